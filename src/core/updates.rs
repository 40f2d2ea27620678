//! Pending update classification
//!
//! Each package family implements [`UpdateClassifier`], which only knows how
//! to list upgradable and security-flagged package names. The split into
//! critical / security / regular and the host status are computed once, in
//! [`classify_updates`], from those two lists.
//!
//! # Example
//!
//! ```ignore
//! let classifier = classifier_for(Distribution::Ubuntu).unwrap();
//! let check = check_updates(classifier, &session, &keywords).await;
//! println!("{}: {} critical", check.status, check.updates.critical.len());
//! ```

use super::distro::Distribution;
use super::session::RemoteSession;
use crate::utils::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Host-level status; carries only the update-classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    Critical,
    Security,
    Regular,
    UpToDate,
    Warning,
    Error,
}

impl UpdateStatus {
    pub const ALL: [UpdateStatus; 6] = [
        UpdateStatus::Critical,
        UpdateStatus::Security,
        UpdateStatus::Regular,
        UpdateStatus::UpToDate,
        UpdateStatus::Warning,
        UpdateStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Critical => "critical",
            UpdateStatus::Security => "security",
            UpdateStatus::Regular => "regular",
            UpdateStatus::UpToDate => "up-to-date",
            UpdateStatus::Warning => "warning",
            UpdateStatus::Error => "error",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending updates split into three disjoint lists
///
/// Counts are always derived from the lists (`.len()`), never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSet {
    /// Security-flagged packages matching a critical keyword
    pub critical: Vec<String>,
    /// Security-flagged packages that are not critical
    pub security: Vec<String>,
    /// Upgradable packages with no security flag
    pub regular: Vec<String>,
}

impl UpdateSet {
    /// Distinct packages with a pending update
    pub fn total(&self) -> usize {
        self.critical.len() + self.security.len() + self.regular.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Outcome of the update check for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub status: UpdateStatus,
    pub error: Option<String>,
    pub updates: UpdateSet,
}

impl UpdateCheck {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: UpdateStatus::Error,
            error: Some(message.into()),
            updates: UpdateSet::default(),
        }
    }
}

/// Package-manager specific listing logic
#[async_trait::async_trait]
pub trait UpdateClassifier: Send + Sync {
    /// Short name used in error messages ("APT", "YUM", "DNF")
    fn label(&self) -> &'static str;

    /// Refresh package metadata before listing. Best-effort; never fails.
    async fn refresh(&self, _session: &dyn RemoteSession) {}

    /// Names of every package with a pending update
    async fn list_upgradable(&self, session: &dyn RemoteSession)
        -> Result<Vec<String>, SessionError>;

    /// Names of packages whose pending update is flagged as a security fix
    async fn list_security(&self, session: &dyn RemoteSession)
        -> Result<Vec<String>, SessionError>;
}

/// Debian family (apt)
#[derive(Debug, Clone, Copy, Default)]
pub struct AptClassifier;

/// RHEL family (yum)
#[derive(Debug, Clone, Copy, Default)]
pub struct YumClassifier;

/// Fedora family (dnf)
#[derive(Debug, Clone, Copy, Default)]
pub struct DnfClassifier;

static APT: AptClassifier = AptClassifier;
static YUM: YumClassifier = YumClassifier;
static DNF: DnfClassifier = DnfClassifier;

/// Pick the classifier for a detected distribution
///
/// Returns `None` for families without a supported package manager.
pub fn classifier_for(distro: Distribution) -> Option<&'static dyn UpdateClassifier> {
    match distro {
        Distribution::Ubuntu | Distribution::Debian => Some(&APT),
        Distribution::Centos | Distribution::Rhel => Some(&YUM),
        Distribution::Fedora => Some(&DNF),
        Distribution::Opensuse | Distribution::Unknown => None,
    }
}

#[async_trait::async_trait]
impl UpdateClassifier for AptClassifier {
    fn label(&self) -> &'static str {
        "APT"
    }

    async fn refresh(&self, session: &dyn RemoteSession) {
        match session
            .execute("sudo -n apt-get update >/dev/null 2>&1")
            .await
        {
            Ok(output) if output.exit_status != 0 => tracing::debug!(
                host = session.server_name(),
                status = output.exit_status,
                "apt-get update did not complete, listing cached metadata"
            ),
            Ok(_) => {}
            Err(e) => tracing::debug!(
                host = session.server_name(),
                error = %e,
                "apt-get update failed, listing cached metadata"
            ),
        }
    }

    async fn list_upgradable(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<Vec<String>, SessionError> {
        let output = session.execute("apt list --upgradable 2>/dev/null").await?;
        Ok(parse_apt_list(&output.stdout))
    }

    async fn list_security(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<Vec<String>, SessionError> {
        let output = session
            .execute("apt list --upgradable 2>/dev/null | grep -i security")
            .await?;
        Ok(parse_apt_list(&output.stdout))
    }
}

#[async_trait::async_trait]
impl UpdateClassifier for YumClassifier {
    fn label(&self) -> &'static str {
        "YUM"
    }

    async fn list_upgradable(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<Vec<String>, SessionError> {
        rpm_check_update(session, "yum", false).await
    }

    async fn list_security(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<Vec<String>, SessionError> {
        rpm_check_update(session, "yum", true).await
    }
}

#[async_trait::async_trait]
impl UpdateClassifier for DnfClassifier {
    fn label(&self) -> &'static str {
        "DNF"
    }

    async fn list_upgradable(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<Vec<String>, SessionError> {
        rpm_check_update(session, "dnf", false).await
    }

    async fn list_security(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<Vec<String>, SessionError> {
        rpm_check_update(session, "dnf", true).await
    }
}

// `check-update` exits 100 when updates exist, so the exit status is ignored.
async fn rpm_check_update(
    session: &dyn RemoteSession,
    tool: &str,
    security_only: bool,
) -> Result<Vec<String>, SessionError> {
    let command = if security_only {
        format!("{} check-update --security 2>/dev/null", tool)
    } else {
        format!("{} check-update 2>/dev/null", tool)
    };
    let output = session.execute(&command).await?;
    Ok(parse_rpm_check_update(&output.stdout))
}

/// Parse `apt list --upgradable` rows (`name/suite version arch [...]`)
pub fn parse_apt_list(raw: &str) -> Vec<String> {
    dedup_names(raw.lines().filter(|line| line.contains('/')).filter_map(|line| {
        let name = line.split('/').next()?.trim();
        (!name.is_empty()).then(|| name.to_string())
    }))
}

/// Banner lines printed by yum/dnf that look like package rows
const RPM_BANNERS: &[&str] = &[
    "Last metadata expiration check",
    "Loaded plugins",
    "Loading mirror speeds",
    "Obsoleting Packages",
    "Security:",
    "Updating Subscription Management",
    "No security updates",
];

/// Parse `yum/dnf check-update` rows (`name.arch version repo`)
pub fn parse_rpm_check_update(raw: &str) -> Vec<String> {
    dedup_names(
        raw.lines()
            .filter(|line| {
                line.chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric())
            })
            .filter(|line| !RPM_BANNERS.iter().any(|banner| line.starts_with(banner)))
            .filter_map(|line| {
                let mut columns = line.split_whitespace();
                let name = columns.next()?;
                columns.next()?;
                Some(name.to_string())
            }),
    )
}

fn dedup_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.filter(|name| seen.insert(name.clone())).collect()
}

/// Split listed packages into an [`UpdateSet`] and derive the host status
///
/// Pure function of its inputs: identical listings always yield identical
/// results.
pub fn classify_updates(
    upgradable: &[String],
    security_flagged: &[String],
    critical_keywords: &[String],
) -> (UpdateSet, UpdateStatus) {
    let keywords: Vec<String> = critical_keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let flagged = dedup_names(security_flagged.iter().map(|name| name.trim().to_string()));

    let (critical, security): (Vec<String>, Vec<String>) = flagged.iter().cloned().partition(|name| {
        let lower = name.to_lowercase();
        keywords.iter().any(|keyword| lower.contains(keyword.as_str()))
    });

    let flagged_set: HashSet<&str> = flagged.iter().map(String::as_str).collect();
    let regular = dedup_names(
        upgradable
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !flagged_set.contains(name.as_str())),
    );

    let status = if !critical.is_empty() {
        UpdateStatus::Critical
    } else if !flagged.is_empty() {
        UpdateStatus::Security
    } else if !regular.is_empty() {
        UpdateStatus::Regular
    } else {
        UpdateStatus::UpToDate
    };

    (
        UpdateSet {
            critical,
            security,
            regular,
        },
        status,
    )
}

/// Run one classifier against a session
///
/// Transport failures become an `error` status with zeroed lists; they never
/// escape this function.
pub async fn check_updates(
    classifier: &dyn UpdateClassifier,
    session: &dyn RemoteSession,
    critical_keywords: &[String],
) -> UpdateCheck {
    classifier.refresh(session).await;

    let listings = async {
        let upgradable = classifier.list_upgradable(session).await?;
        let security = classifier.list_security(session).await?;
        Ok::<_, SessionError>((upgradable, security))
    }
    .await;

    match listings {
        Ok((upgradable, security)) => {
            let (updates, status) = classify_updates(&upgradable, &security, critical_keywords);
            tracing::debug!(
                host = session.server_name(),
                status = %status,
                critical = updates.critical.len(),
                security = updates.security.len(),
                regular = updates.regular.len(),
                "updates classified"
            );
            UpdateCheck {
                status,
                error: None,
                updates,
            }
        }
        Err(e) => {
            tracing::warn!(host = session.server_name(), error = %e, "{} listing failed", classifier.label());
            UpdateCheck::failed(format!("{} error: {}", classifier.label(), e))
        }
    }
}
