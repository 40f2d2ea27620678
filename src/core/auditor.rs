//! Per-host audit orchestration
//!
//! Resolves credentials, opens one session, runs distribution detection and
//! the three checks, and always releases the session. Every failure is
//! folded into the returned [`HostAuditRecord`]; nothing propagates.

use super::containers::{check_containers, ContainerState};
use super::credential::CredentialStore;
use super::disk::{check_disk, DiskState};
use super::distro::{detect_distribution, Distribution};
use super::session::{Connector, RemoteSession};
use super::updates::{check_updates, classifier_for, UpdateCheck, UpdateSet, UpdateStatus};
use crate::constants::*;
use crate::models::{Credentials, Host};
use crate::utils::SessionError;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Audit outcome for one host; immutable once returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAuditRecord {
    pub name: String,
    pub address: String,
    /// Update-classification outcome only; containers and disk report separately
    pub status: UpdateStatus,
    pub error: Option<String>,
    pub distribution: Distribution,
    pub updates: UpdateSet,
    pub containers: ContainerState,
    pub disk: DiskState,
    /// Wall-clock time spent on this host
    pub duration_ms: u64,
}

impl HostAuditRecord {
    /// Record for a host whose audit stopped before any check ran
    pub fn failed(host: &Host, disk_threshold: u8, error: impl Into<String>, skipped: &str) -> Self {
        let reason = format!("not checked ({})", skipped);
        Self {
            name: host.name.clone(),
            address: host.address.clone(),
            status: UpdateStatus::Error,
            error: Some(error.into()),
            distribution: Distribution::Unknown,
            updates: UpdateSet::default(),
            containers: ContainerState::skipped(reason.clone()),
            disk: DiskState::failed(disk_threshold, reason),
            duration_ms: 0,
        }
    }

    pub fn has_stale_images(&self) -> bool {
        self.containers.has_stale_images()
    }

    pub fn has_disk_alert(&self) -> bool {
        self.disk.alert()
    }
}

/// Policy knobs shared by every host audit
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Lowercase substrings that promote a security update to critical
    pub critical_keywords: Vec<String>,
    pub disk_threshold: u8,
    pub ignored_images: Vec<String>,
    pub connect_timeout: Duration,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            critical_keywords: DEFAULT_CRITICAL_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            disk_threshold: DEFAULT_DISK_THRESHOLD,
            ignored_images: IGNORED_IMAGES.iter().map(|s| s.to_string()).collect(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Audits one host at a time against a connector and a credential store
#[derive(Clone)]
pub struct HostAuditor {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialStore>,
    settings: Arc<AuditSettings>,
}

impl HostAuditor {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialStore>,
        settings: AuditSettings,
    ) -> Self {
        Self {
            connector,
            credentials,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Disk threshold in force for `host`
    pub fn threshold_for(&self, host: &Host) -> u8 {
        host.disk_threshold.unwrap_or(self.settings.disk_threshold)
    }

    /// Audit one host. Never fails and never panics past this call.
    pub async fn audit(&self, host: &Host) -> HostAuditRecord {
        let started = Instant::now();
        tracing::info!(host = %host.name, address = %host.address, "audit START");

        let mut record = match AssertUnwindSafe(self.audit_inner(host)).catch_unwind().await {
            Ok(record) => record,
            Err(_) => {
                tracing::error!(host = %host.name, "audit panicked");
                HostAuditRecord::failed(
                    host,
                    self.threshold_for(host),
                    "Internal error during audit",
                    "audit aborted",
                )
            }
        };
        record.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            host = %host.name,
            status = %record.status,
            elapsed_ms = record.duration_ms,
            "audit DONE"
        );
        record
    }

    async fn audit_inner(&self, host: &Host) -> HostAuditRecord {
        let threshold = self.threshold_for(host);

        let credentials = match self.credentials.retrieve(&host.credential).await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                tracing::warn!(host = %host.name, profile = %host.credential, "no credentials");
                return HostAuditRecord::failed(host, threshold, "Missing credentials", "missing credentials");
            }
            Err(e) => {
                return HostAuditRecord::failed(
                    host,
                    threshold,
                    format!("Credential lookup failed: {}", e),
                    "missing credentials",
                );
            }
        };

        let session = match self.open_session(host, &credentials).await {
            Ok(session) => session,
            Err(SessionError::Authentication) => {
                tracing::warn!(host = %host.name, "SSH authentication failed");
                return HostAuditRecord::failed(
                    host,
                    threshold,
                    "SSH authentication failed",
                    "SSH authentication failed",
                );
            }
            Err(e) => {
                tracing::warn!(host = %host.name, error = %e, "connection failed");
                return HostAuditRecord::failed(host, threshold, e.to_string(), "connection failed");
            }
        };

        let record = self
            .run_checks(host, session.as_ref(), &credentials, threshold)
            .await;
        session.close().await;
        record
    }

    async fn open_session(
        &self,
        host: &Host,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let limit = self.settings.connect_timeout;
        match timeout(limit, self.connector.connect(host, credentials, limit)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(limit)),
        }
    }

    async fn run_checks(
        &self,
        host: &Host,
        session: &dyn RemoteSession,
        credentials: &Credentials,
        threshold: u8,
    ) -> HostAuditRecord {
        let distribution = detect_distribution(session).await;

        let update_check = match classifier_for(distribution) {
            Some(classifier) => {
                check_updates(classifier, session, &self.settings.critical_keywords).await
            }
            None => UpdateCheck {
                status: UpdateStatus::Warning,
                error: Some(format!("Unsupported distribution: {}", distribution)),
                updates: UpdateSet::default(),
            },
        };

        let containers = check_containers(
            session,
            credentials.escalation_secret(),
            &self.settings.ignored_images,
        )
        .await;
        let disk = check_disk(session, threshold).await;

        HostAuditRecord {
            name: host.name.clone(),
            address: host.address.clone(),
            status: update_check.status,
            error: update_check.error,
            distribution,
            updates: update_check.updates,
            containers,
            disk,
            duration_ms: 0,
        }
    }
}
