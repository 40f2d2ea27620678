//! Distribution detection from system identification files

use super::session::RemoteSession;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identification sources, read in order until one yields text
const RELEASE_SOURCES: &[&str] = &["/etc/os-release", "/etc/redhat-release", "/etc/lsb-release"];

/// Operating-system family of an audited host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Ubuntu,
    Debian,
    Centos,
    Rhel,
    Fedora,
    Opensuse,
    Unknown,
}

impl Distribution {
    /// Markers searched in priority order; the first hit decides the tag
    const MARKERS: &'static [(&'static str, Distribution)] = &[
        ("ubuntu", Distribution::Ubuntu),
        ("debian", Distribution::Debian),
        ("centos", Distribution::Centos),
        ("red hat", Distribution::Rhel),
        ("rhel", Distribution::Rhel),
        ("fedora", Distribution::Fedora),
        ("suse", Distribution::Opensuse),
    ];

    /// Classify raw identification text (case-insensitive substring match)
    pub fn from_release_text(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        Self::MARKERS
            .iter()
            .find(|(marker, _)| lower.contains(marker))
            .map(|(_, distro)| *distro)
            .unwrap_or(Distribution::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Distribution::Ubuntu => "ubuntu",
            Distribution::Debian => "debian",
            Distribution::Centos => "centos",
            Distribution::Rhel => "rhel",
            Distribution::Fedora => "fedora",
            Distribution::Opensuse => "opensuse",
            Distribution::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the distribution of the connected host
///
/// Never fails: unreadable sources are skipped and a host with no readable
/// source is reported as [`Distribution::Unknown`].
pub async fn detect_distribution(session: &dyn RemoteSession) -> Distribution {
    for source in RELEASE_SOURCES {
        let command = format!("cat {} 2>/dev/null", source);
        match session.execute(&command).await {
            Ok(output) if !output.stdout.trim().is_empty() => {
                let distro = Distribution::from_release_text(&output.stdout);
                tracing::debug!(
                    host = session.server_name(),
                    source,
                    distro = %distro,
                    "distribution detected"
                );
                return distro;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(host = session.server_name(), source, error = %e, "release source unreadable");
                continue;
            }
        }
    }

    tracing::warn!(host = session.server_name(), "no readable release file");
    Distribution::Unknown
}
