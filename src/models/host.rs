//! Host descriptors supplied to an audit run

use super::credentials::CredentialProfile;
use serde::{Deserialize, Serialize};

/// One audited machine
///
/// `name` is the unique key within a run. Descriptors are read-only for the
/// duration of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    /// Network address (IP or DNS name, no port)
    pub address: String,
    pub port: u16,
    pub credential: CredentialProfile,
    /// Per-host override of the fleet disk threshold
    pub disk_threshold: Option<u8>,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            credential: CredentialProfile::for_host(&name),
            name,
            address: address.into(),
            port: crate::constants::DEFAULT_SSH_PORT,
            disk_threshold: None,
        }
    }

    /// `address:port` target for the transport
    pub fn target(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_defaults() {
        let host = Host::new("web01", "10.0.0.5");
        assert_eq!(host.port, 22);
        assert_eq!(host.credential.as_str(), "patchwatch:web01");
        assert_eq!(host.target(), "10.0.0.5:22");
        assert!(host.disk_threshold.is_none());
    }
}
