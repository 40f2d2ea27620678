//! Credential types for SSH logins and privilege escalation
//!
//! SECURITY: Credential types implement Drop to clear sensitive data.

use crate::utils::CredentialError;
use std::fmt;

/// Remote login name
///
/// Accepts anything an SSH server would accept as a user name, but rejects
/// empty values, whitespace and control characters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    /// Create a new username after validation
    pub fn new(username: impl Into<String>) -> Result<Self, CredentialError> {
        let username = username.into();

        if username.is_empty() {
            return Err(CredentialError::InvalidUsername(
                "Username cannot be empty".to_string(),
            ));
        }

        if username.len() > 256 {
            return Err(CredentialError::InvalidUsername(
                "Username exceeds maximum length (256)".to_string(),
            ));
        }

        if username
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(CredentialError::InvalidUsername(
                "Username cannot contain whitespace or control characters".to_string(),
            ));
        }

        Ok(Username(username))
    }

    /// Get the username as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Username {
    type Error = CredentialError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Username::new(value)
    }
}

/// Secret that zeros memory on drop
///
/// SECURITY: This type never implements Display or Debug in a way that reveals the secret.
pub struct SecureString(String);

impl Clone for SecureString {
    fn clone(&self) -> Self {
        SecureString(self.0.clone())
    }
}

impl SecureString {
    /// Create a new secure string
    pub fn new(secret: impl Into<String>) -> Self {
        SecureString(secret.into())
    }

    /// Get the secret as a string slice
    ///
    /// Use this sparingly and only when handing the secret to the transport.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        // SAFETY: We own this String and overwrite it with zeros (valid UTF-8) before drop
        unsafe {
            let bytes = self.0.as_bytes_mut();
            for byte in bytes {
                std::ptr::write_volatile(byte, 0);
            }
        }
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SECURITY: Never reveal the secret content
        write!(f, "SecureString(*** {} bytes ***)", self.0.len())
    }
}

/// Login credentials for one host, plus the optional sudo secret
#[derive(Clone, Debug)]
pub struct Credentials {
    username: Username,
    password: SecureString,
    escalation: Option<SecureString>,
}

impl Credentials {
    /// Create credentials without an escalation secret
    pub fn new(username: Username, password: SecureString) -> Self {
        Credentials {
            username,
            password,
            escalation: None,
        }
    }

    /// Attach the secret fed to `sudo -S` when the container runtime needs root
    pub fn with_escalation(mut self, secret: SecureString) -> Self {
        self.escalation = Some(secret);
        self
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn password(&self) -> &SecureString {
        &self.password
    }

    pub fn escalation_secret(&self) -> Option<&SecureString> {
        self.escalation.as_ref().filter(|s| !s.is_empty())
    }
}

/// Reference to a stored credential profile
///
/// This is just a name/identifier, not the actual credentials.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CredentialProfile(String);

impl CredentialProfile {
    /// Prefix used for per-host profiles
    pub const HOST_PREFIX: &'static str = "patchwatch:";

    pub fn new(name: impl Into<String>) -> Self {
        CredentialProfile(name.into())
    }

    /// Profile conventionally used for a host's inline credentials
    pub fn for_host(host_name: &str) -> Self {
        CredentialProfile(format!("{}{}", Self::HOST_PREFIX, host_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
