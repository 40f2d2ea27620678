//! patchwatch - fleet security-update auditor
//!
//! Core library: the transport-agnostic audit engine (`core`), the SSH
//! transport (`platform`) and the configuration and report collaborators.

// Public modules
pub mod config;
pub mod constants;
pub mod core;
pub mod logger;
pub mod models;
pub mod normalize;
pub mod platform;
pub mod report;
pub mod utils;

// Re-export commonly used types
pub use core::{
    decide_notification, CredentialStore, FleetAuditor, FleetReport, FleetSummary,
    HostAuditRecord, HostAuditor, NotificationDecision, RemoteSession, UpdateStatus,
};
pub use models::{CredentialProfile, Credentials, Host, SecureString, Username};
pub use utils::{ConfigError, CredentialError, ReportError, SessionError};
