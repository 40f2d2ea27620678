//! Core audit logic (transport-agnostic)
//!
//! CRITICAL: This module MUST NOT import platform-specific code. Everything
//! here talks to hosts through the `RemoteSession` trait.

pub mod auditor;
pub mod containers;
pub mod credential;
pub mod disk;
pub mod distro;
pub mod fleet;
pub mod session;
pub mod updates;

// Test utilities for mock sessions (tests only)
#[cfg(test)]
pub mod mock_session;

pub use auditor::{AuditSettings, HostAuditRecord, HostAuditor};
pub use containers::{check_containers, ContainerState};
pub use credential::{CredentialStore, StaticCredentialStore};
pub use disk::{check_disk, DiskPartition, DiskState};
pub use distro::{detect_distribution, Distribution};
pub use fleet::{
    decide_notification, FleetAuditor, FleetReport, FleetSettings, FleetSummary,
    NotificationDecision, NotificationReason,
};
pub use session::{CommandOutput, Connector, RemoteSession};
pub use updates::{check_updates, classifier_for, UpdateClassifier, UpdateSet, UpdateStatus};
