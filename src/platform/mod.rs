//! Platform-specific implementations
//!
//! All transport code is isolated here; `core` only sees the
//! `RemoteSession`/`Connector` traits.

pub mod ssh;

pub use ssh::{SshConnector, SshSession};
