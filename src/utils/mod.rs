//! # Utilities Module
//!
//! Cross-cutting concerns shared by the core and platform modules.
//!
//! ## Modules
//!
//! - [`errors`]: Typed error hierarchy using `thiserror` for domain-specific errors
//!
//! Error types live here to avoid circular dependencies between `core` and
//! `platform`. Core audit steps never propagate them past a component
//! boundary: each failure is folded into the host's audit record.

pub mod errors;

pub use errors::{ConfigError, CredentialError, ReportError, SessionError};
