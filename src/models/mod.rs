//! # Domain Models
//!
//! Host descriptors and the credentials used to reach them.
//!
//! ## Security Design
//!
//! The [`SecureString`] type wraps login and escalation secrets:
//! - Secret data is zeroed on drop
//! - Never exposed in `Debug` or `Display` implementations
//!
//! A [`Host`] only carries a [`CredentialProfile`] reference; the secrets are
//! resolved through a `CredentialStore` right before connecting.

pub mod credentials;
pub mod host;

pub use credentials::{CredentialProfile, Credentials, SecureString, Username};
pub use host::Host;
