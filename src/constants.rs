//! # Application-Wide Constants
//!
//! Centralized defaults and fixed lists used throughout patchwatch.
//!
//! ```rust
//! use patchwatch::constants::*;
//!
//! let timeout = std::time::Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);
//! assert_eq!(timeout.as_secs(), 10);
//! ```

// ============================================================================
// Timeouts and Concurrency
// ============================================================================

/// Maximum time to establish and authenticate one SSH session
///
/// **Rationale**: 10 seconds covers a WAN round-trip plus the key exchange,
/// but keeps an unreachable host from stalling its worker slot.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum time a single remote command may block on I/O
///
/// `apt-get update` on a slow mirror is the long pole here.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Wall-clock budget for the whole fleet pass
pub const DEFAULT_RUN_DEADLINE_SECS: u64 = 900;

/// Hosts audited at the same time
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

// ============================================================================
// Network Defaults
// ============================================================================

pub const DEFAULT_SSH_PORT: u16 = 22;

// ============================================================================
// Audit Policy Defaults
// ============================================================================

/// Used-space percentage at or above which a mount raises a disk alert
pub const DEFAULT_DISK_THRESHOLD: u8 = 80;

/// Weekday (0 = Monday ... 6 = Sunday) on which a report is sent even when
/// nothing is alarming
pub const DEFAULT_REPORT_WEEKDAY: u8 = 4;

/// Package-name substrings that promote a security update to critical
pub const DEFAULT_CRITICAL_KEYWORDS: &[&str] = &[
    "kernel",
    "openssl",
    "libssl",
    "ssh",
    "sudo",
    "bash",
    "systemd",
    "glibc",
    "nginx",
    "apache",
    "httpd",
    "mysql",
    "mariadb",
    "postgresql",
    "php",
    "python",
    "docker",
    "kube",
    "openssh",
    "firewalld",
    "iptables",
    "dbus",
    "pam",
    "polkit",
    "cryptsetup",
    "grub",
];

/// Images known to be deliberately pinned; never reported as stale
pub const IGNORED_IMAGES: &[&str] = &["mongo:4.4.18"];

/// Tag that upstream moves in place
pub const FLOATING_TAG: &str = "latest";

// ============================================================================
// Reports
// ============================================================================

pub const DEFAULT_REPORT_DIR: &str = "reports";

/// Text reports kept after pruning
pub const DEFAULT_REPORT_MAX_FILES: usize = 3;

pub const REPORT_FILE_PREFIX: &str = "patchwatch_report_";

/// Maximum log file size before rotation (bytes)
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
