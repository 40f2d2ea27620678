//! Disk capacity monitor

use super::session::RemoteSession;
use serde::{Deserialize, Serialize};

const DF_CMD: &str = "df -P -h 2>/dev/null";

/// In-memory filesystem families never worth alerting on
const VIRTUAL_FILESYSTEMS: &[&str] = &["tmpfs", "devtmpfs"];

/// One mount at or above the threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPartition {
    pub filesystem: String,
    pub mountpoint: String,
    pub used_percent: u8,
}

/// Result of a disk check
///
/// Invariant: `alert == !partitions.is_empty()`, upheld by the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskState {
    alert: bool,
    threshold: u8,
    partitions: Vec<DiskPartition>,
    error: Option<String>,
}

impl DiskState {
    /// Evaluated mounts; `partitions` must only hold mounts at or above `threshold`
    pub fn evaluated(threshold: u8, partitions: Vec<DiskPartition>) -> Self {
        Self {
            alert: !partitions.is_empty(),
            threshold,
            partitions,
            error: None,
        }
    }

    /// The check itself failed; never an alert
    pub fn failed(threshold: u8, message: impl Into<String>) -> Self {
        Self {
            alert: false,
            threshold,
            partitions: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn alert(&self) -> bool {
        self.alert
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn partitions(&self) -> &[DiskPartition] {
        &self.partitions
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Parse `df -P` output and keep rows at or above `threshold`
///
/// Rows whose use% column does not parse are skipped. Empty or header-only
/// output is an error.
pub fn parse_df(raw: &str, threshold: u8) -> Result<Vec<DiskPartition>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("No output from 'df'".to_string());
    }

    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() <= 1 {
        return Err("'df' output is invalid or incomplete".to_string());
    }

    let mut partitions = Vec::new();
    // Filesystem  Size  Used  Avail  Use%  Mounted-on
    for line in &lines[1..] {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }

        let filesystem = parts[0];
        if VIRTUAL_FILESYSTEMS
            .iter()
            .any(|prefix| filesystem.starts_with(prefix))
        {
            continue;
        }

        let Ok(used_percent) = parts[4].trim_end_matches('%').parse::<u8>() else {
            continue;
        };

        if used_percent >= threshold {
            partitions.push(DiskPartition {
                filesystem: filesystem.to_string(),
                mountpoint: parts[5..].join(" "),
                used_percent,
            });
        }
    }

    Ok(partitions)
}

/// Check mounts on the connected host against `threshold` (percent used)
///
/// Never fails: errors end up in [`DiskState::error`].
pub async fn check_disk(session: &dyn RemoteSession, threshold: u8) -> DiskState {
    if threshold > 100 {
        return DiskState::failed(
            threshold,
            format!("Invalid threshold: {}. Must be between 0 and 100", threshold),
        );
    }

    let output = match session.execute(DF_CMD).await {
        Ok(output) => output,
        Err(e) => return DiskState::failed(threshold, format!("Failed to run df: {}", e)),
    };

    if output.stdout.trim().is_empty() && !output.stderr.trim().is_empty() {
        return DiskState::failed(threshold, output.stderr.trim().to_string());
    }

    match parse_df(&output.stdout, threshold) {
        Ok(partitions) => {
            if !partitions.is_empty() {
                tracing::info!(
                    host = session.server_name(),
                    mounts = partitions.len(),
                    threshold,
                    "disk usage above threshold"
                );
            }
            DiskState::evaluated(threshold, partitions)
        }
        Err(message) => DiskState::failed(threshold, message),
    }
}
