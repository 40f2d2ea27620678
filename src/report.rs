//! Plain-text and JSON report artifacts for a finished fleet run

use crate::constants::REPORT_FILE_PREFIX;
use crate::core::auditor::HostAuditRecord;
use crate::core::fleet::FleetReport;
use crate::core::updates::UpdateStatus;
use crate::utils::ReportError;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Items listed per section before the rest is summarised as "... and N more"
const LIST_LIMIT: usize = 5;
const RULE_WIDTH: usize = 80;

fn status_label(status: UpdateStatus) -> &'static str {
    match status {
        UpdateStatus::Critical => "CRITICAL",
        UpdateStatus::Security => "SECURITY",
        UpdateStatus::Regular => "REGULAR",
        UpdateStatus::UpToDate => "UP TO DATE",
        UpdateStatus::Warning => "WARNING",
        UpdateStatus::Error => "ERROR",
    }
}

fn write_limited(out: &mut String, indent: &str, items: &[String]) {
    for item in items.iter().take(LIST_LIMIT) {
        let _ = writeln!(out, "{indent}- {item}");
    }
    if items.len() > LIST_LIMIT {
        let _ = writeln!(out, "{indent}... and {} more", items.len() - LIST_LIMIT);
    }
}

fn render_host(out: &mut String, host: &HostAuditRecord) {
    let _ = writeln!(out, "{} ({})", host.name, host.address);
    let _ = writeln!(out, "   Distribution: {}", host.distribution);
    let _ = writeln!(out, "   Status: {}", status_label(host.status));

    if let Some(error) = &host.error {
        let _ = writeln!(out, "   Error: {}", error);
    } else {
        let updates = &host.updates;
        let _ = writeln!(out, "   Total updates: {}", updates.total());
        let _ = writeln!(out, "   Critical updates: {}", updates.critical.len());
        let _ = writeln!(out, "   Security updates: {}", updates.security.len());
        let _ = writeln!(out, "   Regular updates: {}", updates.regular.len());
        if !updates.critical.is_empty() {
            let _ = writeln!(out, "   Critical packages:");
            write_limited(out, "     ", &updates.critical);
        }
    }

    let containers = &host.containers;
    if containers.has_runtime {
        match &containers.error {
            Some(error) => {
                let _ = writeln!(out, "   Docker: check failed ({})", error);
            }
            None => {
                let _ = writeln!(out, "   Docker:");
                let _ = writeln!(out, "     Running containers: {}", containers.containers);
                let _ = writeln!(out, "     Images in use: {}", containers.images_total);
                if containers.has_stale_images() {
                    let _ = writeln!(
                        out,
                        "     Images pinned to a fixed tag: {}",
                        containers.outdated_count()
                    );
                    write_limited(out, "       ", &containers.outdated_images);
                } else {
                    let _ = writeln!(out, "     No images flagged for review");
                }
            }
        }
    } else if let Some(error) = containers.error.as_ref().filter(|_| host.error.is_none()) {
        let _ = writeln!(out, "   Docker: check failed ({})", error);
    }

    let disk = &host.disk;
    if disk.alert() {
        let _ = writeln!(out, "   Disk alert (>= {}% used):", disk.threshold());
        for part in disk.partitions() {
            let _ = writeln!(
                out,
                "     - {} mounted on {}: {}% used",
                part.filesystem, part.mountpoint, part.used_percent
            );
        }
    } else if let Some(error) = disk.error().filter(|_| host.error.is_none()) {
        let _ = writeln!(out, "   Disk: check failed ({})", error);
    }
    out.push('\n');
}

/// Render the full plain-text report
pub fn render_text(report: &FleetReport, disk_threshold: u8) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);
    let thin = "-".repeat(40);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "PATCHWATCH - SECURITY UPDATE REPORT");
    let _ = writeln!(out, "Date: {}", report.finished_at.format("%d/%m/%Y %H:%M:%S"));
    let _ = writeln!(out, "{rule}\n");

    let _ = writeln!(out, "SUMMARY");
    let _ = writeln!(out, "{thin}");
    let _ = writeln!(out, "Hosts audited: {}", summary.total);
    let _ = writeln!(out, "Successful checks: {}", summary.successful);
    let _ = writeln!(out, "Critical hosts: {}", summary.count(UpdateStatus::Critical));
    let _ = writeln!(
        out,
        "Hosts with security updates: {}",
        summary.count(UpdateStatus::Security)
    );
    let _ = writeln!(out, "Hosts with Docker: {}", summary.hosts_with_runtime);
    let _ = writeln!(
        out,
        "Hosts with images to review: {}",
        summary.hosts_with_stale_images
    );
    let _ = writeln!(
        out,
        "Hosts with disk alert (>= {}% used): {}",
        disk_threshold, summary.hosts_with_disk_alert
    );
    let _ = writeln!(
        out,
        "Notification: {}\n",
        match report.notification.reason {
            Some(reason) => reason.to_string(),
            None => "none".to_string(),
        }
    );

    for host in &report.hosts {
        render_host(&mut out, host);
    }

    let _ = writeln!(out, "RECOMMENDATIONS");
    let _ = writeln!(out, "{thin}");
    if summary.count(UpdateStatus::Critical) > 0 {
        let _ = writeln!(out, "IMMEDIATE ACTION REQUIRED:");
        let _ = writeln!(out, "   - Apply critical package updates now");
        let _ = writeln!(out, "   - Review system logs after updating");
        let _ = writeln!(out, "   - Reboot where required");
    } else if summary.count(UpdateStatus::Security) > 0 {
        let _ = writeln!(out, "ACTION RECOMMENDED:");
        let _ = writeln!(out, "   - Schedule the pending security updates");
        let _ = writeln!(out, "   - Apply them in the next maintenance window");
    } else {
        let _ = writeln!(out, "FLEET STABLE:");
        let _ = writeln!(out, "   - Keep auditing on the regular schedule");
    }
    if summary.hosts_with_disk_alert > 0 {
        let _ = writeln!(out, "   - Free space on hosts with a disk alert");
    }
    out
}

/// One-paragraph overview for the terminal
pub fn render_summary(report: &FleetReport) -> String {
    let s = &report.summary;
    format!(
        "Hosts audited: {}\nCritical: {} | Security: {} | Regular: {} | Up to date: {} | Warning: {} | Error: {}\nDocker: {} host(s), {} with images to review\nDisk: {} host(s) with an alert",
        s.total,
        s.count(UpdateStatus::Critical),
        s.count(UpdateStatus::Security),
        s.count(UpdateStatus::Regular),
        s.count(UpdateStatus::UpToDate),
        s.count(UpdateStatus::Warning),
        s.count(UpdateStatus::Error),
        s.hosts_with_runtime,
        s.hosts_with_stale_images,
        s.hosts_with_disk_alert,
    )
}

pub fn report_file_name(at: &DateTime<Local>) -> String {
    format!("{}{}.txt", REPORT_FILE_PREFIX, at.format("%Y%m%d_%H%M%S"))
}

/// Write the text report into `dir`, creating it if needed
pub fn write_text_report(
    dir: &Path,
    report: &FleetReport,
    disk_threshold: u8,
) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(&report.finished_at));
    fs::write(&path, render_text(report, disk_threshold))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(path)
}

/// Write the whole [`FleetReport`] as pretty JSON
pub fn write_json_report(path: &Path, report: &FleetReport) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    tracing::info!(path = %path.display(), "JSON report written");
    Ok(())
}

/// Delete older text reports so that at most `max_files` remain
///
/// Returns the removed paths. Files that cannot be removed are logged and kept.
pub fn prune_reports(dir: &Path, max_files: usize) -> Result<Vec<PathBuf>, ReportError> {
    let mut reports: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_report = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(REPORT_FILE_PREFIX) && n.ends_with(".txt"))
            .unwrap_or(false);
        if !is_report {
            continue;
        }
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        reports.push((modified, path));
    }

    if reports.len() <= max_files {
        return Ok(Vec::new());
    }

    // Oldest first; the name carries the timestamp, so it breaks mtime ties.
    reports.sort();
    let excess = reports.len() - max_files;
    let mut removed = Vec::new();
    for (_, path) in reports.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "old report removed");
                removed.push(path);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove old report"),
        }
    }
    Ok(removed)
}
