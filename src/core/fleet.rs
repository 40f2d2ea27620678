//! Fleet aggregation and notification policy

use super::auditor::{HostAuditRecord, HostAuditor};
use super::updates::UpdateStatus;
use crate::models::Host;
use chrono::{DateTime, Local, Weekday};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};

pub const CANCELLED_MESSAGE: &str = "audit cancelled";
pub const DEADLINE_MESSAGE: &str = "run deadline exceeded";

/// Read-only counts derived from the host records of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total: usize,
    pub by_status: BTreeMap<UpdateStatus, usize>,
    /// Hosts whose update check did not end in `error`
    pub successful: usize,
    pub hosts_with_runtime: usize,
    pub hosts_with_stale_images: usize,
    pub hosts_with_disk_alert: usize,
}

impl FleetSummary {
    pub fn from_records(records: &[HostAuditRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            by_status: UpdateStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            ..Self::default()
        };

        for record in records {
            *summary.by_status.entry(record.status).or_insert(0) += 1;
            if record.status != UpdateStatus::Error {
                summary.successful += 1;
            }
            if record.containers.has_runtime {
                summary.hosts_with_runtime += 1;
            }
            if record.has_stale_images() {
                summary.hosts_with_stale_images += 1;
            }
            if record.has_disk_alert() {
                summary.hosts_with_disk_alert += 1;
            }
        }
        summary
    }

    pub fn count(&self, status: UpdateStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationReason {
    CriticalUpdates,
    DiskAlerts,
    ScheduledReport,
}

impl NotificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalUpdates => "critical updates detected",
            Self::DiskAlerts => "disk alert(s) detected",
            Self::ScheduledReport => "scheduled report day",
        }
    }
}

impl fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDecision {
    pub notify: bool,
    pub reason: Option<NotificationReason>,
}

impl NotificationDecision {
    fn because(reason: NotificationReason) -> Self {
        Self {
            notify: true,
            reason: Some(reason),
        }
    }

    fn quiet() -> Self {
        Self {
            notify: false,
            reason: None,
        }
    }
}

/// Decide whether this run warrants a notification. First matching rule wins.
///
/// `report_weekday` counts from Monday = 0.
pub fn decide_notification(
    summary: &FleetSummary,
    today: Weekday,
    report_weekday: u8,
) -> NotificationDecision {
    if summary.count(UpdateStatus::Critical) > 0 {
        NotificationDecision::because(NotificationReason::CriticalUpdates)
    } else if summary.hosts_with_disk_alert > 0 {
        NotificationDecision::because(NotificationReason::DiskAlerts)
    } else if today.num_days_from_monday() == u32::from(report_weekday) {
        NotificationDecision::because(NotificationReason::ScheduledReport)
    } else {
        NotificationDecision::quiet()
    }
}

/// Sole output of a fleet run, handed to the report renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    /// One record per configured host, in configuration order
    pub hosts: Vec<HostAuditRecord>,
    pub summary: FleetSummary,
    pub notification: NotificationDecision,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy)]
pub struct FleetSettings {
    pub max_concurrency: usize,
    pub deadline: Duration,
    pub report_weekday: u8,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            max_concurrency: crate::constants::DEFAULT_MAX_CONCURRENCY,
            deadline: Duration::from_secs(crate::constants::DEFAULT_RUN_DEADLINE_SECS),
            report_weekday: crate::constants::DEFAULT_REPORT_WEEKDAY,
        }
    }
}

pub struct FleetAuditor {
    auditor: HostAuditor,
    settings: FleetSettings,
}

impl FleetAuditor {
    pub fn new(auditor: HostAuditor, settings: FleetSettings) -> Self {
        Self { auditor, settings }
    }

    /// Audit every host and aggregate the results
    ///
    /// Hosts run with bounded concurrency; output keeps input order. A host
    /// that has not finished by the run deadline, or had not started when
    /// `cancel` flipped to `true`, gets an error record instead of being
    /// dropped.
    pub async fn run(
        &self,
        hosts: &[Host],
        today: Weekday,
        cancel: watch::Receiver<bool>,
    ) -> FleetReport {
        let started_at = Local::now();
        let deadline = Instant::now() + self.settings.deadline;
        let limit = self.settings.max_concurrency.max(1);

        tracing::info!(
            hosts = hosts.len(),
            concurrency = limit,
            deadline_secs = self.settings.deadline.as_secs(),
            "fleet audit START"
        );

        let records: Vec<HostAuditRecord> = stream::iter(hosts)
            .map(|host| {
                let cancel = cancel.clone();
                async move { self.audit_one(host, deadline, &cancel).await }
            })
            .buffered(limit)
            .collect()
            .await;

        let summary = FleetSummary::from_records(&records);
        let notification = decide_notification(&summary, today, self.settings.report_weekday);

        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            critical = summary.count(UpdateStatus::Critical),
            disk_alerts = summary.hosts_with_disk_alert,
            notify = notification.notify,
            "fleet audit DONE"
        );

        FleetReport {
            hosts: records,
            summary,
            notification,
            started_at,
            finished_at: Local::now(),
        }
    }

    async fn audit_one(
        &self,
        host: &Host,
        deadline: Instant,
        cancel: &watch::Receiver<bool>,
    ) -> HostAuditRecord {
        let threshold = self.auditor.threshold_for(host);
        if *cancel.borrow() {
            tracing::warn!(host = %host.name, "skipped: run cancelled");
            return HostAuditRecord::failed(host, threshold, CANCELLED_MESSAGE, CANCELLED_MESSAGE);
        }

        if Instant::now() >= deadline {
            tracing::warn!(host = %host.name, "skipped: run deadline reached");
            return HostAuditRecord::failed(host, threshold, DEADLINE_MESSAGE, DEADLINE_MESSAGE);
        }

        match timeout_at(deadline, self.auditor.audit(host)).await {
            Ok(record) => record,
            Err(_) => {
                tracing::warn!(host = %host.name, "abandoned at run deadline");
                HostAuditRecord::failed(host, threshold, DEADLINE_MESSAGE, DEADLINE_MESSAGE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auditor::AuditSettings;
    use crate::core::credential::StaticCredentialStore;
    use crate::core::mock_session::{MockConnector, MockRemoteSession};
    use crate::models::{CredentialProfile, Credentials, SecureString, Username};
    use std::sync::Arc;

    fn record(name: &str, status: UpdateStatus) -> HostAuditRecord {
        let mut record = HostAuditRecord::failed(&Host::new(name, "10.0.0.1"), 80, "x", "test");
        record.status = status;
        record.error = None;
        record
    }

    fn with_disk_alert(mut record: HostAuditRecord) -> HostAuditRecord {
        record.disk = crate::core::disk::DiskState::evaluated(
            80,
            vec![crate::core::disk::DiskPartition {
                filesystem: "/dev/sda1".to_string(),
                mountpoint: "/".to_string(),
                used_percent: 91,
            }],
        );
        record
    }

    fn fleet(connector: MockConnector, names: &[&str], settings: FleetSettings) -> FleetAuditor {
        let mut store = StaticCredentialStore::new();
        for name in names {
            store.insert(
                CredentialProfile::for_host(name),
                Credentials::new(Username::new("ops").unwrap(), SecureString::new("pw")),
            );
        }
        let auditor = HostAuditor::new(
            Arc::new(connector),
            Arc::new(store),
            AuditSettings {
                connect_timeout: Duration::from_secs(5),
                ..AuditSettings::default()
            },
        );
        FleetAuditor::new(auditor, settings)
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            record("a", UpdateStatus::Critical),
            with_disk_alert(record("b", UpdateStatus::UpToDate)),
            record("c", UpdateStatus::Error),
        ];
        let summary = FleetSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.count(UpdateStatus::Critical), 1);
        assert_eq!(summary.count(UpdateStatus::Security), 0);
        assert_eq!(summary.hosts_with_disk_alert, 1);
        assert_eq!(summary.hosts_with_stale_images, 0);
    }

    #[test]
    fn test_notify_on_critical_first() {
        let records = vec![
            record("a", UpdateStatus::Critical),
            with_disk_alert(record("b", UpdateStatus::Regular)),
        ];
        let decision =
            decide_notification(&FleetSummary::from_records(&records), Weekday::Mon, 4);
        assert!(decision.notify);
        assert_eq!(decision.reason, Some(NotificationReason::CriticalUpdates));
    }

    #[test]
    fn test_notify_on_disk_alert() {
        let records = vec![with_disk_alert(record("b", UpdateStatus::Regular))];
        let decision =
            decide_notification(&FleetSummary::from_records(&records), Weekday::Fri, 4);
        assert_eq!(decision.reason, Some(NotificationReason::DiskAlerts));
        assert_eq!(decision.reason.unwrap().to_string(), "disk alert(s) detected");
    }

    #[test]
    fn test_notify_on_scheduled_weekday() {
        let records = vec![record("a", UpdateStatus::UpToDate)];
        let decision =
            decide_notification(&FleetSummary::from_records(&records), Weekday::Fri, 4);
        assert!(decision.notify);
        assert_eq!(decision.reason, Some(NotificationReason::ScheduledReport));
    }

    #[test]
    fn test_no_notification_on_quiet_day() {
        let records = vec![
            record("a", UpdateStatus::Security),
            record("b", UpdateStatus::Error),
        ];
        let decision =
            decide_notification(&FleetSummary::from_records(&records), Weekday::Tue, 4);
        assert!(!decision.notify);
        assert!(decision.reason.is_none());
    }

    #[tokio::test]
    async fn test_run_keeps_input_order_and_records_every_host() {
        let connector = MockConnector::new()
            .with_session("a", MockRemoteSession::ubuntu("a"))
            .refusing("b", crate::utils::SessionError::Authentication)
            .with_session("c", MockRemoteSession::ubuntu("c"));
        let fleet = fleet(connector, &["a", "b", "c"], FleetSettings::default());
        let hosts = vec![
            Host::new("a", "10.0.0.1"),
            Host::new("b", "10.0.0.2"),
            Host::new("c", "10.0.0.3"),
        ];
        let (_tx, rx) = watch::channel(false);

        let report = fleet.run(&hosts, Weekday::Tue, rx).await;

        let names: Vec<_> = report.hosts.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(report.summary.count(UpdateStatus::Critical), 2);
        assert_eq!(report.summary.count(UpdateStatus::Error), 1);
        assert_eq!(report.summary.hosts_with_stale_images, 2);
        assert_eq!(
            report.notification.reason,
            Some(NotificationReason::CriticalUpdates)
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_records_unstarted_hosts() {
        let connector = MockConnector::new().with_session("a", MockRemoteSession::ubuntu("a"));
        let fleet = fleet(connector, &["a"], FleetSettings::default());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = fleet.run(&[Host::new("a", "10.0.0.1")], Weekday::Tue, rx).await;

        assert_eq!(report.hosts.len(), 1);
        assert_eq!(report.hosts[0].status, UpdateStatus::Error);
        assert_eq!(report.hosts[0].error.as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn test_deadline_records_slow_hosts() {
        let connector = MockConnector::new()
            .with_session("a", MockRemoteSession::ubuntu("a"))
            .with_session("b", MockRemoteSession::ubuntu("b"))
            .with_delay(Duration::from_millis(500));
        let settings = FleetSettings {
            max_concurrency: 1,
            deadline: Duration::from_millis(50),
            report_weekday: 4,
        };
        let fleet = fleet(connector, &["a", "b"], settings);
        let (_tx, rx) = watch::channel(false);

        let report = fleet
            .run(
                &[Host::new("a", "10.0.0.1"), Host::new("b", "10.0.0.2")],
                Weekday::Tue,
                rx,
            )
            .await;

        assert_eq!(report.hosts.len(), 2);
        assert!(report
            .hosts
            .iter()
            .all(|r| r.error.as_deref() == Some(DEADLINE_MESSAGE)));
        assert!(!report.notification.notify);
    }

    #[tokio::test]
    async fn test_no_connection_opened_after_deadline() {
        let connector = MockConnector::new()
            .with_session("a", MockRemoteSession::ubuntu("a"))
            .with_session("b", MockRemoteSession::ubuntu("b"))
            .with_session("c", MockRemoteSession::ubuntu("c"))
            .with_session("d", MockRemoteSession::ubuntu("d"))
            .with_delay(Duration::from_millis(500));
        let counter = connector.clone();
        let settings = FleetSettings {
            max_concurrency: 1,
            deadline: Duration::from_millis(50),
            report_weekday: 4,
        };
        let fleet = fleet(connector, &["a", "b", "c", "d"], settings);
        let hosts: Vec<Host> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, name)| Host::new(*name, format!("10.0.0.{}", i + 1)))
            .collect();
        let (_tx, rx) = watch::channel(false);

        let report = fleet.run(&hosts, Weekday::Tue, rx).await;

        assert_eq!(report.hosts.len(), 4);
        assert!(report
            .hosts
            .iter()
            .all(|r| r.error.as_deref() == Some(DEADLINE_MESSAGE)));
        assert_eq!(counter.attempts(), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_run_lets_in_flight_host_finish() {
        let connector = MockConnector::new()
            .with_session("a", MockRemoteSession::ubuntu("a"))
            .with_session("b", MockRemoteSession::ubuntu("b"))
            .with_delay(Duration::from_millis(100));
        let counter = connector.clone();
        let settings = FleetSettings {
            max_concurrency: 1,
            ..FleetSettings::default()
        };
        let fleet = fleet(connector, &["a", "b"], settings);
        let hosts = vec![Host::new("a", "10.0.0.1"), Host::new("b", "10.0.0.2")];
        let (tx, rx) = watch::channel(false);

        let (report, _) = tokio::join!(fleet.run(&hosts, Weekday::Tue, rx), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(report.hosts[0].status, UpdateStatus::Critical);
        assert!(report.hosts[0].error.is_none());
        assert!(report.hosts[0].has_disk_alert());
        assert_eq!(report.hosts[1].status, UpdateStatus::Error);
        assert_eq!(report.hosts[1].error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(counter.attempts(), 1);
    }
}
