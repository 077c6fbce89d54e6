//! Run reports and the storage capability they are written through.
//!
//! A [`RunReportItem`] records one execution of a job on a node. Transports fill in
//! the outcome; the dispatcher persists the finished item through a [`ReportStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::Running => write!(f, "running"),
            ReportStatus::Succeeded => write!(f, "succeeded"),
            ReportStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReportItem {
    pub id: Uuid,
    pub job: String,
    pub node: String,
    pub status: ReportStatus,
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReportItem {
    pub fn new(job: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.into(),
            node: node.into(),
            status: ReportStatus::Pending,
            exit_code: None,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = ReportStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_succeeded(&mut self, exit_code: Option<i32>, output: Option<String>) {
        self.status = ReportStatus::Succeeded;
        self.exit_code = exit_code;
        self.output = output;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(
        &mut self,
        exit_code: Option<i32>,
        output: Option<String>,
        error: impl Into<String>,
    ) {
        self.status = ReportStatus::Failed;
        self.exit_code = exit_code;
        self.output = output;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Wall time between start and finish, when both are recorded.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// Storage backend for finished run reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn persist(&self, report: RunReportItem) -> Result<()>;

    /// Reports for `job`, oldest first.
    async fn list_for_job(&self, job: &str) -> Result<Vec<RunReportItem>>;
}

/// Report store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, Vec<RunReportItem>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn persist(&self, report: RunReportItem) -> Result<()> {
        let mut reports = self.reports.write().await;
        let entries = reports.entry(report.job.clone()).or_default();
        entries.push(report);
        entries.sort_by_key(|r| r.started_at);
        Ok(())
    }

    async fn list_for_job(&self, job: &str) -> Result<Vec<RunReportItem>> {
        Ok(self
            .reports
            .read()
            .await
            .get(job)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_pending() {
        let report = RunReportItem::new("backup", "db1");
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.job, "backup");
        assert_eq!(report.node, "db1");
        assert!(report.started_at.is_none());
        assert!(report.duration().is_none());
    }

    #[test]
    fn test_failed_report_keeps_error_and_timing() {
        let mut report = RunReportItem::new("backup", "db1");
        report.mark_started();
        report.mark_failed(Some(2), None, "disk full");
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.exit_code, Some(2));
        assert_eq!(report.error.as_deref(), Some("disk full"));
        assert!(report.finished_at.is_some());
        assert!(report.duration().is_some());
    }

    #[tokio::test]
    async fn test_store_lists_reports_per_job_in_start_order() {
        let store = InMemoryReportStore::new();

        let t0 = Utc::now();
        let mut first = RunReportItem::new("backup", "db1");
        first.mark_succeeded(Some(0), None);
        first.started_at = Some(t0);
        let mut second = RunReportItem::new("backup", "db2");
        second.mark_succeeded(Some(0), None);
        second.started_at = Some(t0 + chrono::Duration::seconds(1));
        let other = RunReportItem::new("rotate-logs", "web1");

        store.persist(second.clone()).await.unwrap();
        store.persist(first.clone()).await.unwrap();
        store.persist(other).await.unwrap();

        let backups = store.list_for_job("backup").await.unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].id, first.id);
        assert_eq!(backups[1].id, second.id);
        assert_eq!(store.len().await, 3);
        assert!(store.list_for_job("unknown").await.unwrap().is_empty());
    }
}
