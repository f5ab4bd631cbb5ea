use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;

use crate::events::{ReportEvent, ReportSubscription};
use crate::models::{Candidate, Report};

/// Read side of the report store, as the engine sees it.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Open, active, non-deleted reports not owned by `exclude_owner`.
    async fn list_active_reports(&self, exclude_owner: &str) -> Result<Vec<Report>>;

    /// Insert/update notifications for the same reports.
    fn subscribe(&self) -> ReportSubscription;
}

pub struct CandidateScanner {
    source: Arc<dyn ReportSource>,
    user_id: String,
    query_timeout: Duration,
}

impl CandidateScanner {
    pub fn new(source: Arc<dyn ReportSource>, user_id: String, query_timeout: Duration) -> Self {
        Self {
            source,
            user_id,
            query_timeout,
        }
    }

    /// Query the store for every eligible report. Rows without geodata are
    /// dropped here, not reported as errors.
    pub async fn full_scan(&self) -> Result<Vec<Candidate>> {
        let reports = tokio::time::timeout(
            self.query_timeout,
            self.source.list_active_reports(&self.user_id),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "report query timed out after {}ms",
                self.query_timeout.as_millis()
            )
        })??;

        let total = reports.len();
        let candidates: Vec<Candidate> = reports
            .into_iter()
            .filter_map(|report| self.eligible(report))
            .collect();

        if candidates.len() < total {
            debug!(
                "full scan kept {} of {} reports (others lacked geodata or were ineligible)",
                candidates.len(),
                total
            );
        }

        Ok(candidates)
    }

    /// Turn a single change event into a candidate, skipping the full query.
    pub fn incremental(&self, event: ReportEvent) -> Option<Candidate> {
        if !event.warrants_immediate_scan() {
            return None;
        }
        self.eligible(event.into_report())
    }

    fn eligible(&self, report: Report) -> Option<Candidate> {
        if !report.status.is_open() || report.owner_id == self.user_id {
            return None;
        }
        Candidate::from_report(report)
    }
}
