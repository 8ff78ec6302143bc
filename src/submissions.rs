//! Durable record keeping for contact-form submissions.
//!
//! Writes fail loudly: a submission that cannot be recorded has no recovery
//! path. Reads feed the admin dashboard and degrade to empty or zero results,
//! since an unprovisioned table is a normal first-run state.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::model::{ContactStats, ContactSubmission, DailyAnalytics, NewSubmission, SubmissionStatus};
use crate::store::{StoreError, SubmissionCount, SubmissionStore};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("contact_submissions table is not provisioned")]
    NotProvisioned,
    #[error("Database insert failed: {0}")]
    DatabaseInsertFailed(String),
    #[error("Database insert succeeded but no ID was returned")]
    NoIdReturned,
}

pub struct SubmissionLog {
    store: Arc<dyn SubmissionStore>,
    clock: Arc<dyn Clock>,
    auto_provision: bool,
}

impl SubmissionLog {
    pub fn new(store: Arc<dyn SubmissionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            auto_provision: false,
        }
    }

    /// Provision the schema from the write path when an insert finds it missing.
    pub fn with_auto_provision(mut self, enabled: bool) -> Self {
        self.auto_provision = enabled;
        self
    }

    /// Create the submissions table. Runs outside request handling.
    pub async fn provision(&self) -> Result<(), StoreError> {
        self.store.provision().await
    }

    #[instrument(skip_all)]
    pub async fn log_submission(&self, submission: &NewSubmission) -> Result<String, LogError> {
        let now = self.clock.now();
        let inserted = match self.store.insert_submission(submission, now).await {
            Err(StoreError::SchemaMissing(table)) if self.auto_provision => {
                warn!(table, "submissions table missing; provisioning before retry");
                if let Err(err) = self.store.provision().await {
                    warn!(?err, "provisioning failed; attempting insert anyway");
                }
                self.store.insert_submission(submission, now).await
            }
            other => other,
        };

        let id = match inserted {
            Ok(id) => id,
            Err(StoreError::SchemaMissing(_)) => return Err(LogError::NotProvisioned),
            Err(err) => return Err(LogError::DatabaseInsertFailed(err.to_string())),
        };
        if id.trim().is_empty() {
            return Err(LogError::NoIdReturned);
        }
        info!(id = %id, "submission logged");
        Ok(id)
    }

    /// Best effort: never fails, reports whether the row was patched.
    #[instrument(skip_all)]
    pub async fn update_submission_status(
        &self,
        id: &str,
        status: SubmissionStatus,
        message: Option<&str>,
    ) -> bool {
        if !status.is_terminal() {
            warn!(id, %status, "refusing to move submission back to pending");
            return false;
        }
        match self
            .store
            .update_submission_status(id, status, message, self.clock.now())
            .await
        {
            Ok(true) => {
                info!(id, %status, "submission status updated");
                true
            }
            Ok(false) => {
                warn!(id, %status, "no submission with this id");
                false
            }
            Err(err) => {
                warn!(?err, id, %status, "failed to update submission status");
                false
            }
        }
    }

    pub async fn recent_submissions(&self, limit: i64) -> Vec<ContactSubmission> {
        match self.store.recent_submissions(limit).await {
            Ok(subs) => subs,
            Err(err) => {
                note_read_failure("recent submissions", &err);
                Vec::new()
            }
        }
    }

    pub async fn submission_stats(&self) -> ContactStats {
        let now = self.clock.now();
        let store = &self.store;
        let counts = futures::try_join!(
            store.count_submissions(SubmissionCount::All),
            store.count_submissions(SubmissionCount::CreatedSince(start_of_day(now))),
            store.count_submissions(SubmissionCount::CreatedSince(now - Duration::days(7))),
            store.count_submissions(SubmissionCount::CreatedSince(start_of_month(now))),
            store.count_submissions(SubmissionCount::WithStatus(SubmissionStatus::Sent)),
        );
        match counts {
            Ok((total, today, this_week, this_month, sent)) => ContactStats {
                total,
                today,
                this_week,
                this_month,
                success_rate: success_rate(sent, total),
            },
            Err(err) => {
                note_read_failure("submission stats", &err);
                ContactStats::default()
            }
        }
    }

    /// Per-day totals for the last `days` days, most recent day first.
    pub async fn analytics(&self, days: i64) -> Vec<DailyAnalytics> {
        let since = Duration::try_days(days).and_then(|span| self.clock.now().checked_sub_signed(span));
        let Some(since) = since else {
            warn!(days, "analytics window out of range");
            return Vec::new();
        };
        match self.store.submission_activity_since(since).await {
            Ok(activity) => {
                let mut by_day: BTreeMap<NaiveDate, DailyAnalytics> = BTreeMap::new();
                for item in activity {
                    let date = item.created_at.date_naive();
                    let day = by_day.entry(date).or_insert_with(|| DailyAnalytics {
                        submission_date: date,
                        total_submissions: 0,
                        successful_submissions: 0,
                        failed_submissions: 0,
                        success_rate: 0,
                    });
                    day.total_submissions += 1;
                    match item.status {
                        SubmissionStatus::Sent => day.successful_submissions += 1,
                        SubmissionStatus::Failed => day.failed_submissions += 1,
                        _ => {}
                    }
                }
                by_day
                    .into_values()
                    .rev()
                    .map(|mut day| {
                        day.success_rate =
                            success_rate(day.successful_submissions, day.total_submissions);
                        day
                    })
                    .collect()
            }
            Err(err) => {
                note_read_failure("analytics", &err);
                Vec::new()
            }
        }
    }
}

/// Percentage of `successful` in `total`, rounded; 0 when there is nothing to count.
pub fn success_rate(successful: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (successful as f64 * 100.0 / total as f64).round() as i64
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    midnight(now.date_naive()).unwrap_or(now)
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(midnight)
        .unwrap_or(now)
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn note_read_failure(what: &str, err: &StoreError) {
    if err.is_schema_missing() {
        info!(what, "submissions table not provisioned yet; returning empty result");
    } else {
        warn!(?err, what, "failed to read submissions");
    }
}
