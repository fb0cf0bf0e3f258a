//! The import job ledger.
//!
//! Lifecycle: `pending -> processing -> completed | failed` (a pending job may also fail).
//! `total_records` is fixed by `start` and `processed + failed <= total` always holds.

use crate::{ImportError, ImportResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_advance_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row.
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub file_size: usize,
    /// CRC32 of the decoded upload, when it was read through `read_source`.
    pub checksum: Option<u32>,
    pub kind: String,
    pub status: JobStatus,
    pub total_records: usize,
    pub processed_records: usize,
    pub failed_records: usize,
    pub errors: Vec<RowError>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(owner_id: &str, file_name: &str, file_size: usize, kind: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            file_name: file_name.to_string(),
            file_size,
            checksum: None,
            kind: kind.to_string(),
            status: JobStatus::Pending,
            total_records: 0,
            processed_records: 0,
            failed_records: 0,
            errors: Vec::new(),
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    fn advance(&mut self, next: JobStatus) -> ImportResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(ImportError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Enter `processing` with the row count fixed.
    pub fn start(&mut self, total: usize) -> ImportResult<()> {
        self.advance(JobStatus::Processing)?;
        self.total_records = total;
        Ok(())
    }

    fn ensure_room(&self) -> ImportResult<()> {
        if self.status != JobStatus::Processing {
            return Err(ImportError::InvariantViolated(format!(
                "cannot count rows while job is {}",
                self.status
            )));
        }
        if self.attempted() >= self.total_records {
            return Err(ImportError::InvariantViolated(format!(
                "already counted {} of {} rows",
                self.attempted(),
                self.total_records
            )));
        }
        Ok(())
    }

    pub fn record_success(&mut self) -> ImportResult<()> {
        self.ensure_room()?;
        self.processed_records += 1;
        Ok(())
    }

    pub fn record_failure(&mut self, row: usize, message: impl Into<String>) -> ImportResult<()> {
        self.ensure_room()?;
        self.failed_records += 1;
        self.errors.push(RowError {
            row,
            message: message.into(),
        });
        Ok(())
    }

    /// Finished attempting every row; individual rows may still have failed.
    pub fn complete(&mut self) -> ImportResult<()> {
        self.advance(JobStatus::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> ImportResult<()> {
        self.advance(JobStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn attempted(&self) -> usize {
        self.processed_records + self.failed_records
    }

    pub fn is_partial(&self) -> bool {
        self.status == JobStatus::Completed && self.failed_records > 0
    }

    pub fn to_record(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_record(record: Value) -> serde_json::Result<Self> {
        serde_json::from_value(record)
    }

    /// The mutable part of the job, for `update_record`.
    pub fn progress_patch(&self) -> Value {
        json!({
            "status": self.status,
            "processed_records": self.processed_records,
            "failed_records": self.failed_records,
            "errors": self.errors,
            "failure_reason": self.failure_reason,
            "completed_at": self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(total: usize) -> ImportJob {
        let mut job = ImportJob::new("owner-1", "goals.csv", 120, "strategic_goals");
        job.start(total).unwrap();
        job
    }

    #[test]
    fn counts_rows_and_completes() {
        let mut job = started(3);
        job.record_success().unwrap();
        job.record_failure(2, "duplicate name").unwrap();
        job.record_success().unwrap();
        job.complete().unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.processed_records, job.failed_records), (2, 1));
        assert_eq!(job.errors, vec![RowError { row: 2, message: "duplicate name".into() }]);
        assert!(job.is_partial());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn refuses_to_count_past_total() {
        let mut job = started(1);
        job.record_success().unwrap();
        assert!(matches!(
            job.record_failure(2, "x"),
            Err(ImportError::InvariantViolated(_))
        ));
        assert_eq!(job.attempted(), 1);
    }

    #[test]
    fn terminal_states_do_not_move() {
        let mut job = started(0);
        job.complete().unwrap();
        assert!(matches!(
            job.fail("late"),
            Err(ImportError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Failed
            })
        ));
        assert!(job.start(5).is_err());
        assert_eq!(job.total_records, 0);
    }

    #[test]
    fn pending_job_can_fail_but_not_complete() {
        let mut job = ImportJob::new("o", "f.csv", 1, "kpis");
        assert!(job.complete().is_err());
        job.fail("cancelled").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("cancelled"));
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut job = started(2).with_checksum(0xdead_beef);
        job.record_failure(1, "boom").unwrap();
        let back = ImportJob::from_record(job.to_record().unwrap()).unwrap();
        assert_eq!(back, job);
    }
}
