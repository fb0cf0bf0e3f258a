//! Bulk CSV import, validation and export for strategic-planning records.
//!
//! - Source decoding: local files or any `AsyncRead`, gzip/zstd, non-UTF-8 charsets.
//! - Dry-run validation: `validate` / `validate_text` never touch the store.
//! - Batch import: `Importer::import` persists row by row and keeps an `ImportJob` ledger.
//! - Export: `to_csv` / `export_table` serialize fetched records back to CSV.
//!
//! Data shape:
//! - `ParsedCsv { headers, rows }`
//! - `ValidationResult { is_valid, errors, warnings, row_count }`
//! - `ImportOutcome::{ValidationFailed, SystemError, Completed}`
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod audit;
mod codec;
mod config;
mod csv;
mod export;
mod importer;
mod io;
mod job;
mod kind;
mod rate_limit;
mod record;
mod sanitize;
mod schema;
mod store;

pub use crate::audit::{AuditEvent, AuditSink, MemoryAuditSink, Severity, TracingAuditSink};
pub use crate::config::{ImportConfig, RateLimitConfig};
pub use crate::csv::{header_key, parse_csv, parse_reader, ParsedCsv};
pub use crate::export::{export_filename, export_table, to_csv, ExportArtifact};
pub use crate::importer::{ImportOutcome, ImportRequest, ImportSummary, Importer};
pub use crate::io::{build_text_reader, read_source, reader_from_path, SourceInfo, SourceMeta};
pub use crate::job::{ImportJob, JobStatus, RowError};
pub use crate::kind::{KindRegistry, KindSpec, RowMapper, KPIS, STRATEGIC_GOALS};
pub use crate::rate_limit::{RateLimitCache, RateLimitDecision};
pub use crate::record::{GoalRecord, GoalStatus, ImportedRecord, KpiFrequency, KpiRecord, RowView};
pub use crate::sanitize::{sanitize, sanitize_bounded, sanitize_str};
pub use crate::schema::{validate, validate_text, ColumnRule, ColumnSpec, Schema, ValidationResult};
pub use crate::store::{InMemoryStore, Pagination, RecordStore, StoreError};

use std::time::Duration;
use thiserror::Error;

/// Error type returned by this crate when not using `anyhow`.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Malformed CSV: {0}")]
    MalformedCsv(String),
    #[error("Schema validation failed with {} error(s)", .0.len())]
    SchemaValidationFailed(Vec<String>),
    #[error("Row {row}: {message}")]
    RowPersistenceFailed { row: usize, message: String },
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("Unknown import kind: {0}")]
    UnknownKind(String),
    #[error("Rate limit exceeded; retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("Job invariant violated: {0}")]
    InvariantViolated(String),
    #[error("Import cancelled")]
    Cancelled,
    #[error("System error: {0}")]
    System(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    /// Errors that abort a whole batch rather than a single row.
    pub fn is_system(&self) -> bool {
        !matches!(
            self,
            ImportError::MalformedCsv(_)
                | ImportError::SchemaValidationFailed(_)
                | ImportError::RowPersistenceFailed { .. }
                | ImportError::PayloadTooLarge { .. }
        )
    }
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;
