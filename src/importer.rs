//! Batch import: dry-run check, job ledger, row-by-row persistence.
//!
//! A failing row is recorded in the job's error ledger and counted; it never aborts the
//! batch. Only system-level failures (job writes, cancellation, rate limiting) do, and they
//! move an already created job to `failed`.

use crate::audit::{AuditEvent, AuditSink, Severity, TracingAuditSink};
use crate::config::ImportConfig;
use crate::csv::parse_csv;
use crate::io::SourceInfo;
use crate::job::{ImportJob, RowError};
use crate::kind::{KindRegistry, KindSpec};
use crate::rate_limit::{RateLimitCache, RateLimitDecision};
use crate::record::RowView;
use crate::sanitize::sanitize_bounded;
use crate::schema::{validate_text, Schema, ValidationResult};
use crate::store::{Pagination, RecordStore, StoreError};
use crate::{ImportError, ImportResult};
use futures::{future, stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub raw_text: String,
    pub owner_id: String,
    pub file_name: String,
    pub kind: String,
    /// Present when the text came through `read_source`.
    pub source: Option<SourceInfo>,
}

impl ImportRequest {
    pub fn new(
        raw_text: impl Into<String>,
        owner_id: impl Into<String>,
        file_name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            raw_text: raw_text.into(),
            owner_id: owner_id.into(),
            file_name: file_name.into(),
            kind: kind.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub job_id: String,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

impl ImportSummary {
    fn from_job(job: &ImportJob) -> Self {
        Self {
            job_id: job.id.clone(),
            total: job.total_records,
            processed: job.processed_records,
            failed: job.failed_records,
            errors: job.errors.clone(),
        }
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} of {}; {} failed",
            self.processed, self.total, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Blocking validation errors; no job was created.
    ValidationFailed(ValidationResult),
    /// The batch could not run or was aborted; `job_id` is set if a job had been created.
    SystemError {
        message: String,
        job_id: Option<String>,
    },
    /// Every row was attempted.
    Completed(ImportSummary),
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Completed(_))
    }

    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            ImportOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            ImportOutcome::Completed(summary) => Some(&summary.job_id),
            ImportOutcome::SystemError { job_id, .. } => job_id.as_deref(),
            ImportOutcome::ValidationFailed(_) => None,
        }
    }
}

pub struct Importer<S> {
    store: Arc<S>,
    registry: KindRegistry,
    config: ImportConfig,
    audit: Arc<dyn AuditSink>,
    rate_limiter: Option<Arc<RateLimitCache>>,
}

impl<S: RecordStore> Importer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            registry: KindRegistry::builtin(),
            config: ImportConfig::default(),
            audit: Arc::new(TracingAuditSink),
            rate_limiter: None,
        }
    }

    /// Also installs a rate limiter when `config.rate_limit` is set.
    pub fn with_config(mut self, config: ImportConfig) -> Self {
        if let Some(limits) = &config.rate_limit {
            self.rate_limiter = Some(Arc::new(RateLimitCache::from_config(limits)));
        }
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: KindRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Share one limiter between importers.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimitCache>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    fn schema_for(&self, spec: &KindSpec) -> Schema {
        spec.schema.clone().with_field_limit(self.config.max_field_bytes)
    }

    /// Dry run for previews. Nothing is written.
    pub async fn validate(&self, raw_text: &str, kind: &str) -> ImportResult<ValidationResult> {
        let spec = self.registry.get(kind)?;
        Ok(validate_text(raw_text, &self.schema_for(spec)).await)
    }

    pub async fn import(&self, request: ImportRequest) -> ImportOutcome {
        self.import_with_cancel(request, &CancellationToken::new()).await
    }

    /// `cancel` is checked before each row; a cancelled batch ends as a failed job.
    pub async fn import_with_cancel(
        &self,
        request: ImportRequest,
        cancel: &CancellationToken,
    ) -> ImportOutcome {
        let span = info_span!("import", kind = %request.kind, owner = %request.owner_id);
        self.run(request, cancel).instrument(span).await
    }

    async fn run(&self, request: ImportRequest, cancel: &CancellationToken) -> ImportOutcome {
        let spec = match self.registry.get(&request.kind) {
            Ok(spec) => spec,
            Err(err) => return self.system_error(&request, err, None),
        };

        if request.raw_text.len() > self.config.max_source_bytes {
            let err = ImportError::PayloadTooLarge {
                size: request.raw_text.len(),
                limit: self.config.max_source_bytes,
            };
            return ImportOutcome::ValidationFailed(rejected(err));
        }

        if self.config.validate_before_import {
            let result = validate_text(&request.raw_text, &self.schema_for(spec)).await;
            if !result.is_valid {
                info!(errors = result.errors.len(), "import rejected by validation");
                return ImportOutcome::ValidationFailed(result);
            }
        }

        let parsed = match parse_csv(&request.raw_text).await {
            Ok(parsed) => parsed,
            Err(err) => return ImportOutcome::ValidationFailed(rejected(err)),
        };

        // only uploads that would create a job count against the owner's quota
        if let Some(limiter) = &self.rate_limiter {
            if let RateLimitDecision::Limited { retry_after } = limiter.check(&request.owner_id) {
                return self.system_error(&request, ImportError::RateLimited { retry_after }, None);
            }
        }

        let size = request
            .source
            .as_ref()
            .map_or(request.raw_text.len(), |s| s.byte_size);
        let mut job = ImportJob::new(&request.owner_id, &request.file_name, size, &request.kind);
        if let Some(source) = &request.source {
            job = job.with_checksum(source.checksum);
        }
        if let Err(err) = self.create_job(&mut job, parsed.row_count()).await {
            return self.system_error(&request, err, None);
        }
        info!(job_id = %job.id, total = job.total_records, "import job started");

        let keys = parsed.header_keys();
        let rows = self
            .persist_rows(&mut job, spec, &keys, &parsed.rows, &request.owner_id, cancel)
            .await;
        let finished = match rows {
            Ok(()) => self.finish(&mut job).await,
            Err(err) => Err(err),
        };

        if let Err(err) = finished {
            self.abandon(&mut job, &err).await;
            return self.system_error(&request, err, Some(job.id.clone()));
        }

        let summary = ImportSummary::from_job(&job);
        self.audit.log_event(AuditEvent {
            action: "import".into(),
            resource: request.kind.clone(),
            description: summary.to_string(),
            severity: if summary.failed > 0 {
                Severity::Warning
            } else {
                Severity::Info
            },
            metadata: json!({
                "job_id": summary.job_id,
                "file_name": request.file_name,
                "total": summary.total,
                "processed": summary.processed,
                "failed": summary.failed,
            }),
        });
        info!(
            job_id = %summary.job_id,
            processed = summary.processed,
            failed = summary.failed,
            "import job completed"
        );
        ImportOutcome::Completed(summary)
    }

    async fn create_job(&self, job: &mut ImportJob, total: usize) -> ImportResult<()> {
        job.start(total)?;
        self.store
            .create_record(&self.config.jobs_table, job.to_record()?)
            .await?;
        Ok(())
    }

    async fn finish(&self, job: &mut ImportJob) -> ImportResult<()> {
        job.complete()?;
        self.write_progress(job).await
    }

    async fn write_progress(&self, job: &ImportJob) -> ImportResult<()> {
        self.store
            .update_record(&self.config.jobs_table, &job.id, job.progress_patch())
            .await?;
        Ok(())
    }

    /// Rows run in order; with `concurrency > 1` several writes are in flight, but
    /// `buffered` still yields results in row order, so the ledger stays ordered.
    async fn persist_rows(
        &self,
        job: &mut ImportJob,
        spec: &KindSpec,
        keys: &[String],
        rows: &[Vec<String>],
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> ImportResult<()> {
        let timeout = self.config.row_timeout();
        let every = self.config.progress_every.max(1);

        let mut attempts = stream::iter(rows.iter().enumerate())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|(idx, values)| self.persist_row(spec, keys, idx + 1, values, owner_id, timeout))
            .buffered(self.config.concurrency.max(1));

        while let Some((row, result)) = attempts.next().await {
            match result {
                Ok(()) => job.record_success()?,
                Err(err) if err.is_system() => return Err(err),
                Err(err) => {
                    let message = row_message(err);
                    warn!(row, %message, "row failed");
                    job.record_failure(row, message)?;
                }
            }
            if job.attempted() % every == 0 {
                self.write_progress(job).await?;
            }
        }

        if job.attempted() < job.total_records {
            return Err(ImportError::Cancelled);
        }
        Ok(())
    }

    /// Row-level problems come back as `RowPersistenceFailed` or `PayloadTooLarge`;
    /// anything else is a system error that aborts the batch.
    async fn persist_row(
        &self,
        spec: &KindSpec,
        keys: &[String],
        row: usize,
        values: &[String],
        owner_id: &str,
        timeout: Duration,
    ) -> (usize, ImportResult<()>) {
        (row, self.write_row(spec, keys, row, values, owner_id, timeout).await)
    }

    async fn write_row(
        &self,
        spec: &KindSpec,
        keys: &[String],
        row: usize,
        values: &[String],
        owner_id: &str,
        timeout: Duration,
    ) -> ImportResult<()> {
        let cleaned = values
            .iter()
            .map(|v| clean_cell(v, self.config.max_field_bytes))
            .collect::<ImportResult<Vec<String>>>()?;
        let view = RowView::new(row, keys, &cleaned);

        let record = (spec.mapper)(&view)
            .map_err(|message| ImportError::RowPersistenceFailed { row, message })?;
        debug!(row, %record, "persisting");
        let payload = record.into_payload(owner_id)?;

        let write = self.store.create_record(spec.table, payload);
        let stored = match tokio::time::timeout(timeout, write).await {
            Ok(stored) => stored,
            Err(_) => Err(StoreError::Timeout(timeout)),
        };
        stored
            .map(|_| ())
            .map_err(|err| ImportError::RowPersistenceFailed {
                row,
                message: err.to_string(),
            })
    }

    /// Best effort: the batch is already lost, so a failing write here is only logged.
    async fn abandon(&self, job: &mut ImportJob, err: &ImportError) {
        let reason = match err {
            ImportError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };
        if job.fail(reason).is_ok() {
            if let Err(write_err) = self.write_progress(job).await {
                warn!(job_id = %job.id, error = %write_err, "could not mark job failed");
            }
        }
    }

    fn system_error(
        &self,
        request: &ImportRequest,
        err: ImportError,
        job_id: Option<String>,
    ) -> ImportOutcome {
        let message = err.to_string();
        warn!(error = %message, "import aborted");
        self.audit.log_event(AuditEvent {
            action: "import".into(),
            resource: request.kind.clone(),
            description: format!("Import of {} aborted: {message}", request.file_name),
            severity: Severity::Error,
            metadata: json!({ "job_id": job_id, "file_name": request.file_name }),
        });
        ImportOutcome::SystemError { message, job_id }
    }

    /// Read a job back from the store.
    pub async fn job(&self, id: &str) -> ImportResult<Option<ImportJob>> {
        let mut filters = Map::new();
        filters.insert("id".into(), Value::String(id.to_string()));
        let found = self
            .store
            .fetch_data(&self.config.jobs_table, Pagination::first(1), &filters)
            .await?;
        found
            .into_iter()
            .next()
            .map(ImportJob::from_record)
            .transpose()
            .map_err(ImportError::from)
    }
}

/// Sanitized cell text, or `PayloadTooLarge` when the cell is over the field limit.
fn clean_cell(value: &str, limit: usize) -> ImportResult<String> {
    match sanitize_bounded(&Value::String(value.to_string()), limit)? {
        Value::String(clean) => Ok(clean),
        other => Ok(other.to_string()),
    }
}

/// Ledger text for a row-level error.
fn row_message(err: ImportError) -> String {
    match err {
        ImportError::RowPersistenceFailed { message, .. } => message,
        other => other.to_string(),
    }
}

fn rejected(err: ImportError) -> ValidationResult {
    ValidationResult {
        is_valid: false,
        errors: vec![err.to_string()],
        warnings: Vec::new(),
        row_count: 0,
    }
}
