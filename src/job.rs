// 🚦 Job Driver
// NotStarted → Running → Completed | Failed
//
// Reads one record at a time, filters it, pushes survivors into the chunk
// writer. Each chunk is its own transaction; a failure leaves earlier chunks
// committed.

use crate::config::JobConfig;
use crate::employee::ParseError;
use crate::error::{JobError, ReadError, RepositoryError};
use crate::filter::{RecordFilter, SalaryFilter};
use crate::reader::{EmployeeReader, ReaderOptions};
use crate::repository::{JobExecution, JobParameters, JobRepository};
use crate::store::EmployeeStore;
use crate::writer::ChunkWriter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const JOB_NAME: &str = "importEmployees";

// ============================================================================
// STATE & COUNTERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotStarted => "NOT_STARTED",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        match s {
            "NOT_STARTED" => Some(JobState::NotStarted),
            "RUNNING" => Some(JobState::Running),
            "COMPLETED" => Some(JobState::Completed),
            "FAILED" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    /// Lines parsed into records
    pub read: usize,
    /// Records dropped by the filter
    pub filtered: usize,
    /// Malformed lines skipped
    pub skipped: usize,
    pub written: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub execution_id: Option<String>,
    pub state: JobState,
    pub counts: StepCounts,
    pub skipped_lines: Vec<ParseError>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: read {}, filtered {}, skipped {}, written {} in {} chunk(s)",
            self.state.as_str(),
            self.counts.read,
            self.counts.filtered,
            self.counts.skipped,
            self.counts.written,
            self.counts.chunks
        )
    }
}

// ============================================================================
// JOB DRIVER
// ============================================================================

/// JobDriver - runs the import exactly once.
///
/// The store is handed in explicitly and owned by the chunk writer. The job
/// repository is optional; without it restart prevention only applies to
/// this driver instance.
pub struct JobDriver<S: EmployeeStore, F: RecordFilter = SalaryFilter> {
    source_path: PathBuf,
    reader_options: ReaderOptions,
    strict: bool,
    destructive_schema_reset: bool,
    parameters: JobParameters,
    filter: F,
    writer: ChunkWriter<S>,
    repository: Option<JobRepository>,
    cancel: Option<Arc<AtomicBool>>,
    state: JobState,
    counts: StepCounts,
    skipped: Vec<ParseError>,
    execution: Option<JobExecution>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl<S: EmployeeStore> JobDriver<S, SalaryFilter> {
    pub fn new(config: &JobConfig, store: S) -> Result<Self, JobError> {
        config.validate()?;

        let source = config.source_path.to_string_lossy().to_string();
        let parameters = match &config.run_id {
            Some(run_id) => JobParameters::new(&source, run_id),
            None => JobParameters::fresh(&source),
        };

        Ok(JobDriver {
            source_path: config.source_path.clone(),
            reader_options: config.reader_options(),
            strict: config.strict,
            destructive_schema_reset: config.destructive_schema_reset,
            parameters,
            filter: SalaryFilter::new(config.salary_threshold),
            writer: ChunkWriter::new(store, config.chunk_size).with_retry(config.retry_policy()),
            repository: None,
            cancel: None,
            state: JobState::NotStarted,
            counts: StepCounts::default(),
            skipped: Vec::new(),
            execution: None,
            started_at: None,
            ended_at: None,
        })
    }
}

impl<S: EmployeeStore, F: RecordFilter> JobDriver<S, F> {
    pub fn with_repository(mut self, repository: JobRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Checked after every flushed chunk; a set flag fails the job there
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_filter<G: RecordFilter>(self, filter: G) -> JobDriver<S, G> {
        JobDriver {
            source_path: self.source_path,
            reader_options: self.reader_options,
            strict: self.strict,
            destructive_schema_reset: self.destructive_schema_reset,
            parameters: self.parameters,
            filter,
            writer: self.writer,
            repository: self.repository,
            cancel: self.cancel,
            state: self.state,
            counts: self.counts,
            skipped: self.skipped,
            execution: self.execution,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn parameters(&self) -> &JobParameters {
        &self.parameters
    }

    pub fn job_key(&self) -> String {
        self.parameters.job_key(JOB_NAME)
    }

    pub fn store(&self) -> &S {
        self.writer.store()
    }

    pub fn into_store(self) -> S {
        self.writer.into_store()
    }

    pub fn report(&self) -> JobReport {
        JobReport {
            execution_id: self.execution.as_ref().map(|e| e.execution_id.clone()),
            state: self.state,
            counts: self.counts.clone(),
            skipped_lines: self.skipped.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Run the job. A driver runs once; later calls fail with `AlreadyRun`.
    pub fn run(&mut self) -> Result<JobReport, JobError> {
        if self.state != JobState::NotStarted {
            return Err(JobError::AlreadyRun {
                job_key: self.job_key(),
            });
        }

        self.started_at = Some(Utc::now());
        self.transition(JobState::Running);

        let outcome = self.setup().and_then(|reader| self.process(reader));

        self.ended_at = Some(Utc::now());
        self.counts.written = self.writer.records_written();
        self.counts.chunks = self.writer.chunks_flushed();

        match outcome {
            Ok(()) => {
                self.transition(JobState::Completed);
                self.record_execution(None);
                info!("{}", self.report().summary());
                Ok(self.report())
            }
            Err(e) => {
                self.transition(JobState::Failed);
                self.record_execution(Some(e.to_string()));
                error!(error = %e, line = ?e.line(), "job failed");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // NotStarted → Running
    // ------------------------------------------------------------------------

    fn setup(&mut self) -> Result<EmployeeReader, JobError> {
        // Nothing is dropped or registered until the source is readable
        let reader = EmployeeReader::open(&self.source_path, &self.reader_options)?;

        if self.destructive_schema_reset {
            warn!("destructive schema reset requested: all stored employees and job history will be dropped");
            self.writer
                .store_mut()
                .reset_schema()
                .map_err(JobError::SchemaReset)?;
            if let Some(repository) = &self.repository {
                repository.reset_schema().map_err(JobError::HistoryReset)?;
            }
        } else {
            self.writer
                .store_mut()
                .ensure_schema()
                .map_err(JobError::Schema)?;
            if let Some(repository) = &self.repository {
                repository.ensure_schema()?;
            }
        }

        if let Some(repository) = &self.repository {
            let mut execution = match repository.create_execution(JOB_NAME, &self.parameters) {
                Ok(execution) => execution,
                Err(RepositoryError::AlreadyExists { job_key }) => {
                    return Err(JobError::AlreadyRun { job_key });
                }
                Err(e) => return Err(e.into()),
            };
            execution.status = JobState::Running;
            execution.started_at = self.started_at;
            repository.update_execution(&execution)?;
            info!(execution_id = %execution.execution_id, "job execution registered");
            self.execution = Some(execution);
        }

        Ok(reader)
    }

    // ------------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------------

    fn process(&mut self, mut reader: EmployeeReader) -> Result<(), JobError> {
        info!(source = %self.source_path.display(), "reading employees");

        let mut chunk_first_line = 0;

        while let Some(item) = reader.next() {
            let employee = match item {
                Ok(employee) => employee,
                Err(ReadError::Parse(err)) => {
                    if self.strict {
                        return Err(JobError::StrictParse(err));
                    }
                    warn!(line = err.line, error = %err.kind, "skipping malformed line");
                    self.counts.skipped += 1;
                    self.skipped.push(err);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            self.counts.read += 1;

            if !self.filter.keep(&employee) {
                debug!(id = employee.id, salary = employee.salary, "filtered out");
                self.counts.filtered += 1;
                continue;
            }

            if self.writer.pending() == 0 {
                chunk_first_line = reader.last_line();
            }
            let chunk = self.writer.chunks_flushed() + 1;

            let flushed = self.writer.push(employee).map_err(|source| JobError::Persist {
                chunk,
                first_line: chunk_first_line,
                source,
            })?;

            if flushed {
                self.check_cancelled()?;
            }
        }

        let chunk = self.writer.chunks_flushed() + 1;
        self.writer.finish().map_err(|source| JobError::Persist {
            chunk,
            first_line: chunk_first_line,
            source,
        })?;

        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), JobError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => {
                let chunks_flushed = self.writer.chunks_flushed();
                info!(chunks_flushed, "stop requested, halting at chunk boundary");
                Err(JobError::Cancelled { chunks_flushed })
            }
            _ => Ok(()),
        }
    }

    fn transition(&mut self, next: JobState) {
        info!(from = self.state.as_str(), to = next.as_str(), "job state");
        self.state = next;
    }

    /// Final state is written best-effort; the job outcome stands either way
    fn record_execution(&mut self, exit_message: Option<String>) {
        let (Some(repository), Some(execution)) = (&self.repository, self.execution.as_mut())
        else {
            return;
        };

        execution.status = self.state;
        execution.ended_at = self.ended_at;
        execution.counts = self.counts.clone();
        execution.exit_message = exit_message;

        if let Err(e) = repository.update_execution(execution) {
            error!(error = %e, execution_id = %execution.execution_id, "failed to record job execution");
        }
    }
}
