// 📜 Job Repository
// Persisted job executions. A job instance (job name + identifying
// parameters) may have at most one execution: restart is refused.

use crate::error::RepositoryError;
use crate::job::{JobState, StepCounts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

const CREATE_EXECUTION_TABLE: &str = "CREATE TABLE IF NOT EXISTS batch_job_execution (
    execution_id TEXT PRIMARY KEY,
    job_name TEXT NOT NULL,
    job_key TEXT UNIQUE NOT NULL,
    parameters TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT,
    ended_at TEXT,
    read_count INTEGER NOT NULL DEFAULT 0,
    filter_count INTEGER NOT NULL DEFAULT 0,
    skip_count INTEGER NOT NULL DEFAULT 0,
    write_count INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    exit_message TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)";

const SELECT_EXECUTION: &str = "SELECT execution_id, job_name, job_key, parameters, status,
        started_at, ended_at, read_count, filter_count, skip_count, write_count,
        chunk_count, exit_message
    FROM batch_job_execution";

// ============================================================================
// JOB PARAMETERS & EXECUTIONS
// ============================================================================

/// Identifying parameters of a job instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    pub source_path: String,
    pub run_id: String,
}

impl JobParameters {
    pub fn new(source_path: &str, run_id: &str) -> Self {
        JobParameters {
            source_path: source_path.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Parameters with a fresh random run id: a brand new job instance
    pub fn fresh(source_path: &str) -> Self {
        JobParameters::new(source_path, &uuid::Uuid::new_v4().to_string())
    }

    /// Stable identity of the job instance (SHA-256 hex)
    pub fn job_key(&self, job_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}|{}", job_name, self.source_path, self.run_id));
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub execution_id: String,
    pub job_name: String,
    pub job_key: String,
    pub parameters: JobParameters,
    pub status: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counts: StepCounts,
    pub exit_message: Option<String>,
}

// ============================================================================
// REPOSITORY
// ============================================================================

pub struct JobRepository {
    conn: Connection,
}

impl JobRepository {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(JobRepository { conn })
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Ok(JobRepository {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.conn.execute(CREATE_EXECUTION_TABLE, [])?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_execution_created ON batch_job_execution(created_at)",
            [],
        )?;
        Ok(())
    }

    /// Drop and recreate the execution table. Forgets every past run.
    pub fn reset_schema(&self) -> Result<(), RepositoryError> {
        warn!("dropping batch_job_execution table");
        self.conn
            .execute("DROP TABLE IF EXISTS batch_job_execution", [])?;
        self.ensure_schema()
    }

    /// Register a new execution in `NotStarted`.
    ///
    /// Fails with `AlreadyExists` when the job instance has run before.
    pub fn create_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<JobExecution, RepositoryError> {
        let job_key = parameters.job_key(job_name);

        if self.find_by_key(&job_key)?.is_some() {
            return Err(RepositoryError::AlreadyExists { job_key });
        }

        let execution = JobExecution {
            execution_id: uuid::Uuid::new_v4().to_string(),
            job_name: job_name.to_string(),
            job_key,
            parameters: parameters.clone(),
            status: JobState::NotStarted,
            started_at: None,
            ended_at: None,
            counts: StepCounts::default(),
            exit_message: None,
        };

        let parameters_json = serde_json::to_string(&execution.parameters)
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        let result = self.conn.execute(
            "INSERT INTO batch_job_execution (
                execution_id, job_name, job_key, parameters, status
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                execution.execution_id,
                execution.job_name,
                execution.job_key,
                parameters_json,
                execution.status.as_str(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(execution_id = %execution.execution_id, job_key = %execution.job_key, "job execution created");
                Ok(execution)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(RepositoryError::AlreadyExists {
                    job_key: execution.job_key,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_execution(&self, execution: &JobExecution) -> Result<(), RepositoryError> {
        let updated = self.conn.execute(
            "UPDATE batch_job_execution
             SET status = ?1, started_at = ?2, ended_at = ?3,
                 read_count = ?4, filter_count = ?5, skip_count = ?6,
                 write_count = ?7, chunk_count = ?8, exit_message = ?9
             WHERE execution_id = ?10",
            params![
                execution.status.as_str(),
                execution.started_at.map(|dt| dt.to_rfc3339()),
                execution.ended_at.map(|dt| dt.to_rfc3339()),
                execution.counts.read as i64,
                execution.counts.filtered as i64,
                execution.counts.skipped as i64,
                execution.counts.written as i64,
                execution.counts.chunks as i64,
                execution.exit_message,
                execution.execution_id,
            ],
        )?;

        if updated == 0 {
            return Err(RepositoryError::NotFound(execution.execution_id.clone()));
        }
        Ok(())
    }

    pub fn get_execution(&self, execution_id: &str) -> Result<JobExecution, RepositoryError> {
        let sql = format!("{} WHERE execution_id = ?1", SELECT_EXECUTION);
        self.conn
            .query_row(&sql, [execution_id], read_row)
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(execution_id.to_string()))?
    }

    pub fn find_by_key(&self, job_key: &str) -> Result<Option<JobExecution>, RepositoryError> {
        let sql = format!("{} WHERE job_key = ?1", SELECT_EXECUTION);
        match self.conn.query_row(&sql, [job_key], read_row).optional()? {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Most recent executions first
    pub fn list_executions(&self, limit: usize) -> Result<Vec<JobExecution>, RepositoryError> {
        let sql = format!(
            "{} ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            SELECT_EXECUTION
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt
            .query_map([limit as i64], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }
}

/// Row → execution. Column decoding errors surface as `rusqlite::Error`,
/// content errors (bad JSON, bad status) as the inner `RepositoryError`.
fn read_row(row: &Row) -> rusqlite::Result<Result<JobExecution, RepositoryError>> {
    let parameters_json: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let started_at: Option<String> = row.get(5)?;
    let ended_at: Option<String> = row.get(6)?;

    let counts = StepCounts {
        read: row.get::<_, i64>(7)? as usize,
        filtered: row.get::<_, i64>(8)? as usize,
        skipped: row.get::<_, i64>(9)? as usize,
        written: row.get::<_, i64>(10)? as usize,
        chunks: row.get::<_, i64>(11)? as usize,
    };

    let execution_id: String = row.get(0)?;
    let job_name: String = row.get(1)?;
    let job_key: String = row.get(2)?;
    let exit_message: Option<String> = row.get(12)?;

    let parse_time = |s: Option<String>| -> Result<Option<DateTime<Utc>>, RepositoryError> {
        s.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| RepositoryError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
        })
        .transpose()
    };

    let build = || -> Result<JobExecution, RepositoryError> {
        let parameters: JobParameters = serde_json::from_str(&parameters_json)
            .map_err(|e| RepositoryError::Corrupt(format!("bad parameters: {}", e)))?;
        let status = JobState::parse(&status_str)
            .ok_or_else(|| RepositoryError::Corrupt(format!("bad status '{}'", status_str)))?;

        Ok(JobExecution {
            execution_id,
            job_name,
            job_key,
            parameters,
            status,
            started_at: parse_time(started_at)?,
            ended_at: parse_time(ended_at)?,
            counts,
            exit_message,
        })
    };

    Ok(build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> JobRepository {
        let repo = JobRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    #[test]
    fn test_job_key_is_stable_and_parameter_sensitive() {
        let a = JobParameters::new("data/employee_data.csv", "run-1");
        let b = JobParameters::new("data/employee_data.csv", "run-2");

        assert_eq!(a.job_key("importEmployees"), a.job_key("importEmployees"));
        assert_ne!(a.job_key("importEmployees"), b.job_key("importEmployees"));
        assert_eq!(a.job_key("importEmployees").len(), 64);
    }

    #[test]
    fn test_fresh_parameters_differ() {
        let a = JobParameters::fresh("x.csv");
        let b = JobParameters::fresh("x.csv");

        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_create_and_get_execution() {
        let repo = repository();
        let params = JobParameters::new("x.csv", "run-1");

        let created = repo.create_execution("importEmployees", &params).unwrap();
        let loaded = repo.get_execution(&created.execution_id).unwrap();

        assert_eq!(loaded.status, JobState::NotStarted);
        assert_eq!(loaded.parameters, params);
        assert_eq!(loaded.job_key, params.job_key("importEmployees"));
        assert!(loaded.started_at.is_none());
    }

    #[test]
    fn test_same_instance_cannot_run_twice() {
        let repo = repository();
        let params = JobParameters::new("x.csv", "run-1");

        repo.create_execution("importEmployees", &params).unwrap();
        let err = repo.create_execution("importEmployees", &params).unwrap_err();

        assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
    }

    #[test]
    fn test_update_execution_round_trips_counts_and_times() {
        let repo = repository();
        let mut execution = repo
            .create_execution("importEmployees", &JobParameters::new("x.csv", "r"))
            .unwrap();

        execution.status = JobState::Completed;
        execution.started_at = Some(Utc::now());
        execution.ended_at = Some(Utc::now());
        execution.counts = StepCounts {
            read: 4,
            filtered: 1,
            skipped: 1,
            written: 2,
            chunks: 1,
        };
        execution.exit_message = Some("ok".to_string());
        repo.update_execution(&execution).unwrap();

        let loaded = repo.get_execution(&execution.execution_id).unwrap();
        assert_eq!(loaded.status, JobState::Completed);
        assert_eq!(loaded.counts, execution.counts);
        assert!(loaded.ended_at.is_some());
        assert_eq!(loaded.exit_message.as_deref(), Some("ok"));
    }

    #[test]
    fn test_missing_execution_is_not_found() {
        let repo = repository();

        assert!(matches!(
            repo.get_execution("nope"),
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_executions_newest_first() {
        let repo = repository();
        for run in ["a", "b", "c"] {
            repo.create_execution("importEmployees", &JobParameters::new("x.csv", run))
                .unwrap();
        }

        let listed = repo.list_executions(2).unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].parameters.run_id, "c");
        assert_eq!(listed[1].parameters.run_id, "b");
    }

    #[test]
    fn test_reset_schema_forgets_runs() {
        let repo = repository();
        let params = JobParameters::new("x.csv", "run-1");
        repo.create_execution("importEmployees", &params).unwrap();

        repo.reset_schema().unwrap();

        assert!(repo.create_execution("importEmployees", &params).is_ok());
    }
}
