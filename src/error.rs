//! Error types for the employee import job

use crate::employee::ParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Source reader errors.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("source file unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading source at line {line}: {source}")]
    Io {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ReadError {
    /// Line the error refers to, when it refers to one
    pub fn line(&self) -> Option<u64> {
        match self {
            ReadError::SourceUnavailable { .. } => None,
            ReadError::Io { line, .. } => Some(*line),
            ReadError::Parse(err) => Some(err.line),
        }
    }
}

/// Employee store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("employee id {id} conflicts with an existing row")]
    Conflict { id: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Job repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("job instance {job_key} already has an execution")]
    AlreadyExists { job_key: String },

    #[error("job execution {0} not found")]
    NotFound(String),

    #[error("corrupt job execution row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Fatal job errors. Any of these moves the job to `Failed`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("source file unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading source at line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed line in strict mode: {0}")]
    StrictParse(#[source] ParseError),

    #[error("failed to persist chunk {chunk} (starting at line {first_line}): {source}")]
    Persist {
        chunk: usize,
        first_line: u64,
        #[source]
        source: StoreError,
    },

    #[error("destructive schema reset failed: {0}")]
    SchemaReset(#[source] StoreError),

    #[error("destructive reset of job history failed: {0}")]
    HistoryReset(#[source] RepositoryError),

    #[error("schema setup failed: {0}")]
    Schema(#[source] StoreError),

    #[error("job repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("job instance {job_key} has already run; restart is not allowed")]
    AlreadyRun { job_key: String },

    #[error("job stopped at a chunk boundary after {chunks_flushed} chunk(s)")]
    Cancelled { chunks_flushed: usize },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl JobError {
    /// Line number of the first fatal error, where one applies
    pub fn line(&self) -> Option<u64> {
        match self {
            JobError::Read { line, .. } => Some(*line),
            JobError::StrictParse(err) => Some(err.line),
            JobError::Persist { first_line, .. } => Some(*first_line),
            _ => None,
        }
    }
}

impl From<ReadError> for JobError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::SourceUnavailable { path, source } => {
                JobError::SourceUnavailable { path, source }
            }
            ReadError::Io { line, source } => JobError::Read { line, source },
            ReadError::Parse(parse) => JobError::StrictParse(parse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::ParseErrorKind;

    #[test]
    fn test_job_error_line_from_strict_parse() {
        let parse = ParseError::new(
            4,
            "3,Bob,bob1,M,notanumber",
            ParseErrorKind::InvalidInteger {
                field: "salary",
                value: "notanumber".to_string(),
            },
        );
        let err: JobError = ReadError::Parse(parse).into();

        assert_eq!(err.line(), Some(4));
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn test_job_error_line_from_persist() {
        let err = JobError::Persist {
            chunk: 2,
            first_line: 12,
            source: StoreError::Conflict { id: 5 },
        };

        assert_eq!(err.line(), Some(12));
        assert!(err.to_string().contains("chunk 2"));
    }

    #[test]
    fn test_source_unavailable_has_no_line() {
        let err: JobError = ReadError::SourceUnavailable {
            path: PathBuf::from("missing.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        }
        .into();

        assert!(matches!(err, JobError::SourceUnavailable { .. }));
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_schema_reset_keeps_source_chain() {
        use std::error::Error as _;

        let err = JobError::SchemaReset(StoreError::Conflict { id: 1 });
        let source = err.source().expect("reset error keeps its cause");
        assert!(source.to_string().contains("employee id 1"));

        let err = JobError::HistoryReset(RepositoryError::NotFound("x".to_string()));
        assert!(err.source().is_some());
    }
}
