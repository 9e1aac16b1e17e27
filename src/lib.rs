// Employee Batch Import - Core Library
// CSV → salary filter → chunked SQLite writes, driven as a one-shot job

pub mod config;
pub mod employee;
pub mod error;
pub mod filter;
pub mod job;
pub mod reader;
pub mod repository;
pub mod store;
pub mod writer;

// Re-export commonly used types
pub use config::JobConfig;
pub use employee::{Employee, ParseError, ParseErrorKind};
pub use error::{ConfigError, JobError, ReadError, RepositoryError, StoreError};
pub use filter::{keep, RecordFilter, SalaryFilter, SALARY_THRESHOLD};
pub use job::{JobDriver, JobReport, JobState, StepCounts, JOB_NAME};
pub use reader::{EmployeeReader, ReaderOptions};
pub use repository::{JobExecution, JobParameters, JobRepository};
pub use store::{EmployeeStore, SqliteEmployeeStore};
pub use writer::{ChunkWriter, RetryPolicy, DEFAULT_CHUNK_SIZE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
