//! Job configuration
//!
//! Defaults, optionally overridden by a YAML file, optionally overridden by
//! command-line flags.

use crate::error::ConfigError;
use crate::filter::SALARY_THRESHOLD;
use crate::reader::ReaderOptions;
use crate::writer::{RetryPolicy, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub source_path: PathBuf,
    pub database_path: PathBuf,
    pub delimiter: char,
    pub header_lines_to_skip: usize,
    pub chunk_size: usize,
    pub salary_threshold: i64,
    /// Drops the employee table and job history before the run
    pub destructive_schema_reset: bool,
    /// Abort on the first malformed line instead of skipping it
    pub strict: bool,
    pub max_flush_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Identifies the job instance; a fresh one is generated when absent
    pub run_id: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            source_path: PathBuf::from("data/employee_data.csv"),
            database_path: PathBuf::from("employees.db"),
            delimiter: ',',
            header_lines_to_skip: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            salary_threshold: SALARY_THRESHOLD,
            destructive_schema_reset: false,
            strict: false,
            max_flush_attempts: 1,
            retry_backoff_ms: 200,
            run_id: None,
        }
    }
}

impl JobConfig {
    /// Load from a YAML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = JobConfig::from_yaml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        debug!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as unit, not as an empty map
        if content.trim().is_empty() {
            return Ok(JobConfig::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }

        // Tab is the only control character allowed (TSV input)
        let control = self.delimiter.is_ascii_control() && self.delimiter != '\t';
        if !self.delimiter.is_ascii() || control || self.delimiter == '"' {
            return Err(ConfigError::Invalid {
                field: "delimiter",
                reason: format!("{:?} is not a usable single-byte delimiter", self.delimiter),
            });
        }

        if self.max_flush_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_flush_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(run_id) = &self.run_id {
            if run_id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "run_id",
                    reason: "must not be blank".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Only meaningful on a validated config (ASCII delimiter)
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            delimiter: self.delimiter as u8,
            header_lines_to_skip: self.header_lines_to_skip,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            self.max_flush_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = JobConfig::default();

        assert_eq!(config.delimiter, ',');
        assert_eq!(config.header_lines_to_skip, 1);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.salary_threshold, 50_000);
        assert!(!config.destructive_schema_reset);
        assert!(!config.strict);
        assert_eq!(config.retry_policy(), RetryPolicy::none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = JobConfig::from_yaml(
            "source_path: input/people.csv\nchunk_size: 25\ndelimiter: ';'\n",
        )
        .unwrap();

        assert_eq!(config.source_path, PathBuf::from("input/people.csv"));
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.reader_options().delimiter, b';');
        assert_eq!(config.salary_threshold, 50_000);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(JobConfig::from_yaml("").unwrap(), JobConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "salary_threshold: 65000").unwrap();
        writeln!(file, "destructive_schema_reset: true").unwrap();

        let config = JobConfig::from_file(file.path()).unwrap();

        assert_eq!(config.salary_threshold, 65000);
        assert!(config.destructive_schema_reset);
    }

    #[test]
    fn test_from_missing_file() {
        let err = JobConfig::from_file(Path::new("/no/such/job.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_bad_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size: lots").unwrap();

        let err = JobConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            JobConfig {
                chunk_size: 0,
                ..JobConfig::default()
            },
            JobConfig {
                delimiter: 'é',
                ..JobConfig::default()
            },
            JobConfig {
                max_flush_attempts: 0,
                ..JobConfig::default()
            },
            JobConfig {
                run_id: Some("  ".to_string()),
                ..JobConfig::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn test_control_character_delimiters_rejected() {
        for delimiter in ['\r', '\n', '\0', '\x1b', '\x7f'] {
            let config = JobConfig {
                delimiter,
                ..JobConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { field: "delimiter", .. }),
                "{:?}",
                delimiter
            );
        }

        let tsv = JobConfig {
            delimiter: '\t',
            ..JobConfig::default()
        };
        assert!(tsv.validate().is_ok());
        assert_eq!(tsv.reader_options().delimiter, b'\t');
    }
}
