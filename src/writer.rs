// 📦 Batch Writer
// Accumulates filtered records and flushes them chunk by chunk

use crate::employee::Employee;
use crate::error::StoreError;
use crate::store::EmployeeStore;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 10;

// ============================================================================
// RETRY POLICY
// ============================================================================

/// How often a failed flush is attempted before giving up.
///
/// The default is a single attempt. Conflicts are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::none()
    }
}

// ============================================================================
// CHUNK WRITER
// ============================================================================

/// ChunkWriter - owns its store handle; one `save_all` call per chunk.
pub struct ChunkWriter<S: EmployeeStore> {
    store: S,
    chunk_size: usize,
    retry: RetryPolicy,
    buffer: Vec<Employee>,
    chunks_flushed: usize,
    records_written: usize,
}

impl<S: EmployeeStore> ChunkWriter<S> {
    /// `chunk_size` of zero is treated as one
    pub fn new(store: S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        ChunkWriter {
            store,
            chunk_size,
            retry: RetryPolicy::default(),
            buffer: Vec::with_capacity(chunk_size),
            chunks_flushed: 0,
            records_written: 0,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Buffer one record; flushes when the chunk is full.
    ///
    /// Returns `true` when this push completed and flushed a chunk.
    pub fn push(&mut self, record: Employee) -> Result<bool, StoreError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.chunk_size {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flush the final partial chunk, if any
    pub fn finish(&mut self) -> Result<(), StoreError> {
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        let chunk = self.chunks_flushed + 1;
        let mut attempt = 1;

        loop {
            match self.store.save_all(&self.buffer) {
                Ok(written) => {
                    info!(chunk, records = written, "chunk flushed");
                    self.records_written += written;
                    self.chunks_flushed += 1;
                    self.buffer.clear();
                    return Ok(());
                }
                Err(StoreError::Conflict { id }) => {
                    return Err(StoreError::Conflict { id });
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff * attempt;
                    warn!(chunk, attempt, error = %e, ?delay, "chunk flush failed, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Records buffered but not yet flushed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks_flushed(&self) -> usize {
        self.chunks_flushed
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every save_all call; optionally fails the first N calls
    #[derive(Default)]
    struct RecordingStore {
        calls: Vec<Vec<Employee>>,
        failures_left: usize,
    }

    impl EmployeeStore for RecordingStore {
        fn ensure_schema(&mut self) -> Result<(), StoreError> {
            Ok(())
        }

        fn reset_schema(&mut self) -> Result<(), StoreError> {
            self.calls.clear();
            Ok(())
        }

        fn save_all(&mut self, records: &[Employee]) -> Result<usize, StoreError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
            }
            self.calls.push(records.to_vec());
            Ok(records.len())
        }
    }

    fn employees(n: usize) -> Vec<Employee> {
        (0..n)
            .map(|i| Employee::new(i as i64 + 1, "E", "e", "F", 60000))
            .collect()
    }

    #[test]
    fn test_flush_count_is_ceil_n_over_c() {
        for (n, c) in [(0, 10), (1, 10), (10, 10), (11, 10), (25, 4), (7, 1), (3, 100)] {
            let mut writer = ChunkWriter::new(RecordingStore::default(), c);
            for emp in employees(n) {
                writer.push(emp).unwrap();
            }
            writer.finish().unwrap();

            let calls = &writer.store().calls;
            assert_eq!(calls.len(), (n + c - 1) / c, "n={} c={}", n, c);
            for (i, call) in calls.iter().enumerate() {
                if i + 1 < calls.len() {
                    assert_eq!(call.len(), c);
                } else {
                    assert!(call.len() <= c && !call.is_empty());
                }
            }
            assert_eq!(writer.records_written(), n);
        }
    }

    #[test]
    fn test_write_order_matches_push_order() {
        let mut writer = ChunkWriter::new(RecordingStore::default(), 3);
        for emp in employees(8) {
            writer.push(emp).unwrap();
        }
        writer.finish().unwrap();

        let ids: Vec<i64> = writer
            .into_store()
            .calls
            .into_iter()
            .flatten()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, (1..=8).collect::<Vec<i64>>());
    }

    #[test]
    fn test_push_reports_flush() {
        let mut writer = ChunkWriter::new(RecordingStore::default(), 2);
        let mut records = employees(2).into_iter();

        assert!(!writer.push(records.next().unwrap()).unwrap());
        assert_eq!(writer.pending(), 1);
        assert!(writer.push(records.next().unwrap()).unwrap());
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.chunks_flushed(), 1);
    }

    #[test]
    fn test_single_attempt_by_default() {
        let store = RecordingStore {
            failures_left: 1,
            ..Default::default()
        };
        let mut writer = ChunkWriter::new(store, 2);

        writer.push(Employee::new(1, "A", "a", "F", 60000)).unwrap();
        let err = writer.push(Employee::new(2, "B", "b", "M", 60000)).unwrap_err();

        assert!(matches!(err, StoreError::Database(_)));
        assert!(writer.store().calls.is_empty());
        assert_eq!(writer.chunks_flushed(), 0);
    }

    #[test]
    fn test_bounded_retry_recovers() {
        let store = RecordingStore {
            failures_left: 2,
            ..Default::default()
        };
        let mut writer =
            ChunkWriter::new(store, 1).with_retry(RetryPolicy::bounded(3, Duration::ZERO));

        writer.push(Employee::new(1, "A", "a", "F", 60000)).unwrap();

        assert_eq!(writer.store().calls.len(), 1);
        assert_eq!(writer.records_written(), 1);
    }

    #[test]
    fn test_zero_chunk_size_treated_as_one() {
        let writer = ChunkWriter::new(RecordingStore::default(), 0);
        assert_eq!(writer.chunk_size(), 1);
    }
}
