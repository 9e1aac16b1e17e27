// 🧮 Filter Stage
// Salary threshold policy: below-threshold employees are dropped silently

use crate::employee::Employee;

/// Minimum salary (inclusive) for an employee to be imported
pub const SALARY_THRESHOLD: i64 = 50_000;

/// RecordFilter - keep or drop one record. Must be free of side effects.
pub trait RecordFilter {
    fn keep(&self, record: &Employee) -> bool;
}

/// Keeps employees earning at least `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalaryFilter {
    threshold: i64,
}

impl SalaryFilter {
    pub fn new(threshold: i64) -> Self {
        SalaryFilter { threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

impl Default for SalaryFilter {
    fn default() -> Self {
        SalaryFilter::new(SALARY_THRESHOLD)
    }
}

impl RecordFilter for SalaryFilter {
    fn keep(&self, record: &Employee) -> bool {
        record.salary >= self.threshold
    }
}

/// `keep` with the default threshold
pub fn keep(record: &Employee) -> bool {
    SalaryFilter::default().keep(record)
}
