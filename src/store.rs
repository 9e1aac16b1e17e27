// 🗄️ Employee Store - SQLite persistence
// One transaction per save_all call: a chunk commits whole or not at all

use crate::employee::Employee;
use crate::error::StoreError;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, warn};

const CREATE_EMPLOYEE_TABLE: &str = "CREATE TABLE IF NOT EXISTS employee (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    username TEXT NOT NULL,
    gender TEXT NOT NULL,
    salary INTEGER NOT NULL
)";

/// EmployeeStore - destination of the batch writer.
///
/// `save_all` must be atomic per call.
pub trait EmployeeStore {
    /// Create the destination schema if it is missing. Never drops data.
    fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Drop and recreate the destination schema. Destroys all stored rows.
    fn reset_schema(&mut self) -> Result<(), StoreError>;

    /// Persist every record or none of them. Returns the number written.
    fn save_all(&mut self, records: &[Employee]) -> Result<usize, StoreError>;
}

pub struct SqliteEmployeeStore {
    conn: Connection,
}

impl SqliteEmployeeStore {
    /// Open (or create) a database file with WAL journaling
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened employee store");
        Ok(SqliteEmployeeStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(SqliteEmployeeStore {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteEmployeeStore { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// All stored employees, ordered by id
    pub fn all_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, username, gender, salary FROM employee ORDER BY id")?;

        let employees = stmt
            .query_map([], |row| {
                Ok(Employee {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    username: row.get(2)?,
                    gender: row.get(3)?,
                    salary: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(employees)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM employee", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl EmployeeStore for SqliteEmployeeStore {
    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute(CREATE_EMPLOYEE_TABLE, [])?;
        Ok(())
    }

    fn reset_schema(&mut self) -> Result<(), StoreError> {
        warn!("dropping employee table");
        self.conn.execute("DROP TABLE IF EXISTS employee", [])?;
        self.conn.execute(CREATE_EMPLOYEE_TABLE, [])?;
        Ok(())
    }

    fn save_all(&mut self, records: &[Employee]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO employee (id, name, username, gender, salary)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for emp in records {
                let result = stmt.execute(params![
                    emp.id,
                    emp.name,
                    emp.username,
                    emp.gender,
                    emp.salary,
                ]);

                match result {
                    Ok(_) => {}
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        // Dropping `tx` rolls back the rows already inserted
                        return Err(StoreError::Conflict { id: emp.id });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tx.commit()?;
        Ok(records.len())
    }
}
