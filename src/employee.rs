// 👤 Employee Record Model
// One value per data line of the source file

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Column order of a data line: `id,name,username,gender,salary`
pub const FIELD_NAMES: [&str; 5] = ["id", "name", "username", "gender", "salary"];

/// Employee - one row of the source file, one row of the `employee` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub gender: String,
    /// Whole currency units
    pub salary: i64,
}

impl Employee {
    pub fn new(id: i64, name: &str, username: &str, gender: &str, salary: i64) -> Self {
        Employee {
            id,
            name: name.to_string(),
            username: username.to_string(),
            gender: gender.to_string(),
            salary,
        }
    }

    /// Map tokenized fields positionally onto a record.
    ///
    /// `fields` is already padded/truncated by the reader; absent trailing
    /// columns arrive as `None`. `line` and `raw` only feed the error.
    pub fn from_fields<'a>(
        line: u64,
        raw: &str,
        fields: &[Option<&'a str>],
    ) -> Result<Employee, ParseError> {
        Ok(Employee {
            id: integer_field(line, raw, fields, 0)?,
            name: required_field(line, raw, fields, 1)?.to_string(),
            username: required_field(line, raw, fields, 2)?.to_string(),
            gender: required_field(line, raw, fields, 3)?.to_string(),
            salary: integer_field(line, raw, fields, 4)?,
        })
    }
}

fn required_field<'a>(
    line: u64,
    raw: &str,
    fields: &[Option<&'a str>],
    idx: usize,
) -> Result<&'a str, ParseError> {
    match fields.get(idx).copied().flatten() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ParseError::new(
            line,
            raw,
            ParseErrorKind::MissingField {
                field: FIELD_NAMES[idx],
            },
        )),
    }
}

fn integer_field(
    line: u64,
    raw: &str,
    fields: &[Option<&str>],
    idx: usize,
) -> Result<i64, ParseError> {
    let value = required_field(line, raw, fields, idx)?;
    value.parse::<i64>().map_err(|_| {
        ParseError::new(
            line,
            raw,
            ParseErrorKind::InvalidInteger {
                field: FIELD_NAMES[idx],
                value: value.to_string(),
            },
        )
    })
}

// ============================================================================
// PARSE ERRORS
// ============================================================================

/// Why a line could not become an `Employee`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum ParseErrorKind {
    #[error("field '{field}' is not an integer: '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("field '{field}' is missing")]
    MissingField { field: &'static str },

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("line could not be tokenized: {reason}")]
    Malformed { reason: String },
}

/// A malformed data line, with enough context to find it in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("line {line}: {kind} (raw: '{raw}')")]
pub struct ParseError {
    /// 1-based line number in the source file
    pub line: u64,
    pub raw: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: u64, raw: &str, kind: ParseErrorKind) -> Self {
        ParseError {
            line,
            raw: raw.to_string(),
            kind,
        }
    }
}
