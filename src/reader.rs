// 📂 Source Reader
// Lazy, single-pass reader over a delimited employee file

use crate::employee::{Employee, ParseError, ParseErrorKind, FIELD_NAMES};
use crate::error::ReadError;
use csv::{ByteRecord, ReaderBuilder, Trim};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Single ASCII byte separating fields
    pub delimiter: u8,

    /// Physical lines skipped unconditionally before the first data line
    pub header_lines_to_skip: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            delimiter: b',',
            header_lines_to_skip: 1,
        }
    }
}

// ============================================================================
// READER
// ============================================================================

/// EmployeeReader - yields one `Result` per data line.
///
/// Lines are read as raw bytes and each one is tokenized on its own, so a
/// parse error carries the line exactly as it appears in the file. A quoted
/// field left open at the end of a line continues on the next one.
///
/// Tokenizing is non-strict: short rows are padded with absent fields and
/// columns past the fifth are ignored. A bad line yields `ReadError::Parse`
/// and reading carries on; an I/O failure yields `ReadError::Io` and ends the
/// sequence.
pub struct EmployeeReader<R = BufReader<File>> {
    inner: R,
    source: Option<PathBuf>,
    delimiter: u8,
    skip_remaining: usize,
    lines_consumed: u64,
    last_line: u64,
    exhausted: bool,
}

impl EmployeeReader<BufReader<File>> {
    pub fn open(path: &Path, options: &ReaderOptions) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(|e| ReadError::SourceUnavailable {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut reader = EmployeeReader::from_reader(BufReader::new(file), options);
        reader.source = Some(path.to_path_buf());
        Ok(reader)
    }
}

impl<R: BufRead> EmployeeReader<R> {
    pub fn from_reader(inner: R, options: &ReaderOptions) -> Self {
        EmployeeReader {
            inner,
            source: None,
            delimiter: options.delimiter,
            skip_remaining: options.header_lines_to_skip,
            lines_consumed: 0,
            last_line: 0,
            exhausted: false,
        }
    }

    /// File the records come from, when opened from a path
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Line number of the record most recently returned (0 before the first)
    pub fn last_line(&self) -> u64 {
        self.last_line
    }

    /// Append the next physical line, minus its terminator. `false` at EOF.
    fn read_line(&mut self, out: &mut Vec<u8>) -> io::Result<bool> {
        let start = out.len();
        if self.inner.read_until(b'\n', out)? == 0 {
            return Ok(false);
        }
        self.lines_consumed += 1;

        if out.len() > start && out.ends_with(b"\n") {
            out.pop();
        }
        if out.len() > start && out.ends_with(b"\r") {
            out.pop();
        }
        Ok(true)
    }

    fn io_error(&self, source: io::Error) -> ReadError {
        ReadError::Io {
            line: self.lines_consumed + 1,
            source,
        }
    }

    /// Raw bytes of the next non-blank record
    fn read_record(&mut self) -> Option<Result<Vec<u8>, ReadError>> {
        loop {
            let mut raw = Vec::new();
            match self.read_line(&mut raw) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(self.io_error(e))),
            }
            let first_line = self.lines_consumed;

            while has_open_quote(&raw) {
                raw.push(b'\n');
                match self.read_line(&mut raw) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => return Some(Err(self.io_error(e))),
                }
            }

            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            self.last_line = first_line;
            return Some(Ok(raw));
        }
    }

    fn tokenize(&self, raw: &[u8]) -> Result<ByteRecord, csv::Error> {
        let mut tokenizer = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .from_reader(raw);

        let mut record = ByteRecord::new();
        tokenizer.read_byte_record(&mut record)?;
        Ok(record)
    }

    fn map_record(&self, raw: &[u8]) -> Result<Employee, ParseError> {
        let raw_text = String::from_utf8_lossy(raw);

        let record = self.tokenize(raw).map_err(|e| {
            ParseError::new(
                self.last_line,
                &raw_text,
                ParseErrorKind::Malformed {
                    reason: e.to_string(),
                },
            )
        })?;

        let mut fields: Vec<Option<&str>> = Vec::with_capacity(FIELD_NAMES.len());
        for bytes in record.iter().take(FIELD_NAMES.len()) {
            let value = std::str::from_utf8(bytes).map_err(|_| {
                ParseError::new(self.last_line, &raw_text, ParseErrorKind::InvalidUtf8)
            })?;
            fields.push(Some(value));
        }
        fields.resize(FIELD_NAMES.len(), None);

        Employee::from_fields(self.last_line, &raw_text, &fields)
    }
}

/// An odd number of quote bytes means a quoted field runs past this line
fn has_open_quote(raw: &[u8]) -> bool {
    raw.iter().filter(|b| **b == b'"').count() % 2 == 1
}

impl<R: BufRead> Iterator for EmployeeReader<R> {
    type Item = Result<Employee, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        while self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            let mut header = Vec::new();
            match self.read_line(&mut header) {
                Ok(true) => continue,
                Ok(false) => {
                    self.exhausted = true;
                    return None;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(self.io_error(e)));
                }
            }
        }

        match self.read_record() {
            Some(Ok(raw)) => Some(self.map_record(&raw).map_err(ReadError::Parse)),
            Some(Err(e)) => {
                self.exhausted = true;
                Some(Err(e))
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}
