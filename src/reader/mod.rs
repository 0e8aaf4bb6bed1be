//! Line-oriented record readers used to bulk load lookups.
//!
//! Both formats are one record per line, two comma-separated fields:
//!
//! ```text
//! AAAAAAAA,111111111        key/value
//! 10.10.10.0/24,111111111   CIDR block/value
//! ```
//!
//! Blank lines are skipped and a trailing `\r` is ignored. Any other line
//! without exactly two fields is reported as [`Error::MalformedRecord`].

use std::io::BufRead;

use crate::error::{Error, Result};
use crate::ipv4::Ipv4Cidr;

/// A source of `(key, value)` records.
pub trait RecordReader {
    /// Key type produced by this reader.
    type Key;

    /// Read the next record, or `None` at end of input.
    fn next_record(&mut self) -> Option<Result<(Self::Key, Vec<u8>)>>;
}

/// Splits input into two-field lines.
struct FieldLines<R> {
    inner: R,
    buf: Vec<u8>,
    line: usize,
}

impl<R: BufRead> FieldLines<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            line: 0,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedRecord {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_fields(&mut self) -> Option<Result<(&[u8], &[u8])>> {
        loop {
            self.buf.clear();
            match self.inner.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;

            let mut end = self.buf.len();
            while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
                end -= 1;
            }
            if self.buf[..end].iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let line = &self.buf[..end];
            let Some(comma) = line.iter().position(|&b| b == b',') else {
                return Some(Err(self.malformed("expected two comma-separated fields")));
            };
            let (key, value) = (&line[..comma], &line[comma + 1..]);
            if value.contains(&b',') {
                return Some(Err(self.malformed("expected two comma-separated fields")));
            }
            return Some(Ok((key, value)));
        }
    }
}

/// Reads `key,value` lines as raw byte strings.
pub struct CsvRecordReader<R> {
    lines: FieldLines<R>,
}

impl<R: BufRead> CsvRecordReader<R> {
    /// Create a reader over `input`.
    pub fn new(input: R) -> Self {
        Self {
            lines: FieldLines::new(input),
        }
    }
}

impl<R: BufRead> RecordReader for CsvRecordReader<R> {
    type Key = Vec<u8>;

    fn next_record(&mut self) -> Option<Result<(Vec<u8>, Vec<u8>)>> {
        Some(
            self.lines
                .next_fields()?
                .map(|(key, value)| (key.to_vec(), value.to_vec())),
        )
    }
}

impl<R: BufRead> Iterator for CsvRecordReader<R> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Reads `a.b.c.d/n,value` lines into CIDR blocks and raw values.
pub struct CidrCsvRecordReader<R> {
    lines: FieldLines<R>,
}

impl<R: BufRead> CidrCsvRecordReader<R> {
    /// Create a reader over `input`.
    pub fn new(input: R) -> Self {
        Self {
            lines: FieldLines::new(input),
        }
    }
}

impl<R: BufRead> RecordReader for CidrCsvRecordReader<R> {
    type Key = Ipv4Cidr;

    fn next_record(&mut self) -> Option<Result<(Ipv4Cidr, Vec<u8>)>> {
        let (key, value) = match self.lines.next_fields()? {
            Ok(fields) => fields,
            Err(e) => return Some(Err(e)),
        };
        let cidr = std::str::from_utf8(key)
            .map_err(|_| "CIDR block is not UTF-8".to_string())
            .and_then(|text| text.parse::<Ipv4Cidr>().map_err(|e| e.to_string()));
        let value = value.to_vec();
        Some(match cidr {
            Ok(cidr) => Ok((cidr, value)),
            Err(reason) => Err(self.lines.malformed(reason)),
        })
    }
}

impl<R: BufRead> Iterator for CidrCsvRecordReader<R> {
    type Item = Result<(Ipv4Cidr, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}
