//! CSV row reader

use std::io::{Chain, Cursor, Read};

use csv::{ByteRecord, ReaderBuilder};

use super::RowReader;
use crate::config::NullConfig;
use crate::fetch::read_error;
use crate::schema::{normalize_headers, RawRow};
use crate::DataResult;

/// Delimiters considered when sniffing, in tie-break order
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Most bytes buffered while looking for the end of the header line
const SNIFF_LIMIT: usize = 64 * 1024;

/// Reads rows from a CSV body as it arrives
///
/// Only the header line is buffered up front (for delimiter sniffing); the
/// rest is pulled from `source` as rows are requested. Invalid UTF-8 is
/// replaced, rows with more fields than the header are skipped and rows
/// with fewer fields are padded with nulls.
pub struct CsvRowReader<R> {
    reader: csv::Reader<Chain<Cursor<Vec<u8>>, R>>,
    headers: Vec<String>,
    null_config: NullConfig,
    record: ByteRecord,
    skipped: usize,
}

impl<R: Read> CsvRowReader<R> {
    /// Create a reader; the first record is the header
    ///
    /// Fails only when `source` itself fails.
    pub fn new(mut source: R, null_config: NullConfig) -> DataResult<Self> {
        let mut head = read_header_line(&mut source)?;
        if head.starts_with(UTF8_BOM) {
            head.drain(..UTF8_BOM.len());
        }
        let delimiter = sniff_delimiter(&head);

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(Cursor::new(head).chain(source));

        let mut record = ByteRecord::new();
        let raw_headers = match reader.read_byte_record(&mut record) {
            Ok(true) => record.iter().map(lossy).collect(),
            Ok(false) => Vec::new(),
            Err(err) => match err.into_kind() {
                csv::ErrorKind::Io(error) => return Err(read_error(error)),
                _ => Vec::new(),
            },
        };

        Ok(Self {
            reader,
            headers: normalize_headers(raw_headers),
            null_config,
            record,
            skipped: 0,
        })
    }

    fn convert(&self) -> Option<RawRow> {
        if self.record.len() > self.headers.len() {
            return None;
        }
        let mut row: RawRow = self
            .record
            .iter()
            .map(|field| self.null_config.normalize(lossy(field)))
            .collect();
        row.resize(self.headers.len(), None);
        Some(row)
    }
}

impl<R: Read> RowReader for CsvRowReader<R> {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_rows(&mut self, limit: usize, out: &mut Vec<RawRow>) -> DataResult<usize> {
        if self.headers.is_empty() {
            return Ok(0);
        }

        let mut read = 0;
        while read < limit {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => match err.into_kind() {
                    csv::ErrorKind::Io(error) => return Err(read_error(error)),
                    _ => {
                        self.skipped += 1;
                        continue;
                    }
                },
            }

            // Blank line
            if self.record.len() == 1 && self.record[0].is_empty() {
                continue;
            }

            match self.convert() {
                Some(row) => {
                    out.push(row);
                    read += 1;
                }
                None => self.skipped += 1,
            }
        }
        Ok(read)
    }

    fn skipped_rows(&self) -> usize {
        self.skipped
    }
}

/// Buffer `source` up to the first newline, `SNIFF_LIMIT` bytes or EOF
fn read_header_line<R: Read>(source: &mut R) -> DataResult<Vec<u8>> {
    let mut head = Vec::new();
    let mut buf = [0u8; 8 * 1024];
    while head.len() < SNIFF_LIMIT && !head.contains(&b'\n') {
        let n = source.read(&mut buf).map_err(read_error)?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(head)
}

fn lossy(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

/// Pick the delimiter occurring most often outside quotes on the first line
pub fn sniff_delimiter(data: &[u8]) -> u8 {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;

    for &byte in data {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'\n' | b'\r' if !in_quotes => break,
            _ if !in_quotes => {
                if let Some(pos) = CANDIDATE_DELIMITERS.iter().position(|&d| d == byte) {
                    counts[pos] += 1;
                }
            }
            _ => {}
        }
    }

    let mut best = 0;
    for (idx, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = idx;
        }
    }
    CANDIDATE_DELIMITERS[best]
}
