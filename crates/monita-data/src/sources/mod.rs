//! Row readers for the supported tabular formats

pub mod csv_source;
pub mod excel_source;

pub use csv_source::CsvRowReader;
pub use excel_source::ExcelRowReader;

use crate::schema::RawRow;
use crate::DataResult;

/// Incremental access to the rows of a parsed resource
///
/// Readers are tolerant: rows that cannot be used are skipped and counted
/// rather than failing the whole read. Only failures of the underlying
/// source (a dropped connection, a body over the size limit) are errors.
pub trait RowReader {
    /// Normalised header names
    fn headers(&self) -> &[String];

    /// Append up to `limit` rows to `out`, returning how many were read;
    /// zero means the source is exhausted
    fn read_rows(&mut self, limit: usize, out: &mut Vec<RawRow>) -> DataResult<usize>;

    /// Rows dropped so far
    fn skipped_rows(&self) -> usize;
}
