//! Excel (XLS/XLSX) row reader

use std::io::Cursor;

use calamine::{Data, ExcelDateTime, Range, Reader, Xls, Xlsx};
use chrono::NaiveTime;

use super::RowReader;
use crate::config::NullConfig;
use crate::schema::{normalize_headers, RawRow};
use crate::{DataError, DataResult};

/// Workbook flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookKind {
    Xls,
    Xlsx,
}

/// Reads the first worksheet of a workbook
///
/// The sheet is decoded up front; rows are handed out incrementally. The
/// first row is the header.
pub struct ExcelRowReader {
    headers: Vec<String>,
    rows: std::vec::IntoIter<RawRow>,
}

impl ExcelRowReader {
    /// Open a workbook, trying the declared flavour first and then the other
    pub fn new(data: &[u8], kind: WorkbookKind, null_config: &NullConfig) -> DataResult<Self> {
        let range = match kind {
            WorkbookKind::Xlsx => first_sheet::<Xlsx<Cursor<&[u8]>>>(data)
                .or_else(|_| first_sheet::<Xls<Cursor<&[u8]>>>(data)),
            WorkbookKind::Xls => first_sheet::<Xls<Cursor<&[u8]>>>(data)
                .or_else(|_| first_sheet::<Xlsx<Cursor<&[u8]>>>(data)),
        }
        .map_err(|e| DataError::BadResource(format!("cannot open workbook: {e}")))?;

        let mut sheet_rows = range.rows();
        let raw_headers: Vec<String> = sheet_rows
            .next()
            .map(|row| {
                row.iter()
                    .map(|cell| cell_to_string(cell).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        let headers = normalize_headers(raw_headers);

        let rows: Vec<RawRow> = sheet_rows
            .map(|row| {
                let mut values: RawRow = row
                    .iter()
                    .map(|cell| cell_to_string(cell).and_then(|v| null_config.normalize(v)))
                    .collect();
                values.resize(headers.len(), None);
                values
            })
            .filter(|row| row.iter().any(Option::is_some))
            .collect();

        Ok(Self {
            headers,
            rows: rows.into_iter(),
        })
    }
}

impl RowReader for ExcelRowReader {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_rows(&mut self, limit: usize, out: &mut Vec<RawRow>) -> DataResult<usize> {
        let before = out.len();
        out.extend(self.rows.by_ref().take(limit));
        Ok(out.len() - before)
    }

    fn skipped_rows(&self) -> usize {
        0
    }
}

fn first_sheet<'a, R>(data: &'a [u8]) -> Result<Range<Data>, String>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: std::fmt::Display,
{
    let mut workbook = R::new(Cursor::new(data)).map_err(|e| e.to_string())?;
    match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| e.to_string()),
        None => Err("workbook has no worksheets".to_string()),
    }
}

/// Render a cell as text; `None` for empty and error cells
///
/// Date cells become ISO 8601 text so they are never taken for numbers.
pub fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::String(v) => Some(v.to_string()),
        Data::Float(v) => Some(v.to_string()),
        Data::Int(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(v) => Some(format_datetime(v)),
        Data::DateTimeIso(v) => Some(v.to_string()),
        Data::DurationIso(v) => Some(v.to_string()),
        Data::Error(_) | Data::Empty => None,
    }
}

fn format_datetime(value: &ExcelDateTime) -> String {
    if value.is_duration() {
        if let Some(duration) = value.as_duration() {
            let secs = duration.num_seconds();
            let sign = if secs < 0 { "-" } else { "" };
            let secs = secs.unsigned_abs();
            return format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        }
    } else if let Some(datetime) = value.as_datetime() {
        return if datetime.time() == NaiveTime::MIN {
            datetime.format("%Y-%m-%d").to_string()
        } else {
            datetime.format("%Y-%m-%d %H:%M:%S").to_string()
        };
    }
    // Serial outside the calendar range
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_workbook;
    use calamine::ExcelDateTimeType;

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Float(2.5)), Some("2.5".to_string()));
        assert_eq!(cell_to_string(&Data::Int(7)), Some("7".to_string()));
        assert_eq!(cell_to_string(&Data::String("Sur".to_string())), Some("Sur".to_string()));
        assert_eq!(cell_to_string(&Data::Empty), None);
    }

    #[test]
    fn test_date_cells_render_as_iso_text() {
        let date = ExcelDateTime::new(45123.0, ExcelDateTimeType::DateTime, false);
        let stamp = ExcelDateTime::new(45123.5, ExcelDateTimeType::DateTime, false);
        let span = ExcelDateTime::new(1.25, ExcelDateTimeType::TimeDelta, false);
        assert_eq!(cell_to_string(&Data::DateTime(date)).as_deref(), Some("2023-07-16"));
        assert_eq!(
            cell_to_string(&Data::DateTime(stamp)).as_deref(),
            Some("2023-07-16 12:00:00")
        );
        assert_eq!(cell_to_string(&Data::DateTime(span)).as_deref(), Some("30:00:00"));
    }

    #[test]
    fn test_garbage_is_bad_resource() {
        let result =
            ExcelRowReader::new(b"not a workbook", WorkbookKind::Xlsx, &NullConfig::default());
        assert!(matches!(result, Err(DataError::BadResource(_))));
    }

    #[test]
    fn test_reads_first_worksheet() {
        let data = sample_workbook();
        let mut reader = ExcelRowReader::new(&data, WorkbookKind::Xlsx, &NullConfig::default())
            .unwrap();
        assert_eq!(reader.headers(), ["fecha", "zona", "consumo", "Unnamed: 3"]);

        let mut rows = Vec::new();
        assert_eq!(reader.read_rows(2, &mut rows).unwrap(), 2);
        assert_eq!(reader.read_rows(10, &mut rows).unwrap(), 1);
        assert_eq!(reader.read_rows(10, &mut rows).unwrap(), 0);

        assert_eq!(
            rows[0],
            vec![
                Some("2023-07-16".to_string()),
                Some("Norte".to_string()),
                Some("12.5".to_string()),
                Some("x".to_string()),
            ]
        );
        // "NA" is a null token; empty cells are null
        assert_eq!(rows[1][2], None);
        assert_eq!(rows[2][3], None);
        assert_eq!(rows[2][1].as_deref(), Some("Centro"));
    }

    #[test]
    fn test_xlsx_declared_as_xls_still_opens() {
        let data = sample_workbook();
        let reader = ExcelRowReader::new(&data, WorkbookKind::Xls, &NullConfig::default()).unwrap();
        assert_eq!(reader.headers().len(), 4);
    }
}
