//! Tabular loading
//!
//! Turns a resource body into a [`Table`]. CSV is parsed straight from the
//! body as it arrives, so a row limit stops the download early. Resources
//! whose probed size is above the large-file threshold are read in
//! fixed-size row chunks; smaller ones in one pass.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::config::{NullConfig, Settings};
use crate::fetch::read_error;
use crate::schema::RawRow;
use crate::sources::excel_source::WorkbookKind;
use crate::sources::{CsvRowReader, ExcelRowReader, RowReader};
use crate::table::Table;
use crate::{DataError, DataResult};

/// Supported resource formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Xls,
    Xlsx,
}

impl TabularFormat {
    /// Interpret a catalog's free-text format declaration
    pub fn from_declared(declared: &str) -> Option<Self> {
        let declared = declared.to_ascii_lowercase();
        if declared.contains("xlsx") {
            Some(TabularFormat::Xlsx)
        } else if declared.contains("xls") {
            Some(TabularFormat::Xls)
        } else if declared.contains("csv") {
            Some(TabularFormat::Csv)
        } else {
            None
        }
    }

    /// Infer the format from a URL path extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TabularFormat::Csv),
            "xls" => Some(TabularFormat::Xls),
            "xlsx" => Some(TabularFormat::Xlsx),
            _ => None,
        }
    }

    /// Declared format first, URL extension as fallback
    pub fn resolve(declared: &str, url_path: &str) -> DataResult<Self> {
        Self::from_declared(declared)
            .or_else(|| Self::from_path(url_path))
            .ok_or_else(|| {
                DataError::BadResource(format!(
                    "unsupported format '{declared}' for tabular loading"
                ))
            })
    }
}

/// How the body was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    SinglePass,
    Chunked { chunks: usize },
}

/// Result of a load
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    /// A row beyond the requested maximum exists
    pub has_more: bool,
    /// Malformed rows dropped while parsing
    pub skipped_rows: usize,
    pub strategy: ReadStrategy,
}

/// Parses fetched bodies into tables
#[derive(Debug, Clone)]
pub struct TabularLoader {
    large_file_threshold: u64,
    chunk_rows: usize,
    null_config: NullConfig,
}

impl TabularLoader {
    pub fn new(large_file_threshold: u64, chunk_rows: usize, null_config: NullConfig) -> Self {
        Self {
            large_file_threshold,
            chunk_rows: chunk_rows.max(1),
            null_config,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.large_file_threshold_bytes(),
            settings.read_chunk_rows,
            settings.null_config.clone(),
        )
    }

    /// Parse on the blocking pool
    ///
    /// `source` may block on the network; see
    /// [`crate::fetch::into_blocking_reader`].
    pub async fn load_async<R>(
        &self,
        source: R,
        format: TabularFormat,
        max_rows: Option<usize>,
        probed_size: u64,
    ) -> DataResult<LoadedTable>
    where
        R: Read + Send + 'static,
    {
        let loader = self.clone();
        tokio::task::spawn_blocking(move || loader.load(source, format, max_rows, probed_size))
            .await?
    }

    /// Parse `source`, keeping at most `max_rows` rows
    ///
    /// `probed_size` is the size reported by the size probe (0 when
    /// unknown) and picks the read strategy. CSV input is consumed only as
    /// far as the rows kept need; workbooks are read whole.
    pub fn load<'a, R: Read + 'a>(
        &self,
        source: R,
        format: TabularFormat,
        max_rows: Option<usize>,
        probed_size: u64,
    ) -> DataResult<LoadedTable> {
        let mut reader: Box<dyn RowReader + 'a> = match format {
            TabularFormat::Csv => Box::new(CsvRowReader::new(source, self.null_config.clone())?),
            TabularFormat::Xls => Box::new(self.open_workbook(source, WorkbookKind::Xls)?),
            TabularFormat::Xlsx => Box::new(self.open_workbook(source, WorkbookKind::Xlsx)?),
        };

        if reader.headers().is_empty() {
            return Err(DataError::EmptyResource);
        }

        // One extra row tells whether more rows exist
        let target = max_rows.map(|n| n.saturating_add(1));

        let (mut rows, strategy) = if probed_size > self.large_file_threshold {
            self.read_chunked(reader.as_mut(), target)?
        } else {
            let mut rows = Vec::new();
            reader.read_rows(target.unwrap_or(usize::MAX), &mut rows)?;
            (rows, ReadStrategy::SinglePass)
        };

        let has_more = match max_rows {
            Some(n) if rows.len() > n => {
                rows.truncate(n);
                true
            }
            _ => false,
        };

        let skipped_rows = reader.skipped_rows();
        let table = Table::from_raw(reader.headers().to_vec(), &rows)?;
        debug!(
            rows = table.num_rows(),
            columns = table.num_columns(),
            skipped_rows,
            ?strategy,
            "parsed tabular resource"
        );

        Ok(LoadedTable {
            table,
            has_more,
            skipped_rows,
            strategy,
        })
    }

    fn open_workbook<R: Read>(
        &self,
        mut source: R,
        kind: WorkbookKind,
    ) -> DataResult<ExcelRowReader> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).map_err(read_error)?;
        ExcelRowReader::new(&data, kind, &self.null_config)
    }

    fn read_chunked<R: RowReader + ?Sized>(
        &self,
        reader: &mut R,
        target: Option<usize>,
    ) -> DataResult<(Vec<RawRow>, ReadStrategy)> {
        let mut chunks: Vec<Vec<RawRow>> = Vec::new();
        let mut accumulated = 0usize;

        loop {
            let mut chunk = Vec::with_capacity(self.chunk_rows);
            let read = reader.read_rows(self.chunk_rows, &mut chunk)?;
            if read == 0 {
                break;
            }
            accumulated += read;
            chunks.push(chunk);
            if target.is_some_and(|t| accumulated >= t) {
                break;
            }
        }

        let strategy = ReadStrategy::Chunked { chunks: chunks.len() };
        Ok((chunks.concat(), strategy))
    }
}
