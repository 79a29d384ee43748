//! Header normalisation and column type detection

use ahash::{AHashMap, AHashSet};
use monita_core::{ColumnInfo, ColumnKind};

/// A parsed row before typing; `None` is a null cell
pub type RawRow = Vec<Option<String>>;

/// Parse a cell as a number, ignoring surrounding whitespace
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Make header names usable as unique column keys
///
/// Blank names become `Unnamed: {index}`; repeated names get `.1`, `.2`, ...
/// suffixes in order of appearance.
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut used: AHashSet<String> = AHashSet::new();
    let mut counters: AHashMap<String, usize> = AHashMap::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (idx, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name
        };

        let mut candidate = base.clone();
        if used.contains(&candidate) {
            let counter = counters.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                candidate = format!("{base}.{counter}");
                if !used.contains(&candidate) {
                    break;
                }
            }
        }

        used.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

/// Schema detector for assigning a [`ColumnKind`] to every column
#[derive(Debug, Clone, Default)]
pub struct SchemaDetector;

impl SchemaDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the kind of every column
    ///
    /// All rows are inspected: a column is numeric when there is at least one
    /// row and every non-null cell parses as a number. A column with rows but
    /// only nulls is numeric; a column of a header-only file is text.
    pub fn detect(&self, headers: &[String], rows: &[RawRow]) -> Vec<ColumnInfo> {
        headers
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnInfo {
                name: name.clone(),
                kind: Self::detect_column_kind(rows, idx),
            })
            .collect()
    }

    fn detect_column_kind(rows: &[RawRow], col_idx: usize) -> ColumnKind {
        if rows.is_empty() {
            return ColumnKind::Text;
        }

        let all_numeric = rows.iter().all(|row| match row.get(col_idx) {
            Some(Some(value)) => parse_number(value).is_some(),
            _ => true,
        });

        if all_numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }
}
