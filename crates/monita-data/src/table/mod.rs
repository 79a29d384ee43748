//! In-memory tables
//!
//! A [`Table`] wraps an Arrow [`RecordBatch`] whose columns are either
//! `Float64` (numeric) or `Utf8` (text). Tables are never mutated; every
//! operation returns a new table.

use std::ops::Range;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Float64Builder, StringArray, StringBuilder,
    UInt32Array,
};
use arrow::compute::{filter_record_batch, take_record_batch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use monita_core::responses::JsonRow;
use monita_core::{ColumnInfo, ColumnKind};
use serde_json::Value;

use crate::schema::{parse_number, RawRow, SchemaDetector};
use crate::{DataError, DataResult};

/// Borrowed view of one column, dispatched on its kind
#[derive(Debug, Clone, Copy)]
pub enum Column<'a> {
    Numeric(&'a Float64Array),
    Text(&'a StringArray),
}

impl<'a> Column<'a> {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(array) => array.len(),
            Column::Text(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display form of a cell, `None` for nulls
    pub fn display(&self, row: usize) -> Option<String> {
        match self {
            Column::Numeric(array) => {
                (!array.is_null(row)).then(|| format_number(array.value(row)))
            }
            Column::Text(array) => (!array.is_null(row)).then(|| array.value(row).to_string()),
        }
    }

    /// JSON form of a cell
    pub fn json(&self, row: usize) -> Value {
        match self {
            Column::Numeric(array) if !array.is_null(row) => number_to_json(array.value(row)),
            Column::Text(array) if !array.is_null(row) => {
                Value::String(array.value(row).to_string())
            }
            _ => Value::Null,
        }
    }

    /// Non-null numeric values in row order; empty for text columns
    pub fn numeric_values(&self) -> Vec<f64> {
        match self {
            Column::Numeric(array) => array.iter().flatten().collect(),
            Column::Text(_) => Vec::new(),
        }
    }
}

/// Render a number the way it is shown in labels and filters
///
/// Integral values drop the fractional part (`3`, not `3.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Convert a number to JSON; non-finite values become `null`
pub fn number_to_json(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Immutable typed table
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    /// Build a table from a header and raw rows
    ///
    /// Column kinds are detected over all rows; numeric cells that fail to
    /// parse cannot occur because such a column is typed as text.
    pub fn from_raw(headers: Vec<String>, rows: &[RawRow]) -> DataResult<Self> {
        if headers.is_empty() {
            return Err(DataError::BadResource("resource has no columns".to_string()));
        }

        let infos = SchemaDetector::new().detect(&headers, rows);
        let mut fields = Vec::with_capacity(infos.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(infos.len());

        for (col_idx, info) in infos.iter().enumerate() {
            let cells = rows.iter().map(|row| row.get(col_idx).and_then(|c| c.as_deref()));
            match info.kind {
                ColumnKind::Numeric => {
                    let mut builder = Float64Builder::with_capacity(rows.len());
                    for cell in cells {
                        builder.append_option(cell.and_then(parse_number));
                    }
                    columns.push(Arc::new(builder.finish()));
                    fields.push(Field::new(info.name.clone(), DataType::Float64, true));
                }
                ColumnKind::Text => {
                    let mut builder = StringBuilder::new();
                    for cell in cells {
                        builder.append_option(cell);
                    }
                    columns.push(Arc::new(builder.finish()));
                    fields.push(Field::new(info.name.clone(), DataType::Utf8, true));
                }
            }
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(Self { batch })
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn columns(&self) -> Vec<ColumnInfo> {
        (0..self.num_columns())
            .map(|idx| ColumnInfo {
                name: self.batch.schema().field(idx).name().clone(),
                kind: self.column(idx).kind(),
            })
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.batch.schema().index_of(name).ok()
    }

    /// Column by position
    ///
    /// Panics if `idx` is out of bounds.
    pub fn column(&self, idx: usize) -> Column<'_> {
        let array = self.batch.column(idx);
        if let Some(numeric) = array.as_any().downcast_ref::<Float64Array>() {
            Column::Numeric(numeric)
        } else if let Some(text) = array.as_any().downcast_ref::<StringArray>() {
            Column::Text(text)
        } else {
            unreachable!("table columns are Float64 or Utf8")
        }
    }

    pub fn column_by_name(&self, name: &str) -> Option<Column<'_>> {
        self.column_index(name).map(|idx| self.column(idx))
    }

    /// Keep rows where `mask` is true
    pub fn filter(&self, mask: &BooleanArray) -> DataResult<Self> {
        Ok(Self {
            batch: filter_record_batch(&self.batch, mask)?,
        })
    }

    /// Rows at `indices`, in that order
    pub fn take(&self, indices: &[u32]) -> DataResult<Self> {
        let indices = UInt32Array::from(indices.to_vec());
        Ok(Self {
            batch: take_record_batch(&self.batch, &indices)?,
        })
    }

    /// Rows in `range`, clamped to the table
    pub fn slice(&self, range: Range<usize>) -> Self {
        let start = range.start.min(self.num_rows());
        let end = range.end.clamp(start, self.num_rows());
        Self {
            batch: self.batch.slice(start, end - start),
        }
    }

    /// Render every row as a JSON object in column order
    pub fn to_json_rows(&self) -> Vec<JsonRow> {
        let names = self.column_names();
        let columns: Vec<Column<'_>> = (0..self.num_columns()).map(|i| self.column(i)).collect();

        (0..self.num_rows())
            .map(|row| {
                names
                    .iter()
                    .zip(&columns)
                    .map(|(name, column)| (name.clone(), column.json(row)))
                    .collect()
            })
            .collect()
    }
}
