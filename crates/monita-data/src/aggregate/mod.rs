//! Column statistics and chart aggregation

use indexmap::IndexMap;
use monita_core::{ChartBucket, ChartType, ColumnStat};

use crate::table::{format_number, Column, Table};
use crate::{DataError, DataResult};

/// Distinct values shown in a pie chart of a numeric column
const PIE_TOP_VALUES: usize = 10;

/// Distinct values shown for text columns, whatever the chart type
const TEXT_TOP_VALUES: usize = 20;

/// Allowed histogram bin counts
pub const MIN_BINS: usize = 2;
pub const MAX_BINS: usize = 50;

/// Statistics for every numeric column, in column order
pub fn column_stats(table: &Table) -> Vec<ColumnStat> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(idx, info)| match table.column(idx) {
            Column::Numeric(_) => Some(describe(&info.name, &table.column(idx).numeric_values())),
            Column::Text(_) => None,
        })
        .collect()
}

/// Count, sum, mean, min, max and sample standard deviation of `values`
pub fn describe(column: &str, values: &[f64]) -> ColumnStat {
    let count = values.len();
    let sum: f64 = values.iter().sum();

    let (mean, min, max) = if count == 0 {
        (None, None, None)
    } else {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (Some(sum / count as f64), Some(min), Some(max))
    };

    let std = match mean {
        Some(mean) if count > 1 => {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            Some(variance.sqrt())
        }
        _ => None,
    };

    ColumnStat {
        column: column.to_string(),
        count,
        mean,
        min,
        max,
        sum,
        std,
    }
}

/// Chart buckets for `column`
///
/// Text columns always produce the most frequent values, whatever
/// `chart_type` asks for.
pub fn chart_data(
    table: &Table,
    column: &str,
    chart_type: ChartType,
    bins: usize,
) -> DataResult<Vec<ChartBucket>> {
    let col = table
        .column_by_name(column)
        .ok_or_else(|| DataError::NotFound(format!("column '{column}'")))?;

    match col {
        Column::Numeric(_) => {
            let values = col.numeric_values();
            match chart_type {
                ChartType::Histogram => histogram(&values, bins),
                ChartType::Bar | ChartType::Line => Ok(distinct_counts(&values)),
                ChartType::Pie => Ok(top_values(
                    values.iter().map(|v| format_number(*v)),
                    PIE_TOP_VALUES,
                )),
            }
        }
        Column::Text(array) => Ok(top_values(
            array.iter().flatten().map(str::to_string),
            TEXT_TOP_VALUES,
        )),
    }
}

/// Equal-width histogram over `[min, max]`
///
/// The last bin is closed on the right. A constant column is widened to
/// `[v - 0.5, v + 0.5]`; an empty one spans `[0, 1]`.
pub fn histogram(values: &[f64], bins: usize) -> DataResult<Vec<ChartBucket>> {
    if !(MIN_BINS..=MAX_BINS).contains(&bins) {
        return Err(DataError::InvalidRequest(format!(
            "bins must be between {MIN_BINS} and {MAX_BINS}"
        )));
    }

    let (mut lower, mut upper) = if values.is_empty() {
        (0.0, 1.0)
    } else {
        (
            values.iter().copied().fold(f64::INFINITY, f64::min),
            values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    };
    if lower == upper {
        lower -= 0.5;
        upper += 0.5;
    }

    let width = (upper - lower) / bins as f64;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| if i == bins { upper } else { lower + width * i as f64 })
        .collect();

    let mut counts = vec![0usize; bins];
    for &value in values {
        let mut idx = (((value - lower) / width) as usize).min(bins - 1);
        // Float error can land a value one bin off its edges
        if idx > 0 && value < edges[idx] {
            idx -= 1;
        } else if idx + 1 < bins && value >= edges[idx + 1] {
            idx += 1;
        }
        counts[idx] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| ChartBucket {
            label: format!("{:.2}-{:.2}", edges[i], edges[i + 1]),
            value: count as f64,
        })
        .collect())
}

/// One bucket per distinct value, ascending
fn distinct_counts(values: &[f64]) -> Vec<ChartBucket> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut buckets: Vec<ChartBucket> = Vec::new();
    let mut last: Option<f64> = None;
    for value in sorted {
        match (last, buckets.last_mut()) {
            (Some(prev), Some(bucket)) if prev == value => bucket.value += 1.0,
            _ => buckets.push(ChartBucket {
                label: format_number(value),
                value: 1.0,
            }),
        }
        last = Some(value);
    }
    buckets
}

/// The `limit` most frequent labels; ties keep first-seen order
fn top_values(labels: impl Iterator<Item = String>, limit: usize) -> Vec<ChartBucket> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);

    ranked
        .into_iter()
        .map(|(label, count)| ChartBucket {
            label,
            value: count as f64,
        })
        .collect()
}
