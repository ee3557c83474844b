// src/analysis/quantile.rs

use arrow::{
    array::{Array, UInt32Array},
    datatypes::{DataType, Field},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::table::{value_of, Table};

/// A table carrying a quantile-group label column.
#[derive(Debug, Clone)]
pub struct GroupedTable {
    pub table: Table,
    /// Name of the UInt32 label column in `table`.
    pub group_column: String,
}

impl GroupedTable {
    pub fn labels(&self) -> Result<&UInt32Array> {
        let col = self.table.column(&self.group_column)?;
        col.as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| AnalysisError::ColumnType {
                column: self.group_column.clone(),
                expected: DataType::UInt32,
                actual: col.data_type().clone(),
            })
    }

    /// Distinct labels actually assigned, ascending.
    pub fn groups(&self) -> Result<Vec<u32>> {
        let labels: BTreeSet<u32> = self.labels()?.iter().flatten().collect();
        Ok(labels.into_iter().collect())
    }
}

/// Name of the label column produced when grouping by `column`.
pub fn group_column_name(column: &str) -> String {
    format!("{} Group", column)
}

/// Linear-interpolated quantile `q` (0..=1) of an ascending slice.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

/// Assign each value to one of `n` equal-frequency groups, labelled `1..=K`.
///
/// Bin edges sit at the `i/n` quantiles; repeated edges collapse, so heavy
/// ties or few values yield `K < n` groups. Bins are right-closed with the
/// minimum included in group 1, and only occupied bins are numbered, so the
/// labels always cover exactly `1..=K`. Missing values get no label.
pub fn quantile_labels(values: &[Option<f64>], n: usize) -> Result<Vec<Option<u32>>> {
    if n < 1 {
        return Err(AnalysisError::InvalidArgument(
            "number of groups must be at least 1".into(),
        ));
    }

    let mut sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    sorted.sort_by(f64::total_cmp);

    let mut edges: Vec<f64> = (0..=n)
        .filter_map(|i| quantile_sorted(&sorted, i as f64 / n as f64))
        .collect();
    edges.dedup();

    let bins = edges.len().saturating_sub(1).max(1);
    let positions: Vec<Option<usize>> = values
        .iter()
        .map(|v| {
            v.filter(|x| x.is_finite()).map(|x| {
                // first upper edge >= x
                let idx = edges.get(1..).unwrap_or_default().partition_point(|e| *e < x);
                idx.min(bins - 1)
            })
        })
        .collect();

    // empty bins are skipped so labels run 1..=K without gaps
    let occupied: BTreeSet<usize> = positions.iter().flatten().copied().collect();
    let rank: BTreeMap<usize, u32> = occupied
        .iter()
        .enumerate()
        .map(|(i, &bin)| (bin, i as u32 + 1))
        .collect();

    let groups = rank.len();
    if !sorted.is_empty() && groups < n {
        warn!(requested = n, groups, "fewer distinct quantile groups than requested");
    }

    Ok(positions
        .into_iter()
        .map(|pos| pos.and_then(|p| rank.get(&p).copied()))
        .collect())
}

/// Label every row of `table` with the quantile group of its `column` value.
///
/// Returns a new table with a `"<column> Group"` UInt32 column appended;
/// rows with a null value are left unlabelled.
#[tracing::instrument(level = "debug", skip(table), fields(rows = table.num_rows()))]
pub fn group_by_quantile(table: &Table, column: &str, n: usize) -> Result<GroupedTable> {
    let values = table.metric(column)?;
    let vals: Vec<Option<f64>> = (0..values.len()).map(|row| value_of(values, row)).collect();
    let labels = quantile_labels(&vals, n)?;
    attach_labels(table, column, labels)
}

/// `group_by_quantile` over the rows of a single year.
pub fn group_by_quantile_for_year(
    table: &Table,
    year: i64,
    column: &str,
    n: usize,
) -> Result<GroupedTable> {
    group_by_quantile(&table.for_year(year)?, column, n)
}

/// Group countries over an inclusive year range.
///
/// Each country is ranked by its mean `column` value across the range, and
/// all of its rows in the range carry that country's label.
#[tracing::instrument(level = "debug", skip(table))]
pub fn group_by_quantile_for_year_range(
    table: &Table,
    start: i64,
    end: i64,
    column: &str,
    n: usize,
) -> Result<GroupedTable> {
    let slice = table.for_year_range(start, end)?;
    let values = slice.metric(column)?;
    let countries = slice.countries();

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for row in 0..slice.num_rows() {
        if countries.is_null(row) {
            continue;
        }
        let acc = sums.entry(countries.value(row)).or_insert((0.0, 0));
        if let Some(v) = value_of(values, row) {
            acc.0 += v;
            acc.1 += 1;
        }
    }

    let names: Vec<&str> = sums.keys().copied().collect();
    let means: Vec<Option<f64>> = sums
        .values()
        .map(|&(sum, count)| (count > 0).then(|| sum / count as f64))
        .collect();
    let by_country: BTreeMap<&str, Option<u32>> = names
        .into_iter()
        .zip(quantile_labels(&means, n)?)
        .collect();
    debug!(countries = by_country.len(), start, end, "ranked countries by range mean");

    let labels: Vec<Option<u32>> = (0..slice.num_rows())
        .map(|row| {
            if countries.is_null(row) {
                None
            } else {
                by_country.get(countries.value(row)).copied().flatten()
            }
        })
        .collect();

    attach_labels(&slice, column, labels)
}

fn attach_labels(table: &Table, column: &str, labels: Vec<Option<u32>>) -> Result<GroupedTable> {
    let group_column = group_column_name(column);
    let table = table.with_column(
        Field::new(&group_column, DataType::UInt32, true),
        Arc::new(UInt32Array::from(labels)),
    )?;
    Ok(GroupedTable {
        table,
        group_column,
    })
}
