// src/analysis/aggregate.rs

use arrow::array::Array;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use super::quantile::{quantile_sorted, GroupedTable};
use crate::error::{AnalysisError, Result};
use crate::table::{value_of, Table};

/// A per-group summary statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Count,
    Mean,
    Sum,
    /// Sample standard deviation (n - 1 denominator).
    Std,
    Min,
    Max,
    /// Percentile in `0..=100`, linearly interpolated.
    Percentile(f64),
    /// Group sum as a fraction of the whole slice's sum.
    PctOfTotal,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Count => write!(f, "count"),
            Statistic::Mean => write!(f, "mean"),
            Statistic::Sum => write!(f, "sum"),
            Statistic::Std => write!(f, "std"),
            Statistic::Min => write!(f, "min"),
            Statistic::Max => write!(f, "max"),
            Statistic::Percentile(p) => write!(f, "p{}", p),
            Statistic::PctOfTotal => write!(f, "pct_of_total"),
        }
    }
}

/// Accepts `count`, `mean`, `sum`, `std`, `min`, `max`, `median`,
/// `pct_of_total`, and percentiles as `p25` or `25%`.
impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let stat = match s.as_str() {
            "count" => Statistic::Count,
            "mean" | "avg" => Statistic::Mean,
            "sum" => Statistic::Sum,
            "std" => Statistic::Std,
            "min" => Statistic::Min,
            "max" => Statistic::Max,
            "median" => Statistic::Percentile(50.0),
            "pct_of_total" | "percent_of_total" => Statistic::PctOfTotal,
            other => {
                let num = other
                    .strip_prefix('p')
                    .or_else(|| other.strip_suffix('%'))
                    .ok_or_else(|| format!("unknown statistic `{}`", other))?;
                let p: f64 = num
                    .parse()
                    .map_err(|_| format!("invalid percentile `{}`", other))?;
                Statistic::Percentile(p)
            }
        };
        Ok(stat)
    }
}

/// Descriptive statistics of one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

impl GroupStats {
    fn from_sorted(sorted: &[f64]) -> Self {
        Self {
            count: sorted.len(),
            mean: mean(sorted),
            std: sample_std(sorted),
            min: sorted.first().copied(),
            p25: quantile_sorted(sorted, 0.25),
            p50: quantile_sorted(sorted, 0.50),
            p75: quantile_sorted(sorted, 0.75),
            max: sorted.last().copied(),
        }
    }
}

/// Non-missing `column` values per assigned group, each sorted ascending.
/// Every assigned group is present, even when all its values are missing.
fn values_by_group(grouped: &GroupedTable, column: &str) -> Result<BTreeMap<u32, Vec<f64>>> {
    let labels = grouped.labels()?;
    let values = grouped.table.metric(column)?;

    let mut groups: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for row in 0..grouped.table.num_rows() {
        if labels.is_null(row) {
            continue;
        }
        let bucket = groups.entry(labels.value(row)).or_default();
        if let Some(v) = value_of(values, row) {
            bucket.push(v);
        }
    }
    for bucket in groups.values_mut() {
        bucket.sort_by(f64::total_cmp);
    }
    Ok(groups)
}

/// Compute `statistic` of `column` within each group of `grouped`.
///
/// For `PctOfTotal` the denominator is the sum over every row of the grouped
/// table, labelled or not, i.e. the same year / range slice.
pub fn aggregate(
    grouped: &GroupedTable,
    column: &str,
    statistic: Statistic,
) -> Result<BTreeMap<u32, Option<f64>>> {
    if let Statistic::Percentile(p) = statistic {
        if !(0.0..=100.0).contains(&p) {
            return Err(AnalysisError::InvalidArgument(format!(
                "percentile {} is outside 0..=100",
                p
            )));
        }
    }

    let groups = values_by_group(grouped, column)?;
    let grand_total = match statistic {
        Statistic::PctOfTotal => column_sum(&grouped.table, column)?,
        _ => 0.0,
    };

    Ok(groups
        .into_iter()
        .map(|(group, values)| {
            let v = match statistic {
                Statistic::Count => Some(values.len() as f64),
                Statistic::Mean => mean(&values),
                Statistic::Sum => Some(values.iter().sum()),
                Statistic::Std => sample_std(&values),
                Statistic::Min => values.first().copied(),
                Statistic::Max => values.last().copied(),
                Statistic::Percentile(p) => quantile_sorted(&values, p / 100.0),
                Statistic::PctOfTotal => {
                    let sum: f64 = values.iter().sum();
                    (grand_total != 0.0).then(|| sum / grand_total)
                }
            };
            (group, v)
        })
        .collect())
}

/// count / mean / std / min / quartiles / max of `column` per group.
pub fn describe(grouped: &GroupedTable, column: &str) -> Result<BTreeMap<u32, GroupStats>> {
    Ok(values_by_group(grouped, column)?
        .into_iter()
        .map(|(group, values)| (group, GroupStats::from_sorted(&values)))
        .collect())
}

/// Total of `column` per country over the given table (nulls skipped).
pub fn sum_by_country(table: &Table, column: &str) -> Result<BTreeMap<String, f64>> {
    let values = table.metric(column)?;
    let countries = table.countries();
    let mut out: BTreeMap<String, f64> = BTreeMap::new();
    for row in 0..table.num_rows() {
        if countries.is_null(row) {
            continue;
        }
        let total = out.entry(countries.value(row).to_string()).or_insert(0.0);
        if let Some(v) = value_of(values, row) {
            *total += v;
        }
    }
    Ok(out)
}

fn column_sum(table: &Table, column: &str) -> Result<f64> {
    let values = table.metric(column)?;
    Ok((0..values.len()).filter_map(|row| value_of(values, row)).sum())
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Welford's online variance, ddof = 1.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mut count = 0u64;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for &x in values {
        count += 1;
        let delta = x - mean;
        mean += delta / count as f64;
        m2 += delta * (x - mean);
    }
    Some((m2 / (count - 1) as f64).sqrt())
}
