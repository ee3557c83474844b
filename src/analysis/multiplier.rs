// src/analysis/multiplier.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::growth::growth;
use super::quantile::quantile_labels;
use crate::error::{AnalysisError, Result};
use crate::table::Table;

/// How strongly column B's growth tracks column A's for one country.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Multiplier {
    pub growth_a: Option<f64>,
    pub growth_b: Option<f64>,
    /// `growth_b / growth_a`, negated when `growth_a <= 0`.
    pub multiplier: Option<f64>,
    /// Whether the raw ratio was negated.
    pub sign_corrected: bool,
}

impl Multiplier {
    /// Combine two growth rates.
    ///
    /// A shrinking A would flip the sign of the ratio, so the ratio is
    /// negated in that case: positive means both moved in the same direction
    /// relative to A's trend. Missing growth or `growth_a == 0` gives `None`.
    pub fn from_growths(growth_a: Option<f64>, growth_b: Option<f64>) -> Self {
        let raw = match (growth_a, growth_b) {
            (Some(a), Some(b)) if a != 0.0 => Some(b / a).filter(|m| m.is_finite()),
            _ => None,
        };
        let sign_corrected = raw.is_some() && growth_a.is_some_and(|a| a <= 0.0);
        let multiplier = raw.map(|m| if sign_corrected { -m } else { m });
        Self {
            growth_a,
            growth_b,
            multiplier,
            sign_corrected,
        }
    }
}

/// A country's multiplier together with its growth-rate group of column A.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupedMultiplier {
    pub group: Option<u32>,
    #[serde(flatten)]
    pub multiplier: Multiplier,
}

fn column_pair<S: AsRef<str>>(columns: &[S]) -> Result<(&str, &str)> {
    match columns {
        [a, b] => Ok((a.as_ref(), b.as_ref())),
        _ => Err(AnalysisError::InvalidArgument(format!(
            "multiplier needs exactly two columns, got {}",
            columns.len()
        ))),
    }
}

/// Per-country growth multiplier of `columns[1]` relative to `columns[0]`.
///
/// Every country with a growth value for either column is present.
pub fn multiplier<S: AsRef<str>>(
    table: &Table,
    columns: &[S],
    exclude_zero: bool,
) -> Result<BTreeMap<String, Multiplier>> {
    let (col_a, col_b) = column_pair(columns)?;
    let growth_a = growth(table, col_a, exclude_zero)?;
    let growth_b = growth(table, col_b, exclude_zero)?;

    let countries: BTreeSet<&String> = growth_a.keys().chain(growth_b.keys()).collect();
    Ok(countries
        .into_iter()
        .map(|country| {
            let a = growth_a.get(country).copied().flatten();
            let b = growth_b.get(country).copied().flatten();
            (country.clone(), Multiplier::from_growths(a, b))
        })
        .collect())
}

/// Multipliers with each country placed in one of `n` quantile groups of its
/// column-A growth. Countries without A growth are unassigned.
pub fn grouped_growth_multipliers<S: AsRef<str>>(
    table: &Table,
    columns: &[S],
    n: usize,
    exclude_zero: bool,
) -> Result<BTreeMap<String, GroupedMultiplier>> {
    let multipliers = multiplier(table, columns, exclude_zero)?;
    let growth_a: Vec<Option<f64>> = multipliers.values().map(|m| m.growth_a).collect();
    let labels = quantile_labels(&growth_a, n)?;

    Ok(multipliers
        .into_iter()
        .zip(labels)
        .map(|((country, multiplier), group)| (country, GroupedMultiplier { group, multiplier }))
        .collect())
}

/// Mean multiplier within each column-A growth group.
/// A group whose members all lack a multiplier maps to `None`.
pub fn grouped_mean_multiplier<S: AsRef<str>>(
    table: &Table,
    columns: &[S],
    n: usize,
    exclude_zero: bool,
) -> Result<BTreeMap<u32, Option<f64>>> {
    let mut acc: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for gm in grouped_growth_multipliers(table, columns, n, exclude_zero)?.values() {
        let Some(group) = gm.group else {
            continue;
        };
        let entry = acc.entry(group).or_insert((0.0, 0));
        if let Some(m) = gm.multiplier.multiplier {
            entry.0 += m;
            entry.1 += 1;
        }
    }
    Ok(acc
        .into_iter()
        .map(|(group, (sum, count))| (group, (count > 0).then(|| sum / count as f64)))
        .collect())
}
