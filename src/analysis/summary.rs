// src/analysis/summary.rs

use arrow::array::Array;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::growth::pct_change;
use crate::error::Result;
use crate::table::{value_of, Table};

/// A country's first and last usable observation of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountrySummary {
    pub earliest_year: i64,
    pub earliest_value: f64,
    pub latest_year: i64,
    pub latest_value: f64,
    /// `(latest - earliest) / earliest`; `None` when `earliest_value == 0`.
    pub pct_growth: Option<f64>,
}

impl CountrySummary {
    fn new(earliest: (i64, f64), latest: (i64, f64)) -> Self {
        Self {
            earliest_year: earliest.0,
            earliest_value: earliest.1,
            latest_year: latest.0,
            latest_value: latest.1,
            pct_growth: pct_change(Some(earliest.1), Some(latest.1)),
        }
    }
}

/// For every country, the earliest and latest year with a non-null value of
/// `column` (and non-zero, with `exclude_zero`).
///
/// Countries without a qualifying row are simply absent. On duplicate years
/// the first row in table order wins.
pub fn summarize(
    table: &Table,
    column: &str,
    exclude_zero: bool,
) -> Result<BTreeMap<String, CountrySummary>> {
    let values = table.metric(column)?;
    let countries = table.countries();
    let years = table.years();

    let mut spans: BTreeMap<&str, ((i64, f64), (i64, f64))> = BTreeMap::new();
    for row in 0..table.num_rows() {
        let Some(v) = value_of(values, row) else {
            continue;
        };
        if exclude_zero && v == 0.0 {
            continue;
        }
        if countries.is_null(row) || years.is_null(row) {
            continue;
        }
        let obs = (years.value(row), v);
        spans
            .entry(countries.value(row))
            .and_modify(|(earliest, latest)| {
                if obs.0 < earliest.0 {
                    *earliest = obs;
                }
                if obs.0 > latest.0 {
                    *latest = obs;
                }
            })
            .or_insert((obs, obs));
    }

    Ok(spans
        .into_iter()
        .map(|(country, (earliest, latest))| {
            (country.to_string(), CountrySummary::new(earliest, latest))
        })
        .collect())
}

/// Summaries of several columns, keyed by country then column.
///
/// A country appears as soon as any of the columns has data for it; the
/// inner map only holds the columns that do.
pub fn summary_table<S: AsRef<str>>(
    table: &Table,
    columns: &[S],
    exclude_zero: bool,
) -> Result<BTreeMap<String, BTreeMap<String, CountrySummary>>> {
    let mut out: BTreeMap<String, BTreeMap<String, CountrySummary>> = BTreeMap::new();
    for column in columns {
        let column = column.as_ref();
        for (country, summary) in summarize(table, column, exclude_zero)? {
            out.entry(country)
                .or_default()
                .insert(column.to_string(), summary);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn table() -> Table {
        Table::from_rows(
            &["pop", "co2"],
            vec![
                ("A", 2010, vec![Some(20.0), Some(15.0)]),
                ("A", 2000, vec![Some(10.0), Some(5.0)]),
                ("A", 2005, vec![None, Some(0.0)]),
                ("B", 1990, vec![Some(0.0), None]),
                ("B", 1995, vec![Some(4.0), None]),
                ("C", 2000, vec![None, None]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn earliest_and_latest_regardless_of_row_order() {
        let s = summarize(&table(), "pop", false).unwrap();
        let a = s["A"];
        assert_eq!((a.earliest_year, a.earliest_value), (2000, 10.0));
        assert_eq!((a.latest_year, a.latest_value), (2010, 20.0));
        assert_eq!(a.pct_growth, Some(1.0));
    }

    #[test]
    fn zero_start_has_no_growth_unless_excluded() {
        let s = summarize(&table(), "pop", false).unwrap();
        assert_eq!(s["B"].earliest_value, 0.0);
        assert_eq!(s["B"].pct_growth, None);

        let s = summarize(&table(), "pop", true).unwrap();
        assert_eq!(s["B"].earliest_year, 1995);
        assert_eq!(s["B"].pct_growth, Some(0.0));
    }

    #[test]
    fn countries_without_data_are_omitted() {
        let s = summarize(&table(), "co2", false).unwrap();
        assert!(s.contains_key("A"));
        assert!(!s.contains_key("B"));
        assert!(!s.contains_key("C"));
    }

    #[test]
    fn unknown_column_is_reported() {
        assert!(matches!(
            summarize(&table(), "gdp", false).unwrap_err(),
            AnalysisError::UnknownColumn(_)
        ));
    }

    #[test]
    fn summary_table_is_an_outer_join() {
        let s = summary_table(&table(), &["pop", "co2"], false).unwrap();
        assert_eq!(s["A"].len(), 2);
        assert_eq!(s["B"].len(), 1);
        assert!(s["B"].contains_key("pop"));
        assert!(!s.contains_key("C"));
    }
}
