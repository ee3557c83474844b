// src/analysis/growth.rs

use arrow::{
    array::{Array, ArrayRef, Float64Array},
    datatypes::{DataType, Field, FieldRef},
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use super::summary::summarize;
use crate::error::Result;
use crate::table::{value_of, Table};

/// Fractional change from `old` to `new` (0.5 = +50%).
///
/// `None` when either side is missing, `old == 0`, or the result is not finite.
pub fn pct_change(old: Option<f64>, new: Option<f64>) -> Option<f64> {
    let (old, new) = (old?, new?);
    if old == 0.0 {
        return None;
    }
    Some((new - old) / old).filter(|g| g.is_finite())
}

/// Growth between each country's earliest and latest observation of `column`.
pub fn growth(
    table: &Table,
    column: &str,
    exclude_zero: bool,
) -> Result<BTreeMap<String, Option<f64>>> {
    Ok(summarize(table, column, exclude_zero)?
        .into_iter()
        .map(|(country, s)| (country, s.pct_growth))
        .collect())
}

/// Value of `column` for `country` in `year`; first matching row wins.
pub fn value_at(table: &Table, column: &str, country: &str, year: i64) -> Result<Option<f64>> {
    let values = table.metric(column)?;
    let countries = table.countries();
    let years = table.years();
    Ok((0..table.num_rows())
        .find(|&row| {
            !countries.is_null(row)
                && !years.is_null(row)
                && countries.value(row) == country
                && years.value(row) == year
        })
        .and_then(|row| value_of(values, row)))
}

/// Change of `column` between `year_1` and `year_2` for every country that
/// has any non-null, non-zero observation. Countries missing either year map
/// to `None`.
pub fn pct_change_between_years(
    table: &Table,
    column: &str,
    year_1: i64,
    year_2: i64,
) -> Result<BTreeMap<String, Option<f64>>> {
    let values = table.metric(column)?;
    let countries = table.countries();
    let years = table.years();

    let mut points: BTreeMap<&str, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for row in 0..table.num_rows() {
        let Some(v) = value_of(values, row).filter(|v| *v != 0.0) else {
            continue;
        };
        if countries.is_null(row) || years.is_null(row) {
            continue;
        }
        let entry = points.entry(countries.value(row)).or_default();
        let year = years.value(row);
        if year == year_1 && entry.0.is_none() {
            entry.0 = Some(v);
        }
        if year == year_2 && entry.1.is_none() {
            entry.1 = Some(v);
        }
    }

    Ok(points
        .into_iter()
        .map(|(country, (a, b))| (country.to_string(), pct_change(a, b)))
        .collect())
}

/// Name of the year-over-year column derived from `column`.
pub fn yoy_column_name(column: &str) -> String {
    format!("{} YoY_pct_change", column)
}

/// Return a new table with a year-over-year change column inserted right
/// after every metric column.
///
/// Changes are computed per country in year order. A missing value is
/// carried forward from the country's previous observation, so a gap yields
/// a 0 change rather than breaking the series. The input table is not
/// modified.
#[tracing::instrument(level = "debug", skip(table), fields(rows = table.num_rows()))]
pub fn with_yoy_pct_change(table: &Table) -> Result<Table> {
    let order = country_year_order(table);
    let schema = table.batch().schema();

    let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len() * 2);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() * 2);

    for (field, column) in schema.fields().iter().zip(table.batch().columns()) {
        fields.push(field.clone());
        columns.push(column.clone());

        if field.data_type() != &DataType::Float64 {
            continue;
        }
        let values = table.metric(field.name())?;
        let yoy = yoy_values(table, values, &order);
        debug!(column = %field.name(), "derived year-over-year change");

        fields.push(Arc::new(Field::new(
            yoy_column_name(field.name()),
            DataType::Float64,
            true,
        )));
        columns.push(Arc::new(Float64Array::from(yoy)));
    }

    Table::from_columns(fields, columns)
}

/// Row indices ordered by (country, year), stable on ties.
fn country_year_order(table: &Table) -> Vec<usize> {
    let countries = table.countries();
    let years = table.years();
    let mut order: Vec<usize> = (0..table.num_rows())
        .filter(|&row| !countries.is_null(row) && !years.is_null(row))
        .collect();
    order.sort_by(|&a, &b| {
        countries
            .value(a)
            .cmp(countries.value(b))
            .then(years.value(a).cmp(&years.value(b)))
    });
    order
}

fn yoy_values(table: &Table, values: &Float64Array, order: &[usize]) -> Vec<Option<f64>> {
    let countries = table.countries();
    let mut out = vec![None; table.num_rows()];

    let mut current: Option<&str> = None;
    let mut filled: Option<f64> = None;
    for &row in order {
        let country = countries.value(row);
        if current != Some(country) {
            current = Some(country);
            filled = None;
        }
        let previous = filled;
        filled = value_of(values, row).or(previous);
        out[row] = pct_change(previous, filled);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_rows(
            &["pop"],
            vec![
                ("A", 2000, vec![Some(10.0)]),
                ("A", 2010, vec![Some(20.0)]),
                ("B", 2000, vec![Some(0.0)]),
                ("B", 2010, vec![Some(5.0)]),
                ("C", 2000, vec![Some(7.0)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn pct_change_propagates_missing_and_zero() {
        assert_eq!(pct_change(Some(10.0), Some(15.0)), Some(0.5));
        assert_eq!(pct_change(Some(-10.0), Some(-5.0)), Some(-0.5));
        assert_eq!(pct_change(Some(0.0), Some(15.0)), None);
        assert_eq!(pct_change(None, Some(15.0)), None);
        assert_eq!(pct_change(Some(1.0), None), None);
    }

    #[test]
    fn growth_matches_formula() {
        let g = growth(&table(), "pop", false).unwrap();
        assert_eq!(g["A"], Some(1.0));
        assert_eq!(g["B"], None);
        // single observation
        assert_eq!(g["C"], Some(0.0));
    }

    #[test]
    fn value_lookup() {
        let t = table();
        assert_eq!(value_at(&t, "pop", "A", 2010).unwrap(), Some(20.0));
        assert_eq!(value_at(&t, "pop", "A", 2005).unwrap(), None);
        assert_eq!(value_at(&t, "pop", "Z", 2000).unwrap(), None);
    }

    #[test]
    fn change_between_specific_years() {
        let c = pct_change_between_years(&table(), "pop", 2000, 2010).unwrap();
        assert_eq!(c["A"], Some(1.0));
        // B's zero in 2000 is dropped, so there is no start value
        assert_eq!(c["B"], None);
        assert_eq!(c["C"], None);
    }

    #[test]
    fn yoy_is_per_country_and_pure() {
        let t = Table::from_rows(
            &["co2"],
            vec![
                ("B", 2001, vec![Some(4.0)]),
                ("A", 2001, vec![None]),
                ("A", 2000, vec![Some(10.0)]),
                ("A", 2002, vec![Some(15.0)]),
                ("B", 2000, vec![Some(2.0)]),
            ],
        )
        .unwrap();
        let out = with_yoy_pct_change(&t).unwrap();

        assert_eq!(t.batch().num_columns(), 3);
        assert_eq!(out.batch().num_columns(), 4);
        assert_eq!(out.batch().schema().field(3).name(), "co2 YoY_pct_change");

        let yoy = out.metric("co2 YoY_pct_change").unwrap();
        let got: Vec<Option<f64>> = yoy.iter().collect();
        assert_eq!(got, vec![Some(1.0), Some(0.0), None, Some(0.5), None]);
    }
}
