// src/table/mod.rs

pub mod convert;
pub mod load;
pub mod write;

pub use load::{load_csv, read_csv, LoadOptions};
pub use write::write_parquet;

use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray},
    compute::filter_record_batch,
    datatypes::{DataType, Field, FieldRef, Schema},
    record_batch::RecordBatch,
};
use std::{collections::BTreeSet, collections::HashSet, sync::Arc};

use crate::error::{AnalysisError, Result};

/// Name of the country identifier column.
pub const COUNTRY: &str = "country";
/// Name of the observation year column.
pub const YEAR: &str = "year";

/// An immutable per-(country, year) table.
///
/// Backed by a single Arrow `RecordBatch` with a `country` Utf8 column, a
/// `year` Int64 column and any number of nullable Float64 metric columns.
/// Every transform returns a new `Table`; columns are `Arc`-shared so this is
/// cheap.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    /// Wrap a batch, checking the `country` / `year` columns.
    ///
    /// `batch` is private and only ever set here, so `countries()` and
    /// `years()` can rely on both columns existing with these types.
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        expect_type(&batch, COUNTRY, DataType::Utf8)?;
        expect_type(&batch, YEAR, DataType::Int64)?;
        Ok(Self { batch })
    }

    /// Build a table from explicit fields + arrays.
    pub fn from_columns(fields: Vec<FieldRef>, columns: Vec<ArrayRef>) -> Result<Self> {
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Self::try_new(batch)
    }

    /// Build a table from `(country, year, metric values)` rows.
    /// Each row must carry one value per name in `metrics`.
    pub fn from_rows<S, I>(metrics: &[&str], rows: I) -> Result<Self>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = (S, i64, Vec<Option<f64>>)>,
    {
        let mut countries: Vec<String> = Vec::new();
        let mut years: Vec<i64> = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); metrics.len()];

        for (idx, (country, year, row)) in rows.into_iter().enumerate() {
            if row.len() != metrics.len() {
                return Err(AnalysisError::InvalidArgument(format!(
                    "row {} has {} values, expected {}",
                    idx,
                    row.len(),
                    metrics.len()
                )));
            }
            countries.push(country.as_ref().to_string());
            years.push(year);
            for (col, v) in values.iter_mut().zip(row) {
                col.push(v);
            }
        }

        let mut fields: Vec<FieldRef> = vec![
            Arc::new(Field::new(COUNTRY, DataType::Utf8, false)),
            Arc::new(Field::new(YEAR, DataType::Int64, false)),
        ];
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(countries)),
            Arc::new(Int64Array::from(years)),
        ];
        for (name, col) in metrics.iter().zip(values) {
            fields.push(Arc::new(Field::new(*name, DataType::Float64, true)));
            columns.push(Arc::new(Float64Array::from(col)));
        }

        Self::from_columns(fields, columns)
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn countries(&self) -> &StringArray {
        self.batch
            .column_by_name(COUNTRY)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .expect("country column validated on construction")
    }

    pub fn years(&self) -> &Int64Array {
        self.batch
            .column_by_name(YEAR)
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .expect("year column validated on construction")
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| AnalysisError::UnknownColumn(name.to_string()))
    }

    /// Look up a numeric metric column.
    pub fn metric(&self, name: &str) -> Result<&Float64Array> {
        let col = self.column(name)?;
        col.as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| AnalysisError::ColumnType {
                column: name.to_string(),
                expected: DataType::Float64,
                actual: col.data_type().clone(),
            })
    }

    /// Names of all Float64 columns, in schema order.
    pub fn metric_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .filter(|f| f.data_type() == &DataType::Float64)
            .map(|f| f.name().clone())
            .collect()
    }

    /// Distinct non-null country names.
    pub fn country_names(&self) -> BTreeSet<String> {
        self.countries().iter().flatten().map(str::to_string).collect()
    }

    /// Rows for which `mask` is true.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Table> {
        let batch = filter_record_batch(&self.batch, mask)?;
        Table::try_new(batch)
    }

    /// Rows observed in exactly `year`.
    pub fn for_year(&self, year: i64) -> Result<Table> {
        self.for_year_range(year, year)
    }

    /// Rows with `start <= year <= end`.
    pub fn for_year_range(&self, start: i64, end: i64) -> Result<Table> {
        if start > end {
            return Err(AnalysisError::InvalidArgument(format!(
                "year range {}..={} is empty",
                start, end
            )));
        }
        let mask: BooleanArray = self
            .years()
            .iter()
            .map(|y| Some(y.is_some_and(|y| (start..=end).contains(&y))))
            .collect();
        self.filter(&mask)
    }

    /// Rows belonging to one of `countries`.
    pub fn for_countries<S: AsRef<str>>(&self, countries: &[S]) -> Result<Table> {
        let wanted: HashSet<&str> = countries.iter().map(AsRef::as_ref).collect();
        let mask: BooleanArray = self
            .countries()
            .iter()
            .map(|c| Some(c.is_some_and(|c| wanted.contains(c))))
            .collect();
        self.filter(&mask)
    }

    /// Return a new table with `array` appended as `field`.
    /// A column of the same name is replaced in place of the old one.
    pub fn with_column(&self, field: Field, array: ArrayRef) -> Result<Table> {
        let schema = self.batch.schema();
        let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
        let mut columns = self.batch.columns().to_vec();

        match schema.index_of(field.name()) {
            Ok(i) => {
                fields[i] = Arc::new(field);
                columns[i] = array;
            }
            Err(_) => {
                fields.push(Arc::new(field));
                columns.push(array);
            }
        }

        Table::from_columns(fields, columns)
    }
}

/// Value at `row`, treating null and NaN alike as missing.
pub(crate) fn value_of(arr: &Float64Array, row: usize) -> Option<f64> {
    if arr.is_null(row) {
        return None;
    }
    let v = arr.value(row);
    (!v.is_nan()).then_some(v)
}

fn expect_type(batch: &RecordBatch, name: &str, expected: DataType) -> Result<()> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| AnalysisError::UnknownColumn(name.to_string()))?;
    if col.data_type() != &expected {
        return Err(AnalysisError::ColumnType {
            column: name.to_string(),
            expected,
            actual: col.data_type().clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            &["population", "co2"],
            vec![
                ("A", 2000, vec![Some(10.0), Some(5.0)]),
                ("A", 2010, vec![Some(20.0), None]),
                ("B", 2000, vec![None, Some(1.0)]),
                ("B", 2005, vec![Some(3.0), Some(2.0)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let err = Table::from_rows(&["a", "b"], vec![("A", 2000, vec![Some(1.0)])]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument(_)));
    }

    #[test]
    fn metric_lookup_checks_name_and_type() {
        let t = sample();
        assert_eq!(t.metric("co2").unwrap().len(), 4);
        assert!(matches!(
            t.metric("gdp").unwrap_err(),
            AnalysisError::UnknownColumn(c) if c == "gdp"
        ));
        assert!(matches!(
            t.metric(YEAR).unwrap_err(),
            AnalysisError::ColumnType { .. }
        ));
        assert_eq!(t.metric_names(), vec!["population", "co2"]);
    }

    #[test]
    fn try_new_requires_country_and_year() {
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("year", DataType::Int64, false)])),
            vec![Arc::new(Int64Array::from(vec![2000])) as ArrayRef],
        )
        .unwrap();
        assert!(matches!(
            Table::try_new(batch).unwrap_err(),
            AnalysisError::UnknownColumn(c) if c == COUNTRY
        ));
    }

    #[test]
    fn year_and_country_slices() {
        let t = sample();
        assert_eq!(t.for_year(2000).unwrap().num_rows(), 2);
        assert_eq!(t.for_year_range(2001, 2010).unwrap().num_rows(), 2);
        assert!(t.for_year_range(2010, 2000).is_err());

        let b = t.for_countries(&["B"]).unwrap();
        assert_eq!(b.num_rows(), 2);
        assert_eq!(b.country_names().into_iter().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn with_column_leaves_source_untouched() {
        let t = sample();
        let extra = Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0])) as ArrayRef;
        let t2 = t
            .with_column(Field::new("gdp", DataType::Float64, true), extra.clone())
            .unwrap();
        assert_eq!(t.batch().num_columns(), 4);
        assert_eq!(t2.batch().num_columns(), 5);

        // same name replaces rather than duplicates
        let t3 = t2
            .with_column(Field::new("gdp", DataType::Float64, true), extra)
            .unwrap();
        assert_eq!(t3.batch().num_columns(), 5);
    }

    #[test]
    fn value_of_treats_nan_as_missing() {
        let arr = Float64Array::from(vec![Some(1.0), None, Some(f64::NAN)]);
        assert_eq!(value_of(&arr, 0), Some(1.0));
        assert_eq!(value_of(&arr, 1), None);
        assert_eq!(value_of(&arr, 2), None);
    }
}
