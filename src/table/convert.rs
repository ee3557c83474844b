// src/table/convert.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Builder, Int64Builder, StringArray},
    datatypes::{DataType, Field, FieldRef, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::debug;

use super::{COUNTRY, YEAR};

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a cleaned cell as a number; empty cells are missing.
pub fn parse_number(raw: &str) -> Option<f64> {
    let c = clean_str(raw);
    if c.is_empty() {
        return None;
    }
    c.parse::<f64>().ok()
}

/// Parse a year cell. Accepts `2000` as well as `2000.0`.
pub fn parse_year(raw: &str) -> Option<i64> {
    let c = clean_str(raw);
    if let Ok(y) = c.parse::<i64>() {
        return Some(y);
    }
    let f = c.parse::<f64>().ok()?;
    (f.fract() == 0.0 && f.is_finite()).then_some(f as i64)
}

/// Decide the final type of a string column from its cells:
/// - `country` stays Utf8, `year` becomes Int64
/// - anything whose non-empty cells all parse as numbers becomes Float64
/// - everything else stays Utf8
pub fn infer_column_type(name: &str, column: &StringArray) -> DataType {
    if name == COUNTRY {
        return DataType::Utf8;
    }
    if name == YEAR {
        return DataType::Int64;
    }
    let numeric = column
        .iter()
        .flatten()
        .map(clean_str)
        .filter(|c| !c.is_empty())
        .all(|c| c.parse::<f64>().is_ok());
    if numeric {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// Convert an all-Utf8 batch (as read from CSV) into its final types.
pub fn convert_to_final_types(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut fields: Vec<FieldRef> = Vec::with_capacity(batch.num_columns());
    let mut out: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (arr, fld) in batch.columns().iter().zip(batch.schema().fields()) {
        let sarr = arr
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| anyhow!("column {} was expected to be Utf8", fld.name()))?;

        let ty = infer_column_type(fld.name(), sarr);
        debug!(column = %fld.name(), ty = ?ty, "resolved column type");

        let col: ArrayRef = match ty {
            DataType::Int64 => {
                let mut b = Int64Builder::with_capacity(sarr.len());
                for opt in sarr.iter() {
                    b.append_option(opt.and_then(parse_year));
                }
                Arc::new(b.finish())
            }
            DataType::Float64 => {
                let mut b = Float64Builder::with_capacity(sarr.len());
                for opt in sarr.iter() {
                    b.append_option(opt.and_then(parse_number));
                }
                Arc::new(b.finish())
            }
            _ => {
                let cleaned: StringArray = sarr
                    .iter()
                    .map(|opt| opt.map(clean_str).filter(|s| !s.is_empty()))
                    .collect();
                Arc::new(cleaned)
            }
        };

        let nullable = !(fld.name() == COUNTRY || fld.name() == YEAR) || col.null_count() > 0;
        fields.push(Arc::new(Field::new(fld.name(), ty, nullable)));
        out.push(col);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), out).context("building typed RecordBatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};

    #[test]
    fn clean_str_strips_quotes_and_space() {
        assert_eq!(clean_str("  \"Chad\" "), "Chad");
        assert_eq!(clean_str("1.5"), "1.5");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn parse_year_accepts_float_years() {
        assert_eq!(parse_year("2001"), Some(2001));
        assert_eq!(parse_year("2001.0"), Some(2001));
        assert_eq!(parse_year("2001.5"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn converts_metrics_and_keeps_text() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("year", DataType::Utf8, true),
            Field::new("iso_code", DataType::Utf8, true),
            Field::new("co2", DataType::Utf8, true),
            Field::new("empty", DataType::Utf8, true),
        ]));
        let cols: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("A"), Some("B")])),
            Arc::new(StringArray::from(vec![Some("2000"), Some("2001")])),
            Arc::new(StringArray::from(vec![Some("AAA"), None])),
            Arc::new(StringArray::from(vec![Some(" 1.5"), Some("")])),
            Arc::new(StringArray::from(vec![None::<&str>, None])),
        ];
        let batch = RecordBatch::try_new(schema, cols)?;
        let typed = convert_to_final_types(&batch)?;

        let s = typed.schema();
        assert_eq!(s.field(0).data_type(), &DataType::Utf8);
        assert_eq!(s.field(1).data_type(), &DataType::Int64);
        assert_eq!(s.field(2).data_type(), &DataType::Utf8);
        assert_eq!(s.field(3).data_type(), &DataType::Float64);
        assert_eq!(s.field(4).data_type(), &DataType::Float64);

        let years = typed.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(years.value(1), 2001);
        let co2 = typed.column(3).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(co2.value(0), 1.5);
        assert!(co2.is_null(1));
        Ok(())
    }
}
