// src/table/load.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, BooleanArray, StringArray},
    compute::{concat_batches, filter_record_batch},
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    sync::Arc,
};
use tracing::{debug, info, warn};

use super::{convert::convert_to_final_types, Table, COUNTRY, YEAR};

/// Column carrying ISO 3166 alpha-3 codes; empty for aggregate regions.
pub const ISO_CODE: &str = "iso_code";

/// OWID uses `OWID_*` codes for aggregates ("World", income groups, ...),
/// except for Kosovo which has no ISO code of its own.
const OWID_AGGREGATE_PREFIX: &str = "OWID_";
const OWID_COUNTRY_CODES: &[&str] = &["OWID_KOS"];

/// How the raw CSV is turned into a `Table`.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Drop aggregate / region rows (see `ISO_CODE`).
    pub countries_only: bool,
    /// Country names dropped regardless of their ISO code.
    pub excluded_countries: Vec<String>,
    /// Rows per CSV record batch while reading.
    pub batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            countries_only: true,
            excluded_countries: Vec::new(),
            batch_size: 64 * 1024,
        }
    }
}

/// Read the CSV at `path` into a `Table`.
#[tracing::instrument(level = "info", skip(path, opts), fields(path = %path.as_ref().display()))]
pub fn load_csv<P: AsRef<Path>>(path: P, opts: &LoadOptions) -> Result<Table> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path.as_ref()))?;
    read_csv(BufReader::new(file), opts)
        .with_context(|| format!("Failed to load {:?}", path.as_ref()))
}

/// Read CSV text from any seekable reader into a `Table`.
///
/// Every column is first read as Utf8, then converted: `year` to Int64,
/// all-numeric columns to Float64, the rest stays text.
pub fn read_csv<R: Read + Seek>(mut reader: R, opts: &LoadOptions) -> Result<Table> {
    // 1) header names only; types are decided after the full read
    let (header, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut reader, Some(1))
        .context("reading CSV header")?;
    reader.rewind().context("rewinding CSV reader")?;

    for required in [COUNTRY, YEAR] {
        if header.index_of(required).is_err() {
            bail!("CSV is missing required column `{}`", required);
        }
    }

    let read_schema = make_read_schema(&header);

    // 2) read everything as text
    let csv_reader = ReaderBuilder::new(read_schema.clone())
        .with_header(true)
        .with_batch_size(opts.batch_size.max(1))
        .build(reader)
        .context("creating CSV reader")?;
    let batches = csv_reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("parsing CSV records")?;
    let raw = concat_batches(&read_schema, &batches).context("concatenating CSV batches")?;
    debug!(rows = raw.num_rows(), columns = raw.num_columns(), "read raw CSV");

    // 3) final types, then drop unusable / excluded rows
    let typed = convert_to_final_types(&raw)?;
    let kept = filter_rows(&typed, opts)?;
    info!(
        rows = kept.num_rows(),
        dropped = typed.num_rows() - kept.num_rows(),
        "loaded table"
    );

    Table::try_new(kept).map_err(Into::into)
}

/// All fields as nullable Utf8, names taken from the header.
fn make_read_schema(header: &Schema) -> Arc<Schema> {
    let fields: Vec<Field> = header
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Keep rows with a country and a year that pass the region filters.
fn filter_rows(batch: &RecordBatch, opts: &LoadOptions) -> Result<RecordBatch> {
    let countries = string_column(batch, COUNTRY)?;
    let years = batch
        .column_by_name(YEAR)
        .context("typed batch has no year column")?;

    let iso = if opts.countries_only {
        match batch.column_by_name(ISO_CODE) {
            Some(c) => c.as_any().downcast_ref::<StringArray>(),
            None => {
                warn!("no `{}` column; keeping aggregate rows", ISO_CODE);
                None
            }
        }
    } else {
        None
    };

    let excluded: HashSet<&str> = opts.excluded_countries.iter().map(String::as_str).collect();

    let mask: BooleanArray = (0..batch.num_rows())
        .map(|row| {
            if countries.is_null(row) || years.is_null(row) {
                return Some(false);
            }
            if excluded.contains(countries.value(row)) {
                return Some(false);
            }
            if let Some(iso) = iso {
                if iso.is_null(row) || !is_country_code(iso.value(row)) {
                    return Some(false);
                }
            }
            Some(true)
        })
        .collect();

    filter_record_batch(batch, &mask).context("filtering rows")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .with_context(|| format!("column `{}` is not text", name))
}

fn is_country_code(code: &str) -> bool {
    !code.is_empty()
        && (!code.starts_with(OWID_AGGREGATE_PREFIX) || OWID_COUNTRY_CODES.contains(&code))
}
