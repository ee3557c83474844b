// src/table/write.rs

use anyhow::{Context, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{fs, fs::File, path::Path};
use tracing::info;

use super::Table;

/// Write `table` as a single-row-group, Snappy-compressed Parquet file.
///
/// The file is written to `<path>.tmp` first and renamed into place, so a
/// reader never observes a partial file. Returns the size on disk.
#[tracing::instrument(level = "info", skip(table, path), fields(path = %path.as_ref().display()))]
pub fn write_parquet<P: AsRef<Path>>(table: &Table, path: P) -> Result<u64> {
    let out_path = path.as_ref();
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {:?}", parent))?;
    }
    let temp_path = out_path.with_extension("tmp");

    let batch = table.batch();
    let file = File::create(&temp_path)
        .with_context(|| format!("creating parquet file {:?}", &temp_path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating Arrow writer")?;
    writer.write(batch).context("writing table batch")?;
    writer.close().context("closing parquet writer")?;

    fs::rename(&temp_path, out_path)
        .with_context(|| format!("renaming {:?} to {:?}", &temp_path, out_path))?;

    let bytes = fs::metadata(out_path)?.len();
    info!(path = %out_path.display(), rows = batch.num_rows(), bytes, "wrote parquet");
    Ok(bytes)
}
