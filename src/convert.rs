use crate::output::{csv_writer, decode_dictionaries, ensure_parent_dir};
use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{debug, info};

const READ_BATCH_ROWS: usize = 8192;

/// Stream a Parquet file into CSV, one record batch at a time.
///
/// The header row comes from the Parquet schema; nulls become empty fields and
/// categorical columns are written as their labels. Returns the row count.
pub fn parquet_to_csv(parquet_path: &Path, csv_path: &Path) -> Result<u64> {
    info!("reading {}", parquet_path.display());
    let file = File::open(parquet_path)
        .with_context(|| format!("opening {}", parquet_path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata from {}", parquet_path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(READ_BATCH_ROWS)
        .build()
        .context("building parquet reader")?;

    ensure_parent_dir(csv_path)?;
    let out = File::create(csv_path)
        .with_context(|| format!("creating file {}", csv_path.display()))?;
    let mut writer = csv_writer(BufWriter::new(out));

    info!("saving to CSV {}", csv_path.display());
    let mut rows = 0u64;
    let mut wrote_any = false;
    for batch in reader {
        let batch = batch.context("reading parquet batch")?;
        writer
            .write(&decode_dictionaries(&batch)?)
            .context("writing CSV batch")?;
        rows += batch.num_rows() as u64;
        wrote_any = true;
        debug!(rows, "converted batch");
    }

    // A file with no row groups yields no batches; still emit its header.
    if !wrote_any {
        writer
            .write(&decode_dictionaries(&RecordBatch::new_empty(schema))?)
            .context("writing CSV header")?;
    }
    writer
        .into_inner()
        .flush()
        .with_context(|| format!("flushing {}", csv_path.display()))?;

    info!(rows, "done");
    Ok(rows)
}
