use anyhow::{Context, Result};
use arrow::{
    array::ArrayRef,
    compute::cast,
    csv::{Writer, WriterBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::ArrowWriter,
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};
use tracing::debug;

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write one batch as a Brotli-compressed Parquet file; returns bytes on disk.
pub fn write_parquet(batch: &RecordBatch, output_path: &Path) -> Result<u64> {
    let file = File::create(output_path)
        .with_context(|| format!("creating file {}", output_path.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;

    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    let metadata = fs::metadata(output_path).context("getting file metadata")?;
    debug!(
        path = %output_path.display(),
        bytes = metadata.len(),
        rows = batch.num_rows(),
        "wrote parquet"
    );
    Ok(metadata.len())
}

/// Replace dictionary columns with their plain values so every writer
/// sees the category labels rather than the codes.
pub fn decode_dictionaries(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    if !schema
        .fields()
        .iter()
        .any(|f| matches!(f.data_type(), DataType::Dictionary(_, _)))
    {
        return Ok(batch.clone());
    }

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut cols: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (fld, col) in schema.fields().iter().zip(batch.columns()) {
        match fld.data_type() {
            DataType::Dictionary(_, value_type) => {
                cols.push(cast(col.as_ref(), value_type)?);
                fields.push(Field::new(
                    fld.name(),
                    value_type.as_ref().clone(),
                    fld.is_nullable(),
                ));
            }
            _ => {
                cols.push(col.clone());
                fields.push(fld.as_ref().clone());
            }
        }
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).map_err(Into::into)
}

/// Comma-delimited writer with a header row, no index column.
pub fn csv_writer<W: Write>(sink: W) -> Writer<W> {
    WriterBuilder::new().with_header(true).build(sink)
}

/// Write one batch to a CSV file.
pub fn write_csv(batch: &RecordBatch, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("creating file {}", output_path.display()))?;
    let mut writer = csv_writer(BufWriter::new(file));
    writer
        .write(&decode_dictionaries(batch)?)
        .with_context(|| format!("writing CSV {}", output_path.display()))?;
    writer
        .into_inner()
        .flush()
        .with_context(|| format!("flushing {}", output_path.display()))?;
    debug!(path = %output_path.display(), rows = batch.num_rows(), "wrote csv");
    Ok(())
}
