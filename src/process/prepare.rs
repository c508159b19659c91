use crate::ingest::ComponentFile;
use crate::process::key::{
    aggregate_medications, dedup_first, is_medication_file, keyed_batch, DRUG_COLUMN, KEY_COLUMN,
};
use crate::process::optimize::optimize_types;
use anyhow::{Context, Result};
use arrow::{
    array::Array,
    datatypes::{Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, info};

/// A component ready to be joined: keyed, deduplicated, typed and suffixed.
#[derive(Debug, Clone)]
pub struct PreparedComponent {
    pub component: String,
    pub file_name: String,
    pub batch: RecordBatch,
    /// Rows dropped for a missing or invalid key.
    pub dropped_rows: usize,
}

/// Drop every column (other than `keep`) that holds no values at all.
pub fn drop_empty_columns(batch: &RecordBatch, keep: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let kept: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, f)| {
            let col = batch.column(*i);
            f.name() == keep || col.null_count() < col.len()
        })
        .map(|(i, _)| i)
        .collect();

    if kept.len() < schema.fields().len() {
        debug!(
            dropped = schema.fields().len() - kept.len(),
            "dropped empty columns"
        );
    }
    batch.project(&kept).map_err(Into::into)
}

/// Rename every non-key column to `<COLUMN>__<component>`.
pub fn suffix_non_key(batch: &RecordBatch, component: &str) -> Result<RecordBatch> {
    let fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| {
            if f.name() == KEY_COLUMN {
                f.as_ref().clone()
            } else {
                f.as_ref()
                    .clone()
                    .with_name(format!("{}__{}", f.name(), component))
            }
        })
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec())
        .map_err(Into::into)
}

/// Key, clean and type a raw text component for the join.
pub fn prepare_component(file: &ComponentFile, raw: &RecordBatch) -> Result<PreparedComponent> {
    let (keyed, dropped_rows) =
        keyed_batch(raw).with_context(|| format!("{}: preparing key", file.file_name))?;
    let keyed = drop_empty_columns(&keyed, KEY_COLUMN)?;

    let unique = if is_medication_file(&file.file_name)
        && keyed.schema().column_with_name(DRUG_COLUMN).is_some()
    {
        info!(file = %file.file_name, "aggregating {} by {}", DRUG_COLUMN, KEY_COLUMN);
        aggregate_medications(&keyed)?
    } else {
        dedup_first(&keyed)?
    };

    let typed = optimize_types(&unique, &[KEY_COLUMN])
        .with_context(|| format!("{}: optimizing column types", file.file_name))?;
    let batch = suffix_non_key(&typed, &file.component)?;

    Ok(PreparedComponent {
        component: file.component.clone(),
        file_name: file.file_name.clone(),
        batch,
        dropped_rows,
    })
}
