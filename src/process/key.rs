use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, Int64Array, StringArray, UInt32Array},
    compute::{filter_record_batch, take},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use tracing::{debug, warn};

/// NHANES respondent sequence number; the participant key.
pub const KEY_COLUMN: &str = "SEQN";
/// Drug name column in the prescription-medication component.
pub const DRUG_COLUMN: &str = "RXDDRUG";

/// Parse a key cell. Integral floats (`73557.0`, from spreadsheets) are accepted.
pub fn parse_key(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        let f = s.parse::<f64>().ok()?;
        (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
    })
}

/// Gather `indices` from every column of `batch`.
pub fn take_rows(batch: &RecordBatch, indices: &UInt32Array) -> Result<RecordBatch> {
    let cols = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), indices, None))
        .collect::<Result<Vec<ArrayRef>, _>>()?;
    RecordBatch::try_new(batch.schema(), cols).map_err(Into::into)
}

/// Borrow the Int64 key column of a keyed batch.
pub fn key_array(batch: &RecordBatch) -> Result<&Int64Array> {
    batch
        .column_by_name(KEY_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("batch has no Int64 {} column", KEY_COLUMN))
}

/// Turn the text `SEQN` column into a non-null Int64 key at index 0.
///
/// Rows whose key is missing or unparseable are dropped, and the number
/// dropped is returned so it can be reported.
pub fn keyed_batch(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let schema = batch.schema();
    let key_idx = match schema.index_of(KEY_COLUMN) {
        Ok(i) => i,
        Err(_) => bail!("no {} column found", KEY_COLUMN),
    };
    let raw = batch
        .column(key_idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("{} column is not text", KEY_COLUMN))?;

    let keys: Int64Array = raw.iter().map(|v| v.and_then(parse_key)).collect();
    let invalid = keys.null_count();

    let mut fields = vec![Field::new(KEY_COLUMN, DataType::Int64, false)];
    let mut cols: Vec<ArrayRef> = vec![Arc::new(keys.clone())];
    for (i, (fld, col)) in schema.fields().iter().zip(batch.columns()).enumerate() {
        if i == key_idx {
            continue;
        }
        fields.push(fld.as_ref().clone());
        cols.push(col.clone());
    }

    if invalid == 0 {
        let out = RecordBatch::try_new(Arc::new(Schema::new(fields)), cols)?;
        return Ok((out, 0));
    }

    warn!(rows = invalid, "dropping rows with a missing or invalid {}", KEY_COLUMN);
    let keep: BooleanArray = keys.iter().map(|k| Some(k.is_some())).collect();
    // Filter while the key is still nullable, then tighten the field.
    let mut loose = fields.clone();
    loose[0] = Field::new(KEY_COLUMN, DataType::Int64, true);
    let loose = RecordBatch::try_new(Arc::new(Schema::new(loose)), cols)?;
    let filtered = filter_record_batch(&loose, &keep).context("filtering invalid keys")?;
    let out = RecordBatch::try_new(Arc::new(Schema::new(fields)), filtered.columns().to_vec())?;
    Ok((out, invalid))
}

/// Keep the first row per key.
///
/// Components without duplicates are returned untouched. Otherwise rows are
/// stable-sorted by key so "first" means first in file order.
pub fn dedup_first(batch: &RecordBatch) -> Result<RecordBatch> {
    let keys = key_array(batch)?;
    let mut seen = HashSet::with_capacity(keys.len());
    if keys.values().iter().all(|k| seen.insert(*k)) {
        return Ok(batch.clone());
    }

    let mut order: Vec<u32> = (0..keys.len() as u32).collect();
    order.sort_by_key(|&i| keys.value(i as usize));
    let mut last: Option<i64> = None;
    let kept: Vec<u32> = order
        .into_iter()
        .filter(|&i| {
            let k = keys.value(i as usize);
            let fresh = last != Some(k);
            last = Some(k);
            fresh
        })
        .collect();

    debug!(
        before = keys.len(),
        after = kept.len(),
        "deduplicated by {}",
        KEY_COLUMN
    );
    take_rows(batch, &UInt32Array::from(kept))
}

/// Medication files list one row per (participant, drug).
pub fn is_medication_file(file_name: &str) -> bool {
    let lname = file_name.to_lowercase();
    lname.contains("medication") || lname.contains("rxq") || lname.contains("rx_")
}

/// Collapse a keyed medication batch to one row per participant:
/// `(SEQN, RXDDRUG)` with drug names joined by `", "` in file order.
/// Rows without a drug name are dropped; output is in ascending key order.
pub fn aggregate_medications(batch: &RecordBatch) -> Result<RecordBatch> {
    let keys = key_array(batch)?;
    let drugs = batch
        .column_by_name(DRUG_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("no text {} column", DRUG_COLUMN))?;

    let mut grouped: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
    for (k, drug) in keys.values().iter().zip(drugs.iter()) {
        if let Some(d) = drug {
            grouped.entry(*k).or_default().push(d);
        }
    }

    let out_keys: Int64Array = grouped.keys().copied().collect::<Vec<_>>().into();
    let out_drugs: StringArray = grouped
        .values()
        .map(|ds| Some(ds.join(", ")))
        .collect();

    let schema = Schema::new(vec![
        Field::new(KEY_COLUMN, DataType::Int64, false),
        Field::new(DRUG_COLUMN, DataType::Utf8, true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(out_keys) as ArrayRef, Arc::new(out_drugs) as ArrayRef],
    )
    .map_err(Into::into)
}
