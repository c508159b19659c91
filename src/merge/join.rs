use crate::ingest::{read_component, ComponentFile};
use crate::merge::report::MergeReport;
use crate::output::write_parquet;
use crate::process::{
    key::{key_array, KEY_COLUMN},
    prepare_component,
};
use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, UInt32Array},
    compute::take,
    datatypes::{Field, Schema},
    record_batch::RecordBatch,
};
use std::{collections::HashMap, path::Path, sync::Arc};
use tracing::{info, warn};

/// Left-join `right` onto `acc` by key.
///
/// Every row of `acc` is kept, in order; `right` must be unique by key so the
/// row count never changes. Participants missing from `right` get nulls.
pub fn left_join(acc: &RecordBatch, right: &RecordBatch) -> Result<RecordBatch> {
    let acc_schema = acc.schema();
    let right_schema = right.schema();

    for fld in right_schema.fields() {
        if fld.name() != KEY_COLUMN && acc_schema.column_with_name(fld.name()).is_some() {
            bail!("column {} is already present in the merged data", fld.name());
        }
    }

    let right_keys = key_array(right)?;
    let mut lookup: HashMap<i64, u32> = HashMap::with_capacity(right_keys.len());
    for (row, k) in right_keys.values().iter().enumerate() {
        if lookup.insert(*k, row as u32).is_some() {
            bail!("right side is not unique by {} (key {})", KEY_COLUMN, k);
        }
    }

    let indices: UInt32Array = key_array(acc)?
        .values()
        .iter()
        .map(|k| lookup.get(k).copied())
        .collect();

    let mut fields: Vec<Field> = acc_schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut cols: Vec<ArrayRef> = acc.columns().to_vec();
    for (fld, col) in right_schema.fields().iter().zip(right.columns()) {
        if fld.name() == KEY_COLUMN {
            continue;
        }
        cols.push(take(col.as_ref(), &indices, None)?);
        fields.push(fld.as_ref().clone().with_nullable(true));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).map_err(Into::into)
}

/// Fold every component into one wide table with left joins on the key.
///
/// Components that cannot be read, prepared or joined are skipped with a
/// warning and a `skipped` report row. The accumulator is checkpointed to
/// `checkpoint` after each component.
pub fn join_components(
    files: &[ComponentFile],
    checkpoint: &Path,
    report: &mut MergeReport,
) -> Result<RecordBatch> {
    let mut acc: Option<RecordBatch> = None;

    for (i, f) in files.iter().enumerate() {
        info!(
            "[{}/{}] reading {} as component '{}'",
            i + 1,
            files.len(),
            f.file_name,
            f.component
        );
        let prepared = match read_component(f).and_then(|raw| prepare_component(f, &raw)) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping {}: {:#}", f.file_name, e);
                report.skipped(f, &e);
                continue;
            }
        };
        if prepared.dropped_rows > 0 {
            warn!(
                file = %f.file_name,
                rows = prepared.dropped_rows,
                "rows without a usable {} were dropped",
                KEY_COLUMN
            );
        }

        let next = match &acc {
            None => prepared.batch.clone(),
            Some(current) => {
                info!(
                    "merging '{}' into accumulator ({} cols)",
                    prepared.component,
                    current.num_columns()
                );
                match left_join(current, &prepared.batch) {
                    Ok(joined) => joined,
                    Err(e) => {
                        let e = e.context(format!("joining {}", f.file_name));
                        warn!("skipping {}: {:#}", f.file_name, e);
                        report.skipped(f, &e);
                        continue;
                    }
                }
            }
        };
        report.merged(f, &prepared.batch);

        write_parquet(&next, checkpoint)
            .with_context(|| format!("checkpointing to {}", checkpoint.display()))?;
        info!(
            "accumulator now: {} rows x {} cols",
            next.num_rows(),
            next.num_columns()
        );
        acc = Some(next);
    }

    acc.ok_or_else(|| anyhow!("no data merged"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::discover_components;
    use arrow::{
        array::{Array, Int64Array, StringArray},
        datatypes::DataType,
    };
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn keyed(keys: Vec<i64>, name: &str, values: Vec<Option<&str>>) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new(KEY_COLUMN, DataType::Int64, false),
            Field::new(name, DataType::Utf8, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(keys)) as ArrayRef,
                Arc::new(StringArray::from(values)) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn left_join_keeps_left_rows_in_order() -> Result<()> {
        let left = keyed(vec![3, 1, 2], "A__demo", vec![Some("x"), Some("y"), Some("z")]);
        let right = keyed(vec![2, 3, 9], "B__labs", vec![Some("b2"), Some("b3"), Some("b9")]);

        let out = left_join(&left, &right)?;
        assert_eq!(out.num_rows(), 3);
        assert_eq!(key_array(&out)?.values().to_vec(), vec![3, 1, 2]);
        let b = out
            .column_by_name("B__labs")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(b.value(0), "b3");
        assert!(b.is_null(1));
        assert_eq!(b.value(2), "b2");
        Ok(())
    }

    #[test]
    fn colliding_columns_are_rejected() {
        let left = keyed(vec![1], "A__demo", vec![Some("x")]);
        let right = keyed(vec![1], "A__demo", vec![Some("y")]);
        assert!(left_join(&left, &right).is_err());
    }

    #[test]
    fn non_unique_right_side_is_rejected() {
        let left = keyed(vec![1], "A__demo", vec![Some("x")]);
        let right = keyed(vec![1, 1], "B__labs", vec![Some("y"), Some("z")]);
        assert!(left_join(&left, &right).is_err());
    }

    fn checkpoint_columns(path: &Path) -> Result<(usize, Vec<String>)> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
        let names = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        let rows = builder
            .build()?
            .map(|b| b.map(|b| b.num_rows()))
            .sum::<Result<usize, _>>()?;
        Ok((rows, names))
    }

    #[test]
    fn checkpoint_tracks_the_accumulator() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("demographics_clean.csv"),
            "SEQN,RIAGENDR\n1,1\n2,2\n",
        )?;
        fs::write(dir.path().join("labs_clean.csv"), "SEQN,LBXGLU\n2,101\n")?;
        let files = discover_components(dir.path())?;
        let checkpoint = dir.path().join("nhanes_tmp.parquet");

        join_components(&files[..1], &checkpoint, &mut MergeReport::default())?;
        let (rows, names) = checkpoint_columns(&checkpoint)?;
        assert_eq!(rows, 2);
        assert_eq!(names, vec!["SEQN", "RIAGENDR__demographics"]);

        let merged = join_components(&files, &checkpoint, &mut MergeReport::default())?;
        let (rows, names) = checkpoint_columns(&checkpoint)?;
        assert_eq!(rows, merged.num_rows());
        assert_eq!(names, vec!["SEQN", "RIAGENDR__demographics", "LBXGLU__labs"]);
        Ok(())
    }
}
