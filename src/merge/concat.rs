use crate::ingest::{read_component, ComponentFile};
use crate::merge::report::MergeReport;
use crate::process::optimize::optimize_types;
use anyhow::{anyhow, bail, Context, Result};
use arrow::{compute::concat_batches, record_batch::RecordBatch};
use std::collections::BTreeSet;
use tracing::info;

/// Reorder `batch` to the column order of `names`.
///
/// The column sets must match exactly; anything missing or extra is an error
/// naming the offending columns.
fn align_to(batch: &RecordBatch, names: &[String], file_name: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let want: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let have: BTreeSet<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    if want != have {
        let missing: Vec<&str> = want.difference(&have).copied().collect();
        let extra: Vec<&str> = have.difference(&want).copied().collect();
        bail!(
            "{}: columns do not match the first file (missing {:?}, unexpected {:?})",
            file_name,
            missing,
            extra
        );
    }

    let order = names
        .iter()
        .map(|n| schema.index_of(n))
        .collect::<Result<Vec<usize>, _>>()?;
    batch.project(&order).map_err(Into::into)
}

/// Read `file` and align it to the columns seen so far, if any.
fn read_aligned(file: &ComponentFile, names: Option<&[String]>) -> Result<RecordBatch> {
    let raw = read_component(file)?;
    match names {
        Some(n) => align_to(&raw, n, &file.file_name),
        None => Ok(raw),
    }
}

/// Mark every file skipped after an aborted run; `failed` carries the cause.
fn record_abort(files: &[ComponentFile], failed: &str, err: &anyhow::Error, report: &mut MergeReport) {
    for f in files {
        if f.file_name == failed {
            report.skipped(f, err);
        } else {
            report.skipped(f, &anyhow!("not merged: concatenation aborted at {}", failed));
        }
    }
}

/// Stack every component's rows, in discovery order, into one table.
///
/// Every file must read cleanly and share the first file's columns; the
/// output row count is the sum of the input row counts. Column types are
/// inferred once over the combined rows. Files are only reported `merged`
/// once the whole table is built.
pub fn concat_components(files: &[ComponentFile], report: &mut MergeReport) -> Result<RecordBatch> {
    let mut parts: Vec<RecordBatch> = Vec::with_capacity(files.len());
    let mut names: Option<Vec<String>> = None;

    for (i, f) in files.iter().enumerate() {
        info!("[{}/{}] reading {}", i + 1, files.len(), f.file_name);
        let part = match read_aligned(f, names.as_deref()) {
            Ok(p) => p,
            Err(e) => {
                record_abort(files, &f.file_name, &e, report);
                return Err(e);
            }
        };
        if names.is_none() {
            names = Some(
                part.schema()
                    .fields()
                    .iter()
                    .map(|fld| fld.name().to_string())
                    .collect(),
            );
        }
        parts.push(part);
    }

    let first = parts.first().ok_or_else(|| anyhow!("no data merged"))?;
    let schema = first.schema();
    let combined = concat_batches(&schema, &parts)
        .context("concatenating components")
        .and_then(|c| optimize_types(&c, &[]).context("optimizing column types"));
    let combined = match combined {
        Ok(c) => c,
        Err(e) => {
            for f in files {
                report.skipped(f, &e);
            }
            return Err(e);
        }
    };

    for (f, part) in files.iter().zip(&parts) {
        report.merged(f, part);
    }
    info!(
        "concatenated {} files: {} rows x {} cols",
        parts.len(),
        combined.num_rows(),
        combined.num_columns()
    );
    Ok(combined)
}
