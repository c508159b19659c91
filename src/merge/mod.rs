pub mod concat;
pub mod join;
pub mod report;

use crate::config::{MergeConfig, MergeMode};
use crate::ingest::discover_components;
use crate::output::{ensure_parent_dir, write_csv, write_parquet};
use anyhow::{Context, Result};
use self::report::{MergeReport, Status};
use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// What a merge run produced.
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub rows: usize,
    pub cols: usize,
    pub merged_files: usize,
    pub skipped_files: usize,
    pub written: Vec<PathBuf>,
}

/// Discover, combine and write the merged dataset described by `cfg`.
pub fn run_merge(cfg: &MergeConfig) -> Result<MergeSummary> {
    let files = discover_components(&cfg.input_dir)?;
    info!(
        files = files.len(),
        mode = %cfg.mode,
        input = %cfg.input_dir.display(),
        "discovered components"
    );

    let out = &cfg.output;
    ensure_parent_dir(&out.base)?;

    let mut report = MergeReport::default();
    let merged = match cfg.mode {
        MergeMode::Join => join::join_components(&files, &out.checkpoint, &mut report),
        MergeMode::Concat => concat::concat_components(&files, &mut report),
    };
    // The report is most useful exactly when the merge fails.
    if let Err(e) = report.write(&out.report) {
        warn!("could not write merge report {}: {:#}", out.report.display(), e);
    }
    let merged = merged?;

    let mut written = Vec::new();
    write_parquet(&merged, &out.parquet)
        .with_context(|| format!("writing {}", out.parquet.display()))?;
    written.push(out.parquet.clone());

    if cfg.make_csv {
        write_csv(&merged, &out.csv).with_context(|| format!("writing {}", out.csv.display()))?;
        written.push(out.csv.clone());
    }
    written.push(out.report.clone());

    if out.checkpoint.exists() {
        if let Err(e) = fs::remove_file(&out.checkpoint) {
            warn!("failed to delete {}: {}", out.checkpoint.display(), e);
        }
    }

    let summary = MergeSummary {
        rows: merged.num_rows(),
        cols: merged.num_columns(),
        merged_files: report.count(Status::Merged),
        skipped_files: report.count(Status::Skipped),
        written,
    };
    info!(
        "done. final shape: {} rows x {} cols ({} merged, {} skipped)",
        summary.rows, summary.cols, summary.merged_files, summary.skipped_files
    );
    for p in &summary.written {
        info!("wrote {}", p.display());
    }
    Ok(summary)
}
