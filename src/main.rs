use anyhow::Result;
use nhanes_prep::{config::MergeConfig, merge};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) configuration (.env + environment) ───────────────────────
    let cfg = MergeConfig::from_env()?;
    info!(
        input = %cfg.input_dir.display(),
        output = %cfg.output.base.display(),
        csv = cfg.make_csv,
        mode = %cfg.mode,
        "configured"
    );

    // ─── 3) discover, combine, write ─────────────────────────────────
    let summary = merge::run_merge(&cfg)?;
    info!(
        rows = summary.rows,
        cols = summary.cols,
        skipped = summary.skipped_files,
        "all done"
    );
    Ok(())
}
