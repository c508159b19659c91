use anyhow::Result;
use nhanes_prep::{config::ConvertConfig, convert::parquet_to_csv};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cfg = ConvertConfig::from_env()?;
    let rows = parquet_to_csv(&cfg.output.parquet, &cfg.output.csv)?;
    info!(rows, csv = %cfg.output.csv.display(), "done");
    Ok(())
}
