use anyhow::{anyhow, bail, Result};
use std::{env, fmt, path::PathBuf, str::FromStr};
use tracing::debug;

pub const INPUT_DIR_VAR: &str = "NHANES_INPUT_DIR";
pub const OUTPUT_DIR_VAR: &str = "NHANES_OUTPUT_DIR";
pub const MAKE_CSV_VAR: &str = "NHANES_MAKE_CSV";
pub const MERGE_MODE_VAR: &str = "NHANES_MERGE_MODE";

/// How component files are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Left-join components on SEQN into one wide row per participant.
    #[default]
    Join,
    /// Stack same-schema files row-wise.
    Concat,
}

impl FromStr for MergeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" => Ok(MergeMode::Join),
            "concat" => Ok(MergeMode::Concat),
            other => bail!("{} must be 'join' or 'concat', got '{}'", MERGE_MODE_VAR, other),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMode::Join => f.write_str("join"),
            MergeMode::Concat => f.write_str("concat"),
        }
    }
}

/// Every file derived from the configured output base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub base: PathBuf,
    pub parquet: PathBuf,
    pub csv: PathBuf,
    pub checkpoint: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    /// `base` has no extension; an existing one is replaced, not appended to.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            parquet: base.with_extension("parquet"),
            csv: base.with_extension("csv"),
            checkpoint: base.with_file_name(format!("{}_tmp.parquet", name)),
            report: base.with_file_name(format!("{}_merge_report.csv", name)),
            base,
        }
    }
}

/// `1/0`, `true/false`, `yes/no`, `on/off`, case-insensitive.
pub fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean (0/1), got '{}'", name, other),
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{} is not set (checked the environment and .env)", name))
}

/// Load `.env` from the working directory (or a parent) into the process
/// environment. Variables already set win.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) => debug!("no .env loaded: {}", e),
    }
}

/// Settings for the merge binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    pub input_dir: PathBuf,
    pub output: OutputPaths,
    pub make_csv: bool,
    pub mode: MergeMode,
}

impl MergeConfig {
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input_dir = PathBuf::from(required(&lookup, INPUT_DIR_VAR)?);
        let output = OutputPaths::new(required(&lookup, OUTPUT_DIR_VAR)?);
        let make_csv = match lookup(MAKE_CSV_VAR) {
            Some(raw) => parse_flag(MAKE_CSV_VAR, &raw)?,
            None => false,
        };
        let mode = match lookup(MERGE_MODE_VAR) {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => MergeMode::default(),
        };
        Ok(Self {
            input_dir,
            output,
            make_csv,
            mode,
        })
    }
}

/// Settings for the Parquet → CSV converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertConfig {
    pub output: OutputPaths,
}

impl ConvertConfig {
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            output: OutputPaths::new(required(&lookup, OUTPUT_DIR_VAR)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn output_paths_derive_from_base() {
        let p = OutputPaths::new("/data/nhanes_1999_2018");
        assert_eq!(p.parquet, PathBuf::from("/data/nhanes_1999_2018.parquet"));
        assert_eq!(p.csv, PathBuf::from("/data/nhanes_1999_2018.csv"));
        assert_eq!(p.checkpoint, PathBuf::from("/data/nhanes_1999_2018_tmp.parquet"));
        assert_eq!(
            p.report,
            PathBuf::from("/data/nhanes_1999_2018_merge_report.csv")
        );
    }

    #[test]
    fn merge_config_defaults() -> Result<()> {
        let cfg = MergeConfig::from_lookup(vars(&[
            (INPUT_DIR_VAR, "/in"),
            (OUTPUT_DIR_VAR, "/out/nhanes"),
        ]))?;
        assert_eq!(cfg.input_dir, PathBuf::from("/in"));
        assert!(!cfg.make_csv);
        assert_eq!(cfg.mode, MergeMode::Join);
        Ok(())
    }

    #[test]
    fn merge_config_reads_flag_and_mode() -> Result<()> {
        let cfg = MergeConfig::from_lookup(vars(&[
            (INPUT_DIR_VAR, "/in"),
            (OUTPUT_DIR_VAR, "/out/nhanes"),
            (MAKE_CSV_VAR, "1"),
            (MERGE_MODE_VAR, "Concat"),
        ]))?;
        assert!(cfg.make_csv);
        assert_eq!(cfg.mode, MergeMode::Concat);
        Ok(())
    }

    #[test]
    fn missing_or_invalid_values_are_errors() {
        let err = MergeConfig::from_lookup(vars(&[(OUTPUT_DIR_VAR, "/out")])).unwrap_err();
        assert!(err.to_string().contains(INPUT_DIR_VAR));

        assert!(MergeConfig::from_lookup(vars(&[
            (INPUT_DIR_VAR, "/in"),
            (OUTPUT_DIR_VAR, "/out"),
            (MAKE_CSV_VAR, "maybe"),
        ]))
        .is_err());

        assert!(ConvertConfig::from_lookup(vars(&[(OUTPUT_DIR_VAR, "  ")])).is_err());
    }

    #[test]
    fn flags() -> Result<()> {
        assert!(parse_flag("X", "TRUE")?);
        assert!(parse_flag("X", " on ")?);
        assert!(!parse_flag("X", "0")?);
        assert!(parse_flag("X", "2").is_err());
        Ok(())
    }
}
