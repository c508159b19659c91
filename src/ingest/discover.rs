use anyhow::{bail, Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-name prefixes that are documentation or scratch files, never components.
const EXCLUDE_PREFIXES: &[&str] = &[
    "dictionary_",
    "nhanes_inconsistencies_documentation",
    "example_",
    "m -",
    "w -",
    "~$",
];

const PATTERNS: &[&str] = &["*_clean.csv", "*_clean.xlsx", "*_clean.xls"];

/// On-disk format of a component file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileKind::Csv),
            "xlsx" => Some(FileKind::Xlsx),
            "xls" => Some(FileKind::Xls),
            _ => None,
        }
    }
}

/// One discovered input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFile {
    pub path: PathBuf,
    pub file_name: String,
    pub component: String,
    pub kind: FileKind,
}

pub fn is_excluded(name: &str) -> bool {
    let lname = name.to_lowercase();
    EXCLUDE_PREFIXES.iter().any(|p| lname.starts_with(p))
}

/// `Demographics_Clean` → `demographics`, `Lab  Panel_unclean` → `lab_panel`.
pub fn component_from_stem(stem: &str) -> String {
    let suffix = Regex::new(r"_(un)?clean$").unwrap();
    let spaces = Regex::new(r"\s+").unwrap();

    let lower = stem.to_lowercase();
    let stripped = suffix.replace(&lower, "");
    spaces.replace_all(stripped.trim(), "_").into_owned()
}

/// Scan `dir` (non-recursive) for `*_clean.{csv,xlsx,xls}` components.
///
/// Demographics sorts first so it anchors the participant set; everything else
/// follows by lowercased file name.
pub fn discover_components(dir: &Path) -> Result<Vec<ComponentFile>> {
    if !dir.is_dir() {
        bail!("input folder not found: {}", dir.display());
    }

    let opts = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let base = Pattern::escape(&dir.to_string_lossy());

    let mut files = Vec::new();
    for patt in PATTERNS {
        let full = format!("{}/{}", base, patt);
        for entry in glob_with(&full, opts).with_context(|| format!("bad pattern {}", full))? {
            let path = entry.context("reading input folder entry")?;
            if !path.is_file() {
                continue;
            }
            let file_name = match path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };
            if is_excluded(&file_name) {
                debug!(file = %file_name, "excluded");
                continue;
            }
            let Some(kind) = FileKind::from_path(&path) else {
                continue;
            };
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            files.push(ComponentFile {
                component: component_from_stem(&stem),
                file_name,
                kind,
                path,
            });
        }
    }

    if files.is_empty() {
        bail!(
            "no '*_clean.(csv|xlsx|xls)' files found in {}",
            dir.display()
        );
    }

    files.sort_by_key(|f| {
        let lname = f.file_name.to_lowercase();
        (!lname.starts_with("demographics_clean"), lname)
    });
    files.dedup_by(|a, b| a.path == b.path);

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn component_names() {
        assert_eq!(component_from_stem("Demographics_Clean"), "demographics");
        assert_eq!(component_from_stem("lab  panel_unclean"), "lab_panel");
        assert_eq!(component_from_stem(" Body Measures_clean"), "body_measures");
        assert_eq!(component_from_stem("cleaned_data"), "cleaned_data");
    }

    #[test]
    fn excluded_prefixes() {
        assert!(is_excluded("Dictionary_demo_clean.csv"));
        assert!(is_excluded("~$labs_clean.xlsx"));
        assert!(is_excluded("M - notes_clean.csv"));
        assert!(!is_excluded("labs_clean.csv"));
    }

    #[test]
    fn discovers_and_orders_components() -> Result<()> {
        let dir = tempdir()?;
        for name in [
            "labs_clean.csv",
            "Body_clean.xlsx",
            "demographics_clean.csv",
            "dictionary_labs_clean.csv",
            "notes.txt",
            "medications_clean.XLS",
            "questionnaire_unclean.csv",
        ] {
            fs::write(dir.path().join(name), "SEQN\n1\n")?;
        }
        fs::create_dir(dir.path().join("nested_clean.csv"))?;

        let found = discover_components(dir.path())?;
        let names: Vec<&str> = found.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "demographics_clean.csv",
                "Body_clean.xlsx",
                "labs_clean.csv",
                "medications_clean.XLS",
            ]
        );
        assert_eq!(found[1].kind, FileKind::Xlsx);
        assert_eq!(found[3].kind, FileKind::Xls);
        assert_eq!(found[3].component, "medications");
        Ok(())
    }

    #[test]
    fn missing_or_empty_folder_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        assert!(discover_components(&dir.path().join("nope")).is_err());
        assert!(discover_components(dir.path()).is_err());
        Ok(())
    }
}
