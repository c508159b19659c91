use std::collections::HashMap;

/// Tokens that mean "no value" in NHANES exports, in addition to the empty string.
const NA_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "NULL", "null", "#N/A", "."];

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// True when an already-cleaned cell is a missing value.
pub fn is_na(cleaned: &str) -> bool {
    cleaned.is_empty() || NA_TOKENS.contains(&cleaned)
}

/// Clean a raw cell and map missing markers to `None`.
pub fn clean_cell(raw: Option<&str>) -> Option<String> {
    raw.map(clean_str).filter(|s| !is_na(s))
}

/// Trim + uppercase every header, naming blanks `UNNAMED_<i>` and
/// suffixing repeats with `.1`, `.2`, ...
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());

    for (i, h) in raw.iter().enumerate() {
        let mut name = clean_str(h.as_ref()).to_uppercase();
        if name.is_empty() {
            name = format!("UNNAMED_{}", i);
        }
        let count = seen.entry(name.clone()).or_insert(0);
        if *count > 0 {
            let renamed = format!("{}.{}", name, count);
            *count += 1;
            out.push(renamed);
        } else {
            *count = 1;
            out.push(name);
        }
    }
    out
}
