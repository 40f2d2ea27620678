//! Input normalisation helpers for host names, critical keywords and image
//! references.
//!
//! Every user-supplied string from `config.json` and `machines.json` passes
//! through one of these functions before reaching the audit core, so the core
//! can rely on a single canonical representation.

use std::collections::HashSet;

/// Normalise a machine name: trim whitespace, reject empty or embedded
/// whitespace. Case is preserved.
pub fn normalize_host_name(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Host name cannot be empty".to_string());
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("Host name '{}' contains whitespace", trimmed));
    }
    Ok(trimmed.to_string())
}

/// Normalise a host address (IP or DNS name). Ports belong in the separate
/// `port` field.
pub fn normalize_address(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Address cannot be empty".to_string());
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(format!("Address '{}' contains whitespace", trimmed));
    }
    Ok(trimmed.to_string())
}

/// Normalise the critical keyword list: trim, lowercase, deduplicate.
///
/// An empty keyword would match every package, so it is rejected.
pub fn normalize_keywords<I, S>(keywords: I) -> Result<Vec<String>, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for raw in keywords {
        let keyword = raw.as_ref().trim().to_lowercase();
        if keyword.is_empty() {
            return Err("Critical keyword cannot be empty".to_string());
        }
        if seen.insert(keyword.clone()) {
            cleaned.push(keyword);
        }
    }
    Ok(cleaned)
}

/// Normalise image references for the ignore list: trim, drop blanks,
/// deduplicate. References are compared verbatim, so no case folding.
pub fn normalize_images<I, S>(images: I) -> Result<Vec<String>, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for raw in images {
        let image = raw.as_ref().trim();
        if image.is_empty() {
            continue;
        }
        if image.chars().any(char::is_whitespace) {
            return Err(format!("Image reference '{}' contains whitespace", image));
        }
        if seen.insert(image.to_string()) {
            cleaned.push(image.to_string());
        }
    }
    Ok(cleaned)
}
