//! Upload validation.

use std::path::Path;

use assetforge_common::{Error, Result};

/// Check an upload's name, extension and size before anything is copied.
pub fn validate_upload(source: &Path, size_bytes: u64, max_upload_bytes: u64) -> Result<()> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(Error::validation("filename required"));
    }

    let has_extension = source
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| !e.is_empty());
    if !has_extension {
        return Err(Error::validation("extension required"));
    }

    if size_bytes > max_upload_bytes {
        return Err(Error::validation(format!(
            "file too large: {size_bytes} bytes exceeds the {max_upload_bytes} byte limit"
        )));
    }

    Ok(())
}

/// Normalise requested tag names, rejecting blank ones.
pub fn validate_tag_names(names: &[String]) -> Result<Vec<String>> {
    names
        .iter()
        .map(|name| {
            let name = name.trim();
            if name.is_empty() {
                Err(Error::validation("tag name required"))
            } else {
                Ok(name.to_string())
            }
        })
        .collect()
}

/// Accept `#RRGGBB` colours, returned upper-cased.
pub fn validate_tag_color(color: &str) -> Result<String> {
    let color = color.trim();
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(Error::validation(format!(
            "invalid tag color '{color}': expected #RRGGBB"
        )));
    }
    Ok(color.to_ascii_uppercase())
}
