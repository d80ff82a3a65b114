//! Output file naming.

use std::path::{Path, PathBuf};

use crate::error::CellfillError;

/// Characters never allowed in the identifier part of a file name.
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a caller-supplied identifier safe to embed in a file name.
///
/// Reserved and control characters become `_`. When anything had to be
/// replaced, a short digest of the raw identifier is appended, so two
/// distinct identifiers never share an output name.
pub fn sanitize_identifier(raw: &str) -> Result<String, CellfillError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return Err(CellfillError::Config(format!(
            "identifier {:?} cannot name an output file",
            raw
        )));
    }

    let cleaned: String = trimmed
        .chars()
        .map(|c| {
            if c.is_control() || c.is_whitespace() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned == raw {
        Ok(cleaned)
    } else {
        let digest = blake3::hash(raw.as_bytes()).to_hex();
        Ok(format!("{}-{}", cleaned, &digest[..8]))
    }
}

/// `{dir}/{prefix}{identifier}{extension}`.
pub fn output_path(
    dir: &Path,
    prefix: &str,
    identifier: &str,
    extension: &str,
) -> Result<PathBuf, CellfillError> {
    let id = sanitize_identifier(identifier)?;
    Ok(dir.join(format!("{}{}{}", prefix, id, extension)))
}

/// Sibling the document is saved to before being renamed into place.
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}
