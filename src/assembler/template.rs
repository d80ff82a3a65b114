//! Template checks that run before any document is opened.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::cache::{Cache, digest_file};
use crate::error::CellfillError;
use crate::host::xlsx::{self, ZIP_SIGNATURE};

/// Key prefix for cached sheet lists, keyed by template digest.
pub const SHEETS_PREFIX: &str = "template:sheets:";

/// What validation learned about a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub path: PathBuf,
    pub size: u64,
    pub digest: String,
    pub sheets: Vec<String>,
}

impl TemplateInfo {
    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s == name)
    }

    /// Fail unless every `required` sheet is present. Lists all missing ones.
    pub fn require_sheets(&self, required: &[&str]) -> Result<(), CellfillError> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| !self.has_sheet(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CellfillError::Template(format!(
                "{} is missing required sheets: {}",
                self.path.display(),
                missing.join(", ")
            )))
        }
    }
}

/// Existence, signature, size, then sheet names (cached by content digest).
pub async fn inspect(cache: &Cache, path: &Path, min_size: u64) -> Result<TemplateInfo, CellfillError> {
    let template_err = |msg: String| CellfillError::Template(format!("{}: {}", path.display(), msg));

    let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => template_err("template not found".into()),
        _ => template_err(format!("cannot read template: {}", e)),
    })?;
    if !metadata.is_file() {
        return Err(template_err("template is not a regular file".into()));
    }

    let mut signature = [0u8; 4];
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| template_err(format!("cannot read template: {}", e)))?;
    if file.read_exact(&mut signature).await.is_err() || &signature != ZIP_SIGNATURE {
        return Err(template_err("not an xlsx workbook (bad signature)".into()));
    }

    if metadata.len() < min_size {
        return Err(template_err(format!(
            "template is {} bytes, expected at least {}",
            metadata.len(),
            min_size
        )));
    }

    let digest = digest_file(cache, path)
        .await
        .map_err(|e| template_err(format!("cannot hash template: {}", e)))?;

    let owned = path.to_path_buf();
    let sheets: Vec<String> = cache
        .get_or_compute(&format!("{}{}", SHEETS_PREFIX, digest), || async move {
            tokio::task::spawn_blocking(move || xlsx::sheet_names(&owned))
                .await
                .map_err(|e| e.to_string())?
        })
        .await
        .map_err(|reason| template_err(format!("unreadable workbook: {}", reason)))?;

    Ok(TemplateInfo {
        path: path.to_path_buf(),
        size: metadata.len(),
        digest,
        sheets,
    })
}
