//! # Document Assembler
//!
//! Runs one generation request end to end:
//!
//! ```text
//! Created ──► TemplateValidated ──► Filled ──► ImagesPlaced ──► Saved
//!    │                │                │             │
//!    └────────────────┴────────────────┴─────────────┴──► Aborted
//! ```
//!
//! - **Created → TemplateValidated**: output name, template existence,
//!   signature, size and required sheets are checked before anything is
//!   opened.
//! - **→ Filled**: [`Orchestrator::fill`] across all mapped sheets.
//! - **→ ImagesPlaced**: [`ImagePlacer::place`] when placements were given.
//! - **→ Saved**: the document is saved to a `.partial` sibling, then renamed
//!   to `{prefix}{identifier}{extension}`.
//!
//! Invalid configuration, an invalid template, cancellation before the
//! document is opened, and save failures abort the request with an error.
//! Everything else is collected into the [`GenerationReport`]. A request
//! cancelled mid-fill still saves what was written and reports it as partial.

pub mod output;
pub mod template;

pub use template::TemplateInfo;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::cache::{Cache, CacheStats};
use crate::config::EngineConfig;
use crate::error::CellfillError;
use crate::fill::{CancelToken, DocumentWriter, Orchestrator, SheetOutcome};
use crate::host::{DocumentHost, HostError};
use crate::images::{ImagePlacement, ImagePlacer, PlacementResult, PlacementStatus};
use crate::mapping::TemplateMapping;
use crate::normalize::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyState {
    Created,
    TemplateValidated,
    Filled,
    ImagesPlaced,
    Saved,
    Aborted,
}

impl AssemblyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AssemblyState::Saved | AssemblyState::Aborted)
    }

    /// The only state reachable without aborting.
    pub fn successor(self) -> Option<Self> {
        match self {
            AssemblyState::Created => Some(AssemblyState::TemplateValidated),
            AssemblyState::TemplateValidated => Some(AssemblyState::Filled),
            AssemblyState::Filled => Some(AssemblyState::ImagesPlaced),
            AssemblyState::ImagesPlaced => Some(AssemblyState::Saved),
            AssemblyState::Saved | AssemblyState::Aborted => None,
        }
    }
}

/// Tracks one request through [`AssemblyState`].
#[derive(Debug)]
struct Lifecycle {
    state: AssemblyState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: AssemblyState::Created,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.successor() {
            info!(from = ?self.state, to = ?next, "state transition");
            self.state = next;
        }
    }

    fn abort(&mut self, error: CellfillError) -> CellfillError {
        warn!(from = ?self.state, error = %error, "generation aborted");
        self.state = AssemblyState::Aborted;
        error
    }
}

/// Input for one generation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Caller-supplied id (request or user id) embedded in the output name.
    pub identifier: String,
    pub template: PathBuf,
    pub record: Record,
    pub images: Vec<ImagePlacement>,
}

impl GenerationRequest {
    pub fn new(identifier: impl Into<String>, template: impl Into<PathBuf>, record: Record) -> Self {
        Self {
            identifier: identifier.into(),
            template: template.into(),
            record,
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImagePlacement>) -> Self {
        self.images = images;
        self
    }
}

/// Structured outcome of a saved generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub request_id: Uuid,
    pub identifier: String,
    pub state: AssemblyState,
    pub output: PathBuf,
    pub template_digest: String,
    pub sheets: Vec<SheetOutcome>,
    pub images: Vec<PlacementResult>,
    pub cache: CacheStats,
    /// Something was not written: a sheet, a cell, an image, or the rest of a cancelled run.
    pub partial: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl GenerationReport {
    pub fn succeeded_sheets(&self) -> impl Iterator<Item = &str> {
        self.sheets
            .iter()
            .filter(|s| s.succeeded())
            .map(|s| s.sheet.as_str())
    }

    pub fn failed_sheets(&self) -> impl Iterator<Item = &str> {
        self.sheets
            .iter()
            .filter(|s| !s.succeeded())
            .map(|s| s.sheet.as_str())
    }

    pub fn placed_images(&self) -> usize {
        self.images.iter().filter(|i| i.is_placed()).count()
    }
}

/// Validates, fills, places and saves documents for one template mapping.
///
/// Holds no per-request state: concurrent [`generate`](Self::generate) calls
/// each get their own document handle and writer, sharing only the cache.
pub struct Assembler {
    host: Arc<dyn DocumentHost>,
    mapping: Arc<TemplateMapping>,
    cache: Cache,
    config: EngineConfig,
}

impl Assembler {
    pub fn new(
        host: Arc<dyn DocumentHost>,
        mapping: Arc<TemplateMapping>,
        cache: Cache,
        config: EngineConfig,
    ) -> Result<Self, CellfillError> {
        config.validate()?;
        Ok(Self {
            host,
            mapping,
            cache,
            config,
        })
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Where a document for `identifier` would be written.
    pub fn output_path(&self, identifier: &str) -> Result<PathBuf, CellfillError> {
        output::output_path(
            &self.config.output_dir,
            &self.config.output_prefix,
            identifier,
            &self.config.output_extension,
        )
    }

    /// Every check of the `Created → TemplateValidated` transition.
    pub async fn validate_template(&self, template: &Path) -> Result<TemplateInfo, CellfillError> {
        let info = template::inspect(&self.cache, template, self.config.min_template_size).await?;
        info.require_sheets(&self.mapping.required_sheets())?;
        Ok(info)
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationReport, CellfillError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "generate",
            %request_id,
            identifier = %request.identifier
        );
        self.run(request_id, request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationReport, CellfillError> {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let mut lifecycle = Lifecycle::new();

        let output = self
            .output_path(&request.identifier)
            .map_err(|e| lifecycle.abort(e))?;
        let info = self
            .validate_template(&request.template)
            .await
            .map_err(|e| lifecycle.abort(e))?;
        lifecycle.advance();

        if cancel.is_cancelled() {
            return Err(lifecycle.abort(CellfillError::Cancelled));
        }

        let writer = self
            .open(&request.template)
            .await
            .map_err(|e| lifecycle.abort(e))?;

        let record = Arc::new(request.record);
        let sheets = Orchestrator::new(self.mapping.clone(), self.config.fill_options())
            .fill(&writer, record, cancel)
            .await;
        lifecycle.advance();

        let images = if cancel.is_cancelled() {
            request
                .images
                .iter()
                .map(|p| PlacementResult {
                    source: p.source.clone(),
                    target: p.target.clone(),
                    status: PlacementStatus::Cancelled,
                })
                .collect()
        } else {
            ImagePlacer::new(self.cache.clone())
                .place(&writer, &request.images, cancel)
                .await
        };
        lifecycle.advance();

        if let Err(e) = save(&writer, &output).await {
            if let Err(close) = writer.close().await {
                warn!(error = %close, "closing document after failed save");
            }
            return Err(lifecycle.abort(e));
        }
        if let Err(e) = writer.close().await {
            warn!(error = %e, "document saved but handle did not close cleanly");
        }
        lifecycle.advance();

        let cancelled = cancel.is_cancelled();
        let partial = cancelled
            || sheets.iter().any(|s| !s.is_clean() || s.cells_skipped > 0)
            || images.iter().any(|i| !i.is_placed());
        let report = GenerationReport {
            request_id,
            identifier: request.identifier,
            state: lifecycle.state,
            output,
            template_digest: info.digest,
            sheets,
            images,
            cache: self.cache.stats(),
            partial,
            cancelled,
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        };
        info!(
            output = %report.output.display(),
            partial = report.partial,
            failed_sheets = report.failed_sheets().count(),
            placed_images = report.placed_images(),
            elapsed_ms = report.elapsed_ms,
            "document saved"
        );
        Ok(report)
    }

    /// Open the template on a blocking thread and hand it to a writer.
    async fn open(&self, template: &Path) -> Result<DocumentWriter, CellfillError> {
        let host = self.host.clone();
        let path = template.to_path_buf();
        let handle = tokio::task::spawn_blocking(move || host.open(&path))
            .await
            .map_err(|e| HostError::Open {
                path: template.display().to_string(),
                reason: e.to_string(),
            })??;
        Ok(DocumentWriter::spawn(handle, self.config.write_timeout())?)
    }
}

/// Save to the `.partial` sibling, then rename into place. On failure no
/// file is left at either path.
async fn save(writer: &DocumentWriter, output: &Path) -> Result<(), CellfillError> {
    let partial = output::partial_path(output);
    let save_err = |reason: String| CellfillError::Save(format!("{}: {}", output.display(), reason));

    if let Some(dir) = output.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| save_err(e.to_string()))?;
    }

    let result = match writer.save(partial.clone()).await {
        Ok(()) => tokio::fs::rename(&partial, output)
            .await
            .map_err(|e| save_err(e.to_string())),
        Err(e) => Err(save_err(e.to_string())),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Faults, MemoryHost, xlsx};
    use crate::mapping::MappingBuilder;
    use std::time::Duration;

    fn assembler(dir: &Path, host: MemoryHost) -> Assembler {
        let mapping = MappingBuilder::new()
            .field("Datos", "ID", ["B5"])
            .require_sheet("Fotos")
            .build()
            .unwrap();
        let config = EngineConfig {
            output_dir: dir.join("out"),
            ..Default::default()
        };
        Assembler::new(Arc::new(host), Arc::new(mapping), Cache::in_memory(100), config).unwrap()
    }

    fn template(dir: &Path, sheets: &[&str]) -> PathBuf {
        let path = dir.join("plantilla.xlsx");
        xlsx::write_blank_workbook(&path, sheets).unwrap();
        path
    }

    #[test]
    fn test_state_successors() {
        let mut state = AssemblyState::Created;
        let mut seen = vec![state];
        while let Some(next) = state.successor() {
            state = next;
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                AssemblyState::Created,
                AssemblyState::TemplateValidated,
                AssemblyState::Filled,
                AssemblyState::ImagesPlaced,
                AssemblyState::Saved,
            ]
        );
        assert!(AssemblyState::Aborted.is_terminal());
        assert!(!AssemblyState::Filled.is_terminal());
    }

    #[tokio::test]
    async fn test_generate_saves_named_output() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path(), MemoryHost::new());
        let request = GenerationRequest::new(
            "42",
            template(dir.path(), &["Datos", "Fotos"]),
            Record::new().with("ID", "42"),
        );

        let report = assembler.generate(request, &CancelToken::new()).await.unwrap();

        assert_eq!(report.state, AssemblyState::Saved);
        assert_eq!(report.output, dir.path().join("out/DISENO_SOLUCION_42.xlsx"));
        assert!(report.output.is_file());
        assert!(!output::partial_path(&report.output).exists());
        assert!(!report.partial);
        assert_eq!(report.succeeded_sheets().collect::<Vec<_>>(), vec!["Datos"]);
    }

    #[tokio::test]
    async fn test_missing_required_sheet_aborts_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path(), MemoryHost::new());
        let request = GenerationRequest::new("1", template(dir.path(), &["Datos"]), Record::new());

        let err = assembler.generate(request, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, CellfillError::Template(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_save_timeout_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = MappingBuilder::new()
            .field("Datos", "ID", ["B5"])
            .build()
            .unwrap();
        let config = EngineConfig {
            output_dir: dir.path().join("out"),
            write_timeout_ms: 50,
            ..Default::default()
        };
        let host = MemoryHost::with_faults(Faults::default().save_delay(Duration::from_millis(300)));
        let assembler =
            Assembler::new(Arc::new(host), Arc::new(mapping), Cache::in_memory(100), config).unwrap();
        let request = GenerationRequest::new("7", template(dir.path(), &["Datos"]), Record::new());
        let output = assembler.output_path("7").unwrap();

        let err = assembler.generate(request, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, CellfillError::Save(_)));

        // Let the writer thread finish the save it was still working on.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let left: Vec<_> = std::fs::read_dir(dir.path().join("out")).unwrap().collect();
        assert!(left.is_empty(), "left behind: {:?}", left);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_save_failure_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path(), MemoryHost::with_faults(Faults::default().fail_save()));
        let request = GenerationRequest::new("7", template(dir.path(), &["Datos", "Fotos"]), Record::new());
        let output = assembler.output_path("7").unwrap();

        let err = assembler.generate(request, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, CellfillError::Save(_)));
        assert!(!output.exists());
        assert!(!output::partial_path(&output).exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_open_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path(), MemoryHost::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let request = GenerationRequest::new("9", template(dir.path(), &["Datos", "Fotos"]), Record::new());

        let err = assembler.generate(request, &cancel).await.unwrap_err();
        assert!(matches!(err, CellfillError::Cancelled));
    }

    #[tokio::test]
    async fn test_bad_identifier_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = assembler(dir.path(), MemoryHost::new());
        let request = GenerationRequest::new("  ", template(dir.path(), &["Datos", "Fotos"]), Record::new());
        assert!(matches!(
            assembler.generate(request, &CancelToken::new()).await,
            Err(CellfillError::Config(_))
        ));
    }
}
