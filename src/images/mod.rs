//! # Image Placement
//!
//! Inserts pictures into cell ranges of an open document.
//!
//! ## Phases
//!
//! 1. **Probe** (parallel): every source is hashed and its header decoded
//!    (`image::image_dimensions`) on the rayon pool. Probe results are cached
//!    under `image:probe:{digest}`. Missing or undecodable sources are
//!    recorded as skipped and never retried within the request.
//! 2. **Clear** (serialized): each destination sheet loses its existing
//!    pictures once, so regenerating a document never stacks images.
//! 3. **Place** (serialized): geometry is resolved from the target range and
//!    the picture is inserted through the [`DocumentWriter`].
//!
//! Nothing here fails the request: every placement ends with a
//! [`PlacementStatus`].

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::address::RangeAddress;
use crate::cache::{Cache, digest_file};
use crate::error::CellfillError;
use crate::fill::{CancelToken, DocumentWriter};
use crate::host::Geometry;

/// Key prefix for cached probe results.
pub const PROBE_PREFIX: &str = "image:probe:";

/// An image and the range it should cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlacement {
    pub source: PathBuf,
    pub target: RangeAddress,
}

impl ImagePlacement {
    /// `target` is a qualified range such as `"7. Reporte Fotos A!B4:H20"`.
    pub fn new(source: impl Into<PathBuf>, target: &str) -> Result<Self, CellfillError> {
        Ok(Self {
            source: source.into(),
            target: target.parse()?,
        })
    }
}

/// Pixel size read from the image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlacementStatus {
    Placed { geometry: Geometry, image: ImageInfo },
    /// The source was missing or unreadable.
    Skipped { reason: String },
    /// The document rejected the clear, geometry or insert call.
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementResult {
    pub source: PathBuf,
    pub target: RangeAddress,
    #[serde(flatten)]
    pub status: PlacementStatus,
}

impl PlacementResult {
    pub fn is_placed(&self) -> bool {
        matches!(self.status, PlacementStatus::Placed { .. })
    }
}

pub struct ImagePlacer {
    cache: Cache,
}

impl ImagePlacer {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Forget every cached probe result.
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear_prefix(PROBE_PREFIX).await
    }

    /// Place every image. Results come back in input order.
    pub async fn place(
        &self,
        writer: &DocumentWriter,
        placements: &[ImagePlacement],
        cancel: &CancelToken,
    ) -> Vec<PlacementResult> {
        if placements.is_empty() {
            return Vec::new();
        }
        info!(images = placements.len(), "placing images");

        let probes = self.probe_all(placements).await;

        let mut failed_sheets = Vec::new();
        let mut seen = HashSet::new();
        for placement in placements {
            if cancel.is_cancelled() {
                break;
            }
            let sheet = placement.target.sheet.as_str();
            if !seen.insert(sheet) {
                continue;
            }
            match writer.clear_images(sheet).await {
                Ok(removed) => debug!(sheet, removed, "cleared existing images"),
                Err(e) => {
                    warn!(sheet, error = %e, "could not clear images");
                    failed_sheets.push((sheet, e.to_string()));
                }
            }
        }

        let mut results = Vec::with_capacity(placements.len());
        for (placement, probe) in placements.iter().zip(probes) {
            let status = match probe {
                Err(reason) => {
                    warn!(source = %placement.source.display(), %reason, "image skipped");
                    PlacementStatus::Skipped { reason }
                }
                Ok(_) if cancel.is_cancelled() => PlacementStatus::Cancelled,
                Ok(image) => {
                    let sheet = placement.target.sheet.as_str();
                    match failed_sheets.iter().find(|(s, _)| *s == sheet) {
                        Some((_, reason)) => PlacementStatus::Failed {
                            reason: reason.clone(),
                        },
                        None => insert(writer, placement, image).await,
                    }
                }
            };
            results.push(PlacementResult {
                source: placement.source.clone(),
                target: placement.target.clone(),
                status,
            });
        }
        results
    }

    /// Probe every source. Hashing runs on blocking tasks, decoding on rayon.
    async fn probe_all(&self, placements: &[ImagePlacement]) -> Vec<Result<ImageInfo, String>> {
        let mut digests: Vec<Option<Result<String, String>>> = vec![None; placements.len()];
        let mut tasks = JoinSet::new();
        for (i, placement) in placements.iter().enumerate() {
            let cache = self.cache.clone();
            let source = placement.source.clone();
            tasks.spawn(async move { (i, digest_file(&cache, &source).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, Ok(digest))) => digests[i] = Some(Ok(digest)),
                Ok((i, Err(e))) if e.kind() == std::io::ErrorKind::NotFound => {
                    digests[i] = Some(Err("source not found".into()))
                }
                Ok((i, Err(e))) => digests[i] = Some(Err(format!("source unreadable: {}", e))),
                Err(e) => warn!(error = %e, "digest task aborted"),
            }
        }

        let mut probes: Vec<Option<Result<ImageInfo, String>>> = vec![None; placements.len()];
        let mut pending = Vec::new();
        for (i, digest) in digests.iter().enumerate() {
            match digest {
                None => probes[i] = Some(Err("source unreadable".into())),
                Some(Err(reason)) => probes[i] = Some(Err(reason.clone())),
                Some(Ok(digest)) => match self.cache.get_json(&probe_key(digest)).await {
                    Some(info) => probes[i] = Some(Ok(info)),
                    None => pending.push((i, placements[i].source.clone())),
                },
            }
        }

        if !pending.is_empty() {
            debug!(uncached = pending.len(), "decoding image headers");
            let decoded = tokio::task::spawn_blocking(move || {
                pending
                    .into_par_iter()
                    .map(|(i, path)| (i, decode_header(&path)))
                    .collect::<Vec<_>>()
            })
            .await
            .unwrap_or_default();

            for (i, result) in decoded {
                if let (Ok(info), Some(Ok(digest))) = (&result, &digests[i]) {
                    self.cache
                        .set_json(&probe_key(digest), info, self.cache.default_ttl())
                        .await;
                }
                probes[i] = Some(result);
            }
        }

        probes
            .into_iter()
            .map(|p| p.unwrap_or_else(|| Err("image probe did not complete".into())))
            .collect()
    }
}

fn probe_key(digest: &str) -> String {
    format!("{}{}", PROBE_PREFIX, digest)
}

fn decode_header(path: &Path) -> Result<ImageInfo, String> {
    image::image_dimensions(path)
        .map(|(width, height)| ImageInfo { width, height })
        .map_err(|e| format!("not a readable image: {}", e))
}

async fn insert(writer: &DocumentWriter, placement: &ImagePlacement, image: ImageInfo) -> PlacementStatus {
    let sheet = &placement.target.sheet;
    let geometry = match writer.geometry(sheet, placement.target.range).await {
        Ok(geometry) => geometry,
        Err(e) => {
            warn!(range = %placement.target, error = %e, "could not resolve image geometry");
            return PlacementStatus::Failed {
                reason: e.to_string(),
            };
        }
    };
    match writer
        .place_image(sheet, placement.source.clone(), geometry)
        .await
    {
        Ok(()) => {
            debug!(range = %placement.target, source = %placement.source.display(), "image placed");
            PlacementStatus::Placed { geometry, image }
        }
        Err(e) => {
            warn!(range = %placement.target, error = %e, "image insert failed");
            PlacementStatus::Failed {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DocumentHost, DocumentSnapshot, Faults, MemoryHost, xlsx};
    use std::time::Duration;

    const FOTOS: &str = "Fotos";

    fn png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(8, 6).save(&path).unwrap();
        path
    }

    fn writer(dir: &Path, host: MemoryHost) -> DocumentWriter {
        let template = dir.join("t.xlsx");
        xlsx::write_blank_workbook(&template, &[FOTOS, "Datos"]).unwrap();
        DocumentWriter::spawn(host.open(&template).unwrap(), Duration::from_secs(5)).unwrap()
    }

    async fn images(dir: &Path, writer: &DocumentWriter) -> usize {
        let out = dir.join("snapshot.json");
        writer.save(out.clone()).await.unwrap();
        DocumentSnapshot::load(out).unwrap().images(FOTOS).len()
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), MemoryHost::new());
        let placements = vec![
            ImagePlacement::new(png(dir.path(), "a.png"), "Fotos!B2:D8").unwrap(),
            ImagePlacement::new(dir.path().join("missing.png"), "Fotos!F2:H8").unwrap(),
        ];

        let placer = ImagePlacer::new(Cache::in_memory(100));
        let results = placer.place(&writer, &placements, &CancelToken::new()).await;

        assert!(results[0].is_placed());
        assert_eq!(
            results[1].status,
            PlacementStatus::Skipped {
                reason: "source not found".into()
            }
        );
        match &results[0].status {
            PlacementStatus::Placed { geometry, image } => {
                assert_eq!(*image, ImageInfo { width: 8, height: 6 });
                assert_eq!(geometry.width, 3.0 * 48.0);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(images(dir.path(), &writer).await, 1);
    }

    #[tokio::test]
    async fn test_undecodable_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), MemoryHost::new());
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"definitely not a png").unwrap();

        let results = ImagePlacer::new(Cache::in_memory(100))
            .place(
                &writer,
                &[ImagePlacement::new(bogus, "Fotos!A1").unwrap()],
                &CancelToken::new(),
            )
            .await;
        assert!(matches!(results[0].status, PlacementStatus::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_repeated_placement_does_not_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), MemoryHost::new());
        let placements = vec![
            ImagePlacement::new(png(dir.path(), "a.png"), "Fotos!B2:D8").unwrap(),
            ImagePlacement::new(png(dir.path(), "b.png"), "Fotos!F2:H8").unwrap(),
        ];
        let cache = Cache::in_memory(100);
        let placer = ImagePlacer::new(cache.clone());

        placer.place(&writer, &placements, &CancelToken::new()).await;
        let hits_after_first = cache.stats().hits;
        placer.place(&writer, &placements, &CancelToken::new()).await;

        assert_eq!(images(dir.path(), &writer).await, 2);
        // Second run reuses both digests and both probes
        assert_eq!(cache.stats().hits - hits_after_first, 4);

        assert_eq!(placer.clear_cache().await, 2);
    }

    #[tokio::test]
    async fn test_clear_failure_fails_that_sheet_only() {
        let dir = tempfile::tempdir().unwrap();
        let host = MemoryHost::with_faults(Faults::default().unavailable_sheet("Datos"));
        let writer = writer(dir.path(), host);
        let a = png(dir.path(), "a.png");
        let placements = vec![
            ImagePlacement::new(a.clone(), "Datos!A1:B2").unwrap(),
            ImagePlacement::new(a, "Fotos!A1:B2").unwrap(),
        ];

        let results = ImagePlacer::new(Cache::disabled())
            .place(&writer, &placements, &CancelToken::new())
            .await;
        assert!(matches!(results[0].status, PlacementStatus::Failed { .. }));
        assert!(results[1].is_placed());
    }

    #[tokio::test]
    async fn test_cancelled_before_insert() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), MemoryHost::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let results = ImagePlacer::new(Cache::in_memory(10))
            .place(
                &writer,
                &[ImagePlacement::new(png(dir.path(), "a.png"), "Fotos!A1").unwrap()],
                &cancel,
            )
            .await;
        assert_eq!(results[0].status, PlacementStatus::Cancelled);
        assert_eq!(images(dir.path(), &writer).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_placement_leaves_existing_images() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), MemoryHost::new());
        let placer = ImagePlacer::new(Cache::in_memory(10));
        let placements = [ImagePlacement::new(png(dir.path(), "a.png"), "Fotos!A1").unwrap()];

        placer.place(&writer, &placements, &CancelToken::new()).await;
        assert_eq!(images(dir.path(), &writer).await, 1);

        let cancel = CancelToken::new();
        cancel.cancel();
        let results = placer.place(&writer, &placements, &cancel).await;
        assert_eq!(results[0].status, PlacementStatus::Cancelled);
        assert_eq!(images(dir.path(), &writer).await, 1);
    }
}
