//! # Serialized Writer
//!
//! The one place a [`DocumentHandle`] is touched. [`DocumentWriter::spawn`]
//! moves the handle onto a dedicated thread; every mutation (and every query,
//! since the handle is not thread-safe) arrives there as a [`Command`] over a
//! bounded channel and is applied in arrival order. Callers await a oneshot
//! reply, guarded by a timeout.
//!
//! ```text
//!   worker ─┐
//!   worker ─┼──► mpsc<Command> ──► writer thread ──► DocumentHandle
//!   placer ─┘         ▲                  │
//!                     └── oneshot reply ─┘
//! ```

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::address::{CellRange, Coordinate};
use crate::host::{DocumentHandle, Geometry, HostError};

/// Pending commands before senders wait.
const QUEUE_DEPTH: usize = 64;

/// One cell assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    /// Field or choice group the value came from, for diagnostics.
    pub field: String,
    pub coord: Coordinate,
    pub value: String,
}

type Reply<T> = oneshot::Sender<Result<T, HostError>>;

/// Requests understood by the writer thread.
enum Command {
    SheetNames(Reply<Vec<String>>),
    /// Apply a batch to one sheet. Replies with the index and error of each
    /// write that failed; a sheet-level error fails the whole batch.
    Cells {
        sheet: String,
        writes: Vec<CellWrite>,
        reply: Reply<Vec<(usize, HostError)>>,
    },
    ClearImages {
        sheet: String,
        reply: Reply<usize>,
    },
    Geometry {
        sheet: String,
        range: CellRange,
        reply: Reply<Geometry>,
    },
    PlaceImage {
        sheet: String,
        source: PathBuf,
        geometry: Geometry,
        reply: Reply<()>,
    },
    Save {
        path: PathBuf,
        reply: Reply<()>,
    },
    Close(Reply<()>),
}

/// Cloneable front for the writer thread.
///
/// The thread exits after [`close`](Self::close) or once every clone has
/// been dropped; either way the handle is closed exactly once.
#[derive(Clone)]
pub struct DocumentWriter {
    tx: mpsc::Sender<Command>,
    timeout: Duration,
}

impl DocumentWriter {
    pub fn spawn(handle: Box<dyn DocumentHandle>, timeout: Duration) -> Result<Self, HostError> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("cellfill-writer".into())
            .spawn(move || run(handle, rx))
            .map_err(|_| HostError::Disconnected)?;
        Ok(Self { tx, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, HostError> {
        let (reply, rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(command(reply))
                .await
                .map_err(|_| HostError::Disconnected)?;
            rx.await.map_err(|_| HostError::Disconnected)?
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| HostError::Timeout(self.timeout))?
    }

    pub async fn sheet_names(&self) -> Result<Vec<String>, HostError> {
        self.request(Command::SheetNames).await
    }

    pub async fn write_cells(
        &self,
        sheet: &str,
        writes: Vec<CellWrite>,
    ) -> Result<Vec<(usize, HostError)>, HostError> {
        self.request(|reply| Command::Cells {
            sheet: sheet.to_string(),
            writes,
            reply,
        })
        .await
    }

    pub async fn clear_images(&self, sheet: &str) -> Result<usize, HostError> {
        self.request(|reply| Command::ClearImages {
            sheet: sheet.to_string(),
            reply,
        })
        .await
    }

    pub async fn geometry(&self, sheet: &str, range: CellRange) -> Result<Geometry, HostError> {
        self.request(|reply| Command::Geometry {
            sheet: sheet.to_string(),
            range,
            reply,
        })
        .await
    }

    pub async fn place_image(
        &self,
        sheet: &str,
        source: PathBuf,
        geometry: Geometry,
    ) -> Result<(), HostError> {
        self.request(|reply| Command::PlaceImage {
            sheet: sheet.to_string(),
            source,
            geometry,
            reply,
        })
        .await
    }

    pub async fn save(&self, path: PathBuf) -> Result<(), HostError> {
        self.request(|reply| Command::Save { path, reply }).await
    }

    /// Close the handle and stop the thread.
    pub async fn close(&self) -> Result<(), HostError> {
        self.request(Command::Close).await
    }
}

fn run(mut handle: Box<dyn DocumentHandle>, mut rx: mpsc::Receiver<Command>) {
    let mut closed = false;
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::SheetNames(reply) => {
                let _ = reply.send(Ok(handle.sheet_names()));
            }
            Command::Cells {
                sheet,
                writes,
                reply,
            } => {
                let _ = reply.send(apply_cells(handle.as_mut(), &sheet, &writes));
            }
            Command::ClearImages { sheet, reply } => {
                let _ = reply.send(handle.sheet(&sheet).and_then(|s| s.clear_images()));
            }
            Command::Geometry {
                sheet,
                range,
                reply,
            } => {
                let _ = reply.send(handle.sheet(&sheet).and_then(|s| s.geometry_of(&range)));
            }
            Command::PlaceImage {
                sheet,
                source,
                geometry,
                reply,
            } => {
                let result = handle
                    .sheet(&sheet)
                    .and_then(|s| s.place_image(&source, geometry));
                let _ = reply.send(result);
            }
            Command::Save { path, reply } => {
                let result = handle.save(&path);
                let saved = result.is_ok();
                // A failed send means the caller timed out and will never rename or remove it.
                if reply.send(result).is_err() && saved {
                    tracing::warn!(path = %path.display(), "save finished after caller gave up, removing it");
                    if let Err(e) = std::fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "removing abandoned save failed");
                    }
                }
            }
            Command::Close(reply) => {
                closed = true;
                let _ = reply.send(handle.close());
                break;
            }
        }
    }

    if !closed {
        if let Err(e) = handle.close() {
            tracing::warn!(error = %e, "closing abandoned document handle failed");
        }
    }
    tracing::debug!("writer thread finished");
}

fn apply_cells(
    handle: &mut dyn DocumentHandle,
    sheet: &str,
    writes: &[CellWrite],
) -> Result<Vec<(usize, HostError)>, HostError> {
    let sheet = handle.sheet(sheet)?;
    let mut failures = Vec::new();
    for (i, write) in writes.iter().enumerate() {
        if let Err(e) = sheet.set_cell(write.coord, &write.value) {
            failures.push((i, e));
        }
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DocumentHost, DocumentSnapshot, Faults, MemoryHost, xlsx};

    fn open(dir: &std::path::Path, host: MemoryHost) -> DocumentWriter {
        let template = dir.join("t.xlsx");
        xlsx::write_blank_workbook(&template, &["Datos", "Fotos"]).unwrap();
        let handle = host.open(&template).unwrap();
        DocumentWriter::spawn(handle, Duration::from_secs(5)).unwrap()
    }

    fn write(coord: &str, value: &str) -> CellWrite {
        CellWrite {
            field: "f".into(),
            coord: coord.parse().unwrap(),
            value: value.into(),
        }
    }

    #[tokio::test]
    async fn test_writes_apply_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = open(dir.path(), MemoryHost::new());

        let failures = writer
            .write_cells("Datos", vec![write("A1", "first"), write("A1", "second")])
            .await
            .unwrap();
        assert!(failures.is_empty());

        let out = dir.path().join("out.json");
        writer.save(out.clone()).await.unwrap();
        writer.close().await.unwrap();

        let snapshot = DocumentSnapshot::load(&out).unwrap();
        assert_eq!(snapshot.cell("Datos", "A1"), Some("second"));
    }

    #[tokio::test]
    async fn test_cell_failures_are_reported_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let faults = Faults::default().failing_cell("Datos!B2".parse().unwrap());
        let writer = open(dir.path(), MemoryHost::with_faults(faults));

        let failures = writer
            .write_cells(
                "Datos",
                vec![write("B1", "ok"), write("B2", "locked"), write("B3", "ok")],
            )
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
    }

    #[tokio::test]
    async fn test_missing_sheet_fails_batch() {
        let dir = tempfile::tempdir().unwrap();
        let writer = open(dir.path(), MemoryHost::new());
        let result = writer.write_cells("Nope", vec![write("A1", "x")]).await;
        assert!(matches!(result, Err(HostError::SheetNotFound(_))));
    }

    #[tokio::test]
    async fn test_slow_host_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.xlsx");
        xlsx::write_blank_workbook(&template, &["Datos"]).unwrap();
        let host = MemoryHost::with_faults(Faults::default().write_delay(Duration::from_millis(300)));
        let writer =
            DocumentWriter::spawn(host.open(&template).unwrap(), Duration::from_millis(20)).unwrap();

        let result = writer.write_cells("Datos", vec![write("A1", "x")]).await;
        assert!(matches!(result, Err(HostError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_abandoned_save_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.xlsx");
        xlsx::write_blank_workbook(&template, &["Datos"]).unwrap();
        let host = MemoryHost::with_faults(Faults::default().save_delay(Duration::from_millis(200)));
        let writer =
            DocumentWriter::spawn(host.open(&template).unwrap(), Duration::from_millis(20)).unwrap();

        let out = dir.path().join("out.json");
        let result = writer.save(out.clone()).await;
        assert!(matches!(result, Err(HostError::Timeout(_))));

        // Close queues behind the slow save, so once it answers the save is done.
        let writer = DocumentWriter {
            timeout: Duration::from_secs(5),
            ..writer
        };
        writer.close().await.unwrap();
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_requests_after_close_are_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = open(dir.path(), MemoryHost::new());
        assert_eq!(writer.sheet_names().await.unwrap(), vec!["Datos", "Fotos"]);
        writer.close().await.unwrap();
        assert!(matches!(
            writer.sheet_names().await,
            Err(HostError::Disconnected)
        ));
    }
}
