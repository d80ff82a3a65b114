//! # Document Host
//!
//! The document-editing capability the engine drives. A host opens a
//! template and hands back a [`DocumentHandle`]: one live, non-thread-safe
//! connection to the document. All calls are synchronous and, inside the
//! engine, are only ever issued from the single writer thread
//! ([`crate::fill::DocumentWriter`]).
//!
//! ## Available Hosts
//!
//! - [`memory`]: in-memory reference host that reads sheet names from an
//!   xlsx container and saves a JSON snapshot (CLI dry runs and tests)
//!
//! Automation hosts for real spreadsheet applications implement the same
//! three traits.

pub mod memory;
pub mod xlsx;

pub use memory::{DocumentSnapshot, Faults, MemoryHost};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::address::{CellRange, Coordinate};

/// Errors reported by a document host.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("sheet '{sheet}' unavailable: {reason}")]
    SheetUnavailable { sheet: String, reason: String },

    #[error("write to {sheet}!{coord} failed: {reason}")]
    Write {
        sheet: String,
        coord: String,
        reason: String,
    },

    #[error("image {path} rejected: {reason}")]
    Image { path: String, reason: String },

    #[error("save to {path} failed: {reason}")]
    Save { path: String, reason: String },

    #[error("document handle disconnected")]
    Disconnected,

    #[error("document host did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

/// Position and size of a cell range, in points from the sheet origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One worksheet inside an open document.
pub trait Sheet {
    fn name(&self) -> &str;

    fn set_cell(&mut self, coord: Coordinate, value: &str) -> Result<(), HostError>;

    fn geometry_of(&self, range: &CellRange) -> Result<Geometry, HostError>;

    fn place_image(&mut self, path: &Path, geometry: Geometry) -> Result<(), HostError>;

    /// Remove every picture on the sheet. Returns how many were removed.
    fn clear_images(&mut self) -> Result<usize, HostError>;
}

/// A live connection to one open document.
pub trait DocumentHandle: Send {
    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    fn sheet(&mut self, name: &str) -> Result<&mut dyn Sheet, HostError>;

    fn save(&mut self, path: &Path) -> Result<(), HostError>;

    /// Release the connection. Further calls fail with [`HostError::Disconnected`].
    fn close(&mut self) -> Result<(), HostError>;
}

/// Opens templates into document handles.
pub trait DocumentHost: Send + Sync {
    fn open(&self, template: &Path) -> Result<Box<dyn DocumentHandle>, HostError>;
}
