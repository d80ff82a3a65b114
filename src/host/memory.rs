//! # In-Memory Host
//!
//! Reference [`DocumentHost`]. Opening a template reads its sheet names from
//! the xlsx container and starts every sheet blank; saving writes a JSON
//! [`DocumentSnapshot`] of every cell value and placed picture.
//!
//! Column widths and row heights are uniform, so range geometry is pure
//! arithmetic. [`Faults`] lets callers break individual sheets, cells or the
//! save step to exercise failure containment.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{DocumentHandle, DocumentHost, Geometry, HostError, Sheet, xlsx};
use crate::address::{CellAddress, CellRange, Coordinate};

/// Default column width in points.
pub const DEFAULT_COLUMN_WIDTH: f64 = 48.0;

/// Default row height in points.
pub const DEFAULT_ROW_HEIGHT: f64 = 15.0;

/// Injected failures.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    unavailable_sheets: HashSet<String>,
    failing_cells: HashSet<CellAddress>,
    write_delay: Option<Duration>,
    save_delay: Option<Duration>,
    fail_save: bool,
}

impl Faults {
    /// The sheet is listed by the workbook but cannot be activated.
    pub fn unavailable_sheet(mut self, sheet: &str) -> Self {
        self.unavailable_sheets.insert(sheet.to_string());
        self
    }

    pub fn failing_cell(mut self, address: CellAddress) -> Self {
        self.failing_cells.insert(address);
        self
    }

    /// Block every cell write for `delay`.
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Block the save for `delay` before writing anything.
    pub fn save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub fn fail_save(mut self) -> Self {
        self.fail_save = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MemoryHost {
    faults: Arc<Faults>,
    column_width: f64,
    row_height: f64,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self {
            faults: Arc::new(Faults::default()),
            column_width: DEFAULT_COLUMN_WIDTH,
            row_height: DEFAULT_ROW_HEIGHT,
        }
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults: Arc::new(faults),
            ..Self::default()
        }
    }

    pub fn with_cell_size(mut self, column_width: f64, row_height: f64) -> Self {
        self.column_width = column_width;
        self.row_height = row_height;
        self
    }
}

impl DocumentHost for MemoryHost {
    fn open(&self, template: &Path) -> Result<Box<dyn DocumentHandle>, HostError> {
        let names = xlsx::sheet_names(template).map_err(|reason| HostError::Open {
            path: template.display().to_string(),
            reason,
        })?;
        tracing::debug!(template = %template.display(), sheets = names.len(), "opened template");

        let sheets = names
            .into_iter()
            .map(|name| MemorySheet {
                name,
                cells: BTreeMap::new(),
                images: Vec::new(),
                column_width: self.column_width,
                row_height: self.row_height,
                faults: self.faults.clone(),
            })
            .collect();

        Ok(Box::new(MemoryDocument {
            template: template.to_path_buf(),
            sheets,
            faults: self.faults.clone(),
            closed: false,
        }))
    }
}

/// A picture anchored on a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedImage {
    pub source: PathBuf,
    pub geometry: Geometry,
}

struct MemorySheet {
    name: String,
    cells: BTreeMap<Coordinate, String>,
    images: Vec<PlacedImage>,
    column_width: f64,
    row_height: f64,
    faults: Arc<Faults>,
}

impl Sheet for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_cell(&mut self, coord: Coordinate, value: &str) -> Result<(), HostError> {
        if let Some(delay) = self.faults.write_delay {
            std::thread::sleep(delay);
        }
        let address = CellAddress {
            sheet: self.name.clone(),
            coord,
        };
        if self.faults.failing_cells.contains(&address) {
            return Err(HostError::Write {
                sheet: self.name.clone(),
                coord: coord.to_string(),
                reason: "cell is locked".into(),
            });
        }
        self.cells.insert(coord, value.to_string());
        Ok(())
    }

    fn geometry_of(&self, range: &CellRange) -> Result<Geometry, HostError> {
        Ok(Geometry {
            left: (range.start.col - 1) as f64 * self.column_width,
            top: (range.start.row - 1) as f64 * self.row_height,
            width: range.columns() as f64 * self.column_width,
            height: range.rows() as f64 * self.row_height,
        })
    }

    fn place_image(&mut self, path: &Path, geometry: Geometry) -> Result<(), HostError> {
        if !path.is_file() {
            return Err(HostError::Image {
                path: path.display().to_string(),
                reason: "not a readable file".into(),
            });
        }
        self.images.push(PlacedImage {
            source: path.to_path_buf(),
            geometry,
        });
        Ok(())
    }

    fn clear_images(&mut self) -> Result<usize, HostError> {
        let removed = self.images.len();
        self.images.clear();
        Ok(removed)
    }
}

struct MemoryDocument {
    template: PathBuf,
    sheets: Vec<MemorySheet>,
    faults: Arc<Faults>,
    closed: bool,
}

impl MemoryDocument {
    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            template: self.template.clone(),
            sheets: self
                .sheets
                .iter()
                .map(|s| SheetSnapshot {
                    name: s.name.clone(),
                    cells: s.cells.clone(),
                    images: s.images.clone(),
                })
                .collect(),
        }
    }
}

impl DocumentHandle for MemoryDocument {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn sheet(&mut self, name: &str) -> Result<&mut dyn Sheet, HostError> {
        if self.closed {
            return Err(HostError::Disconnected);
        }
        if self.faults.unavailable_sheets.contains(name) {
            return Err(HostError::SheetUnavailable {
                sheet: name.to_string(),
                reason: "sheet is protected".into(),
            });
        }
        match self.sheets.iter_mut().find(|s| s.name == name) {
            Some(sheet) => Ok(sheet as &mut dyn Sheet),
            None => Err(HostError::SheetNotFound(name.to_string())),
        }
    }

    fn save(&mut self, path: &Path) -> Result<(), HostError> {
        if self.closed {
            return Err(HostError::Disconnected);
        }
        let save_err = |reason: String| HostError::Save {
            path: path.display().to_string(),
            reason,
        };
        if let Some(delay) = self.faults.save_delay {
            std::thread::sleep(delay);
        }
        if self.faults.fail_save {
            return Err(save_err("disk full".into()));
        }
        let json = serde_json::to_vec_pretty(&self.snapshot()).map_err(|e| save_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| save_err(e.to_string()))
    }

    fn close(&mut self) -> Result<(), HostError> {
        self.closed = true;
        Ok(())
    }
}

/// Saved state of a [`MemoryHost`] document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub template: PathBuf,
    pub sheets: Vec<SheetSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSnapshot {
    pub name: String,
    pub cells: BTreeMap<Coordinate, String>,
    pub images: Vec<PlacedImage>,
}

impl DocumentSnapshot {
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(std::io::Error::other)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetSnapshot> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Value written at `coord` (e.g. `"B5"`), if any.
    pub fn cell(&self, sheet: &str, coord: &str) -> Option<&str> {
        let coord: Coordinate = coord.parse().ok()?;
        self.sheet(sheet)?.cells.get(&coord).map(String::as_str)
    }

    pub fn images(&self, sheet: &str) -> &[PlacedImage] {
        self.sheet(sheet).map(|s| s.images.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(dir: &Path, sheets: &[&str]) -> PathBuf {
        let path = dir.join("template.xlsx");
        xlsx::write_blank_workbook(&path, sheets).unwrap();
        path
    }

    #[test]
    fn test_open_lists_sheets_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let doc = MemoryHost::new()
            .open(&template(dir.path(), &["Portada", "Datos"]))
            .unwrap();
        assert_eq!(doc.sheet_names(), vec!["Portada", "Datos"]);
    }

    #[test]
    fn test_open_rejects_non_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.xlsx");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(matches!(
            MemoryHost::new().open(&path),
            Err(HostError::Open { .. })
        ));
    }

    #[test]
    fn test_write_and_save_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = MemoryHost::new()
            .open(&template(dir.path(), &["Datos"]))
            .unwrap();
        doc.sheet("Datos")
            .unwrap()
            .set_cell("C7".parse().unwrap(), "Sitio Norte")
            .unwrap();

        let out = dir.path().join("out.json");
        doc.save(&out).unwrap();
        let snapshot = DocumentSnapshot::load(&out).unwrap();
        assert_eq!(snapshot.cell("Datos", "C7"), Some("Sitio Norte"));
        assert_eq!(snapshot.cell("Datos", "C8"), None);
    }

    #[test]
    fn test_geometry_is_uniform() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = MemoryHost::new()
            .with_cell_size(50.0, 20.0)
            .open(&template(dir.path(), &["Fotos"]))
            .unwrap();
        let range: CellRange = "B3:D4".parse().unwrap();
        let geometry = doc.sheet("Fotos").unwrap().geometry_of(&range).unwrap();
        assert_eq!(
            geometry,
            Geometry {
                left: 50.0,
                top: 40.0,
                width: 150.0,
                height: 40.0
            }
        );
    }

    #[test]
    fn test_faults() {
        let dir = tempfile::tempdir().unwrap();
        let faults = Faults::default()
            .unavailable_sheet("Portada")
            .failing_cell("Datos!A1".parse().unwrap())
            .fail_save();
        let mut doc = MemoryHost::with_faults(faults)
            .open(&template(dir.path(), &["Portada", "Datos"]))
            .unwrap();

        assert!(matches!(
            doc.sheet("Portada"),
            Err(HostError::SheetUnavailable { .. })
        ));
        assert!(matches!(doc.sheet("Otra"), Err(HostError::SheetNotFound(_))));

        let sheet = doc.sheet("Datos").unwrap();
        assert!(sheet.set_cell("A1".parse().unwrap(), "x").is_err());
        assert!(sheet.set_cell("A2".parse().unwrap(), "x").is_ok());

        assert!(matches!(
            doc.save(&dir.path().join("o.json")),
            Err(HostError::Save { .. })
        ));
    }

    #[test]
    fn test_closed_handle_is_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = MemoryHost::new()
            .open(&template(dir.path(), &["Datos"]))
            .unwrap();
        doc.close().unwrap();
        assert!(matches!(doc.sheet("Datos"), Err(HostError::Disconnected)));
    }
}
