//! # Field and Choice Mapping
//!
//! Static configuration that tells the engine where each record field lands
//! in the template.
//!
//! A [`TemplateMapping`] is built once per template version and validated at
//! construction. Construction fails fast with [`CellfillError::Config`] when:
//!
//! - an address is malformed or points at a different sheet than its section
//! - a field name repeats within a sheet
//! - a choice group has fewer than two options
//! - two options of one group normalize to the same key (ambiguous match)
//!
//! ## Example
//!
//! ```
//! use cellfill::mapping::MappingBuilder;
//!
//! let mapping = MappingBuilder::new()
//!     .field("Sheet1", "ID", ["B5"])
//!     .field("Sheet1", "Configuración MW:", ["D9", "B14", "C28"])
//!     .choice("Sheet1", "tipo_zona", "Tipo de zona", [("urbana", "L21"), ("rural", "U21")])
//!     .build()?;
//!
//! assert_eq!(mapping.fields_for("Sheet1").len(), 2);
//! assert_eq!(mapping.choice_groups_for("Sheet1").len(), 1);
//! # Ok::<(), cellfill::CellfillError>(())
//! ```

mod choice;
mod file;
pub mod presets;

pub use choice::{ChoiceGroup, ChoiceOption, ChoiceResolution, DEFAULT_MARKER, option_key};
pub use file::MappingFile;

use std::collections::HashSet;
use std::path::Path;

use crate::address::CellAddress;
use crate::error::CellfillError;

/// A logical field and every cell that receives its value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub field: String,
    pub targets: Vec<CellAddress>,
}

/// Everything mapped onto one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetMapping {
    pub name: String,
    pub fields: Vec<FieldMapping>,
    pub choices: Vec<ChoiceGroup>,
}

/// Validated, immutable mapping for one template version.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMapping {
    sheets: Vec<SheetMapping>,
    required_sheets: Vec<String>,
}

impl TemplateMapping {
    /// Load and validate a JSON mapping file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CellfillError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CellfillError::Config(format!("Failed to read mapping {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON mapping document.
    pub fn from_json(text: &str) -> Result<Self, CellfillError> {
        let file: MappingFile = serde_json::from_str(text)
            .map_err(|e| CellfillError::Config(format!("Invalid mapping: {}", e)))?;
        file.into_builder().build()
    }

    /// Sheets that carry mappings, in configuration order.
    pub fn sheets(&self) -> impl Iterator<Item = &SheetMapping> {
        self.sheets.iter()
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetMapping> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Field mappings for a sheet (empty for unmapped sheets).
    pub fn fields_for(&self, sheet: &str) -> &[FieldMapping] {
        self.sheet(sheet).map(|s| s.fields.as_slice()).unwrap_or(&[])
    }

    /// Choice groups for a sheet (empty for unmapped sheets).
    pub fn choice_groups_for(&self, sheet: &str) -> &[ChoiceGroup] {
        self.sheet(sheet).map(|s| s.choices.as_slice()).unwrap_or(&[])
    }

    /// Every sheet the template must expose: mapped sheets first, then any
    /// extra sheets the configuration requires (image sheets, cover pages).
    pub fn required_sheets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.sheets
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.required_sheets.iter().map(String::as_str))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Back to the serializable file form.
    pub fn to_file(&self) -> MappingFile {
        MappingFile::from_mapping(self)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Clone, Default)]
struct RawSheet {
    name: String,
    fields: Vec<(String, Vec<String>)>,
    choices: Vec<RawChoice>,
}

#[derive(Debug, Clone)]
struct RawChoice {
    name: String,
    field: String,
    options: Vec<(String, String)>,
    marker: Option<String>,
}

/// Collects raw strings and validates everything in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    sheets: Vec<RawSheet>,
    required: Vec<String>,
    marker: Option<String>,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn sheet_mut(&mut self, sheet: &str) -> &mut RawSheet {
        let idx = match self.sheets.iter().position(|s| s.name == sheet) {
            Some(idx) => idx,
            None => {
                self.sheets.push(RawSheet {
                    name: sheet.to_string(),
                    ..Default::default()
                });
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx]
    }

    /// Map `field` to one or more coordinates on `sheet`.
    ///
    /// Coordinates may be local ("B5") or qualified ("Sheet1!B5").
    pub fn field<I, S>(mut self, sheet: &str, field: &str, coords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let coords = coords.into_iter().map(Into::into).collect();
        self.sheet_mut(sheet).fields.push((field.to_string(), coords));
        self
    }

    /// Add a choice group whose selection is read from record field `field`.
    pub fn choice<I, L, C>(mut self, sheet: &str, name: &str, field: &str, options: I) -> Self
    where
        I: IntoIterator<Item = (L, C)>,
        L: Into<String>,
        C: Into<String>,
    {
        let options = options
            .into_iter()
            .map(|(l, c)| (l.into(), c.into()))
            .collect();
        self.sheet_mut(sheet).choices.push(RawChoice {
            name: name.to_string(),
            field: field.to_string(),
            options,
            marker: None,
        });
        self
    }

    /// Override the marker for the most recently added choice group on `sheet`.
    pub fn choice_marker(mut self, sheet: &str, marker: &str) -> Self {
        if let Some(choice) = self.sheet_mut(sheet).choices.last_mut() {
            choice.marker = Some(marker.to_string());
        }
        self
    }

    /// Default marker for every group without its own.
    pub fn marker(mut self, marker: &str) -> Self {
        self.marker = Some(marker.to_string());
        self
    }

    /// Require a sheet to exist in the template even if nothing maps onto it.
    pub fn require_sheet(mut self, sheet: &str) -> Self {
        self.required.push(sheet.to_string());
        self
    }

    pub fn build(self) -> Result<TemplateMapping, CellfillError> {
        let default_marker = self.marker.unwrap_or_else(|| DEFAULT_MARKER.to_string());
        if default_marker.is_empty() {
            return Err(CellfillError::Config("choice marker must not be empty".into()));
        }

        let mut sheets = Vec::with_capacity(self.sheets.len());
        for raw in self.sheets {
            sheets.push(build_sheet(raw, &default_marker)?);
        }

        for name in &self.required {
            if name.trim().is_empty() {
                return Err(CellfillError::Config("required sheet name is empty".into()));
            }
        }

        Ok(TemplateMapping {
            sheets,
            required_sheets: self.required,
        })
    }
}

/// Parse a coordinate in the context of `sheet`, rejecting cross-sheet targets.
fn resolve_address(sheet: &str, coord: &str, context: &str) -> Result<CellAddress, CellfillError> {
    let address = if coord.contains('!') {
        coord.parse::<CellAddress>()
    } else {
        CellAddress::new(sheet, coord.trim())
    }
    .map_err(|e| CellfillError::Config(format!("{}: {}", context, e)))?;

    if address.sheet != sheet {
        return Err(CellfillError::Config(format!(
            "{}: address {} points outside sheet '{}'",
            context, address, sheet
        )));
    }
    Ok(address)
}

fn build_sheet(raw: RawSheet, default_marker: &str) -> Result<SheetMapping, CellfillError> {
    let sheet = raw.name;
    if sheet.trim().is_empty() {
        return Err(CellfillError::Config("sheet name is empty".into()));
    }

    let mut seen_fields = HashSet::new();
    let mut fields = Vec::with_capacity(raw.fields.len());
    for (field, coords) in raw.fields {
        let context = format!("sheet '{}', field '{}'", sheet, field);
        if !seen_fields.insert(field.clone()) {
            return Err(CellfillError::Config(format!("{}: duplicate field", context)));
        }
        if coords.is_empty() {
            return Err(CellfillError::Config(format!("{}: no target cells", context)));
        }
        let targets = coords
            .iter()
            .map(|c| resolve_address(&sheet, c, &context))
            .collect::<Result<Vec<_>, _>>()?;
        fields.push(FieldMapping { field, targets });
    }

    let mut seen_groups = HashSet::new();
    let mut choices = Vec::with_capacity(raw.choices.len());
    for group in raw.choices {
        let context = format!("sheet '{}', choice group '{}'", sheet, group.name);
        if !seen_groups.insert(group.name.clone()) {
            return Err(CellfillError::Config(format!("{}: duplicate group", context)));
        }
        if group.options.len() < 2 {
            return Err(CellfillError::Config(format!(
                "{}: needs at least two options, has {}",
                context,
                group.options.len()
            )));
        }

        let mut keys = HashSet::new();
        let mut options = Vec::with_capacity(group.options.len());
        for (label, coord) in group.options {
            let key = option_key(&label);
            if key.is_empty() {
                return Err(CellfillError::Config(format!("{}: empty option label", context)));
            }
            if !keys.insert(key.clone()) {
                return Err(CellfillError::Config(format!(
                    "{}: option '{}' is ambiguous after normalization",
                    context, label
                )));
            }
            let target = resolve_address(&sheet, &coord, &context)?;
            options.push(ChoiceOption { label, key, target });
        }

        let marker = group.marker.unwrap_or_else(|| default_marker.to_string());
        if marker.is_empty() {
            return Err(CellfillError::Config(format!("{}: empty marker", context)));
        }

        choices.push(ChoiceGroup {
            name: group.name,
            field: group.field,
            options,
            marker,
        });
    }

    Ok(SheetMapping {
        name: sheet,
        fields,
        choices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_error(result: Result<TemplateMapping, CellfillError>) -> String {
        match result {
            Err(CellfillError::Config(msg)) => msg,
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_address_field() {
        let mapping = MappingBuilder::new()
            .field("Sheet1", "Configuración MW:", ["D9", "B14", "C28", "F28"])
            .build()
            .unwrap();
        let fields = mapping.fields_for("Sheet1");
        assert_eq!(fields[0].targets.len(), 4);
        assert!(fields[0].targets.iter().all(|a| a.sheet == "Sheet1"));
    }

    #[test]
    fn test_unknown_sheet_is_empty() {
        let mapping = MappingBuilder::new().field("Sheet1", "ID", ["B5"]).build().unwrap();
        assert!(mapping.fields_for("Nope").is_empty());
        assert!(mapping.choice_groups_for("Nope").is_empty());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let msg = config_error(
            MappingBuilder::new()
                .field("Sheet1", "breaker", ["Y47"])
                .field("Sheet1", "breaker", ["AB47"])
                .build(),
        );
        assert!(msg.contains("duplicate field"), "{}", msg);
    }

    #[test]
    fn test_same_field_on_two_sheets_is_fine() {
        let mapping = MappingBuilder::new()
            .field("A", "ID", ["B5"])
            .field("B", "ID", ["B5"])
            .build()
            .unwrap();
        assert_eq!(mapping.sheets().count(), 2);
    }

    #[test]
    fn test_malformed_address_rejected() {
        let msg = config_error(MappingBuilder::new().field("Sheet1", "ID", ["5B"]).build());
        assert!(msg.contains("field 'ID'"), "{}", msg);
    }

    #[test]
    fn test_cross_sheet_address_rejected() {
        let msg = config_error(
            MappingBuilder::new()
                .field("Sheet1", "ID", ["Sheet2!B5"])
                .build(),
        );
        assert!(msg.contains("outside sheet"), "{}", msg);
    }

    #[test]
    fn test_single_option_group_rejected() {
        let msg = config_error(
            MappingBuilder::new()
                .choice("Sheet1", "vis", "Visibilidad", [("si", "P22")])
                .build(),
        );
        assert!(msg.contains("at least two options"), "{}", msg);
    }

    #[test]
    fn test_ambiguous_options_rejected() {
        let msg = config_error(
            MappingBuilder::new()
                .choice("Sheet1", "vis", "Visibilidad", [("Si", "P22"), (" si ", "S22")])
                .build(),
        );
        assert!(msg.contains("ambiguous"), "{}", msg);
    }

    #[test]
    fn test_required_sheets_deduplicated_in_order() {
        let mapping = MappingBuilder::new()
            .field("B", "x", ["A1"])
            .field("A", "y", ["A1"])
            .require_sheet("Cover")
            .require_sheet("A")
            .build()
            .unwrap();
        assert_eq!(mapping.required_sheets(), vec!["B", "A", "Cover"]);
    }

    #[test]
    fn test_marker_override() {
        let mapping = MappingBuilder::new()
            .marker("✓")
            .choice("S", "g1", "f1", [("a", "A1"), ("b", "B1")])
            .choice("S", "g2", "f2", [("a", "A2"), ("b", "B2")])
            .choice_marker("S", "x")
            .build()
            .unwrap();
        let groups = mapping.choice_groups_for("S");
        assert_eq!(groups[0].marker, "✓");
        assert_eq!(groups[1].marker, "x");
    }
}
