//! Mutually-exclusive choice groups (template checkboxes).

use serde::Serialize;

use crate::address::CellAddress;
use crate::normalize::{FieldValue, NOT_AVAILABLE, normalize};

/// Default marker written into the selected option's cell.
pub const DEFAULT_MARKER: &str = "X";

/// One candidate in a [`ChoiceGroup`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOption {
    /// Label as configured ("Urbana", "pueblo mágico").
    pub label: String,
    /// Matching key derived from the label.
    pub key: String,
    pub target: CellAddress,
}

/// A named set of mutually-exclusive options read from one record field.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceGroup {
    pub name: String,
    /// Record field holding the selected option.
    pub field: String,
    pub options: Vec<ChoiceOption>,
    /// Value written into the selected option's cell.
    pub marker: String,
}

/// Outcome of resolving a selection against a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChoiceResolution {
    Selected { option: String, address: CellAddress },
    /// The record carried no selection.
    NoneSelected,
    /// The record carried a selection that matches no option.
    Unmatched { selection: String },
}

/// Case- and whitespace-insensitive matching key.
///
/// No fuzzy matching beyond this: "Sub urbana" does not match "suburbana".
pub fn option_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ChoiceGroup {
    /// Resolve a raw record value to at most one option.
    pub fn resolve(&self, selection: &FieldValue) -> ChoiceResolution {
        let normalized = normalize(selection);
        if normalized == NOT_AVAILABLE {
            return ChoiceResolution::NoneSelected;
        }

        let key = option_key(&normalized);
        match self.options.iter().find(|o| o.key == key) {
            Some(option) => ChoiceResolution::Selected {
                option: option.label.clone(),
                address: option.target.clone(),
            },
            None => ChoiceResolution::Unmatched {
                selection: normalized,
            },
        }
    }

    /// Cell writes that realize a resolution: the marker on the selected
    /// option, an empty value on every other option.
    pub fn writes(&self, resolution: &ChoiceResolution) -> Vec<(CellAddress, String)> {
        let selected = match resolution {
            ChoiceResolution::Selected { address, .. } => Some(address),
            _ => None,
        };

        self.options
            .iter()
            .map(|o| {
                let value = if Some(&o.target) == selected {
                    self.marker.clone()
                } else {
                    String::new()
                };
                (o.target.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zona() -> ChoiceGroup {
        let option = |label: &str, coord: &str| ChoiceOption {
            label: label.to_string(),
            key: option_key(label),
            target: CellAddress::new("Sheet1", coord).unwrap(),
        };
        ChoiceGroup {
            name: "tipo_zona".into(),
            field: "Tipo de zona".into(),
            options: vec![
                option("urbana", "L21"),
                option("suburbana", "P21"),
                option("rural", "U21"),
                option("pueblo mágico", "AB21"),
            ],
            marker: DEFAULT_MARKER.into(),
        }
    }

    #[test]
    fn test_selection_is_case_and_space_insensitive() {
        let group = zona();
        for raw in ["Urbana", " URBANA ", "urbana"] {
            match group.resolve(&FieldValue::from(raw)) {
                ChoiceResolution::Selected { option, address } => {
                    assert_eq!(option, "urbana");
                    assert_eq!(address.to_string(), "Sheet1!L21");
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        assert!(matches!(
            group.resolve(&FieldValue::from("Pueblo   Mágico")),
            ChoiceResolution::Selected { .. }
        ));
    }

    #[test]
    fn test_exactly_one_marker_after_selection() {
        let group = zona();
        let resolution = group.resolve(&FieldValue::from("Urbana"));
        let writes = group.writes(&resolution);

        assert_eq!(writes.len(), 4);
        let marked: Vec<_> = writes.iter().filter(|(_, v)| v == DEFAULT_MARKER).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].0.coord.to_string(), "L21");
        assert!(writes.iter().filter(|(a, _)| a.coord.to_string() != "L21").all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn test_unmatched_selection_marks_nothing() {
        let group = zona();
        let resolution = group.resolve(&FieldValue::from("sub urbana"));
        assert_eq!(
            resolution,
            ChoiceResolution::Unmatched {
                selection: "sub urbana".into()
            }
        );
        assert!(group.writes(&resolution).iter().all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn test_missing_selection() {
        let group = zona();
        assert_eq!(group.resolve(&FieldValue::Missing), ChoiceResolution::NoneSelected);
        assert_eq!(group.resolve(&FieldValue::from("n/a")), ChoiceResolution::NoneSelected);
    }
}
