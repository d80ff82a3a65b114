//! JSON form of a [`TemplateMapping`](super::TemplateMapping).
//!
//! ```json
//! {
//!   "required_sheets": ["0. Carátula"],
//!   "sheets": {
//!     "1. Información General A": {
//!       "fields": {
//!         "ID": "AF9",
//!         "Configuración MW:": ["D9", "B14"]
//!       },
//!       "choices": {
//!         "tipo_zona": {
//!           "field": "Tipo de zona",
//!           "options": { "urbana": "L21", "rural": "U21" }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! A field target is a single address string or an array of them. Objects
//! are read as ordered entry lists, so a key repeated inside one object is
//! kept and reported as a duplicate by validation instead of silently
//! overwriting the first occurrence.

use serde::{Deserialize, Serialize};

use super::{MappingBuilder, TemplateMapping};

/// Serializable mapping document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingFile {
    /// Default selected-option marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// Sheets the template must expose beyond the mapped ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_sheets: Vec<String>,
    #[serde(with = "entries")]
    pub sheets: Vec<(String, SheetSection)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetSection {
    #[serde(default, with = "entries", skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<(String, Targets)>,
    #[serde(default, with = "entries", skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<(String, ChoiceSection)>,
}

/// `"B5"` or `["D9", "B14"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    One(String),
    Many(Vec<String>),
}

impl Targets {
    fn into_vec(self) -> Vec<String> {
        match self {
            Targets::One(s) => vec![s],
            Targets::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceSection {
    /// Record field holding the selection.
    pub field: String,
    #[serde(with = "entries")]
    pub options: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl MappingFile {
    pub(super) fn into_builder(self) -> MappingBuilder {
        let mut builder = MappingBuilder::new();
        if let Some(marker) = &self.marker {
            builder = builder.marker(marker);
        }
        for name in &self.required_sheets {
            builder = builder.require_sheet(name);
        }
        for (sheet, section) in self.sheets {
            for (field, targets) in section.fields {
                builder = builder.field(&sheet, &field, targets.into_vec());
            }
            for (name, choice) in section.choices {
                builder = builder.choice(&sheet, &name, &choice.field, choice.options);
                if let Some(marker) = &choice.marker {
                    builder = builder.choice_marker(&sheet, marker);
                }
            }
        }
        builder
    }

    pub(super) fn from_mapping(mapping: &TemplateMapping) -> Self {
        let mapped: Vec<&str> = mapping.sheets().map(|s| s.name.as_str()).collect();
        let sheets = mapping
            .sheets()
            .map(|sheet| {
                let fields = sheet
                    .fields
                    .iter()
                    .map(|f| {
                        let coords: Vec<String> =
                            f.targets.iter().map(|a| a.coord.to_string()).collect();
                        let targets = match coords.as_slice() {
                            [one] => Targets::One(one.clone()),
                            _ => Targets::Many(coords),
                        };
                        (f.field.clone(), targets)
                    })
                    .collect();
                let choices = sheet
                    .choices
                    .iter()
                    .map(|g| {
                        let options = g
                            .options
                            .iter()
                            .map(|o| (o.label.clone(), o.target.coord.to_string()))
                            .collect();
                        let section = ChoiceSection {
                            field: g.field.clone(),
                            options,
                            marker: Some(g.marker.clone()),
                        };
                        (g.name.clone(), section)
                    })
                    .collect();
                (sheet.name.clone(), SheetSection { fields, choices })
            })
            .collect();

        MappingFile {
            marker: None,
            required_sheets: mapping
                .required_sheets()
                .into_iter()
                .filter(|name| !mapped.contains(name))
                .map(String::from)
                .collect(),
            sheets,
        }
    }
}

/// (De)serialize a JSON object as an ordered `Vec<(String, T)>`, keeping
/// repeated keys.
mod entries {
    use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
    use serde::ser::{SerializeMap, Serializer};
    use serde::Serialize;
    use std::fmt;
    use std::marker::PhantomData;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(entries: &Vec<(String, T)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Vec<(String, T)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, T>()? {
                    out.push((k, v));
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}
