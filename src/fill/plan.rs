//! Turning one sheet's mapping and a record into concrete cell writes.

use serde::Serialize;
use std::sync::Arc;

use super::writer::CellWrite;
use crate::mapping::{ChoiceGroup, ChoiceResolution, FieldMapping, SheetMapping};
use crate::normalize::{Record, normalize};

/// A selection that matched no option of its group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceMismatch {
    pub group: String,
    pub field: String,
    pub selection: String,
}

/// One sheet's share of a generation request. Owned by exactly one worker.
#[derive(Debug, Clone)]
pub struct FillUnit {
    pub sheet: String,
    fields: Vec<FieldMapping>,
    choices: Vec<ChoiceGroup>,
    record: Arc<Record>,
}

/// What a unit will write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitPlan {
    pub writes: Vec<CellWrite>,
    pub mismatches: Vec<ChoiceMismatch>,
}

impl FillUnit {
    pub fn new(sheet: &SheetMapping, record: Arc<Record>) -> Self {
        Self {
            sheet: sheet.name.clone(),
            fields: sheet.fields.clone(),
            choices: sheet.choices.clone(),
            record,
        }
    }

    /// Field writes first, in mapping order, then choice groups.
    ///
    /// Each field value is normalized once and copied to every target, so a
    /// multi-address field cannot end up with differing values.
    pub fn plan(&self) -> UnitPlan {
        let mut plan = UnitPlan::default();

        for field in &self.fields {
            let value = normalize(self.record.get(&field.field));
            for target in &field.targets {
                plan.writes.push(CellWrite {
                    field: field.field.clone(),
                    coord: target.coord,
                    value: value.clone(),
                });
            }
        }

        for group in &self.choices {
            let resolution = group.resolve(self.record.get(&group.field));
            if let ChoiceResolution::Unmatched { selection } = &resolution {
                plan.mismatches.push(ChoiceMismatch {
                    group: group.name.clone(),
                    field: group.field.clone(),
                    selection: selection.clone(),
                });
            }
            for (address, value) in group.writes(&resolution) {
                plan.writes.push(CellWrite {
                    field: group.name.clone(),
                    coord: address.coord,
                    value,
                });
            }
        }

        plan
    }
}

/// One [`FillUnit`] per mapped sheet, in mapping order.
pub fn partition<'a>(
    sheets: impl IntoIterator<Item = &'a SheetMapping>,
    record: Arc<Record>,
) -> Vec<FillUnit> {
    sheets
        .into_iter()
        .map(|sheet| FillUnit::new(sheet, record.clone()))
        .collect()
}
