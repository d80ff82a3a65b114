//! # Cell Addressing
//!
//! A1-style coordinates, ranges and sheet-qualified addresses.
//!
//! ## Grammar
//!
//! ```text
//! coordinate = column row          ; "B5", "AF9", "XFD1048576"
//! column     = 1*3 ALPHA           ; A..XFD (1..=16384)
//! row        = nonzero *DIGIT      ; 1..=1048576
//! range      = coordinate [ ":" coordinate ]
//! address    = [ sheet "!" ] range ; sheet may be 'single quoted'
//! ```
//!
//! Column letters are case-insensitive and stored uppercase.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest column index (XFD).
pub const MAX_COLUMN: u32 = 16_384;

/// Highest row index.
pub const MAX_ROW: u32 = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty sheet name in address '{0}'")]
    EmptySheet(String),
    #[error("malformed coordinate '{0}'")]
    Malformed(String),
    #[error("coordinate '{0}' is outside the sheet bounds")]
    OutOfBounds(String),
    #[error("range '{0}' ends before it starts")]
    Inverted(String),
}

/// A single cell position. Both indices are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub row: u32,
    pub col: u32,
}

impl Coordinate {
    pub fn new(col: u32, row: u32) -> Result<Self, AddressError> {
        if col == 0 || col > MAX_COLUMN || row == 0 || row > MAX_ROW {
            return Err(AddressError::OutOfBounds(format!("col {} row {}", col, row)));
        }
        Ok(Self { row, col })
    }

    /// Column letters for this coordinate ("A", "AF", ...).
    pub fn column_name(&self) -> String {
        column_name(self.col)
    }
}

/// Convert a 1-based column index to letters.
pub fn column_name(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

impl FromStr for Coordinate {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
        let (letters, digits) = s.split_at(split);

        if letters.is_empty()
            || letters.len() > 3
            || !letters.chars().all(|c| c.is_ascii_alphabetic())
            || digits.starts_with('0')
            || !digits.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AddressError::Malformed(s.to_string()));
        }

        let col = letters
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + (b.to_ascii_uppercase() - b'A' + 1) as u32);
        let row: u32 = digits
            .parse()
            .map_err(|_| AddressError::OutOfBounds(s.to_string()))?;

        Coordinate::new(col, row).map_err(|_| AddressError::OutOfBounds(s.to_string()))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_name(), self.row)
    }
}

/// A rectangular block of cells, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: Coordinate,
    pub end: Coordinate,
}

impl CellRange {
    pub fn single(coord: Coordinate) -> Self {
        Self {
            start: coord,
            end: coord,
        }
    }

    pub fn columns(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn rows(&self) -> u32 {
        self.end.row - self.start.row + 1
    }
}

impl FromStr for CellRange {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => Ok(CellRange::single(s.parse()?)),
            Some((a, b)) => {
                let start: Coordinate = a.parse()?;
                let end: Coordinate = b.parse()?;
                if end.col < start.col || end.row < start.row {
                    return Err(AddressError::Inverted(s.to_string()));
                }
                Ok(CellRange { start, end })
            }
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Split `Sheet!A1` into its sheet and local parts, unquoting `'...'` names.
fn split_sheet(s: &str) -> Result<(String, &str), AddressError> {
    let (sheet, local) = s
        .rsplit_once('!')
        .ok_or_else(|| AddressError::EmptySheet(s.to_string()))?;
    let sheet = sheet
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .map(|inner| inner.replace("''", "'"))
        .unwrap_or_else(|| sheet.to_string());
    if sheet.trim().is_empty() {
        return Err(AddressError::EmptySheet(s.to_string()));
    }
    Ok((sheet, local))
}

fn fmt_sheet(sheet: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        write!(f, "{}", sheet)
    } else {
        write!(f, "'{}'", sheet.replace('\'', "''"))
    }
}

/// One writable location in the target document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub sheet: String,
    pub coord: Coordinate,
}

impl CellAddress {
    pub fn new(sheet: impl Into<String>, coord: &str) -> Result<Self, AddressError> {
        let sheet = sheet.into();
        if sheet.trim().is_empty() {
            return Err(AddressError::EmptySheet(coord.to_string()));
        }
        Ok(Self {
            sheet,
            coord: coord.parse()?,
        })
    }
}

impl FromStr for CellAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, local) = split_sheet(s)?;
        Ok(Self {
            sheet,
            coord: local.parse()?,
        })
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_sheet(&self.sheet, f)?;
        write!(f, "!{}", self.coord)
    }
}

/// A sheet-qualified range, used as an image destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeAddress {
    pub sheet: String,
    pub range: CellRange,
}

impl RangeAddress {
    pub fn new(sheet: impl Into<String>, range: &str) -> Result<Self, AddressError> {
        let sheet = sheet.into();
        if sheet.trim().is_empty() {
            return Err(AddressError::EmptySheet(range.to_string()));
        }
        Ok(Self {
            sheet,
            range: range.parse()?,
        })
    }
}

impl FromStr for RangeAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, local) = split_sheet(s)?;
        Ok(Self {
            sheet,
            range: local.parse()?,
        })
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_sheet(&self.sheet, f)?;
        write!(f, "!{}", self.range)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Coordinate);
string_serde!(CellRange);
string_serde!(CellAddress);
string_serde!(RangeAddress);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        assert_eq!("B5".parse::<Coordinate>().unwrap(), Coordinate { col: 2, row: 5 });
        assert_eq!("af9".parse::<Coordinate>().unwrap(), Coordinate { col: 32, row: 9 });
        assert_eq!(
            "XFD1048576".parse::<Coordinate>().unwrap(),
            Coordinate { col: MAX_COLUMN, row: MAX_ROW }
        );
    }

    #[test]
    fn test_reject_malformed_coordinates() {
        for bad in ["", "5B", "B", "12", "B0", "B05", "ABCD1", "B5x", "B-5"] {
            assert!(bad.parse::<Coordinate>().is_err(), "{} should be rejected", bad);
        }
        assert!(matches!(
            "XFE1".parse::<Coordinate>(),
            Err(AddressError::OutOfBounds(_))
        ));
        assert!(matches!(
            "A1048577".parse::<Coordinate>(),
            Err(AddressError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_column_names_roundtrip() {
        for (col, name) in [(1, "A"), (26, "Z"), (27, "AA"), (52, "AZ"), (703, "AAA")] {
            assert_eq!(column_name(col), name);
        }
    }

    #[test]
    fn test_ranges() {
        let range: CellRange = "B2:D8".parse().unwrap();
        assert_eq!(range.columns(), 3);
        assert_eq!(range.rows(), 7);
        assert_eq!(range.to_string(), "B2:D8");
        assert!(matches!("D8:B2".parse::<CellRange>(), Err(AddressError::Inverted(_))));
    }

    #[test]
    fn test_sheet_qualified_addresses() {
        let addr: CellAddress = "Sheet1!B5".parse().unwrap();
        assert_eq!(addr.sheet, "Sheet1");
        assert_eq!(addr.to_string(), "Sheet1!B5");

        let quoted: CellAddress = "'1. Información General A'!J9".parse().unwrap();
        assert_eq!(quoted.sheet, "1. Información General A");
        assert_eq!(quoted.to_string(), "'1. Información General A'!J9");

        assert!(matches!("!B5".parse::<CellAddress>(), Err(AddressError::EmptySheet(_))));
        assert!(matches!("B5".parse::<CellAddress>(), Err(AddressError::EmptySheet(_))));
    }

    #[test]
    fn test_range_address_serde() {
        let addr: RangeAddress = serde_json::from_str(r#""'4. Planos A'!B2:H20""#).unwrap();
        assert_eq!(addr.sheet, "4. Planos A");
        assert_eq!(addr.range.to_string(), "B2:H20");
        assert_eq!(serde_json::to_string(&addr).unwrap(), r#""'4. Planos A'!B2:H20""#);
    }
}
