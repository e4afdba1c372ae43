//! In-memory worksheet model for the library engine.
//!
//! Rows and columns are 1-based, matching A1 references. Merged regions are
//! tracked explicitly: any read or write inside a region is redirected to its
//! top-left anchor, because only the anchor stores a value in the underlying
//! format. Row insertion copies the full style (font, fill, border,
//! alignment, number format) from the row above, since the format does not
//! propagate styles across an insert on its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SheetError;

/// A 1-based (column, row) cell address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: u16,
    pub row: u32,
}

impl CellRef {
    pub fn new(col: u16, row: u32) -> Self {
        Self { col, row }
    }

    /// Parse an A1-style reference such as `"D10"` or `"AB3"`.
    pub fn parse(reference: &str) -> Result<Self, SheetError> {
        let reference = reference.trim();
        let split = reference
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| SheetError::BadCellRef(reference.to_string()))?;
        let (letters, digits) = reference.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SheetError::BadCellRef(reference.to_string()));
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        let row: u32 = digits
            .parse()
            .map_err(|_| SheetError::BadCellRef(reference.to_string()))?;
        if row == 0 || col == 0 || col > u16::MAX as u32 {
            return Err(SheetError::BadCellRef(reference.to_string()));
        }
        Ok(Self {
            col: col as u16,
            row,
        })
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut col = self.col as u32;
        let mut letters = Vec::new();
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        letters.reverse();
        let letters: String = letters.into_iter().collect();
        write!(f, "{letters}{}", self.row)
    }
}

/// A cell value. Formulas carry their source text and are evaluated by the
/// engine, not by this model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Formula(String),
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    #[default]
    None,
    Thin,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Borders {
    pub left: Edge,
    pub right: Edge,
    pub top: Edge,
    pub bottom: Edge,
}

impl Borders {
    pub fn thin() -> Self {
        Self {
            left: Edge::Thin,
            right: Edge::Thin,
            top: Edge::Thin,
            bottom: Edge::Thin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Everything `insert_row` must carry over from the row above.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    pub font_size: Option<f64>,
    pub font_name: Option<String>,
    /// Fill color as 0xRRGGBB.
    pub fill: Option<u32>,
    pub border: Borders,
    pub align: Option<Align>,
    pub number_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRegion {
    pub first_col: u16,
    pub first_row: u32,
    pub last_col: u16,
    pub last_row: u32,
}

impl MergeRegion {
    pub fn contains(&self, at: CellRef) -> bool {
        at.row >= self.first_row
            && at.row <= self.last_row
            && at.col >= self.first_col
            && at.col <= self.last_col
    }

    pub fn anchor(&self) -> CellRef {
        CellRef::new(self.first_col, self.first_row)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: Option<CellValue>,
    pub style: CellStyle,
}

#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    /// Keyed by (row, col), both 1-based.
    cells: BTreeMap<(u32, u16), Cell>,
    merges: Vec<MergeRegion>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            merges: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_merge(&mut self, region: MergeRegion) {
        self.merges.push(region);
    }

    pub fn merges(&self) -> &[MergeRegion] {
        &self.merges
    }

    /// Redirect an address inside a merged region to the region's top-left
    /// anchor. Addresses outside any region map to themselves.
    pub fn resolve_anchor(&self, at: CellRef) -> CellRef {
        self.merges
            .iter()
            .find(|m| m.contains(at))
            .map(MergeRegion::anchor)
            .unwrap_or(at)
    }

    pub fn set_value(&mut self, at: CellRef, value: CellValue) {
        let anchor = self.resolve_anchor(at);
        self.cells
            .entry((anchor.row, anchor.col))
            .or_default()
            .value = Some(value);
    }

    pub fn value(&self, at: CellRef) -> Option<&CellValue> {
        let anchor = self.resolve_anchor(at);
        self.cells
            .get(&(anchor.row, anchor.col))
            .and_then(|c| c.value.as_ref())
    }

    pub fn set_style(&mut self, at: CellRef, style: CellStyle) {
        self.cells.entry((at.row, at.col)).or_default().style = style;
    }

    pub fn style(&self, at: CellRef) -> CellStyle {
        self.cells
            .get(&(at.row, at.col))
            .map(|c| c.style.clone())
            .unwrap_or_default()
    }

    /// Shift all rows at or below `index` down by one. The new row at
    /// `index` inherits cell styles (not values) from `index - 1`; when
    /// `index` is the first row there is nothing above to copy.
    pub fn insert_row(&mut self, index: u32) {
        let mut shifted = BTreeMap::new();
        for ((row, col), cell) in std::mem::take(&mut self.cells) {
            let target = if row >= index { row + 1 } else { row };
            shifted.insert((target, col), cell);
        }
        self.cells = shifted;

        for merge in &mut self.merges {
            if merge.first_row >= index {
                merge.first_row += 1;
                merge.last_row += 1;
            } else if merge.last_row >= index {
                // The insert lands inside the region, which grows.
                merge.last_row += 1;
            }
        }

        if index >= 2 {
            let template_row = index - 1;
            let styled: Vec<(u16, CellStyle)> = self
                .cells
                .range((template_row, 0)..(template_row + 1, 0))
                .map(|((_, col), cell)| (*col, cell.style.clone()))
                .collect();
            for (col, style) in styled {
                self.cells.insert(
                    (index, col),
                    Cell {
                        value: None,
                        style,
                    },
                );
            }
        }
    }

    /// All populated cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.cells
            .iter()
            .map(|((row, col), cell)| (CellRef::new(*col, *row), cell))
    }
}
