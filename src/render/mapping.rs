//! Field-to-cell mapping configuration.
//!
//! The exact cell addresses and aggregation filters for the cost-cover sheet
//! were still being iterated on by the estimating team, so they are
//! configuration data, not code: the built-in defaults can be overridden by
//! a JSON file (`CELL_MAP_FILE`). Any subset of fields may be overridden.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RenderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageColumns {
    /// Fresh sheet, filled in by the main contractor.
    pub draft: String,
    /// Sheet under consultant review.
    pub review: String,
    /// Sheet accepted by the owner.
    pub approved: String,
}

impl Default for StageColumns {
    fn default() -> Self {
        Self {
            draft: "D".to_string(),
            review: "E".to_string(),
            approved: "F".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountRows {
    pub original_amount: u32,
    pub period_amount: u32,
    pub mobilization: u32,
    pub materials: u32,
}

impl Default for AmountRows {
    fn default() -> Self {
        Self {
            original_amount: 10,
            period_amount: 20,
            mobilization: 23,
            materials: 26,
        }
    }
}

/// Sum cost-item estimates whose split-number prefix matches, into one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRow {
    pub prefix: String,
    pub row: u32,
}

/// Copy a payment property value into a row when its name contains the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRow {
    pub name_contains: String,
    pub row: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingMap {
    pub start_row: u32,
    pub code_col: String,
    pub name_col: String,
    pub unit_price_col: String,
}

impl Default for ListingMap {
    fn default() -> Self {
        Self {
            start_row: 11,
            code_col: "A".to_string(),
            name_col: "B".to_string(),
            unit_price_col: "D".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormsMap {
    pub header_row: u32,
    pub start_row: u32,
    pub id_col: String,
    pub name_col: String,
    pub status_col: String,
}

impl Default for FormsMap {
    fn default() -> Self {
        Self {
            header_row: 1,
            start_row: 2,
            id_col: "A".to_string(),
            name_col: "B".to_string(),
            status_col: "C".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellMap {
    pub title_cell: String,
    pub subtitle_cell: String,
    pub start_date_cell: String,
    pub end_date_cell: String,
    pub sequence_cell: String,
    pub reviewer_cell: String,
    /// `{end_date}` is replaced by the formatted period end.
    pub title_template: String,
    /// `{seq}` is replaced by the running certificate number.
    pub subtitle_template: String,
    pub stage_columns: StageColumns,
    pub amount_rows: AmountRows,
    pub prefix_rows: Vec<PrefixRow>,
    pub property_rows: Vec<PropertyRow>,
    /// Payment-item codes that count toward mobilization.
    pub mobilization_codes: Vec<String>,
    pub budgets: ListingMap,
    pub forms: FormsMap,
}

impl Default for CellMap {
    fn default() -> Self {
        Self {
            title_cell: "D2".to_string(),
            subtitle_cell: "E4".to_string(),
            start_date_cell: "C6".to_string(),
            end_date_cell: "F6".to_string(),
            sequence_cell: "C44".to_string(),
            reviewer_cell: "D52".to_string(),
            title_template: "أعمال حتى {end_date}".to_string(),
            subtitle_template: "مستخلص جاري رقم ({seq})".to_string(),
            stage_columns: StageColumns::default(),
            amount_rows: AmountRows::default(),
            prefix_rows: vec![
                PrefixRow {
                    prefix: "NIC".to_string(),
                    row: 13,
                },
                PrefixRow {
                    prefix: "SIC".to_string(),
                    row: 14,
                },
                PrefixRow {
                    prefix: "REM".to_string(),
                    row: 15,
                },
                PrefixRow {
                    prefix: "INF".to_string(),
                    row: 16,
                },
            ],
            property_rows: vec![
                PropertyRow {
                    name_contains: "000".to_string(),
                    row: 35,
                },
                PropertyRow {
                    name_contains: "001".to_string(),
                    row: 36,
                },
                PropertyRow {
                    name_contains: "002".to_string(),
                    row: 37,
                },
                PropertyRow {
                    name_contains: "003".to_string(),
                    row: 38,
                },
                PropertyRow {
                    name_contains: "006".to_string(),
                    row: 45,
                },
            ],
            mobilization_codes: vec!["01-71".to_string(), "01-72".to_string()],
            budgets: ListingMap::default(),
            forms: FormsMap::default(),
        }
    }
}

impl CellMap {
    /// Built-in defaults, optionally overlaid by a JSON file.
    pub fn load(path: Option<&Path>) -> Result<Self, RenderError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .map_err(|e| RenderError::Mapping(format!("{}: {e}", path.display())))?;
                serde_json::from_str(&raw)
                    .map_err(|e| RenderError::Mapping(format!("{}: {e}", path.display())))
            }
        }
    }
}
