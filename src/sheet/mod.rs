//! Spreadsheet backend adapter.
//!
//! One uniform contract over two engines:
//! - `library` - in-process document model; PDF via a headless converter
//!   subprocess.
//! - `automation` - a live spreadsheet application driven through a bridge
//!   subprocess speaking line-delimited JSON.
//!
//! Every handle walks the same state machine:
//! Closed -> Open -> Modified -> Exported -> Closed. Writes are valid in
//! Open/Modified, export in any open state (re-exporting an unmodified
//! workbook is permitted), and `close` is valid anywhere and idempotent.

pub mod automation;
pub mod library;
pub mod model;
mod styles;


pub use automation::AutomationBackend;
pub use library::LibraryBackend;
pub use model::{Align, Borders, CellRef, CellStyle, CellValue, Edge, MergeRegion, Worksheet};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{PlatformConfig, SheetEngine};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("template not found: {0}")]
    TemplateMissing(PathBuf),
    #[error("failed to read template: {0}")]
    TemplateRead(String),
    #[error("invalid cell reference {0:?}")]
    BadCellRef(String),
    #[error("workbook is {state:?}, cannot {op}")]
    InvalidState {
        op: &'static str,
        state: WorkbookState,
    },
    #[error("failed to write workbook: {0}")]
    Write(#[source] rust_xlsxwriter::XlsxError),
    #[error("converter failed to start: {0}")]
    ConverterSpawn(#[source] std::io::Error),
    #[error("converter exited with status {0}")]
    ConverterExit(i32),
    #[error("converter produced no output at {0}")]
    ConverterNoOutput(PathBuf),
    #[error("bridge error: {0}")]
    Bridge(String),
    #[error("workbook I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookState {
    Closed,
    Open,
    Modified,
    Exported,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Final PDF filename (the converter's own naming is corrected to this).
    pub pdf_name: String,
}

/// The uniform capability set both engines expose.
pub trait SheetBackend: Send {
    /// Acquire exclusive access to one workbook instance.
    fn open(&mut self) -> Result<(), SheetError>;
    /// Write a value at an A1-style reference, resolving merged-cell anchors.
    fn write_cell(&mut self, cell: &str, value: CellValue) -> Result<(), SheetError>;
    /// Shift rows at or below `index` down by one; the new row inherits
    /// formatting (not values) from the row above.
    fn insert_row(&mut self, index: u32) -> Result<(), SheetError>;
    /// Render to PDF with single-page-wide/tall fitting; returns the
    /// absolute output path.
    fn export_pdf(&mut self, options: &ExportOptions) -> Result<PathBuf, SheetError>;
    /// Release the workbook. Idempotent; valid in any state.
    fn close(&mut self);
}

/// Config-time strategy selection: one engine per deployment.
pub fn create_backend(
    config: &PlatformConfig,
    template: &Path,
    workbook_stem: &str,
) -> Box<dyn SheetBackend> {
    match config.sheet_engine {
        SheetEngine::Library => Box::new(LibraryBackend::new(
            template,
            &config.output_dir,
            workbook_stem,
            &config.converter_cmd,
        )),
        SheetEngine::Automation => Box::new(AutomationBackend::new(
            template,
            &config.output_dir,
            &config.bridge_cmd,
        )),
    }
}

pub(crate) fn ensure_writable(op: &'static str, state: WorkbookState) -> Result<(), SheetError> {
    match state {
        WorkbookState::Open | WorkbookState::Modified => Ok(()),
        other => Err(SheetError::InvalidState { op, state: other }),
    }
}

pub(crate) fn ensure_exportable(op: &'static str, state: WorkbookState) -> Result<(), SheetError> {
    match state {
        WorkbookState::Closed => Err(SheetError::InvalidState { op, state }),
        _ => Ok(()),
    }
}
