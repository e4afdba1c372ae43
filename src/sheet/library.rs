//! Library engine: in-process workbook model, headless converter for PDF.
//!
//! The template is loaded into the in-memory model (values and merged
//! regions), edited there, written back out as a spreadsheet file, and
//! converted to PDF by shelling out to the headless converter. The converter
//! names its output after the input file, so the result is renamed to the
//! requested filename afterward; an existing file at the destination is
//! deleted first because the rename would otherwise conflict.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use calamine::{Data, Reader};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Formula, Workbook};

use super::model::{Align, CellRef, CellStyle, CellValue, Edge, MergeRegion, Worksheet};
use super::{ensure_exportable, ensure_writable, ExportOptions, SheetBackend, SheetError, WorkbookState};

pub struct LibraryBackend {
    template_path: PathBuf,
    output_dir: PathBuf,
    /// Stem for the intermediate workbook file (typically the record id).
    workbook_stem: String,
    converter_cmd: String,
    sheet: Option<Worksheet>,
    state: WorkbookState,
}

impl LibraryBackend {
    pub fn new(
        template_path: &Path,
        output_dir: &Path,
        workbook_stem: &str,
        converter_cmd: &str,
    ) -> Self {
        Self {
            template_path: template_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            workbook_stem: workbook_stem.to_string(),
            converter_cmd: converter_cmd.to_string(),
            sheet: None,
            state: WorkbookState::Closed,
        }
    }

    /// Read access to the active sheet model.
    pub fn sheet(&self) -> Option<&Worksheet> {
        self.sheet.as_ref()
    }

    /// Read a cell through merged-anchor resolution.
    pub fn cell_value(&self, cell: &str) -> Result<Option<CellValue>, SheetError> {
        let at = CellRef::parse(cell)?;
        Ok(self.sheet.as_ref().and_then(|s| s.value(at).cloned()))
    }

    fn load_template(&self) -> Result<Worksheet, SheetError> {
        let mut book = calamine::open_workbook::<
            calamine::Xlsx<std::io::BufReader<std::fs::File>>,
            _,
        >(&self.template_path)
        .map_err(|e| SheetError::TemplateRead(e.to_string()))?;
        book.load_merged_regions()
            .map_err(|e| SheetError::TemplateRead(e.to_string()))?;

        let sheet_name = book
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SheetError::TemplateRead("workbook has no sheets".to_string()))?;
        let range = book
            .worksheet_range(&sheet_name)
            .map_err(|e| SheetError::TemplateRead(e.to_string()))?;

        let mut sheet = Worksheet::new(&sheet_name);
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        for (row, col, data) in range.used_cells() {
            let at = CellRef::new(
                (start_col + col as u32 + 1) as u16,
                start_row + row as u32 + 1,
            );
            if let Some(value) = convert_data(data) {
                sheet.set_value(at, value);
            }
        }

        // Dimensions are 0-based; the model is 1-based.
        let merges = book
            .worksheet_merge_cells(&sheet_name)
            .unwrap_or(Ok(Vec::new()))
            .map_err(|e| SheetError::TemplateRead(e.to_string()))?;
        for dims in merges {
            sheet.add_merge(MergeRegion {
                first_col: (dims.start.1 + 1) as u16,
                first_row: dims.start.0 + 1,
                last_col: (dims.end.1 + 1) as u16,
                last_row: dims.end.0 + 1,
            });
        }

        // calamine does not surface formatting, so cell styles come straight
        // out of the package. Without them, inserted rows would have nothing
        // to inherit and the write-back would strip the template's look.
        for (at, style) in super::styles::load_styles(&self.template_path)? {
            sheet.set_style(at, style);
        }

        Ok(sheet)
    }

    /// Write the model out as a spreadsheet file and return its path.
    fn save_workbook(&self) -> Result<PathBuf, SheetError> {
        let sheet = self
            .sheet
            .as_ref()
            .expect("save_workbook called with no open sheet");

        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.xlsx", self.workbook_stem));

        let mut book = Workbook::new();
        let ws = book.add_worksheet();
        ws.set_name(sheet.name()).map_err(SheetError::Write)?;

        // Merge regions first; anchors are overwritten with real values below.
        for merge in sheet.merges() {
            let anchor_style = sheet.style(merge.anchor());
            ws.merge_range(
                merge.first_row - 1,
                merge.first_col - 1,
                merge.last_row - 1,
                merge.last_col - 1,
                "",
                &to_format(&anchor_style),
            )
            .map_err(SheetError::Write)?;
        }

        for (at, cell) in sheet.iter() {
            let format = to_format(&cell.style);
            let (row, col) = (at.row - 1, at.col - 1);
            match &cell.value {
                Some(CellValue::Number(n)) => ws
                    .write_number_with_format(row, col, *n, &format)
                    .map_err(SheetError::Write)?,
                Some(CellValue::Text(s)) => ws
                    .write_string_with_format(row, col, s, &format)
                    .map_err(SheetError::Write)?,
                Some(CellValue::Bool(b)) => ws
                    .write_boolean_with_format(row, col, *b, &format)
                    .map_err(SheetError::Write)?,
                Some(CellValue::Formula(f)) => ws
                    .write_formula_with_format(row, col, Formula::new(f), &format)
                    .map_err(SheetError::Write)?,
                None => ws
                    .write_blank(row, col, &format)
                    .map_err(SheetError::Write)?,
            };
        }

        // Page-fit export: exactly one page wide and tall, zoom disabled by
        // the fit mode itself.
        ws.set_print_fit_to_pages(1, 1);

        book.save(&path).map_err(SheetError::Write)?;
        Ok(path)
    }

    fn convert_to_pdf(&self, workbook_path: &Path, pdf_name: &str) -> Result<PathBuf, SheetError> {
        let status = Command::new(&self.converter_cmd)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&self.output_dir)
            .arg(workbook_path)
            .status()
            .map_err(SheetError::ConverterSpawn)?;

        if !status.success() {
            return Err(SheetError::ConverterExit(status.code().unwrap_or(-1)));
        }

        // The converter names the PDF after the input file.
        let produced = self
            .output_dir
            .join(format!("{}.pdf", self.workbook_stem));
        if !produced.exists() {
            return Err(SheetError::ConverterNoOutput(produced));
        }

        let requested = self.output_dir.join(pdf_name);
        if requested != produced {
            if requested.exists() {
                fs::remove_file(&requested)?;
            }
            fs::rename(&produced, &requested)?;
        }

        Ok(requested
            .canonicalize()
            .unwrap_or(requested))
    }
}

impl SheetBackend for LibraryBackend {
    fn open(&mut self) -> Result<(), SheetError> {
        if !self.template_path.exists() {
            return Err(SheetError::TemplateMissing(self.template_path.clone()));
        }
        self.sheet = Some(self.load_template()?);
        self.state = WorkbookState::Open;
        log::debug!("opened template {}", self.template_path.display());
        Ok(())
    }

    fn write_cell(&mut self, cell: &str, value: CellValue) -> Result<(), SheetError> {
        ensure_writable("write_cell", self.state)?;
        let at = CellRef::parse(cell)?;
        let sheet = self.sheet.as_mut().expect("open state implies a sheet");
        sheet.set_value(at, value);
        self.state = WorkbookState::Modified;
        Ok(())
    }

    fn insert_row(&mut self, index: u32) -> Result<(), SheetError> {
        ensure_writable("insert_row", self.state)?;
        let sheet = self.sheet.as_mut().expect("open state implies a sheet");
        sheet.insert_row(index);
        self.state = WorkbookState::Modified;
        Ok(())
    }

    fn export_pdf(&mut self, options: &ExportOptions) -> Result<PathBuf, SheetError> {
        ensure_exportable("export_pdf", self.state)?;
        let workbook_path = self.save_workbook()?;
        let pdf = self.convert_to_pdf(&workbook_path, &options.pdf_name)?;
        self.state = WorkbookState::Exported;
        log::info!("exported {}", pdf.display());
        Ok(pdf)
    }

    fn close(&mut self) {
        self.sheet = None;
        self.state = WorkbookState::Closed;
    }
}

fn convert_data(data: &Data) -> Option<CellValue> {
    match data {
        Data::Empty => None,
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        Data::DateTime(dt) => Some(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
        Data::Error(_) => None,
    }
}

fn to_format(style: &CellStyle) -> Format {
    let mut format = Format::new();
    if style.bold {
        format = format.set_bold();
    }
    if style.italic {
        format = format.set_italic();
    }
    if let Some(size) = style.font_size {
        format = format.set_font_size(size);
    }
    if let Some(name) = &style.font_name {
        format = format.set_font_name(name);
    }
    if let Some(rgb) = style.fill {
        format = format.set_background_color(Color::RGB(rgb));
    }
    format = format
        .set_border_left(to_border(style.border.left))
        .set_border_right(to_border(style.border.right))
        .set_border_top(to_border(style.border.top))
        .set_border_bottom(to_border(style.border.bottom));
    if let Some(align) = style.align {
        format = format.set_align(match align {
            Align::Left => FormatAlign::Left,
            Align::Center => FormatAlign::Center,
            Align::Right => FormatAlign::Right,
        });
    }
    if let Some(num) = &style.number_format {
        format = format.set_num_format(num);
    }
    format
}

fn to_border(edge: Edge) -> FormatBorder {
    match edge {
        Edge::None => FormatBorder::None,
        Edge::Thin => FormatBorder::Thin,
        Edge::Medium => FormatBorder::Medium,
    }
}
