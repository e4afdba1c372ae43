//! Template formatting extraction.
//!
//! calamine surfaces values and merged regions but not formatting, so cell
//! styles are read straight out of the template package: `xl/styles.xml`
//! holds the component tables (fonts, fills, borders, number formats,
//! cell formats), and the worksheet part maps each cell to a format index
//! via the `s` attribute on `<c>`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::model::{Align, Borders, CellRef, CellStyle, Edge};
use super::SheetError;

type Package = zip::ZipArchive<BufReader<File>>;

/// Every cell of the first worksheet that carries a non-default format,
/// paired with that format. Templates without a styles part yield nothing.
pub(crate) fn load_styles(path: &Path) -> Result<Vec<(CellRef, CellStyle)>, SheetError> {
    let file = File::open(path)?;
    let mut package =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| SheetError::TemplateRead(e.to_string()))?;

    let formats = match read_part(&mut package, "xl/styles.xml")? {
        Some(xml) => parse_format_table(&xml)?,
        None => return Ok(Vec::new()),
    };
    let Some(sheet_part) = first_sheet_part(&package) else {
        return Ok(Vec::new());
    };
    let Some(xml) = read_part(&mut package, &sheet_part)? else {
        return Ok(Vec::new());
    };

    let mut styled = Vec::new();
    for (at, index) in parse_cell_format_indices(&xml)? {
        if let Some(style) = formats.get(index) {
            if *style != CellStyle::default() {
                styled.push((at, style.clone()));
            }
        }
    }
    Ok(styled)
}

fn read_part(package: &mut Package, name: &str) -> Result<Option<String>, SheetError> {
    match package.by_name(name) {
        Ok(mut part) => {
            let mut xml = String::new();
            part.read_to_string(&mut xml)?;
            Ok(Some(xml))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(SheetError::TemplateRead(e.to_string())),
    }
}

/// The loader only reads the first sheet, which writers store as
/// `sheet1.xml`. Fall back to the lexicographically first worksheet part for
/// packages with other naming.
fn first_sheet_part(package: &Package) -> Option<String> {
    let mut parts: Vec<&str> = package
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .collect();
    if parts.iter().any(|n| *n == "xl/worksheets/sheet1.xml") {
        return Some("xl/worksheets/sheet1.xml".to_string());
    }
    parts.sort_unstable();
    parts.first().map(|n| n.to_string())
}

#[derive(Debug, Clone, Default)]
struct Font {
    bold: bool,
    italic: bool,
    size: Option<f64>,
    name: Option<String>,
}

/// Resolve `xl/styles.xml` into one flat `CellStyle` per `<cellXfs>` entry.
fn parse_format_table(xml: &str) -> Result<Vec<CellStyle>, SheetError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut number_formats: HashMap<u32, String> = HashMap::new();
    let mut fonts: Vec<Font> = Vec::new();
    let mut fills: Vec<Option<u32>> = Vec::new();
    let mut borders: Vec<Borders> = Vec::new();
    let mut formats: Vec<CellStyle> = Vec::new();

    // <dxfs> entries nest their own font/fill/border elements and must not
    // leak into the shared tables. Only <cellXfs> entries become cell
    // formats; <cellStyleXfs> reuses the same <xf> element name.
    let mut in_dxfs = false;
    let mut in_cell_xfs = false;
    let mut font: Option<Font> = None;
    let mut fill_solid = false;
    let mut fill_rgb: Option<u32> = None;
    let mut border: Option<Borders> = None;
    let mut format: Option<CellStyle> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) if in_dxfs => {}
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"dxfs" => in_dxfs = true,
                b"cellXfs" => in_cell_xfs = true,
                b"font" => font = Some(Font::default()),
                b"fill" => {
                    fill_solid = false;
                    fill_rgb = None;
                }
                b"patternFill" => {
                    fill_solid = attr(e, b"patternType").as_deref() == Some("solid");
                }
                b"border" => border = Some(Borders::default()),
                b"left" | b"right" | b"top" | b"bottom" => {
                    apply_border_edge(border.as_mut(), e);
                }
                b"xf" if in_cell_xfs => format = Some(resolve_format(
                    e,
                    &number_formats,
                    &fonts,
                    &fills,
                    &borders,
                )),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"numFmt" => {
                    if let (Some(id), Some(code)) = (
                        attr(e, b"numFmtId").and_then(|v| v.parse().ok()),
                        attr(e, b"formatCode"),
                    ) {
                        number_formats.insert(id, code);
                    }
                }
                b"font" => fonts.push(Font::default()),
                b"b" => set_font_flag(font.as_mut(), e, |f| f.bold = true),
                b"i" => set_font_flag(font.as_mut(), e, |f| f.italic = true),
                b"sz" => {
                    if let Some(f) = font.as_mut() {
                        f.size = attr(e, b"val").and_then(|v| v.parse().ok());
                    }
                }
                b"name" => {
                    if let Some(f) = font.as_mut() {
                        f.name = attr(e, b"val");
                    }
                }
                b"fill" => fills.push(None),
                b"patternFill" => {
                    fill_solid = attr(e, b"patternType").as_deref() == Some("solid");
                }
                b"fgColor" => {
                    fill_rgb = attr(e, b"rgb")
                        .and_then(|v| u32::from_str_radix(&v, 16).ok())
                        // ARGB on the wire; the model keeps 0xRRGGBB.
                        .map(|argb| argb & 0x00FF_FFFF);
                }
                b"border" => borders.push(Borders::default()),
                b"left" | b"right" | b"top" | b"bottom" => {
                    apply_border_edge(border.as_mut(), e);
                }
                b"xf" if in_cell_xfs => formats.push(resolve_format(
                    e,
                    &number_formats,
                    &fonts,
                    &fills,
                    &borders,
                )),
                b"alignment" => {
                    if let Some(style) = format.as_mut() {
                        style.align = match attr(e, b"horizontal").as_deref() {
                            Some("left") => Some(Align::Left),
                            Some("center") => Some(Align::Center),
                            Some("right") => Some(Align::Right),
                            _ => None,
                        };
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"dxfs" => in_dxfs = false,
                b"cellXfs" => in_cell_xfs = false,
                b"font" if !in_dxfs => {
                    if let Some(f) = font.take() {
                        fonts.push(f);
                    }
                }
                b"fill" if !in_dxfs => {
                    fills.push(if fill_solid { fill_rgb } else { None });
                }
                b"border" if !in_dxfs => {
                    if let Some(b) = border.take() {
                        borders.push(b);
                    }
                }
                b"xf" if in_cell_xfs => {
                    if let Some(style) = format.take() {
                        formats.push(style);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SheetError::TemplateRead(e.to_string())),
        }
    }

    Ok(formats)
}

fn resolve_format(
    xf: &BytesStart<'_>,
    number_formats: &HashMap<u32, String>,
    fonts: &[Font],
    fills: &[Option<u32>],
    borders: &[Borders],
) -> CellStyle {
    let id = |name: &[u8]| attr(xf, name).and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);

    let mut style = CellStyle::default();
    if let Some(font) = fonts.get(id(b"fontId")) {
        style.bold = font.bold;
        style.italic = font.italic;
        style.font_size = font.size;
        style.font_name = font.name.clone();
    }
    style.fill = fills.get(id(b"fillId")).copied().flatten();
    style.border = borders.get(id(b"borderId")).copied().unwrap_or_default();

    let numfmt = id(b"numFmtId") as u32;
    style.number_format = number_formats
        .get(&numfmt)
        .cloned()
        .or_else(|| builtin_number_format(numfmt));
    style
}

/// The handful of builtin ids templates actually use; custom codes live in
/// `<numFmts>` and override these.
fn builtin_number_format(id: u32) -> Option<String> {
    let code = match id {
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        14 => "m/d/yyyy",
        _ => return None,
    };
    Some(code.to_string())
}

fn apply_border_edge(border: Option<&mut Borders>, e: &BytesStart<'_>) {
    let Some(border) = border else { return };
    let edge = match attr(e, b"style").as_deref() {
        None | Some("none") => Edge::None,
        Some("medium") | Some("thick") | Some("double") => Edge::Medium,
        Some(_) => Edge::Thin,
    };
    match e.name().as_ref() {
        b"left" => border.left = edge,
        b"right" => border.right = edge,
        b"top" => border.top = edge,
        b"bottom" => border.bottom = edge,
        _ => {}
    }
}

fn set_font_flag(font: Option<&mut Font>, e: &BytesStart<'_>, set: impl FnOnce(&mut Font)) {
    if let Some(font) = font {
        // `<b val="0"/>` turns the flag off; bare `<b/>` turns it on.
        let off = matches!(attr(e, b"val").as_deref(), Some("0") | Some("false"));
        if !off {
            set(font);
        }
    }
}

/// `(cell, cellXfs index)` for every `<c>` carrying an `s` attribute.
fn parse_cell_format_indices(xml: &str) -> Result<Vec<(CellRef, usize)>, SheetError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut indices = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"c" => {
                let reference = attr(e, b"r");
                let index = attr(e, b"s").and_then(|v| v.parse::<usize>().ok());
                if let (Some(reference), Some(index)) = (reference, index) {
                    if index > 0 {
                        if let Ok(at) = CellRef::parse(&reference) {
                            indices.push((at, index));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(SheetError::TemplateRead(e.to_string())),
        }
    }
    Ok(indices)
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}
