//! Office Open XML workbook (.xlsx) decoder.
//!
//! A zip archive of XML parts: relationships name the workbook, styles
//! and shared-string parts, the workbook part names the sheets, and
//! each sheet part is pulled through a streaming XML reader. Number
//! formats flow through the same [`Formatter`] as the binary decoder.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use zip::read::{ZipArchive, ZipFile};
use zip::result::ZipError;

use crate::cell::Value;
use crate::errors::from_err;
use crate::formats::Formatter;
use crate::sheet::{Sheet, SheetVisible};

const REL_OFFICE_DOCUMENT: &str = "officeDocument";
const REL_WORKSHEET: &str = "worksheet";
const REL_STYLES: &str = "styles";
const REL_SHARED_STRINGS: &str = "sharedStrings";
const REL_HYPERLINK: &str = "hyperlink";

/// An enum for xlsx specific errors.
#[derive(Debug)]
pub enum XlsxError {
    /// IO error
    Io(io::Error),
    /// error reading the zip container
    Zip(ZipError),
    /// error parsing xml
    Xml(quick_xml::Error),
    /// error parsing xml attributes
    XmlAttr(quick_xml::events::attributes::AttrError),
    /// numeric cell text failed to parse
    ParseFloat(std::num::ParseFloatError),
    /// numeric attribute failed to parse
    ParseInt(std::num::ParseIntError),
    /// the archive has no workbook part
    MissingWorkbook,
    /// malformed A1-style cell reference
    CellRef(String),
    /// no sheet with this name
    WorksheetNotFound(String),
}

from_err!(io::Error, XlsxError, Io);
from_err!(ZipError, XlsxError, Zip);
from_err!(quick_xml::Error, XlsxError, Xml);
from_err!(quick_xml::events::attributes::AttrError, XlsxError, XmlAttr);
from_err!(std::num::ParseFloatError, XlsxError, ParseFloat);
from_err!(std::num::ParseIntError, XlsxError, ParseInt);

impl XlsxError {
    pub(crate) fn is_not_in_format(&self) -> bool {
        // not a zip at all, or a zip with no workbook inside
        matches!(
            self,
            XlsxError::Zip(ZipError::InvalidArchive(_))
                | XlsxError::Zip(ZipError::UnsupportedArchive(_))
                | XlsxError::Zip(ZipError::FileNotFound)
                | XlsxError::MissingWorkbook
        )
    }
}

impl fmt::Display for XlsxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XlsxError::Io(e) => write!(f, "{e}"),
            XlsxError::Zip(e) => write!(f, "zip error: {e}"),
            XlsxError::Xml(e) => write!(f, "xml error: {e}"),
            XlsxError::XmlAttr(e) => write!(f, "xml attribute error: {e}"),
            XlsxError::ParseFloat(e) => write!(f, "{e}"),
            XlsxError::ParseInt(e) => write!(f, "{e}"),
            XlsxError::MissingWorkbook => write!(f, "archive holds no workbook part"),
            XlsxError::CellRef(r) => write!(f, "invalid cell reference '{r}'"),
            XlsxError::WorksheetNotFound(name) => write!(f, "worksheet '{name}' not found"),
        }
    }
}

impl std::error::Error for XlsxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsxError::Io(e) => Some(e),
            XlsxError::Zip(e) => Some(e),
            XlsxError::Xml(e) => Some(e),
            _ => None,
        }
    }
}

struct SheetMeta {
    name: String,
    path: String,
    visible: SheetVisible,
}

/// An OOXML workbook.
pub struct Xlsx {
    archive: ZipArchive<Cursor<Arc<[u8]>>>,
    sheets: Vec<SheetMeta>,
    strings: Vec<String>,
    xfs: Vec<u16>,
    formatter: Arc<Formatter>,
    cache: BTreeMap<String, Sheet>,
}

type Rels = HashMap<String, (String, String)>; // id -> (type, target)

impl Xlsx {
    /// Opens an xlsx file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Xlsx, XlsxError> {
        let data = std::fs::read(path)?;
        Xlsx::from_bytes(Arc::from(data))
    }

    /// Decodes a workbook from an in-memory file image.
    pub fn from_bytes(data: Arc<[u8]>) -> Result<Xlsx, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let root_rels = parse_rels(&mut archive, "_rels/.rels")?;
        let workbook_path = root_rels
            .values()
            .find(|(typ, _)| typ.ends_with(REL_OFFICE_DOCUMENT))
            .map(|(_, target)| target.trim_start_matches('/').to_string())
            .ok_or(XlsxError::MissingWorkbook)?;

        let wb_rels = parse_rels(&mut archive, &rels_path_for(&workbook_path))?;

        let mut book = Xlsx {
            archive,
            sheets: Vec::new(),
            strings: Vec::new(),
            xfs: Vec::new(),
            formatter: Arc::new(Formatter::new()),
            cache: BTreeMap::new(),
        };

        let mut formatter = Formatter::new();
        book.parse_workbook(&workbook_path, &wb_rels, &mut formatter)?;
        for (typ, target) in wb_rels.values() {
            if typ.ends_with(REL_STYLES) {
                book.parse_styles(&resolve_target(target), &mut formatter)?;
            }
        }
        book.formatter = Arc::new(formatter);
        for (typ, target) in wb_rels.values() {
            if typ.ends_with(REL_SHARED_STRINGS) {
                book.parse_shared_strings(&resolve_target(target))?;
            }
        }
        Ok(book)
    }

    /// Names of the visible sheets, in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets
            .iter()
            .filter(|s| s.visible == SheetVisible::Visible)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Decodes the named sheet, caching the result.
    pub fn worksheet(&mut self, name: &str) -> Result<&Sheet, XlsxError> {
        if !self.cache.contains_key(name) {
            let meta_idx = self
                .sheets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| XlsxError::WorksheetNotFound(name.to_string()))?;
            let sheet = self.parse_worksheet(meta_idx)?;
            self.cache.insert(name.to_string(), sheet);
        }
        Ok(&self.cache[name])
    }

    fn parse_workbook(
        &mut self,
        path: &str,
        rels: &Rels,
        formatter: &mut Formatter,
    ) -> Result<(), XlsxError> {
        let Some(mut xml) = open_xml_part(&mut self.archive, path)? else {
            return Err(XlsxError::MissingWorkbook);
        };
        let mut buf = Vec::new();
        let mut sheets = Vec::new();
        loop {
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    match e.local_name().as_ref() {
                        b"sheet" => {
                            let name = get_attr(e, b"name")?.unwrap_or_default();
                            let rid = get_attr(e, b"id")?.unwrap_or_default();
                            let visible = match get_attr(e, b"state")?.as_deref() {
                                Some("hidden") => SheetVisible::Hidden,
                                Some("veryHidden") => SheetVisible::VeryHidden,
                                _ => SheetVisible::Visible,
                            };
                            let path = rels
                                .get(&rid)
                                .filter(|(typ, _)| typ.ends_with(REL_WORKSHEET))
                                .map(|(_, target)| resolve_target(target));
                            match path {
                                Some(path) => sheets.push(SheetMeta {
                                    name,
                                    path,
                                    visible,
                                }),
                                None => debug!("sheet '{name}' has no worksheet part"),
                            }
                        }
                        b"workbookPr" => {
                            if let Some(v) = get_attr(e, b"date1904")? {
                                formatter.set_mode_1904(v == "1" || v == "true");
                            }
                        }
                        _ => (),
                    }
                }
                Event::Eof => break,
                _ => (),
            }
            buf.clear();
        }
        self.sheets = sheets;
        Ok(())
    }

    fn parse_styles(&mut self, path: &str, formatter: &mut Formatter) -> Result<(), XlsxError> {
        let Some(mut xml) = open_xml_part(&mut self.archive, path)? else {
            return Ok(());
        };
        let mut buf = Vec::new();
        // 0 = outside, 1 = cellStyleXfs, 2 = cellXfs
        let mut section = 0;
        let mut base_formats: Vec<u16> = Vec::new();
        let mut xfs: Vec<u16> = Vec::new();
        loop {
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"numFmt" => {
                        let id: u16 = get_attr(e, b"numFmtId")?.unwrap_or_default().parse()?;
                        let code = get_attr(e, b"formatCode")?.unwrap_or_default();
                        formatter.add(id, &code);
                    }
                    b"cellStyleXfs" => section = 1,
                    b"cellXfs" => section = 2,
                    b"xf" => {
                        let own: Option<u16> = match get_attr(e, b"numFmtId")? {
                            Some(v) => Some(v.parse()?),
                            None => None,
                        };
                        let apply = get_attr(e, b"applyNumberFormat")?;
                        match section {
                            1 => base_formats.push(match apply.as_deref() {
                                Some("0") => 0,
                                _ => own.unwrap_or(0),
                            }),
                            2 => {
                                let base = match get_attr(e, b"xfId")? {
                                    Some(v) => {
                                        let idx: usize = v.parse()?;
                                        base_formats.get(idx).copied().unwrap_or(0)
                                    }
                                    None => 0,
                                };
                                let id = match apply.as_deref() {
                                    Some("0") => 0,
                                    _ => own.unwrap_or(base),
                                };
                                xfs.push(id);
                            }
                            _ => (),
                        }
                    }
                    _ => (),
                },
                Event::End(ref e) => {
                    if matches!(e.local_name().as_ref(), b"cellStyleXfs" | b"cellXfs") {
                        section = 0;
                    }
                }
                Event::Eof => break,
                _ => (),
            }
            buf.clear();
        }
        self.xfs = xfs;
        Ok(())
    }

    fn parse_shared_strings(&mut self, path: &str) -> Result<(), XlsxError> {
        let Some(mut xml) = open_xml_part(&mut self.archive, path)? else {
            return Ok(());
        };
        let mut buf = Vec::new();
        let mut strings = Vec::new();
        let mut current = String::new();
        let mut in_text = false;
        loop {
            match xml.read_event_into(&mut buf)? {
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"si" => current.clear(),
                    b"t" => in_text = true,
                    _ => (),
                },
                Event::Text(ref t) if in_text => current.push_str(&t.unescape()?),
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"si" => strings.push(std::mem::take(&mut current)),
                    b"t" => in_text = false,
                    _ => (),
                },
                Event::Eof => break,
                _ => (),
            }
            buf.clear();
        }
        self.strings = strings;
        Ok(())
    }

    fn parse_worksheet(&mut self, meta_idx: usize) -> Result<Sheet, XlsxError> {
        let meta = &self.sheets[meta_idx];
        let name = meta.name.clone();
        let path = meta.path.clone();
        let visible = meta.visible;

        // external hyperlink targets live in the sheet's own rels part
        let links: HashMap<String, String> = match parse_rels_opt(&mut self.archive, &rels_path_for(&path))? {
            Some(rels) => rels
                .into_iter()
                .filter(|(_, (typ, _))| typ.ends_with(REL_HYPERLINK))
                .map(|(id, (_, target))| (id, target))
                .collect(),
            None => HashMap::new(),
        };

        let mut cells: Vec<(usize, usize, Value, u16)> = Vec::new();
        let mut merges: Vec<(usize, usize, usize, usize)> = Vec::new();
        let mut hyperlinks: Vec<(usize, usize, String)> = Vec::new();
        let mut dims: Option<(usize, usize)> = None;

        {
            let Some(mut xml) = open_xml_part(&mut self.archive, &path)? else {
                return Err(XlsxError::WorksheetNotFound(name));
            };
            let mut buf = Vec::new();

            #[derive(Clone, Copy, PartialEq)]
            enum CellKind {
                Number,
                SharedString,
                FormulaString,
                Bool,
                Error,
                Inline,
            }
            let mut cell: Option<(usize, usize, u16, CellKind)> = None;
            let mut in_value = false;
            let mut text = String::new();

            loop {
                let event = xml.read_event_into(&mut buf)?;
                let self_closing = matches!(event, Event::Empty(_));
                match event {
                    Event::Start(ref e) | Event::Empty(ref e) => {
                        match e.local_name().as_ref() {
                            b"dimension" => {
                                // a bare "A1" ref advertises no extent;
                                // fall back to the cells actually seen
                                if let Some(r) = get_attr(e, b"ref")? {
                                    if let Some((_, bottom)) = r.split_once(':') {
                                        let (row, col) = parse_ref(bottom)?;
                                        dims = Some((row, col));
                                    }
                                }
                            }
                            b"c" => {
                                let r = get_attr(e, b"r")?.unwrap_or_default();
                                let Ok((row, col)) = parse_ref(&r) else {
                                    debug!("cell without a usable reference: '{r}'");
                                    continue;
                                };
                                let style: usize = match get_attr(e, b"s")? {
                                    Some(v) => v.parse()?,
                                    None => 0,
                                };
                                let format = self.xfs.get(style).copied().unwrap_or(0);
                                let kind = match get_attr(e, b"t")?.as_deref() {
                                    Some("s") => CellKind::SharedString,
                                    Some("str") => CellKind::FormulaString,
                                    Some("b") => CellKind::Bool,
                                    Some("e") => CellKind::Error,
                                    Some("inlineStr") => CellKind::Inline,
                                    _ => CellKind::Number,
                                };
                                cell = Some((row, col, format, kind));
                                text.clear();
                            }
                            b"v" => in_value = !self_closing && cell.is_some(),
                            b"t" => {
                                in_value = !self_closing
                                    && matches!(cell, Some((.., CellKind::Inline)));
                            }
                            b"mergeCell" => {
                                if let Some(r) = get_attr(e, b"ref")? {
                                    if let Some((top, bottom)) = r.split_once(':') {
                                        let (r0, c0) = parse_ref(top)?;
                                        let (r1, c1) = parse_ref(bottom)?;
                                        merges.push((r0, c0, r1, c1));
                                    }
                                }
                            }
                            b"hyperlink" => {
                                let anchor = get_attr(e, b"ref")?.unwrap_or_default();
                                let rid = get_attr(e, b"id")?.unwrap_or_default();
                                if let (Ok((row, col)), Some(target)) =
                                    (parse_ref(&anchor), links.get(&rid))
                                {
                                    hyperlinks.push((row, col, target.clone()));
                                }
                            }
                            _ => (),
                        }
                    }
                    Event::Text(ref t) if in_value => text.push_str(&t.unescape()?),
                    Event::End(ref e) => match e.local_name().as_ref() {
                        b"v" | b"t" => in_value = false,
                        b"c" => {
                            if let Some((row, col, format, kind)) = cell.take() {
                                if let Some(value) = cell_value(kind, &text, &self.strings) {
                                    cells.push((row, col, value, format));
                                }
                            }
                            text.clear();
                            in_value = false;
                        }
                        _ => (),
                    },
                    Event::Eof => break,
                    _ => (),
                }
                buf.clear();
            }

            // self-closing blank cells produce no End event and no value
            fn cell_value(kind: CellKind, text: &str, strings: &[String]) -> Option<Value> {
                match kind {
                    _ if text.is_empty() => None,
                    CellKind::SharedString => {
                        let idx: usize = text.parse().ok()?;
                        strings.get(idx).map(|s| Value::from(s.as_str()))
                    }
                    CellKind::FormulaString | CellKind::Inline | CellKind::Error => {
                        Some(Value::from(text))
                    }
                    CellKind::Bool => Some(Value::Bool(text != "0")),
                    CellKind::Number => Some(match text.parse::<i64>() {
                        Ok(i) => Value::Int(i),
                        Err(_) => Value::Float(text.parse::<f64>().ok()?),
                    }),
                }
            }
        }

        let mut sheet = Sheet::new(name, Arc::clone(&self.formatter));
        sheet.set_visible(visible);

        let extent = dims.or_else(|| {
            cells
                .iter()
                .map(|(r, c, ..)| (*r, *c))
                .reduce(|(ar, ac), (r, c)| (ar.max(r), ac.max(c)))
        });
        match extent {
            Some((max_row, max_col)) => {
                sheet.set_dimensions(max_row, max_col);
                sheet.place(max_row, max_col, Default::default());
            }
            None => {
                sheet.mark_empty();
                return Ok(sheet);
            }
        }

        for (row, col, value, format) in cells {
            sheet.put(row, col, value, format);
        }
        for (row, col, target) in hyperlinks {
            let text = match sheet.cell(row, col).map(|c| &c.value) {
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
            sheet.put(
                row,
                col,
                Value::Hyperlink {
                    text,
                    url: target,
                },
                0,
            );
        }
        for (r0, c0, r1, c1) in merges {
            sheet.fill_merged_region(r0, c0, r1, c1);
        }
        Ok(sheet)
    }

}

fn open_xml_part<'a>(
    archive: &'a mut ZipArchive<Cursor<Arc<[u8]>>>,
    path: &str,
) -> Result<Option<XmlReader<BufReader<ZipFile<'a>>>>, XlsxError> {
    match archive.by_name(path) {
        Ok(part) => Ok(Some(XmlReader::from_reader(BufReader::new(part)))),
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn get_attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

// "worksheets/sheet1.xml" relative to the xl/ directory
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{target}")
    }
}

// "_rels/<base>.rels" next to the part
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/_rels/{base}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn parse_rels(
    archive: &mut ZipArchive<Cursor<Arc<[u8]>>>,
    path: &str,
) -> Result<Rels, XlsxError> {
    parse_rels_opt(archive, path)?.ok_or(XlsxError::MissingWorkbook)
}

fn parse_rels_opt(
    archive: &mut ZipArchive<Cursor<Arc<[u8]>>>,
    path: &str,
) -> Result<Option<Rels>, XlsxError> {
    let part = match archive.by_name(path) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = XmlReader::from_reader(BufReader::new(part));
    let mut buf = Vec::new();
    let mut rels = Rels::new();
    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let id = get_attr(e, b"Id")?.unwrap_or_default();
                let typ = get_attr(e, b"Type")?.unwrap_or_default();
                let target = get_attr(e, b"Target")?.unwrap_or_default();
                rels.insert(id, (typ, target));
            }
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }
    Ok(Some(rels))
}

// zero-based (row, col) from an A1-style reference
fn parse_ref(r: &str) -> Result<(usize, usize), XlsxError> {
    let split = r
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| XlsxError::CellRef(r.to_string()))?;
    if split == 0 {
        return Err(XlsxError::CellRef(r.to_string()));
    }
    let mut col: usize = 0;
    for c in r[..split].chars() {
        let d = match c {
            'A'..='Z' => c as usize - 'A' as usize + 1,
            'a'..='z' => c as usize - 'a' as usize + 1,
            _ => return Err(XlsxError::CellRef(r.to_string())),
        };
        col = col * 26 + d;
    }
    let row: usize = r[split..]
        .parse()
        .map_err(|_| XlsxError::CellRef(r.to_string()))?;
    if row == 0 {
        return Err(XlsxError::CellRef(r.to_string()));
    }
    Ok((row - 1, col - 1))
}
