//! Microsoft Excel binary workbook (BIFF8) decoder.
//!
//! The workbook stream comes out of the CFB container as one byte
//! buffer, gets split into length-prefixed records grouped into
//! `BOF`/`EOF` substreams, and the globals substream is interpreted
//! before any worksheet: shared strings, XF/format tables, date mode
//! and the sheet directory all live there. Worksheets are decoded on
//! first access and cached.

mod crypto;
mod hyperlinks;
mod records;
mod strings;
mod worksheet;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::cfb::{Cfb, CfbError};
use crate::errors::from_err;
use crate::formats::Formatter;
use crate::sheet::{Sheet, SheetVisible};
use crate::utils::read_u16;
use strings::{parse_short_string, parse_string, XlsEncoding};
use worksheet::SheetCtx;

/// An enum for xls specific errors.
#[derive(Debug)]
pub enum XlsError {
    /// IO error
    Io(io::Error),
    /// error from the CFB container
    Cfb(CfbError),
    /// BIFF version is not BIFF8
    UnsupportedVersion(u16),
    /// BOF year field out of range
    InvalidYear(u16),
    /// BOF document type is neither globals nor worksheet
    InvalidDocType(u16),
    /// encryption scheme other than standard RC4
    UnsupportedEncryption(u16),
    /// standard RC4 header with an unknown minor version
    UnknownRc4Version(u16),
    /// FilePass payload has the wrong length
    InvalidFilePass(usize),
    /// password verification failed
    InvalidPassword,
    /// record payload shorter than its fixed fields
    RecordTooShort {
        /// record type
        typ: u16,
        /// payload length
        len: usize,
    },
    /// record advertises a payload beyond the spec maximum
    RecordOversize {
        /// record type
        typ: u16,
        /// advertised length
        len: usize,
    },
    /// stream ends inside a record
    StreamTruncated,
    /// no BOF opens the stream
    MissingBof,
    /// Dimensions record out of the BIFF8 row/column range
    InvalidDimensions {
        /// one past the last row
        rows: u32,
        /// one past the last column
        cols: u32,
    },
    /// LabelSst points past the shared string table
    SstIndexOutOfBounds {
        /// index requested
        index: usize,
        /// table length
        len: usize,
    },
    /// shared string table is internally inconsistent
    SstCorrupt(&'static str),
    /// string runs past its record
    StringTruncated,
    /// character data is not valid UTF-16
    InvalidUtf16,
    /// workbook code page is not recognized
    CodePageNotFound(u16),
    /// hyperlink structure error
    Hyperlink(&'static str),
    /// hyperlink stream version is unknown
    HyperlinkVersion(u32),
    /// no sheet with this name
    WorksheetNotFound(String),
    /// BoundSheet8 points at a position with no substream
    SubstreamNotFound(u32),
}

from_err!(io::Error, XlsError, Io);
from_err!(CfbError, XlsError, Cfb);

impl XlsError {
    pub(crate) fn is_not_in_format(&self) -> bool {
        // a CFB container without a Workbook stream is some other
        // OLE document, not a broken xls
        matches!(self, XlsError::Cfb(e)
            if e.is_not_in_format() || matches!(e, CfbError::StreamNotFound(_)))
    }
}

impl fmt::Display for XlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XlsError::Io(e) => write!(f, "{e}"),
            XlsError::Cfb(e) => write!(f, "{e}"),
            XlsError::UnsupportedVersion(v) => write!(f, "unsupported BIFF version {v:#06X}"),
            XlsError::InvalidYear(y) => write!(f, "invalid BOF year field {y:#06X}"),
            XlsError::InvalidDocType(t) => write!(f, "unsupported document type {t:#06X}"),
            XlsError::UnsupportedEncryption(t) => {
                write!(f, "unsupported encryption type {t} (only standard RC4)")
            }
            XlsError::UnknownRc4Version(v) => write!(f, "unknown RC4 header minor version {v}"),
            XlsError::InvalidFilePass(len) => {
                write!(f, "invalid FilePass payload of {len} bytes, expected 52")
            }
            XlsError::InvalidPassword => write!(f, "incorrect password"),
            XlsError::RecordTooShort { typ, len } => {
                write!(f, "record {typ:#06X} too short ({len} bytes)")
            }
            XlsError::RecordOversize { typ, len } => {
                write!(f, "record {typ:#06X} advertises {len} bytes (max 8224)")
            }
            XlsError::StreamTruncated => write!(f, "workbook stream ends inside a record"),
            XlsError::MissingBof => write!(f, "workbook stream does not start with BOF"),
            XlsError::InvalidDimensions { rows, cols } => {
                write!(f, "sheet dimensions out of range ({rows} rows, {cols} cols)")
            }
            XlsError::SstIndexOutOfBounds { index, len } => {
                write!(f, "string index {index} out of bounds (table holds {len})")
            }
            XlsError::SstCorrupt(msg) => write!(f, "corrupt shared string table: {msg}"),
            XlsError::StringTruncated => write!(f, "string runs past the end of its record"),
            XlsError::InvalidUtf16 => write!(f, "invalid UTF-16 string data"),
            XlsError::CodePageNotFound(cp) => write!(f, "code page {cp} not found"),
            XlsError::Hyperlink(msg) => write!(f, "bad hyperlink: {msg}"),
            XlsError::HyperlinkVersion(v) => write!(f, "unknown hyperlink version {v}"),
            XlsError::WorksheetNotFound(name) => write!(f, "worksheet '{name}' not found"),
            XlsError::SubstreamNotFound(pos) => {
                write!(f, "no substream starts at stream position {pos}")
            }
        }
    }
}

impl std::error::Error for XlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XlsError::Io(e) => Some(e),
            XlsError::Cfb(e) => Some(e),
            _ => None,
        }
    }
}

/// One framed BIFF record.
#[derive(Debug)]
pub(crate) struct Record {
    pub typ: u16,
    pub data: Vec<u8>,
}

// sheet directory entry from BoundSheet8
#[derive(Debug)]
struct BoundSheet {
    name: String,
    position: u32,
    visible: SheetVisible,
    #[allow(dead_code)]
    sheet_type: u8,
}

/// A BIFF8 workbook.
#[derive(Debug)]
pub struct Xls {
    sheets: Vec<BoundSheet>,
    strings: Vec<String>,
    xfs: Vec<u16>,
    formatter: Arc<Formatter>,
    substreams: Vec<Vec<Record>>,
    pos2substream: BTreeMap<u64, usize>,
    cache: BTreeMap<String, Sheet>,
}

impl Xls {
    /// Opens an xls file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Xls, XlsError> {
        let data = std::fs::read(path)?;
        Xls::from_bytes(Arc::from(data), None)
    }

    /// Opens an xls file, decrypting with the given password if needed.
    pub fn open_with_password<P: AsRef<Path>>(path: P, password: &str) -> Result<Xls, XlsError> {
        let data = std::fs::read(path)?;
        Xls::from_bytes(Arc::from(data), Some(password))
    }

    /// Decodes a workbook from an in-memory file image.
    pub fn from_bytes(data: Arc<[u8]>, password: Option<&str>) -> Result<Xls, XlsError> {
        let cfb = Cfb::new(data)?;
        let mut stream = cfb.open_stream("Workbook")?.read_to_vec()?;
        Xls::from_workbook_stream(&mut stream, password)
    }

    fn from_workbook_stream(stream: &mut Vec<u8>, password: Option<&str>) -> Result<Xls, XlsError> {
        let (mut substreams, mut pos2substream) = frame(stream)?;

        let filepass = substreams
            .first()
            .and_then(|recs| recs.iter().find(|r| r.typ == records::FILEPASS))
            .map(|r| r.data.clone());
        if let Some(fp) = filepass {
            if fp.len() < 2 {
                return Err(XlsError::RecordTooShort {
                    typ: records::FILEPASS,
                    len: fp.len(),
                });
            }
            match read_u16(&fp) {
                1 => {
                    let decryptor = crypto::Rc4Decryptor::new(&fp[2..], password)?;
                    decryptor.decrypt_stream(stream);
                    let reframed = frame(stream)?;
                    substreams = reframed.0;
                    pos2substream = reframed.1;
                }
                t => return Err(XlsError::UnsupportedEncryption(t)),
            }
        }

        let mut book = Xls {
            sheets: Vec::new(),
            strings: Vec::new(),
            xfs: Vec::with_capacity(128),
            formatter: Arc::new(Formatter::new()),
            substreams: Vec::new(),
            pos2substream,
            cache: BTreeMap::new(),
        };
        book.parse_globals(substreams.first().ok_or(XlsError::MissingBof)?)?;
        book.substreams = substreams;
        Ok(book)
    }

    fn parse_globals(&mut self, globals: &[Record]) -> Result<(), XlsError> {
        let mut formatter = Formatter::new();
        let mut encoding = XlsEncoding::utf16();

        let mut i = 0;
        while i < globals.len() {
            let r = &globals[i];
            match r.typ {
                records::BOF => {
                    if i == 0 {
                        validate_bof(r, records::DOCTYPE_GLOBALS)?;
                    }
                }
                records::CODEPAGE => {
                    need(r, 2)?;
                    encoding = XlsEncoding::from_codepage(read_u16(&r.data))?;
                }
                records::DATE1904 => {
                    need(r, 2)?;
                    formatter.set_mode_1904(read_u16(&r.data) != 0);
                }
                records::FORMAT => {
                    need(r, 2)?;
                    let id = read_u16(&r.data);
                    let (code, _) = parse_string(&r.data[2..], &encoding)?;
                    formatter.add(id, &code);
                }
                records::XF => {
                    need(r, 4)?;
                    self.xfs.push(read_u16(&r.data[2..4]));
                }
                records::BOUNDSHEET8 => {
                    need(r, 8)?;
                    let position = crate::utils::read_u32(&r.data);
                    let visible = match r.data[4] & 0x03 {
                        0 => SheetVisible::Visible,
                        1 => SheetVisible::Hidden,
                        _ => SheetVisible::VeryHidden,
                    };
                    let sheet_type = r.data[5];
                    let (name, _) = parse_short_string(&r.data[6..], &encoding)?;
                    self.sheets.push(BoundSheet {
                        name,
                        position,
                        visible,
                        sheet_type,
                    });
                }
                records::SST => {
                    let mut end = i + 1;
                    while end < globals.len() && globals[end].typ == records::CONTINUE {
                        end += 1;
                    }
                    self.strings = strings::parse_sst(&globals[i..end])?;
                    i = end;
                    continue;
                }
                records::FILEPASS | records::CONTINUE | records::EOF => (),
                typ => debug!("unhandled workbook record type {typ:#06X}"),
            }
            i += 1;
        }

        self.formatter = Arc::new(formatter);
        Ok(())
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
    pub fn worksheet(&mut self, name: &str) -> Result<&Sheet, XlsError> {
        if !self.cache.contains_key(name) {
            let bound = self
                .sheets
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| XlsError::WorksheetNotFound(name.to_string()))?;
            let substream = *self
                .pos2substream
                .get(&(bound.position as u64))
                .ok_or(XlsError::SubstreamNotFound(bound.position))?;
            let ctx = SheetCtx {
                strings: &self.strings,
                xfs: &self.xfs,
                formatter: &self.formatter,
            };
            let sheet = worksheet::parse_worksheet(
                &bound.name,
                bound.visible,
                &self.substreams[substream],
                &ctx,
            )?;
            self.cache.insert(name.to_string(), sheet);
        }
        Ok(&self.cache[name])
    }
}

fn need(r: &Record, len: usize) -> Result<(), XlsError> {
    if r.data.len() < len {
        return Err(XlsError::RecordTooShort {
            typ: r.typ,
            len: r.data.len(),
        });
    }
    Ok(())
}

fn validate_bof(r: &Record, expected_doctype: u16) -> Result<(), XlsError> {
    need(r, 8)?;
    let version = read_u16(&r.data[0..2]);
    if version != records::BIFF8_VERSION {
        return Err(XlsError::UnsupportedVersion(version));
    }
    let doctype = read_u16(&r.data[2..4]);
    if doctype != expected_doctype {
        return Err(XlsError::InvalidDocType(doctype));
    }
    let year = read_u16(&r.data[6..8]);
    if year != 0x07CC && year != 0x07CD {
        return Err(XlsError::InvalidYear(year));
    }
    Ok(())
}

// splits the stream into records grouped by top-level substream; the
// map records the absolute position of each substream's BOF, which is
// how BoundSheet8 names its sheet
#[allow(clippy::type_complexity)]
fn frame(stream: &[u8]) -> Result<(Vec<Vec<Record>>, BTreeMap<u64, usize>), XlsError> {
    let mut substreams: Vec<Vec<Record>> = Vec::new();
    let mut pos2substream = BTreeMap::new();
    let mut nested = 0u32;
    let mut pos = 0usize;

    while pos + 4 <= stream.len() {
        let typ = read_u16(&stream[pos..]);
        let size = read_u16(&stream[pos + 2..]) as usize;
        if typ == 0 && size == 0 {
            break;
        }
        if size > records::MAX_RECORD_SIZE {
            return Err(XlsError::RecordOversize { typ, len: size });
        }
        if pos + 4 + size > stream.len() {
            return Err(XlsError::StreamTruncated);
        }

        match typ {
            records::BOF => {
                // nested substreams stay in the enclosing grouping
                if nested == 0 {
                    pos2substream.insert(pos as u64, substreams.len());
                    substreams.push(Vec::new());
                }
                nested += 1;
            }
            records::EOF => nested = nested.saturating_sub(1),
            _ => (),
        }

        let record = Record {
            typ,
            data: stream[pos + 4..pos + 4 + size].to_vec(),
        };
        substreams
            .last_mut()
            .ok_or(XlsError::MissingBof)?
            .push(record);
        pos += 4 + size;
    }

    if substreams.is_empty() {
        return Err(XlsError::MissingBof);
    }
    Ok((substreams, pos2substream))
}
