//! Uniform row-oriented reader for tabular data files.
//!
//! `rasp` opens legacy Excel binary workbooks (BIFF8 `.xls`), Office
//! Open XML workbooks (`.xlsx`) and delimited text files (CSV/TSV)
//! behind one interface: open a file, list its sheets, and iterate the
//! rows of a sheet as formatted strings or typed scalars.
//!
//! ```no_run
//! # fn run() -> Result<(), rasp::Error> {
//! let mut workbook = rasp::open("report.xls")?;
//! for name in workbook.list() {
//!     let sheet = workbook.get(&name)?;
//!     for row in sheet.rows() {
//!         println!("{}", row.strings().join("\t"));
//!     }
//! }
//! # Ok(()) }
//! ```
//!
//! Typed extraction goes through [`Row::scan`] with a tuple of `&mut`
//! destinations:
//!
//! ```no_run
//! # fn run() -> Result<(), rasp::Error> {
//! # let mut workbook = rasp::open("report.xls")?;
//! # let sheet = workbook.get("Data")?;
//! let (mut id, mut label, mut price) = (0i64, String::new(), 0f64);
//! for row in sheet.rows() {
//!     row.scan((&mut id, &mut label, &mut price))?;
//! }
//! # Ok(()) }
//! ```
//!
//! File types are probed by content, not extension: the CFB/BIFF8
//! decoder first, then the OOXML decoder, then tab- and comma-separated
//! text. A probe that does not recognize the file passes it along;
//! structural errors inside a recognized format are fatal.

#![warn(missing_docs)]

mod cell;
mod cfb;
mod delimited;
mod errors;
mod formats;
mod sheet;
mod utils;
mod xls;
mod xlsx;

use std::path::Path;
use std::sync::Arc;

use log::debug;

pub use cell::{Cell, CellType, FromCell, MergeMarker, ScanRow, Value};
pub use cfb::{Cfb, CfbError, SliceReader};
pub use delimited::{Delimited, DelimitedError};
pub use errors::Error;
pub use formats::Formatter;
pub use sheet::{Row, Rows, Sheet, SheetVisible};
pub use xls::{Xls, XlsError};
pub use xlsx::{Xlsx, XlsxError};

/// A workbook whose concrete format was detected at runtime.
pub enum Workbook {
    /// BIFF8 binary workbook
    Xls(Xls),
    /// Office Open XML workbook
    Xlsx(Xlsx),
    /// Delimited text file
    Delimited(Delimited),
}

impl Workbook {
    /// Names of the visible sheets, in workbook order.
    pub fn list(&self) -> Vec<String> {
        match self {
            Workbook::Xls(b) => b.sheet_names(),
            Workbook::Xlsx(b) => b.sheet_names(),
            Workbook::Delimited(b) => b.sheet_names(),
        }
    }

    /// Decodes the named sheet. Sheets are decoded once and cached for
    /// the life of the workbook.
    pub fn get(&mut self, name: &str) -> Result<&Sheet, Error> {
        match self {
            Workbook::Xls(b) => b.worksheet(name).map_err(|e| match e {
                XlsError::WorksheetNotFound(n) => Error::SheetNotFound(n),
                e => Error::Xls(e),
            }),
            Workbook::Xlsx(b) => b.worksheet(name).map_err(|e| match e {
                XlsxError::WorksheetNotFound(n) => Error::SheetNotFound(n),
                e => Error::Xlsx(e),
            }),
            Workbook::Delimited(b) => b.worksheet(name).map_err(Error::Delimited),
        }
    }
}

/// Opens a tabular data file, detecting its format from the content.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Workbook, Error> {
    open_impl(path.as_ref(), None)
}

/// Opens a tabular data file, decrypting password-protected workbooks.
///
/// Only standard-RC4 encrypted `.xls` files take a password; for every
/// other format it is ignored.
pub fn open_with_password<P: AsRef<Path>>(path: P, password: &str) -> Result<Workbook, Error> {
    open_impl(path.as_ref(), Some(password))
}

// probes are an explicit ordered list: each opener either succeeds,
// reports "not my format", or fails the whole open
fn open_impl(path: &Path, password: Option<&str>) -> Result<Workbook, Error> {
    let data: Arc<[u8]> = Arc::from(std::fs::read(path)?);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match Xls::from_bytes(Arc::clone(&data), password) {
        Ok(book) => return Ok(Workbook::Xls(book)),
        Err(e) => {
            let e = Error::Xls(e);
            if !e.is_not_in_format() {
                return Err(e);
            }
            debug!("{name} is not an xls file");
        }
    }
    match Xlsx::from_bytes(Arc::clone(&data)) {
        Ok(book) => return Ok(Workbook::Xlsx(book)),
        Err(e) => {
            let e = Error::Xlsx(e);
            if !e.is_not_in_format() {
                return Err(e);
            }
            debug!("{name} is not an xlsx file");
        }
    }
    for delimiter in [b'\t', b','] {
        match Delimited::from_bytes(&name, &data, delimiter) {
            Ok(book) => return Ok(Workbook::Delimited(book)),
            Err(e) => {
                let e = Error::Delimited(e);
                if !e.is_not_in_format() {
                    return Err(e);
                }
            }
        }
    }
    Err(Error::UnknownFormat)
}
