//! Top-level error type wrapping each decoder's error enum.

use std::fmt;

use crate::cell::CellType;

/// Generates a `From` impl wrapping an error into an enum variant.
macro_rules! from_err {
    ($from:ty, $to:ty, $var:ident) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                <$to>::$var(e)
            }
        }
    };
}
pub(crate) use from_err;

/// Any error produced while opening or reading a tabular file.
#[derive(Debug)]
pub enum Error {
    /// IO error
    Io(std::io::Error),
    /// CFB container error
    Cfb(crate::cfb::CfbError),
    /// xls decoder error
    Xls(crate::xls::XlsError),
    /// xlsx decoder error
    Xlsx(crate::xlsx::XlsxError),
    /// delimited-text reader error
    Delimited(crate::delimited::DelimitedError),
    /// no registered decoder recognized the file
    UnknownFormat,
    /// requested sheet does not exist
    SheetNotFound(String),
    /// scan destination type does not match the cell value
    TypeMismatch {
        /// destination type
        expected: &'static str,
        /// cell value tag
        found: CellType,
    },
    /// more scan destinations than row columns
    ScanWidth {
        /// destinations supplied
        destinations: usize,
        /// columns available
        columns: usize,
    },
    /// general error message
    Msg(&'static str),
}

from_err!(std::io::Error, Error, Io);
from_err!(crate::cfb::CfbError, Error, Cfb);
from_err!(crate::xls::XlsError, Error, Xls);
from_err!(crate::xlsx::XlsxError, Error, Xlsx);
from_err!(crate::delimited::DelimitedError, Error, Delimited);

impl Error {
    /// True when the error only means "this decoder does not recognize
    /// the file" and the next decoder should be tried.
    pub fn is_not_in_format(&self) -> bool {
        match self {
            Error::Cfb(e) => e.is_not_in_format(),
            Error::Xls(e) => e.is_not_in_format(),
            Error::Xlsx(e) => e.is_not_in_format(),
            Error::Delimited(e) => e.is_not_in_format(),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Cfb(e) => write!(f, "Cfb error: {e}"),
            Error::Xls(e) => write!(f, "Xls error: {e}"),
            Error::Xlsx(e) => write!(f, "Xlsx error: {e}"),
            Error::Delimited(e) => write!(f, "Delimited error: {e}"),
            Error::UnknownFormat => write!(f, "file format is not known or supported"),
            Error::SheetNotFound(name) => write!(f, "sheet '{name}' does not exist"),
            Error::TypeMismatch { expected, found } => {
                write!(f, "scan destination expects {expected}, cell holds {found}")
            }
            Error::ScanWidth {
                destinations,
                columns,
            } => write!(f, "{destinations} scan destinations for {columns} columns"),
            Error::Msg(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Cfb(e) => Some(e),
            Error::Xls(e) => Some(e),
            Error::Xlsx(e) => Some(e),
            Error::Delimited(e) => Some(e),
            _ => None,
        }
    }
}
