//! Cell values as a tagged union.
//!
//! Every decoded cell carries a [`Value`] and the 16-bit workbook format id
//! used to render it. Merged regions keep the sheet matrix rectangular by
//! filling their non-anchor cells with [`MergeMarker`] sentinels.

use std::fmt;

use chrono::NaiveDateTime;

use crate::errors::Error;
use crate::formats::dates::serial_to_datetime;

/// The data type implied by a number format, used to coerce raw record
/// values before they are stored in a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// No value
    Blank,
    /// 64-bit signed integer
    Integer,
    /// IEEE-754 double
    Float,
    /// Unicode string
    String,
    /// Boolean
    Boolean,
    /// Civil date and time
    Date,
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CellType::Blank => "blank",
            CellType::Integer => "integer",
            CellType::Float => "float",
            CellType::String => "string",
            CellType::Boolean => "boolean",
            CellType::Date => "date",
        };
        f.write_str(s)
    }
}

/// Sentinels filling the non-anchor cells of a merged region.
///
/// The anchor keeps the value; every other cell in the region holds one of
/// these so that flattened rows stay rectangular and still show where the
/// merged block extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMarker {
    /// Continuation row within a merged cell (first column).
    ContinueRow,
    /// Last row of a merged cell (first column).
    EndRow,
    /// Continuation column within a merged cell.
    ContinueColumn,
    /// Last column of a merged cell.
    EndColumn,
}

impl fmt::Display for MergeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeMarker::ContinueRow => "↓",
            MergeMarker::EndRow => "⤓",
            MergeMarker::ContinueColumn => "→",
            MergeMarker::EndColumn => "⇥",
        };
        f.write_str(s)
    }
}

/// A cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Empty cell
    #[default]
    Blank,
    /// Signed integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    String(String),
    /// Boolean
    Bool(bool),
    /// Date or time
    Date(NaiveDateTime),
    /// String with an attached URL
    Hyperlink {
        /// Display text
        text: String,
        /// Link target
        url: String,
    },
    /// Merged-region filler
    Marker(MergeMarker),
}

impl Value {
    /// The [`CellType`] tag of this value. Hyperlinks count as strings,
    /// markers and blanks as blank.
    pub fn cell_type(&self) -> CellType {
        match self {
            Value::Blank | Value::Marker(_) => CellType::Blank,
            Value::Int(_) => CellType::Integer,
            Value::Float(_) => CellType::Float,
            Value::String(_) | Value::Hyperlink { .. } => CellType::String,
            Value::Bool(_) => CellType::Boolean,
            Value::Date(_) => CellType::Date,
        }
    }

    /// Assess if the value is blank (markers included).
    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank | Value::Marker(_))
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(true) => Some(1.0),
            Value::Bool(false) => Some(0.0),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Coerce the value to the type implied by its number format.
    ///
    /// The conversion table is total: unconvertible combinations keep the
    /// original value. Booleans coerced to strings become `TRUE`/`FALSE`
    /// strings (and are tagged as such).
    pub fn coerce(self, target: CellType, is_1904: bool) -> Value {
        if self.cell_type() == target {
            return self;
        }
        match (self, target) {
            (v, CellType::Blank) => v,
            (Value::Bool(b), CellType::Integer) => Value::Int(b as i64),
            (Value::Bool(b), CellType::Float) => Value::Float(b as i64 as f64),
            (Value::Bool(b), CellType::String) => {
                Value::String(if b { "TRUE" } else { "FALSE" }.into())
            }
            (Value::Float(f), CellType::Integer) => Value::Int(f as i64),
            (Value::Float(f), CellType::Boolean) => Value::Bool(f != 0.0),
            (Value::Int(i), CellType::Float) => Value::Float(i as f64),
            (Value::Int(i), CellType::Boolean) => Value::Bool(i != 0),
            (Value::String(s), CellType::Integer) => match s.parse() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::String(s),
            },
            (Value::String(s), CellType::Float) => match s.parse() {
                Ok(f) => Value::Float(f),
                Err(_) => Value::String(s),
            },
            (Value::String(s), CellType::Boolean) => match parse_bool(&s) {
                Some(b) => Value::Bool(b),
                None => Value::String(s),
            },
            (Value::Int(i), CellType::String) => Value::String(i.to_string()),
            (Value::Float(f), CellType::String) => Value::String(f.to_string()),
            (Value::Date(d), CellType::String) => Value::String(Value::Date(d).to_string()),
            (Value::Int(i), CellType::Date) => match serial_to_datetime(i as f64, is_1904) {
                Some(d) => Value::Date(d),
                None => Value::Int(i),
            },
            (Value::Float(f), CellType::Date) => match serial_to_datetime(f, is_1904) {
                Some(d) => Value::Date(d),
                None => Value::Float(f),
            },
            (v, _) => v,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "0.0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Blank => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Hyperlink { text, url } => write!(f, "{text} <{url}>"),
            Value::Marker(m) => write!(f, "{m}"),
        }
    }
}

macro_rules! value_from {
    ($variant:path, $ty:ty) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                $variant(v)
            }
        }
    };
}

value_from!(Value::Int, i64);
value_from!(Value::Float, f64);
value_from!(Value::Bool, bool);
value_from!(Value::Date, NaiveDateTime);
value_from!(Value::Marker, MergeMarker);

impl From<String> for Value {
    fn from(v: String) -> Self {
        if v.is_empty() {
            Value::Blank
        } else {
            Value::String(v)
        }
    }
}

impl<'a> From<&'a str> for Value {
    fn from(v: &'a str) -> Self {
        Value::from(v.to_string())
    }
}

/// One cell of a sheet: a value plus the workbook format id used when the
/// cell is rendered to text. Format id 0 is the "general" format.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    /// Decoded value
    pub value: Value,
    /// Workbook number-format id
    pub format: u16,
}

impl Cell {
    /// A cell rendered with the general format.
    pub fn new(value: impl Into<Value>) -> Cell {
        Cell {
            value: value.into(),
            format: 0,
        }
    }

    /// A cell rendered with the given workbook format id.
    pub fn with_format(value: impl Into<Value>, format: u16) -> Cell {
        Cell {
            value: value.into(),
            format,
        }
    }
}

/// Conversion from a cell into one of the five `scan` destination types.
pub trait FromCell: Sized {
    /// Extracts the destination value, failing on a tag mismatch.
    fn from_cell(cell: &Cell) -> Result<Self, Error>;
}

fn mismatch<T>(expected: &'static str, cell: &Cell) -> Result<T, Error> {
    Err(Error::TypeMismatch {
        expected,
        found: cell.value.cell_type(),
    })
}

impl FromCell for bool {
    fn from_cell(cell: &Cell) -> Result<Self, Error> {
        match &cell.value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => parse_bool(s).ok_or(Error::TypeMismatch {
                expected: "bool",
                found: CellType::String,
            }),
            _ => mismatch("bool", cell),
        }
    }
}

impl FromCell for i64 {
    fn from_cell(cell: &Cell) -> Result<Self, Error> {
        match &cell.value {
            Value::Int(v) => Ok(*v),
            Value::String(s) => s.parse().or_else(|_| mismatch("i64", cell)),
            _ => mismatch("i64", cell),
        }
    }
}

impl FromCell for f64 {
    fn from_cell(cell: &Cell) -> Result<Self, Error> {
        match &cell.value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::String(s) => s.parse().or_else(|_| mismatch("f64", cell)),
            _ => mismatch("f64", cell),
        }
    }
}

impl FromCell for String {
    fn from_cell(cell: &Cell) -> Result<Self, Error> {
        match &cell.value {
            Value::String(s) => Ok(s.clone()),
            Value::Hyperlink { text, url } => Ok(format!("{text} <{url}>")),
            Value::Blank | Value::Marker(_) => Ok(String::new()),
            _ => mismatch("String", cell),
        }
    }
}

impl FromCell for NaiveDateTime {
    fn from_cell(cell: &Cell) -> Result<Self, Error> {
        match &cell.value {
            Value::Date(d) => Ok(*d),
            _ => mismatch("NaiveDateTime", cell),
        }
    }
}

impl<T: FromCell> FromCell for Option<T> {
    fn from_cell(cell: &Cell) -> Result<Self, Error> {
        if cell.value.is_blank() {
            Ok(None)
        } else {
            T::from_cell(cell).map(Some)
        }
    }
}

/// A tuple of `&mut` scan destinations, extracted left to right from the
/// leading cells of a row.
pub trait ScanRow {
    /// Number of destinations.
    fn width(&self) -> usize;
    /// Fill the destinations from `cells`.
    fn scan_into(self, cells: &[Cell]) -> Result<(), Error>;
}

macro_rules! impl_scan_row {
    ($n:expr, $($t:ident => $idx:tt),+) => {
        impl<'a, $($t: FromCell),+> ScanRow for ($(&'a mut $t,)+) {
            fn width(&self) -> usize {
                $n
            }
            fn scan_into(self, cells: &[Cell]) -> Result<(), Error> {
                if cells.len() < $n {
                    return Err(Error::ScanWidth {
                        destinations: $n,
                        columns: cells.len(),
                    });
                }
                $(*self.$idx = $t::from_cell(&cells[$idx])?;)+
                Ok(())
            }
        }
    };
}

impl_scan_row!(1, A => 0);
impl_scan_row!(2, A => 0, B => 1);
impl_scan_row!(3, A => 0, B => 1, C => 2);
impl_scan_row!(4, A => 0, B => 1, C => 2, D => 3);
impl_scan_row!(5, A => 0, B => 1, C => 2, D => 3, E => 4);
impl_scan_row!(6, A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
impl_scan_row!(7, A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
impl_scan_row!(8, A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);
