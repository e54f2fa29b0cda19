//! Dense rectangular sheet matrix and its row iteration surface.

use std::sync::Arc;

use log::debug;

use crate::cell::{Cell, CellType, MergeMarker, ScanRow, Value};
use crate::errors::Error;
use crate::formats::Formatter;

/// Worksheet visibility, from the low bits of `BoundSheet8` or the
/// `state` attribute in OOXML workbooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetVisible {
    /// Listed and selectable
    #[default]
    Visible,
    /// Hidden from the tab bar
    Hidden,
    /// Hidden and not restorable from the UI
    VeryHidden,
}

/// A decoded sheet: a rectangular matrix of cells.
///
/// Rows are materialized lazily while decoding; every materialized row
/// spans the full column range so iteration always yields rectangular
/// data.
#[derive(Debug)]
pub struct Sheet {
    name: String,
    visible: SheetVisible,
    rows: Vec<Vec<Cell>>,
    max_row: usize,
    max_col: usize,
    empty: bool,
    formatter: Arc<Formatter>,
}

impl Sheet {
    pub(crate) fn new(name: impl Into<String>, formatter: Arc<Formatter>) -> Sheet {
        Sheet {
            name: name.into(),
            visible: SheetVisible::Visible,
            rows: Vec::new(),
            max_row: 0,
            max_col: 0,
            empty: true,
            formatter,
        }
    }

    /// Fixes the sheet extent to the inclusive last indices.
    pub(crate) fn set_dimensions(&mut self, max_row: usize, max_col: usize) {
        self.max_row = max_row;
        self.max_col = max_col;
        self.empty = false;
    }

    pub(crate) fn mark_empty(&mut self) {
        self.empty = true;
    }

    pub(crate) fn set_visible(&mut self, visible: SheetVisible) {
        self.visible = visible;
    }

    /// Stores a value, coercing it to the type its number format implies.
    pub(crate) fn put(&mut self, row: usize, col: usize, value: Value, format: u16) {
        let value = match self.formatter.cell_type(format) {
            Some(t) if format != 0 => value.coerce(t, self.formatter.is_1904()),
            _ => value,
        };
        // booleans display as TRUE/FALSE unless a boolean-style format
        // is attached
        let format = match value {
            Value::Bool(_) if self.formatter.cell_type(format) != Some(CellType::Boolean) => 0,
            _ => format,
        };
        self.place(row, col, Cell { value, format });
    }

    /// Stores a cell, materializing blank rows up to `row`.
    pub(crate) fn place(&mut self, row: usize, col: usize, cell: Cell) {
        if row > self.max_row || col > self.max_col {
            debug!(
                "cell out of bounds ({row}, {col}) in {}x{} sheet",
                self.max_row + 1,
                self.max_col + 1
            );
            return;
        }
        while self.rows.len() <= row {
            self.rows.push(vec![Cell::default(); self.max_col + 1]);
        }
        self.rows[row][col] = cell;
    }

    /// Overwrites the value of an existing cell, keeping its format.
    /// Used to attach the cached string result of a formula.
    pub(crate) fn set_value(&mut self, row: usize, col: usize, value: Value) {
        if row > self.max_row || col > self.max_col {
            debug!("cell out of bounds ({row}, {col})");
            return;
        }
        if self.rows.len() <= row {
            self.place(row, col, Cell::new(value));
        } else {
            self.rows[row][col].value = value;
        }
    }

    /// Fills the non-anchor cells of a merged region with markers:
    /// continuation/end rows down the first column, an end-column marker
    /// in the last column and continuation-column markers in between.
    pub(crate) fn fill_merged_region(&mut self, r0: usize, c0: usize, r1: usize, c1: usize) {
        for rn in r0..=r1 {
            for cn in c0..=c1 {
                if rn == r0 && cn == c0 {
                    // the anchor keeps its value
                    continue;
                }
                let marker = if cn == c0 {
                    if rn == r1 {
                        MergeMarker::EndRow
                    } else {
                        MergeMarker::ContinueRow
                    }
                } else if cn == c1 {
                    MergeMarker::EndColumn
                } else {
                    MergeMarker::ContinueColumn
                };
                self.place(rn, cn, Cell::new(Value::Marker(marker)));
            }
        }
    }

    /// Appends a row of pre-built cells (delimited text sources).
    pub(crate) fn push_row(&mut self, cells: Vec<Cell>) {
        if cells.len() > self.max_col + 1 {
            self.max_col = cells.len() - 1;
        }
        self.rows.push(cells);
        self.max_row = self.rows.len() - 1;
        self.empty = false;
    }

    // ragged rows can only come from push_row; square them off
    pub(crate) fn finish(&mut self) {
        for row in &mut self.rows {
            row.resize(self.max_col + 1, Cell::default());
        }
    }

    /// Sheet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sheet visibility.
    pub fn visible(&self) -> SheetVisible {
        self.visible
    }

    /// True when the workbook advertised a zero-extent sheet.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Number of materialized rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in every materialized row.
    pub fn width(&self) -> usize {
        if self.rows.is_empty() {
            0
        } else {
            self.max_col + 1
        }
    }

    /// A cell by zero-based position, when its row is materialized.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Iterates the materialized rows in order.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            formatter: &self.formatter,
            inner: self.rows.iter(),
        }
    }
}

/// Iterator over the rows of a [`Sheet`].
pub struct Rows<'a> {
    formatter: &'a Formatter,
    inner: std::slice::Iter<'a, Vec<Cell>>,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Row<'a>> {
        self.inner.next().map(|cells| Row {
            formatter: self.formatter,
            cells,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> ExactSizeIterator for Rows<'a> {}

/// One row of a sheet.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    formatter: &'a Formatter,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// The raw cells.
    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    /// Renders every cell through its number format.
    pub fn strings(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|c| {
                if c.value.is_blank() && !matches!(c.value, Value::Marker(_)) {
                    String::new()
                } else {
                    self.formatter.apply(c.format, &c.value).0
                }
            })
            .collect()
    }

    /// Extracts the leading cells into a tuple of `&mut` destinations.
    ///
    /// Destinations are limited to `bool`, `i64`, `f64`, `String`,
    /// `chrono::NaiveDateTime` and `Option`s thereof.
    pub fn scan<T: ScanRow>(&self, dest: T) -> Result<(), Error> {
        dest.scan_into(self.cells)
    }
}
