//! Delimited text files (CSV/TSV) behind the same sheet interface.
//!
//! Detection is heuristic: a probe succeeds only when a clear majority
//! of rows agree on a multi-column width, so the TSV probe rejects a
//! comma-separated file and the CSV probe can claim it afterwards.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::cell::Cell;
use crate::errors::from_err;
use crate::formats::Formatter;
use crate::sheet::Sheet;

/// An enum for delimited-text specific errors.
#[derive(Debug)]
pub enum DelimitedError {
    /// IO error
    Io(io::Error),
    /// error from the CSV parser
    Csv(csv::Error),
    /// the content does not look like delimited tabular data
    NotTabular,
}

from_err!(io::Error, DelimitedError, Io);
from_err!(csv::Error, DelimitedError, Csv);

impl DelimitedError {
    pub(crate) fn is_not_in_format(&self) -> bool {
        matches!(self, DelimitedError::NotTabular)
    }
}

impl fmt::Display for DelimitedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimitedError::Io(e) => write!(f, "{e}"),
            DelimitedError::Csv(e) => write!(f, "{e}"),
            DelimitedError::NotTabular => write!(f, "content is not delimited tabular data"),
        }
    }
}

impl std::error::Error for DelimitedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DelimitedError::Io(e) => Some(e),
            DelimitedError::Csv(e) => Some(e),
            _ => None,
        }
    }
}

/// A delimited text file: one sheet of string cells.
#[derive(Debug)]
pub struct Delimited {
    name: String,
    sheet: Sheet,
}

impl Delimited {
    /// Opens a tab-separated file.
    pub fn open_tsv<P: AsRef<Path>>(path: P) -> Result<Delimited, DelimitedError> {
        let data = std::fs::read(&path)?;
        Delimited::from_bytes(&display_name(path.as_ref()), &data, b'\t')
    }

    /// Opens a comma-separated file.
    pub fn open_csv<P: AsRef<Path>>(path: P) -> Result<Delimited, DelimitedError> {
        let data = std::fs::read(&path)?;
        Delimited::from_bytes(&display_name(path.as_ref()), &data, b',')
    }

    /// Parses in-memory content with the given delimiter, applying the
    /// tabular-shape heuristic.
    pub fn from_bytes(name: &str, data: &[u8], delimiter: u8) -> Result<Delimited, DelimitedError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            match record {
                Ok(r) => rows.push(r.iter().map(str::to_string).collect()),
                // early failures mean "not this format"; deep into a
                // plausible file they are real errors
                Err(e) if rows.len() < 10 => {
                    log::debug!("rejecting {name} as delimited text: {e}");
                    return Err(DelimitedError::NotTabular);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !looks_tabular(&rows) {
            return Err(DelimitedError::NotTabular);
        }

        let mut sheet = Sheet::new(name, Arc::new(Formatter::new()));
        for row in rows {
            sheet.push_row(row.into_iter().map(Cell::new).collect());
        }
        sheet.finish();
        Ok(Delimited {
            name: name.to_string(),
            sheet,
        })
    }

    /// The single collection, named after the file.
    pub fn sheet_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    /// The file's rows. The name is accepted for interface symmetry.
    pub fn worksheet(&mut self, _name: &str) -> Result<&Sheet, DelimitedError> {
        Ok(&self.sheet)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// more than 80% of rows (and more than 10 of them) sharing a width
// above one column reads as tabular
fn looks_tabular(rows: &[Vec<String>]) -> bool {
    let total = rows.len();
    if total <= 10 {
        // tiny inputs: insist every row agrees on a multi-column width,
        // and a lone line is never evidence of a table
        let Some(first) = rows.first().map(Vec::len) else {
            return false;
        };
        return total >= 2 && first > 1 && rows.iter().all(|r| r.len() == first);
    }
    let mut widths: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    for row in rows {
        *widths.entry(row.len()).or_insert(0) += 1;
    }
    widths
        .iter()
        .any(|(&cols, &n)| cols > 1 && n > 10 && n as f64 / total as f64 > 0.8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Value;

    #[test]
    fn reads_csv() {
        let data = b"a,b,c\n1,2,3\n4,5,6\n";
        let mut t = Delimited::from_bytes("data.csv", data, b',').unwrap();
        assert_eq!(t.sheet_names(), vec!["data.csv".to_string()]);
        let sheet = t.worksheet("data.csv").unwrap();
        let rows: Vec<Vec<String>> = sheet.rows().map(|r| r.strings()).collect();
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2", "3"], vec!["4", "5", "6"]]);
    }

    #[test]
    fn reads_tsv_with_quoting() {
        let data = b"x\ty\n\"multi\nline\"\t2\n";
        let t = Delimited::from_bytes("t.tsv", data, b'\t').unwrap();
        assert_eq!(t.sheet.height(), 2);
        assert_eq!(
            t.sheet.cell(1, 0).unwrap().value,
            Value::String("multi\nline".into())
        );
    }

    #[test]
    fn ragged_rows_are_squared_off() {
        let mut data = String::new();
        for i in 0..20 {
            data.push_str(&format!("{i},{i},{i}\n"));
        }
        data.push_str("a,b\n");
        let t = Delimited::from_bytes("r.csv", data.as_bytes(), b',').unwrap();
        for row in t.sheet.rows() {
            assert_eq!(row.cells().len(), 3);
        }
    }

    #[test]
    fn csv_probed_as_tsv_is_rejected() {
        let mut data = String::new();
        for i in 0..30 {
            data.push_str(&format!("{i},{i},{i}\n"));
        }
        let err = Delimited::from_bytes("x", data.as_bytes(), b'\t').unwrap_err();
        assert!(err.is_not_in_format());
        assert!(Delimited::from_bytes("x", data.as_bytes(), b',').is_ok());
    }

    #[test]
    fn empty_input_rejected() {
        let err = Delimited::from_bytes("e", b"", b',').unwrap_err();
        assert!(err.is_not_in_format());
    }

    #[test]
    fn scan_parses_strings() {
        let data = b"1\ttrue\t2.5\tname\n2\tfalse\t0.5\tother\n";
        let mut t = Delimited::from_bytes("s.tsv", data, b'\t').unwrap();
        let sheet = t.worksheet("s.tsv").unwrap();
        let row = sheet.rows().next().unwrap();
        let (mut n, mut b, mut f, mut s) = (0i64, false, 0f64, String::new());
        row.scan((&mut n, &mut b, &mut f, &mut s)).unwrap();
        assert_eq!((n, b, f, s.as_str()), (1, true, 2.5, "name"));
    }
}
