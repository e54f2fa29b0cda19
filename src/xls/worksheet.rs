//! Two-pass decode of a worksheet substream.
//!
//! The first pass only establishes the sheet extent from `Dimensions`
//! (and bails out of dialog sheets); the second pass places cells.
//! Nested substreams (embedded charts) are skipped in both passes.

use std::sync::Arc;

use log::debug;

use super::hyperlinks::parse_hyperlink;
use super::{records, Record, XlsError};
use crate::cell::Value;
use crate::formats::Formatter;
use crate::sheet::{Sheet, SheetVisible};
use crate::utils::{read_f64, read_u16, read_u32};

// BoolErr error codes to their display strings
fn error_string(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "<unknown error>",
    }
}

/// Decodes a 32-bit RK-compressed number.
///
/// Bit 0 scales the value by 1/100, bit 1 selects integer payload; the
/// upper 30 bits are either a signed integer or the top of an IEEE-754
/// double. Values that survive the scaling as exact integers stay
/// integers.
pub(crate) fn parse_rk(rk: u32) -> Value {
    let d100 = rk & 0x01 != 0;
    let is_int = rk & 0x02 != 0;
    if is_int {
        let v = ((rk as i32) >> 2) as i64;
        if !d100 {
            Value::Int(v)
        } else if v % 100 == 0 {
            Value::Int(v / 100)
        } else {
            Value::Float(v as f64 / 100.0)
        }
    } else {
        let f = f64::from_bits(((rk as u64) & 0xFFFF_FFFC) << 32);
        Value::Float(if d100 { f / 100.0 } else { f })
    }
}

pub(crate) struct SheetCtx<'a> {
    pub strings: &'a [String],
    pub xfs: &'a [u16],
    pub formatter: &'a Arc<Formatter>,
}

impl SheetCtx<'_> {
    fn format_of(&self, ixfe: u16) -> u16 {
        match self.xfs.get(ixfe as usize) {
            Some(id) => *id,
            None => {
                debug!("XF index {ixfe} out of range ({} entries)", self.xfs.len());
                0
            }
        }
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

pub(crate) fn parse_worksheet(
    name: &str,
    visible: SheetVisible,
    recs: &[Record],
    ctx: &SheetCtx<'_>,
) -> Result<Sheet, XlsError> {
    let mut sheet = Sheet::new(name, Arc::clone(ctx.formatter));
    sheet.set_visible(visible);

    if !first_pass(recs, &mut sheet)? {
        return Ok(sheet);
    }
    second_pass(recs, &mut sheet, ctx)?;
    Ok(sheet)
}

// returns false when cell decoding should be skipped entirely
// (dialog sheets, chart substreams, zero-extent dimensions)
fn first_pass(recs: &[Record], sheet: &mut Sheet) -> Result<bool, XlsError> {
    let mut nested = 0;
    let mut has_cells = false;
    for (idx, r) in recs.iter().enumerate() {
        if nested > 0 {
            if r.typ == records::EOF {
                nested -= 1;
            }
            continue;
        }
        match r.typ {
            records::BOF if idx > 0 => nested += 1,
            records::BOF => {
                need(r, 4)?;
                if read_u16(&r.data[2..]) != records::DOCTYPE_WORKSHEET {
                    // charts and macro sheets carry no cell table
                    return Ok(false);
                }
            }
            records::WSBOOL => {
                need(r, 2)?;
                if r.data[1] & 0x10 != 0 {
                    // dialog sheet
                    return Ok(false);
                }
            }
            records::DIMENSIONS => {
                need(r, 12)?;
                let min_row = read_u32(&r.data[0..4]);
                let max_row = read_u32(&r.data[4..8]); // one past the last
                let min_col = read_u16(&r.data[8..10]) as u32;
                let max_col = read_u16(&r.data[10..12]) as u32; // one past
                if min_row > 0xFFFF || max_row > 0x1_0000 || min_col > 0xFF || max_col > 0x100 {
                    return Err(XlsError::InvalidDimensions {
                        rows: max_row,
                        cols: max_col,
                    });
                }
                if max_row == min_row || max_col == min_col {
                    sheet.mark_empty();
                    continue;
                }
                sheet.set_dimensions(max_row as usize - 1, max_col as usize - 1);
                // materialize the full matrix so iteration covers
                // trailing valueless rows
                sheet.place(max_row as usize - 1, max_col as usize - 1, Default::default());
                has_cells = true;
            }
            _ => (),
        }
    }
    Ok(has_cells)
}

fn second_pass(recs: &[Record], sheet: &mut Sheet, ctx: &SheetCtx<'_>) -> Result<(), XlsError> {
    let mut nested = 0;
    // target of a cached formula string in a later String record
    let mut pending_string: Option<(usize, usize)> = None;

    for (idx, r) in recs.iter().enumerate() {
        if nested > 0 {
            if r.typ == records::EOF {
                nested -= 1;
            }
            continue;
        }
        match r.typ {
            records::BOF if idx > 0 => nested += 1,
            records::RK => {
                need(r, 10)?;
                let (row, col) = cell_pos(&r.data);
                let format = ctx.format_of(read_u16(&r.data[4..6]));
                sheet.put(row, col, parse_rk(read_u32(&r.data[6..10])), format);
            }
            records::MULRK => {
                need(r, 10)?;
                let (row, first_col) = cell_pos(&r.data);
                let count = (r.data.len() - 6) / 6;
                for i in 0..count {
                    let base = 4 + i * 6;
                    let format = ctx.format_of(read_u16(&r.data[base..]));
                    let value = parse_rk(read_u32(&r.data[base + 2..]));
                    sheet.put(row, first_col + i, value, format);
                }
            }
            records::NUMBER => {
                need(r, 14)?;
                let (row, col) = cell_pos(&r.data);
                let format = ctx.format_of(read_u16(&r.data[4..6]));
                sheet.put(row, col, Value::Float(read_f64(&r.data[6..14])), format);
            }
            records::BOOLERR => {
                need(r, 8)?;
                let (row, col) = cell_pos(&r.data);
                let format = ctx.format_of(read_u16(&r.data[4..6]));
                match r.data[7] {
                    0x00 => sheet.put(row, col, Value::Bool(r.data[6] != 0), format),
                    _ => sheet.put(row, col, error_string(r.data[6]).into(), 0),
                }
            }
            records::LABELSST => {
                need(r, 10)?;
                let (row, col) = cell_pos(&r.data);
                let format = ctx.format_of(read_u16(&r.data[4..6]));
                let index = read_u32(&r.data[6..10]) as usize;
                if index >= ctx.strings.len() {
                    return Err(XlsError::SstIndexOutOfBounds {
                        index,
                        len: ctx.strings.len(),
                    });
                }
                sheet.put(row, col, ctx.strings[index].as_str().into(), format);
            }
            records::FORMULA => {
                need(r, 14)?;
                let (row, col) = cell_pos(&r.data);
                let format = ctx.format_of(read_u16(&r.data[4..6]));
                let cached = &r.data[6..14];
                if cached[6] == 0xFF && cached[7] == 0xFF {
                    match cached[0] {
                        0x00 => pending_string = Some((row, col)),
                        0x01 => sheet.put(row, col, Value::Bool(cached[2] != 0), format),
                        0x02 => sheet.put(row, col, error_string(cached[2]).into(), 0),
                        0x03 => (), // cached empty string
                        t => debug!("unknown cached formula value type {t}"),
                    }
                } else {
                    sheet.put(row, col, Value::Float(read_f64(cached)), format);
                }
            }
            records::STRING => {
                let text = parse_formula_string(recs, idx)?;
                match pending_string.take() {
                    Some((row, col)) => sheet.set_value(row, col, text.into()),
                    None => debug!("String record without a preceding formula"),
                }
            }
            records::HLINK => {
                need(r, 8)?;
                let (r0, r1, c0, c1) = clamp_ref8(&r.data, sheet);
                if r0 > sheet_last_row(sheet) || c0 > sheet_last_col(sheet) {
                    continue;
                }
                let (display, link) = match parse_hyperlink(&r.data[8..]) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!("skipping malformed hyperlink: {e}");
                        continue;
                    }
                };
                let value = if link.is_empty() {
                    Value::String(display)
                } else {
                    Value::Hyperlink {
                        text: display,
                        url: link,
                    }
                };
                sheet.place(r0, c0, crate::cell::Cell::new(value));
                sheet.fill_merged_region(r0, c0, r1, c1);
            }
            records::MERGECELLS => {
                need(r, 2)?;
                let count = read_u16(&r.data) as usize;
                need(r, 2 + count * 8)?;
                for i in 0..count {
                    let region = &r.data[2 + i * 8..2 + i * 8 + 8];
                    let (r0, r1, c0, c1) = clamp_ref8(region, sheet);
                    sheet.fill_merged_region(r0, c0, r1, c1);
                }
            }
            records::CONTINUE => (), // consumed by String decoding
            records::ROW
            | records::BLANK
            | records::MULBLANK
            | records::DIMENSIONS
            | records::WSBOOL
            | records::EOF => (),
            typ => debug!("unhandled sheet record type {typ:#06X}"),
        }
    }
    Ok(())
}

fn cell_pos(data: &[u8]) -> (usize, usize) {
    (read_u16(&data[0..2]) as usize, read_u16(&data[2..4]) as usize)
}

fn sheet_last_row(sheet: &Sheet) -> usize {
    sheet.height().saturating_sub(1)
}

fn sheet_last_col(sheet: &Sheet) -> usize {
    sheet.width().saturating_sub(1)
}

// Ref8 with 0xFFFF / 0xFF placeholders meaning "to the sheet edge"
fn clamp_ref8(data: &[u8], sheet: &Sheet) -> (usize, usize, usize, usize) {
    let first_row = read_u16(&data[0..2]) as usize;
    let mut last_row = read_u16(&data[2..4]) as usize;
    let first_col = read_u16(&data[4..6]) as usize;
    let mut last_col = read_u16(&data[6..8]) as usize;
    if last_row == 0xFFFF {
        last_row = sheet_last_row(sheet);
    }
    if last_col == 0xFF {
        last_col = sheet_last_col(sheet);
    }
    (first_row, last_row, first_col, last_col)
}

// a formula's cached string: the String record, possibly extended by
// Continue records, each continuation led by a fresh width flag
fn parse_formula_string(recs: &[Record], idx: usize) -> Result<String, XlsError> {
    let r = &recs[idx];
    need(r, 3)?;
    let cch = read_u16(&r.data[0..2]) as usize;
    let mut wide = r.data[2] & 0x01 != 0;
    let mut units: Vec<u16> = Vec::with_capacity(cch);

    let mut payload = &r.data[3..];
    let mut next = idx + 1;
    loop {
        if wide {
            units.extend(payload.chunks_exact(2).map(read_u16));
        } else {
            units.extend(payload.iter().map(|b| *b as u16));
        }
        if units.len() >= cch {
            break;
        }
        match recs.get(next) {
            Some(c) if c.typ == records::CONTINUE && !c.data.is_empty() => {
                wide = c.data[0] & 0x01 != 0;
                payload = &c.data[1..];
                next += 1;
            }
            _ => break,
        }
    }
    units.truncate(cch);
    Ok(String::from_utf16_lossy(&units))
}
