//! BIFF8 string structures: `XLUnicodeString` and friends, plus the
//! shared string table.
//!
//! BIFF8 strings carry a per-string flags byte. Bit 0 selects the
//! character width: 0 means one byte per character (the low byte of the
//! UTF-16 code unit), 1 means little-endian UTF-16. The SST character
//! stream may cross into a `Continue` record mid-string, and the first
//! byte of the continuation is a fresh flags byte that can change the
//! width of the remaining characters.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16LE, UTF_8};

use super::{Record, XlsError};
use crate::utils::{read_u16, read_u32};

/// Decodes legacy 8-bit and UTF-16 text per the workbook code page.
#[derive(Clone)]
pub(crate) struct XlsEncoding {
    encoding: &'static Encoding,
    single_byte: bool,
}

impl XlsEncoding {
    pub(crate) fn from_codepage(codepage: u16) -> Result<XlsEncoding, XlsError> {
        let encoding =
            codepage::to_encoding(codepage).ok_or(XlsError::CodePageNotFound(codepage))?;
        let single_byte = encoding == UTF_8 || encoding.is_single_byte();
        Ok(XlsEncoding {
            encoding,
            single_byte,
        })
    }

    /// BIFF8 default: code page 1200, UTF-16LE.
    pub(crate) fn utf16() -> XlsEncoding {
        XlsEncoding {
            encoding: UTF_16LE,
            single_byte: false,
        }
    }

    /// Decodes `len` characters whose bytes start at `stream`. Returns
    /// the number of bytes consumed.
    fn decode_to(
        &self,
        stream: &[u8],
        len: usize,
        high_byte: bool,
        s: &mut String,
    ) -> Result<usize, XlsError> {
        if self.single_byte {
            if stream.len() < len {
                return Err(XlsError::StringTruncated);
            }
            let (text, _, _) = self.encoding.decode(&stream[..len]);
            s.push_str(&text);
            return Ok(len);
        }
        let bytes: Cow<'_, [u8]> = if high_byte {
            if stream.len() < 2 * len {
                return Err(XlsError::StringTruncated);
            }
            Cow::Borrowed(&stream[..2 * len])
        } else {
            if stream.len() < len {
                return Err(XlsError::StringTruncated);
            }
            // widen to UTF-16 by zero-extension
            let mut wide = vec![0u8; 2 * len];
            for (i, b) in stream[..len].iter().enumerate() {
                wide[2 * i] = *b;
            }
            Cow::Owned(wide)
        };
        let (text, _, malformed) = UTF_16LE.decode(&bytes);
        if malformed {
            return Err(XlsError::InvalidUtf16);
        }
        s.push_str(&text);
        Ok(bytes.len())
    }
}

/// `ShortXLUnicodeString` (2.5.240): u8 char count, flags, characters.
/// Returns the string and the bytes consumed.
pub(crate) fn parse_short_string(
    data: &[u8],
    enc: &XlsEncoding,
) -> Result<(String, usize), XlsError> {
    if data.len() < 2 {
        return Err(XlsError::StringTruncated);
    }
    let cch = data[0] as usize;
    let high_byte = data[1] & 0x01 != 0;
    let mut s = String::with_capacity(cch);
    let used = enc.decode_to(&data[2..], cch, high_byte, &mut s)?;
    Ok((s, 2 + used))
}

/// `XLUnicodeString` (2.5.294): u16 char count, flags, characters.
pub(crate) fn parse_string(data: &[u8], enc: &XlsEncoding) -> Result<(String, usize), XlsError> {
    if data.len() < 3 {
        return Err(XlsError::StringTruncated);
    }
    let cch = read_u16(data) as usize;
    let high_byte = data[2] & 0x01 != 0;
    let mut s = String::with_capacity(cch);
    let used = enc.decode_to(&data[3..], cch, high_byte, &mut s)?;
    Ok((s, 3 + used))
}

// cursor over an SST record followed by its Continue records
struct SstCursor<'a> {
    records: &'a [Record],
    rec: usize,
    pos: usize,
}

impl<'a> SstCursor<'a> {
    fn remaining(&self) -> usize {
        self.records[self.rec].data.len() - self.pos
    }

    // move to the next Continue record
    fn advance(&mut self) -> Result<(), XlsError> {
        if self.rec + 1 >= self.records.len() {
            return Err(XlsError::SstCorrupt("string table ends mid-structure"));
        }
        self.rec += 1;
        self.pos = 0;
        Ok(())
    }

    fn ensure_data(&mut self) -> Result<(), XlsError> {
        while self.remaining() == 0 {
            self.advance()?;
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, XlsError> {
        self.ensure_data()?;
        let b = self.records[self.rec].data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, XlsError> {
        self.ensure_data()?;
        if self.remaining() < 2 {
            return Err(XlsError::SstCorrupt("field split across records"));
        }
        let v = read_u16(&self.records[self.rec].data[self.pos..]);
        self.pos += 2;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, XlsError> {
        self.ensure_data()?;
        if self.remaining() < 4 {
            return Err(XlsError::SstCorrupt("field split across records"));
        }
        let v = read_u32(&self.records[self.rec].data[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    // skip formatting-run or phonetic bytes, across record boundaries
    fn skip(&mut self, mut n: usize) -> Result<(), XlsError> {
        while n > 0 {
            if self.remaining() == 0 {
                self.advance()?;
                continue;
            }
            let take = n.min(self.remaining());
            self.pos += take;
            n -= take;
        }
        Ok(())
    }
}

/// Parses the whole shared string table from the `SST` record and its
/// `Continue` records (`XLUnicodeRichExtendedString`, 2.5.293).
pub(crate) fn parse_sst(records: &[Record]) -> Result<Vec<String>, XlsError> {
    let head = &records[0].data;
    if head.len() < 8 {
        return Err(XlsError::SstCorrupt("header too short"));
    }
    // total reference count at 0..4 is not needed
    let count = read_u32(&head[4..8]) as usize;

    let mut cursor = SstCursor {
        records,
        rec: 0,
        pos: 8,
    };
    let mut table = Vec::with_capacity(count);
    for _ in 0..count {
        table.push(read_rich_string(&mut cursor)?);
    }
    Ok(table)
}

fn read_rich_string(cur: &mut SstCursor<'_>) -> Result<String, XlsError> {
    let cch = cur.u16()? as usize;
    let mut flags = cur.u8()?;
    let rich_runs = if flags & 0x08 != 0 {
        cur.u16()? as usize
    } else {
        0
    };
    let ext_bytes = if flags & 0x04 != 0 {
        cur.u32()? as usize
    } else {
        0
    };

    let mut units = Vec::with_capacity(cch);
    for _ in 0..cch {
        if cur.remaining() == 0 {
            // a fresh flags byte opens the continuation and may flip
            // the character width
            cur.advance()?;
            flags = (flags & !0x01) | (cur.u8()? & 0x01);
        }
        if flags & 0x01 == 0 {
            units.push(cur.u8()? as u16);
        } else {
            if cur.remaining() == 1 {
                return Err(XlsError::SstCorrupt("utf-16 unit split across records"));
            }
            units.push(cur.u16()?);
        }
    }

    cur.skip(rich_runs * 4)?;
    cur.skip(ext_bytes)?;

    String::from_utf16(&units).map_err(|_| XlsError::InvalidUtf16)
}
