//! `HLink` payload decoding: display text plus link target.
//!
//! The payload after the cell region is a `Hyperlink` object: a CLSID,
//! a stream version, a flags bitmap, then optional blocks (display
//! name, target frame, moniker, location string) in that order. URL and
//! file monikers are the only CLSID variants carried by worksheets.

use log::debug;

use super::XlsError;
use crate::utils::{read_u16, read_u32};

const HAS_MONIKER: u32 = 0x0001;
const HAS_LOCATION: u32 = 0x0008;
const HAS_DISPLAY: u32 = 0x0010;
const HAS_FRAME: u32 = 0x0080;
const MONIKER_AS_STR: u32 = 0x0100;

const URL_MONIKER: [u8; 16] = [
    0xE0, 0xC9, 0xEA, 0x79, 0xF9, 0xBA, 0xCE, 0x11, 0x8C, 0x82, 0x00, 0xAA, 0x00, 0x4B, 0xA9,
    0x0B,
];
const FILE_MONIKER: [u8; 16] = [
    0x03, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x46,
];

fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], XlsError> {
    if *pos + n > data.len() {
        return Err(XlsError::Hyperlink("payload too short"));
    }
    let s = &data[*pos..*pos + n];
    *pos += n;
    Ok(s)
}

fn read_utf16_units(data: &[u8], pos: &mut usize, units: usize) -> Result<String, XlsError> {
    let raw = take(data, pos, units * 2)?;
    let decoded: Vec<u16> = raw.chunks_exact(2).map(read_u16).collect();
    Ok(String::from_utf16_lossy(&decoded))
}

fn trim(s: &str) -> String {
    s.trim_matches([' ', '\u{b}', '\u{c}', '\t', '\r', '\n', '\0'])
        .to_string()
}

/// Decodes the hyperlink structure following a `Ref8`, yielding
/// `(display_text, link_target)`.
pub(crate) fn parse_hyperlink(data: &[u8]) -> Result<(String, String), XlsError> {
    let mut pos = 0;
    take(data, &mut pos, 16)?; // object CLSID, fixed
    let version = read_u32(take(data, &mut pos, 4)?);
    if version != 2 {
        return Err(XlsError::HyperlinkVersion(version));
    }
    let flags = read_u32(take(data, &mut pos, 4)?);

    let mut display = String::new();
    let mut link = String::new();

    if flags & HAS_DISPLAY != 0 {
        let units = read_u32(take(data, &mut pos, 4)?) as usize;
        display = read_utf16_units(data, &mut pos, units)?;
    }
    if flags & HAS_FRAME != 0 {
        let units = read_u32(take(data, &mut pos, 4)?) as usize;
        take(data, &mut pos, units * 2)?; // target frame, unused
    }
    if flags & HAS_MONIKER != 0 {
        if flags & MONIKER_AS_STR != 0 {
            let units = read_u32(take(data, &mut pos, 4)?) as usize;
            link = read_utf16_units(data, &mut pos, units)?;
        } else {
            link = parse_moniker(data, &mut pos)?;
        }
    }
    if flags & HAS_LOCATION != 0 {
        // an intra-document location replaces the moniker target
        let units = read_u32(take(data, &mut pos, 4)?) as usize;
        link = read_utf16_units(data, &mut pos, units)?;
    }

    Ok((trim(&display), trim(&link)))
}

fn parse_moniker(data: &[u8], pos: &mut usize) -> Result<String, XlsError> {
    let clsid = take(data, pos, 16)?;
    if clsid == URL_MONIKER {
        let bytes = read_u32(take(data, pos, 4)?) as usize;
        let units = bytes / 2;
        let raw = take(data, pos, units * 2)?;
        let mut decoded: Vec<u16> = raw.chunks_exact(2).map(read_u16).collect();
        // a serial GUID block may pad the URL; it starts after a null
        if units > 12 && decoded[units - 13] == 0 {
            decoded.truncate(units - 12);
        }
        return Ok(String::from_utf16_lossy(&decoded));
    }
    if clsid == FILE_MONIKER {
        take(data, pos, 2)?; // cAnti
        let ansi_len = read_u32(take(data, pos, 4)?) as usize;
        let ansi = take(data, pos, ansi_len)?.to_vec();
        take(data, pos, 24)?; // fixed fields
        let unicode_len = read_u32(take(data, pos, 4)?) as usize;
        if unicode_len > 6 {
            take(data, pos, 6)?;
            return read_utf16_units(data, pos, (unicode_len - 6) / 2);
        }
        return Ok(String::from_utf8_lossy(&ansi).into_owned());
    }
    debug!("unknown hyperlink moniker CLSID {clsid:02X?}");
    Err(XlsError::Hyperlink("unknown moniker classid"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn push_u32(v: &mut Vec<u8>, x: u32) {
        v.extend_from_slice(&x.to_le_bytes());
    }

    fn push_utf16(v: &mut Vec<u8>, s: &str, null_terminated: bool) -> u32 {
        let mut n = 0;
        for u in s.encode_utf16() {
            v.extend_from_slice(&u.to_le_bytes());
            n += 1;
        }
        if null_terminated {
            v.extend_from_slice(&[0, 0]);
            n += 1;
        }
        n
    }

    /// A url-moniker hyperlink payload with a display string.
    pub(crate) fn url_hyperlink(display: &str, url: &str) -> Vec<u8> {
        let mut v = vec![0u8; 16]; // object CLSID
        push_u32(&mut v, 2); // stream version
        push_u32(&mut v, HAS_DISPLAY | HAS_MONIKER);

        let mut text = Vec::new();
        let units = push_utf16(&mut text, display, true);
        push_u32(&mut v, units);
        v.extend_from_slice(&text);

        v.extend_from_slice(&URL_MONIKER);
        let mut url16 = Vec::new();
        push_utf16(&mut url16, url, true);
        push_u32(&mut v, url16.len() as u32);
        v.extend_from_slice(&url16);
        v
    }

    #[test]
    fn url_moniker() {
        let data = url_hyperlink("example", "http://example.com/");
        let (display, link) = parse_hyperlink(&data).unwrap();
        assert_eq!(display, "example");
        assert_eq!(link, "http://example.com/");
    }

    #[test]
    fn url_moniker_with_padding() {
        // null terminator followed by a 24-byte serial GUID block
        let mut v = vec![0u8; 16];
        push_u32(&mut v, 2);
        push_u32(&mut v, HAS_MONIKER);
        v.extend_from_slice(&URL_MONIKER);
        let mut url16 = Vec::new();
        push_utf16(&mut url16, "http://a.example/", false);
        url16.extend_from_slice(&[0u8; 26]); // null + 12 more units
        push_u32(&mut v, url16.len() as u32);
        v.extend_from_slice(&url16);

        let (_, link) = parse_hyperlink(&v).unwrap();
        assert_eq!(link, "http://a.example/");
    }

    #[test]
    fn file_moniker() {
        let mut v = vec![0u8; 16];
        push_u32(&mut v, 2);
        push_u32(&mut v, HAS_MONIKER);
        v.extend_from_slice(&FILE_MONIKER);
        v.extend_from_slice(&0u16.to_le_bytes()); // cAnti
        let path = b"C:\\data\\report.xls\0";
        push_u32(&mut v, path.len() as u32);
        v.extend_from_slice(path);
        v.extend_from_slice(&[0u8; 24]);
        push_u32(&mut v, 0); // no unicode path

        let (display, link) = parse_hyperlink(&v).unwrap();
        assert_eq!(display, "");
        assert_eq!(link, "C:\\data\\report.xls");
    }

    #[test]
    fn location_string_replaces_target() {
        let mut v = vec![0u8; 16];
        push_u32(&mut v, 2);
        push_u32(&mut v, HAS_LOCATION);
        let mut loc = Vec::new();
        let units = push_utf16(&mut loc, "Sheet2!A1", true);
        push_u32(&mut v, units);
        v.extend_from_slice(&loc);

        let (_, link) = parse_hyperlink(&v).unwrap();
        assert_eq!(link, "Sheet2!A1");
    }

    #[test]
    fn bad_version_rejected() {
        let mut v = vec![0u8; 16];
        push_u32(&mut v, 7);
        push_u32(&mut v, 0);
        assert!(matches!(
            parse_hyperlink(&v),
            Err(XlsError::HyperlinkVersion(7))
        ));
    }
}
