//! Excel serial date conversion and date-format translation.
//!
//! Serial values count days from the workbook epoch (1899-12-30 for the
//! 1900 system, 1904-01-01 for the 1904 system) with the fractional part
//! as time of day. Values below 61 in the 1900 system predate the
//! fictitious 1900 leap day and go through a Julian-day formula so the
//! original serial numbering is preserved.

use chrono::format::{Item, StrftimeItems};
use chrono::{Duration, NaiveDate, NaiveDateTime};

// Julian day offsets for serials below 61. The 1904 constant matches the
// historical behavior of this conversion, half a day below the textbook
// value; see DESIGN.md.
const JULIAN_1900: f64 = 2_415_018.5;
const JULIAN_1904: f64 = 2_416_480.5;

const MS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Converts an Excel serial date to a civil datetime.
///
/// Returns `None` for values that do not map to a representable date.
pub fn serial_to_datetime(val: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !val.is_finite() {
        return None;
    }
    let days = val.trunc();
    if days < 61.0 {
        return julian_datetime(val, is_1904);
    }
    let frac = val - days;
    let epoch = epoch_date(is_1904).and_hms_opt(0, 0, 0)?;
    let ms = (frac * MS_PER_DAY).round() as i64;
    epoch
        .checked_add_signed(Duration::try_days(days as i64)?)?
        .checked_add_signed(Duration::milliseconds(ms))
}

/// Inverse of [`serial_to_datetime`] for the epoch branch (serial >= 61).
pub fn datetime_to_serial(dt: &NaiveDateTime, is_1904: bool) -> f64 {
    let epoch = epoch_date(is_1904)
        .and_hms_opt(0, 0, 0)
        .expect("epoch is a valid datetime");
    let delta = dt.signed_duration_since(epoch);
    delta.num_seconds() as f64 / 86_400.0
}

fn epoch_date(is_1904: bool) -> NaiveDate {
    let date = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    };
    date.expect("epoch is a valid date")
}

// Gregorian date from an integral Julian day number, per the USNO formula.
fn julian_datetime(val: f64, is_1904: bool) -> Option<NaiveDateTime> {
    let jdate = val + 0.5 + if is_1904 { JULIAN_1904 } else { JULIAN_1900 };
    if !(0.0..4e9).contains(&jdate) {
        return None;
    }
    let jd = jdate.trunc() as i64;
    let frac = jdate - jd as f64;

    let l = jd + 68_569;
    let n = 4 * l / 146_097;
    let l = l - (146_097 * n + 3) / 4;
    let i = 4000 * (l + 1) / 1_461_001;
    let l = l - 1461 * i / 4 + 31;
    let j = 80 * l / 2447;
    let day = l - 2447 * j / 80;
    let l = j / 11;
    let month = j + 2 - 12 * l;
    let year = 100 * (n - 49) + i + l;

    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;
    let ms = (frac * MS_PER_DAY).round() as i64;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(ms))
}

/// A parsed strftime template, plus the Chinese-meridiem rendering quirk
/// used by built-in formats 34/35/55/56.
#[derive(Clone)]
pub(crate) struct DateTemplate {
    items: Vec<Item<'static>>,
    cn_meridiem: bool,
}

impl DateTemplate {
    /// Parses a strftime template, failing on unknown specifiers.
    pub(crate) fn new(template: &str) -> Option<DateTemplate> {
        let items = StrftimeItems::new(template).parse_to_owned().ok()?;
        Some(DateTemplate {
            items,
            cn_meridiem: false,
        })
    }

    pub(crate) fn with_cn_meridiem(template: &str) -> Option<DateTemplate> {
        let mut t = DateTemplate::new(template)?;
        t.cn_meridiem = true;
        Some(t)
    }

    pub(crate) fn render(&self, dt: &NaiveDateTime) -> String {
        let s = dt.format_with_items(self.items.iter()).to_string();
        if self.cn_meridiem {
            s.replacen("AM", "上午", 1).replacen("PM", "下午", 1)
        } else {
            s
        }
    }
}

/// Translates an Excel date/time format code into a strftime template.
///
/// `code` is a single format section with quoted literals still embedded.
/// The ambiguity between month and minute `m` tokens is resolved by
/// locating the `h...m...s` region first; inside it `m`/`mm` mean minutes.
pub(crate) fn excel_date_code_to_strftime(code: &str) -> String {
    let mut s = normalize_tokens(code);

    // stray percent signs must survive as literals
    if s.contains('%') {
        s = s.replace('%', "%%");
    }

    let has_ampm = s.contains("am/pm") || s.contains("a/p");
    // the meridiem text must leave the stream before the minute-region and
    // month passes can look for `m` tokens
    s = replacen_first(&s, "am/pm", "%p");
    s = replacen_first(&s, "a/p", "%p");

    if let Some(m) = super::MINUTE_REGION.find(&s) {
        let inner = &s[m.start()..m.end()];
        let inner = replacen_first(inner, "mm", "%M");
        let inner = replacen_first(&inner, "m", "%-M");
        s = format!("{}{}{}", &s[..m.start()], inner, &s[m.end()..]);
    }

    let hour_long = if has_ampm { "%I" } else { "%H" };
    let hour_short = if has_ampm { "%-I" } else { "%-H" };
    // longest tokens first so shorter ones never eat their prefixes
    let replacements: &[(&str, &str)] = &[
        ("hh", hour_long),
        ("h", hour_short),
        ("ss", "%S"),
        ("s", "%-S"),
        ("mmmmm", "%b"),
        ("mmmm", "%B"),
        ("mmm", "%b"),
        ("mm", "%m"),
        ("m", "%-m"),
        ("dddd", "%A"),
        ("ddd", "%a"),
        ("dd", "%d"),
        ("d", "%-d"),
        ("yyyy", "%Y"),
        ("yy", "%y"),
    ];
    for (from, to) in replacements {
        s = replacen_first(&s, from, to);
    }

    super::strip_format_decorations(&s)
}

// Excel format tokens are case-insensitive; lowercase them outside quoted
// literals so the substitution table only needs one case.
fn normalize_tokens(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut in_quote = false;
    let mut escaped = false;
    for c in code.chars() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_quote => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                out.push(c);
                in_quote = !in_quote;
            }
            'Y' | 'M' | 'D' | 'H' | 'S' | 'A' | 'P' if !in_quote => {
                out.push(c.to_ascii_lowercase());
            }
            _ => out.push(c),
        }
    }
    out
}

// replace only the first occurrence, skipping over already-emitted
// `%`-specifiers so a token never matches inside one
fn replacen_first(s: &str, from: &str, to: &str) -> String {
    let mut start = 0;
    while let Some(pos) = s[start..].find(from) {
        let at = start + pos;
        if at > 0 && s.as_bytes()[..at].iter().rev().take_while(|&&b| b == b'%').count() % 2 == 1
            || (at > 1 && s.as_bytes()[at - 1] == b'-' && s.as_bytes()[at - 2] == b'%')
        {
            start = at + from.len();
            continue;
        }
        let mut out = String::with_capacity(s.len() + to.len());
        out.push_str(&s[..at]);
        out.push_str(to);
        out.push_str(&s[at + from.len()..]);
        return out;
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn epoch_conversion() {
        // one day after the leap-day gap closes
        assert_eq!(
            serial_to_datetime(61.0, false),
            Some(ymd_hms(1900, 3, 1, 0, 0, 0))
        );
        // unix epoch
        assert_eq!(
            serial_to_datetime(25569.0, false),
            Some(ymd_hms(1970, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            serial_to_datetime(25569.645833333333, false),
            Some(ymd_hms(1970, 1, 1, 15, 30, 0))
        );
    }

    #[test]
    fn mode_1904_julian_branch() {
        // 2.5 days into the 1904 epoch, noon
        assert_eq!(
            serial_to_datetime(2.5, true),
            Some(ymd_hms(1904, 1, 3, 12, 0, 0))
        );
    }

    #[test]
    fn serial_round_trip() {
        for &v in &[61.0, 1000.25, 25569.5, 44484.7916666667, 2_958_465.0] {
            let dt = serial_to_datetime(v, false).unwrap();
            let back = datetime_to_serial(&dt, false);
            assert!(
                (back - v).abs() < 1.5 / 86_400.0,
                "serial {v} -> {dt} -> {back}"
            );
        }
        for &v in &[61.0, 1000.25, 40000.75] {
            let dt = serial_to_datetime(v, true).unwrap();
            let back = datetime_to_serial(&dt, true);
            assert!((back - v).abs() < 1.5 / 86_400.0);
        }
    }

    #[test]
    fn non_finite_rejected() {
        assert_eq!(serial_to_datetime(f64::NAN, false), None);
        assert_eq!(serial_to_datetime(f64::INFINITY, false), None);
        assert_eq!(serial_to_datetime(1e20, false), None);
    }

    #[test]
    fn token_translation() {
        assert_eq!(excel_date_code_to_strftime("mm-dd-yy"), "%m-%d-%y");
        assert_eq!(excel_date_code_to_strftime("yyyy-mm-dd"), "%Y-%m-%d");
        assert_eq!(excel_date_code_to_strftime("d-mmm-yy"), "%-d-%b-%y");
        // m after h is a minute
        assert_eq!(excel_date_code_to_strftime("h:mm:ss"), "%-H:%M:%S");
        assert_eq!(excel_date_code_to_strftime("m/d/yy h:mm"), "%-m/%-d/%y %-H:%M");
        // 12-hour clock with meridiem
        assert_eq!(excel_date_code_to_strftime("h:mm AM/PM"), "%-I:%M %p");
        // quoted CJK literals survive, quotes dropped
        assert_eq!(
            excel_date_code_to_strftime("yyyy\"年\"m\"月\""),
            "%Y年%-m月"
        );
        // uppercase tokens are accepted
        assert_eq!(excel_date_code_to_strftime("DD/MM/YY"), "%d/%m/%y");
    }

    #[test]
    fn template_rendering() {
        let t = DateTemplate::new("%m-%d-%y").unwrap();
        assert_eq!(t.render(&ymd_hms(1904, 1, 3, 12, 0, 0)), "01-03-04");
        let t = DateTemplate::new("%-I:%M %p").unwrap();
        assert_eq!(t.render(&ymd_hms(2020, 5, 1, 15, 4, 0)), "3:04 PM");
        let t = DateTemplate::with_cn_meridiem("%p %-I时%M分").unwrap();
        assert_eq!(t.render(&ymd_hms(2020, 5, 1, 15, 4, 0)), "下午 3时04分");
    }
}
