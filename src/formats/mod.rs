//! Number-format engine shared by the xls and xlsx decoders.
//!
//! An Excel format code compiles into a boxed formatter closure plus the
//! cell type it implies. Built-in format ids (0–81) are pre-compiled;
//! `Format` records and `numFmt` style entries extend the table per
//! workbook.

pub mod dates;
pub mod frac;

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cell::{CellType, Value};
use dates::{excel_date_code_to_strftime, serial_to_datetime, DateTemplate};
use frac::decimal_to_whole_fraction;

/// A compiled formatter: renders one value with one format code.
pub type FmtFunc = Arc<dyn Fn(&Formatter, &Value) -> String + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Compiled {
    func: FmtFunc,
    ctype: Option<CellType>,
}

pub(super) static MINUTE_REGION: Lazy<Regex> = Lazy::new(|| Regex::new("h.*m.*s*").unwrap());
static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static TEXT_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]*""#).unwrap());
static ESCAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(.)").unwrap());
static NON_ESC_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([^"]|^)""#).unwrap());
static SQUASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_].").unwrap());
static NUMERIC_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0#?,.]+").unwrap());
static SCI_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[eE]+[+-]0+").unwrap());
static FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?+/(\?+)").unwrap());

/// Removes quote pairs, squashes `*x`/`_x` padding, and unescapes `\x`.
pub(super) fn strip_format_decorations(s: &str) -> String {
    let s = NON_ESC_QUOTE.replace_all(s, "$1");
    let s = SQUASH.replace_all(&s, "");
    ESCAPED.replace_all(&s, "$1").into_owned()
}

// ── combinators ─────────────────────────────────────────────────────────

fn ident() -> FmtFunc {
    Arc::new(|_, v| v.to_string())
}

fn static_text(s: String) -> FmtFunc {
    Arc::new(move |_, _| s.clone())
}

fn surround(pre: String, ff: FmtFunc, post: String) -> FmtFunc {
    Arc::new(move |x, v| format!("{pre}{}{post}", ff(x, v)))
}

fn neg_parens(ff: FmtFunc) -> FmtFunc {
    Arc::new(move |x, v| {
        let s = ff(x, v);
        match s.strip_prefix('-') {
            Some(rest) => format!("({rest})"),
            None => s,
        }
    })
}

fn add_commas(ff: FmtFunc) -> FmtFunc {
    Arc::new(move |x, v| group_thousands(&ff(x, v)))
}

fn group_thousands(s: &str) -> String {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let end = digits
        .find(|c| matches!(c, '.' | 'e' | 'E'))
        .unwrap_or(digits.len());
    if !digits[..end].bytes().all(|b| b.is_ascii_digit()) {
        return s.to_string();
    }
    let mut out = digits[..end].to_string();
    let mut i = end;
    while i > 3 {
        i -= 3;
        out.insert(i, ',');
    }
    out.push_str(&digits[end..]);
    if neg {
        format!("-{out}")
    } else {
        out
    }
}

fn zero_dash(ff: FmtFunc) -> FmtFunc {
    Arc::new(move |x, v| match v.as_f64() {
        Some(f) if f == 0.0 => "-".to_string(),
        Some(_) => ff(x, v),
        None => v.to_string(),
    })
}

fn int_fmt(width: usize, mul: i64) -> FmtFunc {
    Arc::new(move |_, v| match v.as_f64() {
        Some(f) => {
            let n = (f * mul as f64).round() as i64;
            if width == 0 {
                n.to_string()
            } else {
                format!("{n:width$}")
            }
        }
        None => v.to_string(),
    })
}

fn float_fmt(width: usize, prec: usize, mul: f64) -> FmtFunc {
    Arc::new(move |_, v| match v.as_f64() {
        Some(f) => format!("{:width$.prec$}", f * mul),
        None => v.to_string(),
    })
}

fn sci_fmt(prec: usize, mul: f64) -> FmtFunc {
    Arc::new(move |_, v| match v.as_f64() {
        Some(f) => format_scientific(f * mul, prec),
        None => v.to_string(),
    })
}

// "1.23E+08" style, sign and two exponent digits always present
fn format_scientific(v: f64, prec: usize) -> String {
    let s = format!("{v:.prec$e}");
    match s.split_once('e') {
        Some((mant, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mant}E{sign}{digits:0>2}")
        }
        None => s,
    }
}

fn frac_fmt(n: u32) -> FmtFunc {
    Arc::new(move |_, v| {
        let f = match v.as_f64() {
            Some(f) => f,
            None => return v.to_string(),
        };
        let (w, num, den) = decimal_to_whole_fraction(f, n, n);
        if num == 0 {
            w.to_string()
        } else if w == 0 && f < 0.0 {
            format!("-{num}/{den}")
        } else if w == 0 {
            format!("0 {num}/{den}")
        } else {
            format!("{w} {num}/{den}")
        }
    })
}

fn date_fmt(template: DateTemplate) -> FmtFunc {
    Arc::new(move |x, v| match v {
        Value::Date(dt) => template.render(dt),
        _ => match v.as_f64().and_then(|f| serial_to_datetime(f, x.is_1904())) {
            Some(dt) => template.render(&dt),
            None => v.to_string(),
        },
    })
}

fn abs_value(v: &Value) -> Value {
    match v {
        Value::Int(i) => Value::Int(i.wrapping_abs()),
        Value::Float(f) => Value::Float(f.abs()),
        other => other.clone(),
    }
}

/// Dispatches a value to the positive / negative / zero / text section.
///
/// `neg_abs` feeds the absolute value to the negative section, used when
/// that section carries its own sign marks (leading `(` or `-`).
fn sections(
    pos: FmtFunc,
    neg: Option<(FmtFunc, bool)>,
    zero: Option<FmtFunc>,
    text: Option<FmtFunc>,
) -> FmtFunc {
    Arc::new(move |x, v| match v.as_f64() {
        None => match &text {
            Some(t) => t(x, v),
            None => v.to_string(),
        },
        Some(f) if f == 0.0 => match &zero {
            Some(z) => z(x, v),
            None => pos(x, v),
        },
        Some(f) if f < 0.0 => match &neg {
            Some((n, true)) => n(x, &abs_value(v)),
            Some((n, false)) => n(x, v),
            None => pos(x, v),
        },
        Some(_) => pos(x, v),
    })
}

// ── format-code compiler ────────────────────────────────────────────────

pub(crate) fn compile(code: &str) -> Compiled {
    if code.eq_ignore_ascii_case("general") {
        return Compiled {
            func: ident(),
            ctype: None,
        };
    }
    // color and condition directives are not rendered
    let code = BRACKETS.replace_all(code, "");

    if !code.contains(';') {
        let (func, ctype) = compile_section(&code);
        return Compiled {
            func,
            ctype: Some(ctype),
        };
    }

    let parts: Vec<&str> = code.splitn(4, ';').collect();
    let compiled: Vec<(FmtFunc, CellType)> = parts.iter().map(|p| compile_section(p)).collect();
    let pos_type = compiled[0].1;

    // a format whose numeric sections are all fixed text is a boolean
    // display format ("yes";"yes";"no")
    let all_static = compiled
        .iter()
        .take(3)
        .all(|(_, t)| *t == CellType::String);
    let ctype = if all_static && compiled.len() >= 2 {
        CellType::Boolean
    } else {
        pos_type
    };

    let mut it = compiled.into_iter();
    let pos = it.next().expect("split produces at least one part").0;
    let neg = it.next().map(|(f, _)| {
        let sec = parts[1].trim_start();
        (f, sec.starts_with('(') || sec.starts_with('-'))
    });
    let zero = it.next().map(|(f, _)| f);
    let text = it.next().map(|(f, _)| f);

    Compiled {
        func: sections(pos, neg, zero, text),
        ctype: Some(ctype),
    }
}

// compile one ';'-free section
fn compile_section(s: &str) -> (FmtFunc, CellType) {
    // detection copy without escapes and quoted literals
    let det = ESCAPED.replace_all(s, "");
    let det = TEXT_LITERAL.replace_all(&det, "").into_owned();

    if det.contains(|c| matches!(c, 'y' | 'm' | 'd' | 'h' | 's' | 'Y' | 'M' | 'D' | 'H' | 'S')) {
        let template = excel_date_code_to_strftime(s);
        let template = DateTemplate::new(&template).unwrap_or_else(|| {
            debug!("unsupported date format code {s:?}");
            DateTemplate::new("%Y-%m-%d %H:%M:%S").expect("default template is valid")
        });
        return (date_fmt(template), CellType::Date);
    }

    if let Some(caps) = FRACTION.captures(&det) {
        let n = caps[1].len() as u32;
        return (frac_fmt(n), CellType::Float);
    }

    // the exponent marker is part of the digit-run syntax, not a literal
    let use_sci = det.contains(['e', 'E']);
    let s = SCI_MARKER.replace_all(s, "").into_owned();

    // split the section around its first digit run; no run at all means
    // the section is fixed text
    let (prefix, run, suffix) = match NUMERIC_RUN.find(&s) {
        None => {
            let text = strip_format_decorations(&s);
            if text == "@" {
                return (ident(), CellType::String);
            }
            if text.contains('@') {
                // '@' splices the raw value into the surrounding text
                let f: FmtFunc = Arc::new(move |_, v| text.replace('@', &v.to_string()));
                return (f, CellType::String);
            }
            return (static_text(text), CellType::String);
        }
        Some(m) => (&s[..m.start()], m.as_str(), &s[m.end()..]),
    };

    let mul = if det.contains('%') { 100 } else { 1 };
    let digits: String = run.chars().filter(|c| *c != ',').collect();
    let i1 = digits.find('0');

    let (mut ff, ctype) = if det.contains(|c| matches!(c, '.' | 'e' | 'E')) {
        let i2 = digits.find('.');
        let i3 = digits.rfind(['0', '.']);
        let prec = match (i2, i3) {
            (Some(i2), Some(i3)) if i3 > i2 => i3 - i2,
            _ => 0,
        };
        let width = match (i1, i3) {
            (Some(i1), Some(i3)) if i3 > i1 => i3 - i1,
            _ => 0,
        };
        let ff = if use_sci {
            sci_fmt(prec, mul as f64)
        } else {
            float_fmt(width, prec, mul as f64)
        };
        (ff, CellType::Float)
    } else {
        let i2 = digits.rfind('0');
        let width = match (i1, i2) {
            (Some(i1), Some(i2)) => i2 - i1,
            _ => 0,
        };
        (int_fmt(width, mul), CellType::Integer)
    };

    if run.contains(',') {
        ff = add_commas(ff);
    }

    let pre = strip_format_decorations(prefix);
    let post = strip_format_decorations(suffix);
    if !pre.is_empty() || !post.is_empty() {
        ff = surround(pre, ff, post);
    }

    (ff, ctype)
}

// ── built-in formats ────────────────────────────────────────────────────

fn date(id: u16, template: &str) -> (u16, Compiled) {
    let t = DateTemplate::new(template).expect("builtin template is valid");
    (
        id,
        Compiled {
            func: date_fmt(t),
            ctype: Some(CellType::Date),
        },
    )
}

fn cn_date(id: u16, template: &str) -> (u16, Compiled) {
    let t = DateTemplate::with_cn_meridiem(template).expect("builtin template is valid");
    (
        id,
        Compiled {
            func: date_fmt(t),
            ctype: Some(CellType::Date),
        },
    )
}

fn num(id: u16, func: FmtFunc, ctype: CellType) -> (u16, Compiled) {
    (
        id,
        Compiled {
            func,
            ctype: Some(ctype),
        },
    )
}

static BUILTIN: Lazy<HashMap<u16, Compiled>> = Lazy::new(|| {
    use CellType::{Float, Integer, String as Str};

    let currency = |decimals: bool| -> FmtFunc {
        let inner = move || -> FmtFunc {
            if decimals {
                add_commas(float_fmt(4, 2, 1.0))
            } else {
                add_commas(int_fmt(0, 1))
            }
        };
        sections(
            surround("$".into(), inner(), "".into()),
            Some((surround("$(".into(), inner(), ")".into()), true)),
            Some(static_text("$-".into())),
            None,
        )
    };

    let mut m = HashMap::from([
        num(0, ident(), Str),
        num(49, ident(), Str),
        num(1, int_fmt(0, 1), Integer),
        num(2, float_fmt(4, 2, 1.0), Float),
        num(3, add_commas(int_fmt(0, 1)), Integer),
        num(4, add_commas(float_fmt(4, 2, 1.0)), Float),
        num(9, surround("".into(), int_fmt(0, 100), "%".into()), Float),
        num(10, surround("".into(), float_fmt(4, 2, 100.0), "%".into()), Float),
        num(11, sci_fmt(2, 1.0), Float),
        num(48, sci_fmt(1, 1.0), Float),
        num(12, frac_fmt(1), Float),
        num(13, frac_fmt(2), Float),
        num(37, neg_parens(add_commas(int_fmt(0, 1))), Integer),
        num(38, neg_parens(add_commas(int_fmt(0, 1))), Integer),
        num(39, neg_parens(add_commas(float_fmt(4, 2, 1.0))), Float),
        num(40, neg_parens(add_commas(float_fmt(4, 2, 1.0))), Float),
        num(41, zero_dash(add_commas(int_fmt(0, 1))), Integer),
        num(43, zero_dash(add_commas(float_fmt(4, 2, 1.0))), Float),
        num(42, currency(false), Integer),
        num(44, currency(true), Float),
        // th-th numeric codes carry a digit-shape prefix in the spec
        num(59, surround("t".into(), int_fmt(0, 1), "".into()), Integer),
        num(60, surround("t".into(), float_fmt(4, 2, 1.0), "".into()), Float),
        num(61, surround("t".into(), add_commas(int_fmt(0, 1)), "".into()), Integer),
        num(62, surround("t".into(), add_commas(float_fmt(4, 2, 1.0)), "".into()), Float),
        num(67, surround("t".into(), int_fmt(0, 100), "%".into()), Float),
        num(68, surround("t".into(), float_fmt(4, 2, 100.0), "%".into()), Float),
        num(69, surround("t".into(), frac_fmt(1), "".into()), Float),
        num(70, surround("t".into(), frac_fmt(2), "".into()), Float),
    ]);

    let dates = [
        date(14, "%m-%d-%y"),
        date(15, "%-d-%b-%y"),
        date(16, "%-d-%b"),
        date(17, "%b-%y"),
        date(18, "%-I:%M %p"),
        date(19, "%-I:%M:%S %p"),
        date(20, "%-H:%M"),
        date(21, "%-H:%M:%S"),
        date(22, "%-m/%-d/%y %-H:%M"),
        date(45, "%M:%S"),
        date(46, "%-I:%M:%S"),
        date(47, "%M%S.0"),
        // zh-cn codes
        date(27, "%Y年%-m月"),
        date(28, "%-m月%-d日"),
        date(29, "%-m月%-d日"),
        date(30, "%-m-%-d-%y"),
        date(31, "%Y年%-m月%-d日"),
        date(32, "%-H时%M分"),
        date(33, "%-H时%M分%S秒"),
        date(36, "%Y年%-m月"),
        date(50, "%Y年%-m月"),
        date(51, "%-m月%-d日"),
        date(52, "%Y年%-m月"),
        date(53, "%-m月%-d日"),
        date(54, "%-m月%-d日"),
        date(57, "%Y年%-m月"),
        date(58, "%-m月%-d日"),
        cn_date(34, "%p %-I时%M分"),
        cn_date(35, "%p %-I时%M分%S秒"),
        cn_date(55, "%p %-I时%M分"),
        cn_date(56, "%p %-I时%M分%S秒"),
        // th-th date codes, tokens translated
        date(71, "%-d/%-m/%Y"),
        date(72, "%-d-%b-%y"),
        date(73, "%-d-%b"),
        date(74, "%b-%y"),
        date(75, "%-H:%M"),
        date(76, "%-H:%M:%S"),
        date(77, "%-d/%-m/%Y %-H:%M"),
        date(78, "%M:%S"),
        date(79, "%-H:%M:%S"),
        date(80, "%M:%S.0"),
        date(81, "%-d/%-m/%y"),
    ];
    m.extend(dates);
    m
});

// implied cell types for the built-in ids; id 0 carries no type
static BUILTIN_TYPES: Lazy<HashMap<u16, CellType>> = Lazy::new(|| {
    use CellType::{Date, Float, Integer, String as Str};
    let mut m = HashMap::new();
    for id in [1u16, 3, 37, 38, 41, 42, 59, 61] {
        m.insert(id, Integer);
    }
    for id in [2u16, 4, 9, 10, 11, 12, 13, 39, 40, 43, 44, 48, 60, 62, 67, 68, 69, 70] {
        m.insert(id, Float);
    }
    m.insert(49, Str);
    for id in (14u16..=22)
        .chain(27..=36)
        .chain(45..=47)
        .chain(50..=58)
        .chain(71..=81)
    {
        m.insert(id, Date);
    }
    m
});

/// Compiles and dispatches number formats for one workbook.
#[derive(Default)]
pub struct Formatter {
    is_1904: bool,
    custom: HashMap<u16, Compiled>,
}

impl std::fmt::Debug for Formatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter")
            .field("is_1904", &self.is_1904)
            .field("custom_len", &self.custom.len())
            .finish()
    }
}

impl Formatter {
    /// A formatter with only the built-in formats and the 1900 epoch.
    pub fn new() -> Formatter {
        Formatter::default()
    }

    /// Selects the 1904 date epoch (`Date1904` record, `date1904` attr).
    pub fn set_mode_1904(&mut self, enabled: bool) {
        self.is_1904 = enabled;
    }

    /// Whether serial dates count from the 1904 epoch.
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// Registers a user-defined format code. Built-in ids and already
    /// registered ids keep their first definition.
    pub fn add(&mut self, id: u16, code: &str) {
        if BUILTIN.contains_key(&id) {
            debug!("ignoring redefinition of builtin format {id}: {code:?}");
            return;
        }
        if self.custom.contains_key(&id) {
            debug!("ignoring redefinition of format {id}: {code:?}");
            return;
        }
        self.custom.insert(id, compile(code));
    }

    /// The cell type implied by a format id, if any.
    pub fn cell_type(&self, id: u16) -> Option<CellType> {
        BUILTIN_TYPES
            .get(&id)
            .copied()
            .or_else(|| self.custom.get(&id).and_then(|c| c.ctype))
    }

    /// Renders a value with the given format id. The flag is false when
    /// the id is unknown and the value fell back to its plain rendering.
    pub fn apply(&self, id: u16, value: &Value) -> (String, bool) {
        match BUILTIN.get(&id).or_else(|| self.custom.get(&id)) {
            Some(c) => ((c.func)(self, value), true),
            None => (value.to_string(), false),
        }
    }
}
