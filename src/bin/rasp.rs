//! Extracts the contents of tabular files to TSV on stdout.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::format::{Item, StrftimeItems};
use clap::Parser;
use log::LevelFilter;

use rasp::{Cell, Value};

#[derive(Parser)]
#[command(
    name = "rasp",
    about = "Extract contents of tabular files (xls, xlsx, csv, tsv) to stdout as TSV"
)]
struct Args {
    /// strftime template applied to date cells
    #[arg(long, default_value = "%Y-%m-%d")]
    date: String,

    /// printf-style float format: %g, %e, %f, %.Nf or %.Ne
    #[arg(long, default_value = "%g")]
    float: String,

    /// log decoding details to stderr
    #[arg(short, long)]
    verbose: bool,

    /// password for encrypted workbooks
    #[arg(long)]
    password: Option<String>,

    /// files to extract
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Clone, Copy)]
enum FloatFormat {
    Shortest,
    Fixed(usize),
    Scientific(usize),
}

impl FloatFormat {
    fn parse(spec: &str) -> Option<FloatFormat> {
        match spec {
            "%g" => return Some(FloatFormat::Shortest),
            "%f" => return Some(FloatFormat::Fixed(6)),
            "%e" => return Some(FloatFormat::Scientific(6)),
            _ => (),
        }
        let rest = spec.strip_prefix("%.")?;
        let (digits, verb) = rest.split_at(rest.len().checked_sub(1)?);
        let precision: usize = digits.parse().ok()?;
        match verb {
            "f" => Some(FloatFormat::Fixed(precision)),
            "e" => Some(FloatFormat::Scientific(precision)),
            _ => None,
        }
    }

    fn render(self, v: f64) -> String {
        match self {
            FloatFormat::Shortest => format!("{v}"),
            FloatFormat::Fixed(p) => format!("{v:.p$}"),
            FloatFormat::Scientific(p) => format!("{v:.p$e}"),
        }
    }
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        eprintln!("{:5} {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose && log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }

    let Some(float_format) = FloatFormat::parse(&args.float) else {
        eprintln!("unsupported float format '{}'", args.float);
        return ExitCode::FAILURE;
    };
    let date_items: Vec<Item<'static>> = match StrftimeItems::new(&args.date).parse_to_owned() {
        Ok(items) => items,
        Err(e) => {
            eprintln!("unsupported date format '{}': {e}", args.date);
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut failed = false;
    for file in &args.files {
        if let Err(e) = extract(file, &args, float_format, &date_items, &mut out) {
            eprintln!("{}: {e}", file.display());
            failed = true;
        }
    }
    if out.flush().is_err() {
        failed = true;
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn extract(
    path: &Path,
    args: &Args,
    float_format: FloatFormat,
    date_items: &[Item<'static>],
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut workbook = match &args.password {
        Some(password) => rasp::open_with_password(path, password)?,
        None => rasp::open(path)?,
    };

    for name in workbook.list() {
        let sheet = workbook.get(&name)?;
        if sheet.is_empty() {
            log::debug!("sheet '{name}' is empty");
        }
        let mut line = String::new();
        for row in sheet.rows() {
            line.clear();
            for (i, cell) in row.cells().iter().enumerate() {
                if i > 0 {
                    line.push('\t');
                }
                line.push_str(&render_cell(cell, float_format, date_items));
            }
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

fn render_cell(cell: &Cell, float_format: FloatFormat, date_items: &[Item<'static>]) -> String {
    match &cell.value {
        Value::Float(f) => float_format.render(*f),
        Value::Date(d) => d.format_with_items(date_items.iter()).to_string(),
        other => other.to_string(),
    }
}
