use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;

use log::debug;

use crate::error::DecodeError;
use crate::models::{DecodedTable, RawRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceFormat {
    /// Delimited text (comma, semicolon or tab)
    #[value(name = "csv")]
    Delimited,
    /// Spreadsheet workbook, first sheet only
    #[value(name = "xlsx")]
    Workbook,
}

impl SourceFormat {
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" | "tsv" => Some(Self::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Workbook),
            _ => None,
        }
    }

    /// Zip (xlsx, ods) and OLE (xls) containers are workbooks; anything else
    /// is treated as text.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            Self::Workbook
        } else {
            Self::Delimited
        }
    }
}

pub fn decode_file(path: &Path, format: Option<SourceFormat>) -> Result<DecodedTable, DecodeError> {
    let bytes = std::fs::read(path)?;
    let format = format
        .or_else(|| SourceFormat::from_extension(path))
        .unwrap_or_else(|| SourceFormat::sniff(&bytes));
    debug!("Decoding {} as {:?}", path.display(), format);
    decode(&bytes, format)
}

pub fn decode(bytes: &[u8], format: SourceFormat) -> Result<DecodedTable, DecodeError> {
    match format {
        SourceFormat::Delimited => decode_delimited(bytes),
        SourceFormat::Workbook => decode_workbook(bytes),
    }
}

// ---------------------------------------------------------------------------
// Shared row shaping
// ---------------------------------------------------------------------------

/// Blank headers become `column_N`; repeats get `_1`, `_2`… so every row map
/// key is unique.
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (i, header) in raw.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("column_{}", i + 1)
        } else {
            header
        };
        let mut name = base.clone();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        seen.insert(name.clone());
        out.push(name);
    }
    out
}

/// Missing trailing cells read as empty, surplus cells are dropped, all-blank
/// rows yield `None`.
fn build_row<I>(headers: &[String], cells: I, line: usize) -> Option<RawRow>
where
    I: Iterator<Item = String>,
{
    let mut cells: Vec<String> = cells.take(headers.len()).collect();
    if cells.iter().all(|c| c.trim().is_empty()) {
        return None;
    }
    cells.resize(headers.len(), String::new());
    Some(RawRow {
        line,
        values: headers.iter().cloned().zip(cells).collect(),
    })
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

fn to_utf8(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            debug!("Input is not UTF-8, decoding as Windows-1252");
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Most frequent of `,` `;` `\t` on the header line, ignoring quoted text.
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut counts = [(b',', 0usize), (b';', 0), (b'\t', 0)];
    let mut in_quotes = false;
    for c in first_line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        for (delim, count) in counts.iter_mut() {
            if c == *delim as char {
                *count += 1;
            }
        }
    }
    counts
        .iter()
        .fold((b',', 0), |best, &(d, n)| if n > best.1 { (d, n) } else { best })
        .0
}

fn decode_delimited(bytes: &[u8]) -> Result<DecodedTable, DecodeError> {
    let text = to_utf8(bytes);
    let text: &str = &text;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());
    let mut records = rdr.records();

    let headers = match records.next() {
        Some(record) => unique_headers(record?.iter().map(str::to_string).collect()),
        None => return Ok(DecodedTable::default()),
    };

    let mut rows = Vec::new();
    for result in records {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        if let Some(row) = build_row(&headers, record.iter().map(str::to_string), line) {
            rows.push(row);
        }
    }
    Ok(DecodedTable { headers, rows })
}

// ---------------------------------------------------------------------------
// Spreadsheet workbook (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(any(feature = "xlsx", test))]
pub fn excel_serial_to_date(serial: f64) -> String {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|base| base.checked_add_signed(chrono::Duration::days(serial.floor() as i64)))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(any(feature = "xlsx", test))]
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Whole days and seconds into the day, with rounding carried into the day.
#[cfg(any(feature = "xlsx", test))]
fn split_serial(serial: f64) -> (f64, u32) {
    let days = serial.floor();
    let secs = ((serial - days) * SECONDS_PER_DAY).round() as u32;
    if secs >= 86_400 {
        (days + 1.0, 0)
    } else {
        (days, secs)
    }
}

#[cfg(any(feature = "xlsx", test))]
fn format_time(secs: u32, fmt: &str) -> String {
    chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
        .map(|t| t.format(fmt).to_string())
        .unwrap_or_default()
}

/// Render a date-formatted serial the way the sheet shows it: a date, a time
/// of day (serial below one), or both.
#[cfg(any(feature = "xlsx", test))]
pub fn excel_serial_to_display(serial: f64) -> String {
    let (days, secs) = split_serial(serial);
    if days == 0.0 {
        format_time(secs, if secs % 60 == 0 { "%H:%M" } else { "%H:%M:%S" })
    } else if secs == 0 {
        excel_serial_to_date(days)
    } else {
        format!("{} {}", excel_serial_to_date(days), format_time(secs, "%H:%M:%S"))
    }
}

/// Elapsed time (`[h]:mm` cells) as hours and minutes; hours may exceed 24.
#[cfg(any(feature = "xlsx", test))]
pub fn excel_duration(serial: f64) -> String {
    let total = (serial.abs() * SECONDS_PER_DAY).round() as u64;
    let sign = if serial < 0.0 { "-" } else { "" };
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);
    if seconds == 0 {
        format!("{sign}{hours:02}:{minutes:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(feature = "xlsx")]
fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) if dt.is_duration() => excel_duration(dt.as_f64()),
        Data::DateTime(dt) => excel_serial_to_display(dt.as_f64()),
    }
}

#[cfg(feature = "xlsx")]
fn decode_workbook(bytes: &[u8]) -> Result<DecodedTable, DecodeError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes))?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(DecodeError::EmptyWorkbook);
    };
    let range = workbook.worksheet_range(&sheet)?;
    let first_row = range.start().map_or(0, |(r, _)| r as usize);
    debug!("Reading sheet '{sheet}' ({} rows)", range.height());

    let mut sheet_rows = range.rows();
    let headers = match sheet_rows.next() {
        Some(cells) => unique_headers(cells.iter().map(cell_to_string).collect()),
        None => return Ok(DecodedTable::default()),
    };
    let rows = sheet_rows
        .enumerate()
        .filter_map(|(i, cells)| {
            // header sits on first_row + 1, data starts one below it
            build_row(&headers, cells.iter().map(cell_to_string), first_row + i + 2)
        })
        .collect();
    Ok(DecodedTable { headers, rows })
}

#[cfg(not(feature = "xlsx"))]
fn decode_workbook(_bytes: &[u8]) -> Result<DecodedTable, DecodeError> {
    Err(DecodeError::Unsupported(
        "spreadsheet workbooks (built without the `xlsx` feature)".to_string(),
    ))
}
