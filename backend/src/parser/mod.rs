//! Table loader for delimited text and spreadsheets.
//!
//! Delimited text goes through encoding and delimiter auto-detection before
//! a strict `csv` parse. Spreadsheets are read from their first worksheet
//! with `calamine`. Either way the first row is the header, column names are
//! trimmed, and duplicate names get a `.N` suffix.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;

use crate::error::{TableError, TableResult};
use crate::table::{CellValue, Table};

/// Tabular encoding of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// CSV/TSV-like text.
    Delimited,
    /// Workbook (xlsx, xls, ods, ...).
    Spreadsheet,
}

impl TableFormat {
    /// Infer from a file name extension, if it is a known one.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(TableFormat::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(TableFormat::Spreadsheet),
            _ => None,
        }
    }

    /// Infer from content: zip and OLE containers are spreadsheets.
    pub fn sniff(bytes: &[u8]) -> Self {
        const ZIP: &[u8] = b"PK\x03\x04";
        const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
        if bytes.starts_with(ZIP) || bytes.starts_with(OLE) {
            TableFormat::Spreadsheet
        } else {
            TableFormat::Delimited
        }
    }

    /// Extension first, content second.
    pub fn detect(file_name: Option<&str>, bytes: &[u8]) -> Self {
        file_name
            .and_then(Self::from_file_name)
            .unwrap_or_else(|| Self::sniff(bytes))
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(&bytes.to_vec());
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        // WHATWG maps the latin-1 labels to windows-1252, a superset of it.
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.bytes().filter(|&b| b == sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Trim header names and suffix repeated ones with `.1`, `.2`, ...
pub fn normalize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut used: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::new();

    for name in raw {
        let base = name.as_ref().trim().to_string();
        let mut candidate = base.clone();
        if used.contains(&candidate) {
            let counter = counters.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                candidate = format!("{}.{}", base, counter);
                if !used.contains(&candidate) {
                    break;
                }
            }
        }
        used.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

/// Load a table from a file path, inferring the format.
pub fn load_path<P: AsRef<Path>>(path: P) -> TableResult<Table> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path.file_name().and_then(|n| n.to_str());
    load_bytes(&bytes, TableFormat::detect(name, &bytes))
}

/// Load a table from raw bytes in a known format.
pub fn load_bytes(bytes: &[u8], format: TableFormat) -> TableResult<Table> {
    if bytes.is_empty() {
        return Err(TableError::EmptyFile);
    }
    match format {
        TableFormat::Delimited => {
            let encoding = detect_encoding(bytes);
            let content = decode_content(bytes, &encoding);
            parse_delimited(&content, detect_delimiter(&content))
        }
        TableFormat::Spreadsheet => parse_spreadsheet(bytes),
    }
}

/// Parse delimited text with an explicit delimiter.
pub fn parse_delimited(content: &str, delimiter: u8) -> TableResult<Table> {
    if content.trim().is_empty() {
        return Err(TableError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let header_record = reader.headers()?.clone();
    if header_record.iter().all(|h| h.trim().is_empty()) {
        return Err(TableError::NoHeaders);
    }
    let columns = normalize_headers(header_record.iter());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(CellValue::infer).collect());
    }

    Ok(Table::new(columns, rows))
}

/// Parse the first worksheet of a workbook.
pub fn parse_spreadsheet(bytes: &[u8]) -> TableResult<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TableError::Format("Workbook has no worksheets".to_string()))??;

    let mut rows_iter = range.rows();
    let header_row = rows_iter.next().ok_or(TableError::NoHeaders)?;
    if header_row.iter().all(|c| matches!(c, Data::Empty)) {
        return Err(TableError::NoHeaders);
    }
    let columns = normalize_headers(header_row.iter().map(|c| c.to_string()));

    let mut rows = Vec::new();
    for data_row in rows_iter {
        let row: Vec<CellValue> = data_row.iter().map(cell_from_data).collect();
        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        rows.push(row);
    }

    Ok(Table::new(columns, rows))
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => CellValue::Int(*f as i64),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}
