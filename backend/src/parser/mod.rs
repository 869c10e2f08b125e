//! Generic CSV to JSON parser with encoding and delimiter auto-detection.
//!
//! Converts CSV rows into JSON objects keyed by header. Empty cells and the
//! usual spreadsheet/pandas missing markers become `null`; nothing else about
//! the data is interpreted here.

use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{CsvError, CsvResult};

/// Cell contents treated as a missing value (in addition to blank cells).
const MISSING_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "#NA",
    "<NA>", "-1.#IND", "1.#QNAN",
];

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed records as JSON objects
    pub records: Vec<Value>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
}

/// Whether a raw cell should be read as a missing value.
pub fn is_missing_marker(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed)
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
///
/// Unknown encodings and invalid UTF-8 decode lossily.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match String::from_utf8(bytes.to_vec()) {
            Ok(s) => s,
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        // encoding_rs decodes the ISO-8859-1 label with the windows-1252 table
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        // Fallback: try UTF-8 with lossy conversion
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    decoded.trim_start_matches('\u{feff}').to_string()
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV into JSON objects with explicit delimiter.
///
/// Each row becomes a JSON object where keys are column headers.
///
/// # Example
/// ```ignore
/// use retention::csv_to_json;
///
/// let csv = "CustomerID,InvoiceDate\n17850,2010-12-01\n,2010-12-02";
/// let rows = csv_to_json(csv, ',').unwrap();
///
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0]["CustomerID"], "17850");
/// assert!(rows[1]["CustomerID"].is_null());
/// ```
pub fn csv_to_json(csv: &str, delimiter: char) -> CsvResult<Vec<Value>> {
    parse_string_with_metadata(csv, delimiter, "utf-8".to_string()).map(|r| r.records)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
///
/// # Example
/// ```ignore
/// let result = parse_csv_file_auto("/path/to/online_retail.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", result.encoding, result.delimiter);
/// println!("Records: {}", result.records.len());
/// ```
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    parse_bytes(bytes, None)
}

/// Parse CSV bytes, auto-detecting the encoding and, unless given, the delimiter.
pub fn parse_bytes(bytes: &[u8], delimiter: Option<char>) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    // Detect encoding
    let encoding = detect_encoding(bytes);

    // Decode content
    let content = decode_content(bytes, &encoding);

    // Detect delimiter
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    // Parse with detected settings
    parse_string_with_metadata(&content, delimiter, encoding)
}

/// Parse CSV string with explicit delimiter and return metadata.
pub fn parse_string_with_metadata(
    content: &str,
    delimiter: char,
    encoding: String,
) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }
    if !delimiter.is_ascii() {
        return Err(CsvError::ParseError {
            line: 1,
            message: format!("Delimiter '{}' is not an ASCII character", delimiter),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    // Parse data rows
    let mut records = Vec::new();

    for result in reader.records() {
        let row = result?;

        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut obj = Map::new();
        for (i, header) in headers.iter().enumerate() {
            let value = match row.get(i) {
                Some(cell) if !is_missing_marker(cell) => Value::String(cell.to_string()),
                _ => Value::Null,
            };
            obj.insert(header.clone(), value);
        }

        records.push(Value::Object(obj));
    }

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}
