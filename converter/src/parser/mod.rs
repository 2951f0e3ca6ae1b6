//! CSV source reading with encoding and delimiter auto-detection.
//!
//! Produces a lazy sequence of [`Row`]s with the source shape already
//! applied: leading records skipped (`first_row`), trailing records cut
//! (`last_row`, negative values count from the end) and leading columns
//! dropped (`first_col`). Nothing here knows about transactions.
//!
//! Encoding and delimiter detection need the whole input, so a source is
//! read and decoded in full before the first row is produced. Only the
//! decoded text stays alive while rows are iterated.

use csv::StringRecord;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::mapping::SourceFormat;
use crate::models::Row;

/// Delimiter candidates, in tie-break order
const DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _confidence, _language) = chardet::detect(bytes);

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-15".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => chardet::charset2encoding(&charset).to_string(),
    }
}

/// Decode bytes to a string using the given encoding label.
///
/// A leading byte-order mark is removed.
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let codec = encoding_rs::Encoding::for_label(encoding.trim().as_bytes())
        .ok_or_else(|| CsvError::Encoding(encoding.to_string()))?;

    let (text, _, had_errors) = codec.decode(bytes);
    if had_errors {
        return Err(CsvError::Encoding(encoding.to_string()));
    }
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best = sep;
        }
    }
    best
}

/// A decoded source ready for row iteration
#[derive(Debug, Clone)]
pub struct DecodedSource {
    pub content: String,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Decode raw bytes, honoring explicit encoding and delimiter hints.
///
/// An explicit encoding must decode cleanly. A detected one falls back to a
/// lossy UTF-8 reading, since detection on short inputs is a guess.
pub fn decode_source(bytes: &[u8], format: &SourceFormat) -> CsvResult<DecodedSource> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(CsvError::EmptyFile);
    }

    let (content, encoding) = match &format.encoding {
        Some(encoding) => (decode_content(bytes, encoding)?, encoding.clone()),
        None => {
            let detected = detect_encoding(bytes);
            match decode_content(bytes, &detected) {
                Ok(content) => (content, detected),
                Err(_) => (
                    String::from_utf8_lossy(bytes).trim_start_matches('\u{feff}').to_string(),
                    "utf-8".to_string(),
                ),
            }
        }
    };

    let delimiter = format.delimiter.unwrap_or_else(|| detect_delimiter(&content));
    Ok(DecodedSource { content, encoding, delimiter })
}

/// Lazy row iterator over a CSV source.
pub struct RowReader<R> {
    records: csv::StringRecordsIntoIter<R>,
    headers: Vec<String>,
    first_col: usize,
    /// Records held back while `last_row` is negative
    lookbehind: VecDeque<StringRecord>,
    hold_back: usize,
    /// Index of the last record to emit, when bounded from the start
    last_index: Option<usize>,
    /// Index of the next raw record
    index: usize,
    ordinal: usize,
    done: bool,
}

impl RowReader<Cursor<Vec<u8>>> {
    /// Rows from an already decoded source
    pub fn from_decoded(source: DecodedSource, format: &SourceFormat) -> CsvResult<Self> {
        Self::new(Cursor::new(source.content.into_bytes()), source.delimiter, format)
    }
}

impl<R: Read> RowReader<R> {
    /// Wrap UTF-8 CSV data. Leading records and the header are consumed here.
    pub fn new(reader: R, delimiter: char, format: &SourceFormat) -> CsvResult<Self> {
        let delimiter = u8::try_from(delimiter)
            .map_err(|_| CsvError::Encoding(format!("non-ASCII delimiter '{}'", delimiter)))?;
        let records = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();

        // -1 keeps every record; i64::MIN must not be negated
        let to_usize = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
        let (hold_back, last_index) = match format.last_row {
            Some(last) if last < 0 => (to_usize(last.unsigned_abs() - 1), None),
            Some(last) => (0, Some(to_usize(last.unsigned_abs()))),
            None => (0, None),
        };

        let mut reader = Self {
            records,
            headers: Vec::new(),
            first_col: format.first_col.unwrap_or(0),
            lookbehind: VecDeque::new(),
            hold_back,
            last_index,
            index: 0,
            ordinal: 0,
            done: false,
        };

        let first_row = format.first_row.unwrap_or(0);
        while reader.index < first_row {
            if reader.next_record()?.is_none() {
                return Err(CsvError::EmptyFile);
            }
        }

        if format.has_header.unwrap_or(true) {
            let header = reader.next_record()?.ok_or(CsvError::NoHeaders(first_row))?;
            reader.headers = header
                .iter()
                .skip(reader.first_col)
                .map(|h| h.trim().to_string())
                .collect();
            if reader.headers.iter().all(String::is_empty) {
                return Err(CsvError::NoHeaders(first_row));
            }
        }

        Ok(reader)
    }

    /// Column names; empty for headerless sources until the first row is read
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn next_record(&mut self) -> CsvResult<Option<StringRecord>> {
        match self.records.next() {
            Some(record) => {
                self.index += 1;
                Ok(Some(record?))
            }
            None => Ok(None),
        }
    }

    fn next_data_record(&mut self) -> CsvResult<Option<StringRecord>> {
        loop {
            if self.last_index.is_some_and(|last| self.index > last) {
                return Ok(None);
            }
            let Some(record) = self.next_record()? else {
                return Ok(None);
            };
            if record.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            if self.hold_back == 0 {
                return Ok(Some(record));
            }
            self.lookbehind.push_back(record);
            if self.lookbehind.len() > self.hold_back {
                return Ok(self.lookbehind.pop_front());
            }
        }
    }

    fn to_row(&mut self, record: &StringRecord) -> Row {
        let values: Vec<&str> = record.iter().skip(self.first_col).collect();
        // Headerless sources name columns by position
        if self.headers.is_empty() {
            self.headers = (0..values.len()).map(|i| i.to_string()).collect();
        }

        let mapped: HashMap<String, String> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), values.get(i).copied().unwrap_or("").to_string()))
            .collect();

        let row = Row::new(self.ordinal, mapped);
        self.ordinal += 1;
        row
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = CsvResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_data_record() {
            Ok(Some(record)) => Some(Ok(self.to_row(&record))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read a whole source into memory and decode it.
///
/// The raw bytes are released once decoded.
pub fn read_source<R: Read>(mut source: R, format: &SourceFormat) -> CsvResult<DecodedSource> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    decode_source(&bytes, format)
}

/// Read and decode a whole source, then iterate its rows lazily.
pub fn read_rows<R: Read>(source: R, format: &SourceFormat) -> CsvResult<RowReader<Cursor<Vec<u8>>>> {
    RowReader::from_decoded(read_source(source, format)?, format)
}

/// Same as [`read_rows`] for a file path
pub fn read_rows_from_path<P: AsRef<Path>>(path: P, format: &SourceFormat) -> CsvResult<RowReader<Cursor<Vec<u8>>>> {
    let bytes = std::fs::read(path.as_ref())?;
    RowReader::from_decoded(decode_source(&bytes, format)?, format)
}

/// Header names of a source, used to pick a compatible mapping
pub fn peek_headers(bytes: &[u8], format: &SourceFormat) -> CsvResult<Vec<String>> {
    let reader = RowReader::from_decoded(decode_source(bytes, format)?, format)?;
    Ok(reader.headers().to_vec())
}
