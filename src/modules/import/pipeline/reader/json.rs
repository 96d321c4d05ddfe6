use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{Record, RecordReader};
use crate::shared::errors::{AppError, AppResult};

/// Reader for one JSON array of objects.
///
/// The file is loaded once and elements are scanned out one at a time, so
/// a malformed element reports its own byte offset and, under a skipping
/// policy, the elements after it are still reachable.
pub struct JsonArrayReader {
    text: String,
    pos: usize,
    state: ArrayState,
    needs_separator: bool,
}

#[derive(Debug, PartialEq)]
enum ArrayState {
    Start,
    Elements,
    Done,
}

impl JsonArrayReader {
    pub fn open(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::SourceUnavailable(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Ok(JsonArrayReader {
            text,
            pos: 0,
            state: ArrayState::Start,
            needs_separator: false,
        })
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    /// Advance past one JSON value starting at `self.pos`, returning its
    /// end offset (exclusive). Only tracks nesting and string escapes; the
    /// slice is handed to serde for real validation.
    fn scan_value(&mut self) -> AppResult<usize> {
        let bytes = self.text.as_bytes();
        let start = self.pos;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut i = start;

        while i < bytes.len() {
            let b = bytes[i];
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
            } else {
                match b {
                    b'"' => in_string = true,
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                        if depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    b',' if depth == 0 => break,
                    _ => {}
                }
            }
            i += 1;
        }

        if in_string || depth > 0 {
            return Err(AppError::parse_at(start as u64, "Unterminated JSON value"));
        }
        self.pos = i;
        Ok(i)
    }
}

impl RecordReader for JsonArrayReader {
    fn next_record(&mut self) -> AppResult<Option<Record>> {
        if self.state == ArrayState::Start {
            self.skip_whitespace();
            match self.peek() {
                Some(b'[') => {
                    self.pos += 1;
                    self.state = ArrayState::Elements;
                }
                _ => {
                    return Err(AppError::parse_at(
                        self.pos as u64,
                        "Expected a JSON array of objects",
                    ))
                }
            }
        }

        if self.state == ArrayState::Done {
            return Ok(None);
        }

        self.skip_whitespace();
        match self.peek() {
            Some(b']') => {
                self.pos += 1;
                self.state = ArrayState::Done;
                return Ok(None);
            }
            Some(b',') if self.needs_separator => {
                self.pos += 1;
                self.needs_separator = false;
                self.skip_whitespace();
            }
            Some(_) if !self.needs_separator => {}
            Some(_) => {
                return Err(AppError::parse_at(
                    self.pos as u64,
                    "Expected ',' or ']' after array element",
                ))
            }
            None => {
                return Err(AppError::parse_at(self.pos as u64, "Unterminated JSON array"))
            }
        }

        let start = self.pos;
        let end = self.scan_value()?;
        let slice = &self.text[start..end];
        let value: Value = serde_json::from_str(slice)
            .map_err(|e| AppError::parse_at(start as u64, format!("Invalid JSON element: {}", e)))?;
        let fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(AppError::parse_at(
                    start as u64,
                    format!("Array element is not an object: {}", other),
                ))
            }
        };

        self.needs_separator = true;
        Ok(Some(Record {
            fields,
            offset: start as u64,
        }))
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }
}

/// Reader for newline-delimited JSON: one object per line, blank lines
/// skipped.
pub struct JsonLinesReader {
    reader: BufReader<File>,
    offset: u64,
}

impl JsonLinesReader {
    pub fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path).map_err(|e| {
            AppError::SourceUnavailable(format!("Cannot open '{}': {}", path.display(), e))
        })?;
        Ok(JsonLinesReader {
            reader: BufReader::new(file),
            offset: 0,
        })
    }
}

impl RecordReader for JsonLinesReader {
    fn next_record(&mut self) -> AppResult<Option<Record>> {
        let mut line = String::new();
        loop {
            line.clear();
            let start = self.offset;
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| AppError::SourceUnavailable(format!("Read failed: {}", e)))?;
            if read == 0 {
                return Ok(None);
            }
            self.offset += read as u64;

            if line.trim().is_empty() {
                continue;
            }
            let fields: Map<String, Value> = serde_json::from_str(line.trim())
                .map_err(|e| AppError::parse_at(start, format!("Invalid JSON line: {}", e)))?;
            return Ok(Some(Record {
                fields,
                offset: start,
            }));
        }
    }

    fn position(&self) -> u64 {
        self.offset
    }
}
