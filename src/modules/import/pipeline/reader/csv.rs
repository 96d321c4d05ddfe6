use serde_json::{Map, Value};
use std::fs::File;
use std::path::Path;

use super::{Record, RecordReader};
use crate::shared::errors::{AppError, AppResult};

/// CSV reader. The first row names the columns; every cell comes out as a
/// string (the schema mapper coerces types later). Empty cells become
/// `null` so numeric columns accept them.
#[derive(Debug)]
pub struct CsvReader {
    reader: csv::Reader<File>,
    headers: csv::StringRecord,
    record: csv::StringRecord,
}

impl CsvReader {
    pub fn open(path: &Path) -> AppResult<Self> {
        let file = File::open(path).map_err(|e| {
            AppError::SourceUnavailable(format!("Cannot open '{}': {}", path.display(), e))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);
        let headers = reader.headers()?.clone();
        Ok(CsvReader {
            reader,
            headers,
            record: csv::StringRecord::new(),
        })
    }
}

impl RecordReader for CsvReader {
    fn next_record(&mut self) -> AppResult<Option<Record>> {
        let offset = self.reader.position().byte();
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }

        let mut fields = Map::new();
        for (header, value) in self.headers.iter().zip(self.record.iter()) {
            if header.is_empty() {
                continue;
            }
            let value = if value.is_empty() {
                Value::Null
            } else {
                Value::String(value.to_string())
            };
            fields.insert(header.to_string(), value);
        }
        Ok(Some(Record { fields, offset }))
    }

    fn position(&self) -> u64 {
        self.reader.position().byte()
    }
}
