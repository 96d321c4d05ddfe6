/// Source readers.
///
/// A reader turns one source file into a stream of records, each tagged
/// with the byte offset it starts at so parse failures and checkpoints can
/// point back into the source.
pub mod csv;
pub mod json;

use serde_json::{Map, Value};

use crate::modules::import::domain::{SourceFormat, SourceUnit};
use crate::shared::errors::AppResult;

pub use self::csv::CsvReader;
pub use self::json::{JsonArrayReader, JsonLinesReader};

/// One decoded source record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Map<String, Value>,
    /// Byte offset of the record start in its source file.
    pub offset: u64,
}

pub trait RecordReader: Send {
    /// Next record, `None` at end of source. Errors from the source itself
    /// surface as `SourceUnavailable`; malformed content as `ParseError`
    /// carrying the offending offset.
    fn next_record(&mut self) -> AppResult<Option<Record>>;

    /// Byte offset just past the last record returned.
    fn position(&self) -> u64;
}

pub fn open(unit: &SourceUnit) -> AppResult<Box<dyn RecordReader>> {
    let reader: Box<dyn RecordReader> = match unit.format {
        SourceFormat::Csv => Box::new(CsvReader::open(&unit.path)?),
        SourceFormat::Json => Box::new(JsonArrayReader::open(&unit.path)?),
        SourceFormat::JsonLines => Box::new(JsonLinesReader::open(&unit.path)?),
    };
    Ok(reader)
}
