/// Import source description and resolution.
///
/// A source names either one file or a directory. A directory expands to
/// one unit per recognized file, each loading into a table named after the
/// file stem; a single file loads into its stem (or an explicit table).
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    /// One JSON array of objects.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "json" => Some(SourceFormat::Json),
            "jsonl" | "ndjson" => Some(SourceFormat::JsonLines),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSource {
    pub path: PathBuf,
    /// Detected from the file extension when absent.
    #[serde(default)]
    pub format: Option<SourceFormat>,
    /// Target table; defaults to the file stem. Not allowed for
    /// directory sources.
    #[serde(default)]
    pub table: Option<String>,
}

impl ImportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ImportSource {
            path: path.into(),
            format: None,
            table: None,
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Expand into concrete units to import, in a deterministic order.
    pub fn resolve(&self) -> AppResult<Vec<SourceUnit>> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| {
            AppError::SourceUnavailable(format!(
                "Cannot read source '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        if metadata.is_dir() {
            if self.table.is_some() {
                return Err(AppError::InvalidInput(
                    "An explicit table cannot be combined with a directory source".to_string(),
                ));
            }
            self.resolve_directory()
        } else {
            let unit = SourceUnit::for_file(&self.path, self.format, self.table.as_deref())?;
            Ok(vec![unit])
        }
    }

    fn resolve_directory(&self) -> AppResult<Vec<SourceUnit>> {
        let entries = std::fs::read_dir(&self.path).map_err(|e| {
            AppError::SourceUnavailable(format!(
                "Cannot list source directory '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                AppError::SourceUnavailable(format!(
                    "Cannot list source directory '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;
            let path = entry.path();
            if path.is_file() {
                // Unrecognized extensions are skipped, not an error.
                let format = self.format.or_else(|| SourceFormat::from_path(&path));
                if format.is_some() {
                    paths.push(path);
                }
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(AppError::SourceUnavailable(format!(
                "Source directory '{}' contains no importable files",
                self.path.display()
            )));
        }

        paths
            .into_iter()
            .map(|path| SourceUnit::for_file(&path, self.format, None))
            .collect()
    }
}

/// One file to import into one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnit {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub table: String,
}

impl SourceUnit {
    fn for_file(
        path: &Path,
        format: Option<SourceFormat>,
        table: Option<&str>,
    ) -> AppResult<Self> {
        let format = format.or_else(|| SourceFormat::from_path(path)).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Cannot detect the format of '{}'; specify one explicitly",
                path.display()
            ))
        })?;

        let table = match table {
            Some(name) => name.to_string(),
            None => path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(|stem| stem.to_string())
                .ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "Cannot derive a table name from '{}'",
                        path.display()
                    ))
                })?,
        };
        Validator::validate_identifier(&table, "Table name")?;

        Ok(SourceUnit {
            path: path.to_path_buf(),
            format,
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("whodb_source_test_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/users.CSV")),
            Some(SourceFormat::Csv)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("users.jsonl")),
            Some(SourceFormat::JsonLines)
        );
        assert_eq!(SourceFormat::from_path(Path::new("users.parquet")), None);
        assert_eq!(SourceFormat::from_path(Path::new("users")), None);
    }

    #[test]
    fn test_resolve_single_file_uses_stem() {
        let dir = temp_dir();
        let file = dir.join("users.csv");
        fs::write(&file, "id\n1\n").unwrap();

        let units = ImportSource::new(&file).resolve().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].table, "users");
        assert_eq!(units[0].format, SourceFormat::Csv);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_missing_path_is_source_unavailable() {
        let err = ImportSource::new("/no/such/file.csv").resolve().unwrap_err();
        assert!(matches!(err, AppError::SourceUnavailable(_)));
    }

    #[test]
    fn test_resolve_directory_sorts_and_skips_unknown() {
        let dir = temp_dir();
        fs::write(dir.join("b_table.json"), "[]").unwrap();
        fs::write(dir.join("a_table.csv"), "id\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignore me").unwrap();

        let units = ImportSource::new(&dir).resolve().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].table, "a_table");
        assert_eq!(units[1].table, "b_table");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_directory_rejects_explicit_table() {
        let dir = temp_dir();
        fs::write(dir.join("a.csv"), "id\n").unwrap();

        let err = ImportSource::new(&dir)
            .with_table("users")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_rejects_unusable_table_name() {
        let dir = temp_dir();
        let file = dir.join("users-2024.csv");
        fs::write(&file, "id\n").unwrap();

        let err = ImportSource::new(&file).resolve().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        fs::remove_dir_all(&dir).ok();
    }
}
