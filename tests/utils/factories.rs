/// Test data factories for import sources
///
/// Provides temp directories and source files with predictable content.
/// File stems double as table names, so every name here is a plain
/// identifier (no hyphens).
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Temp directory that cleans up after itself.
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("whodb_it_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path).unwrap();
        TestDir { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.path).ok();
    }
}

/// Builder for CSV sources with `id,name,active` rows and optional
/// malformed cells.
pub struct CsvSourceFactory {
    rows: usize,
    bad_rows: Vec<usize>,
}

impl Default for CsvSourceFactory {
    fn default() -> Self {
        CsvSourceFactory {
            rows: 10,
            bad_rows: Vec::new(),
        }
    }
}

impl CsvSourceFactory {
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Give the 0-based row an `active` cell no boolean column accepts.
    pub fn with_bad_row(mut self, index: usize) -> Self {
        self.bad_rows.push(index);
        self
    }

    pub fn write(self, dir: &TestDir, name: &str) -> PathBuf {
        let path = dir.file(name);
        let mut content = String::from("id,name,active\n");
        for i in 0..self.rows {
            if self.bad_rows.contains(&i) {
                content.push_str(&format!("{},person_{},not_a_bool\n", i, i));
            } else {
                content.push_str(&format!("{},person_{},{}\n", i, i, i % 2 == 0));
            }
        }
        fs::write(&path, content).unwrap();
        path
    }
}

/// Plain CSV with `rows` well-formed records.
pub fn write_csv(dir: &TestDir, name: &str, rows: usize) -> PathBuf {
    CsvSourceFactory::default().with_rows(rows).write(dir, name)
}

/// CSV whose `nickname` column is not part of [`users_schema`], so it has
/// to land in the overflow column.
pub fn write_csv_with_unknown_column(dir: &TestDir, name: &str, rows: usize) -> PathBuf {
    let path = dir.file(name);
    let mut content = String::from("id,name,active,nickname\n");
    for i in 0..rows {
        content.push_str(&format!("{},person_{},true,nick_{}\n", i, i, i));
    }
    fs::write(&path, content).unwrap();
    path
}

/// One JSON array of objects.
pub fn write_json_array(dir: &TestDir, name: &str, rows: usize) -> PathBuf {
    let records: Vec<Value> = (0..rows)
        .map(|i| json!({ "id": i, "name": format!("person_{}", i) }))
        .collect();
    let path = dir.file(name);
    fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
    path
}

/// One JSON object per line.
pub fn write_jsonl(dir: &TestDir, name: &str, rows: usize) -> PathBuf {
    let mut content = String::new();
    for i in 0..rows {
        content.push_str(&json!({ "id": i, "name": format!("person_{}", i) }).to_string());
        content.push('\n');
    }
    let path = dir.file(name);
    fs::write(&path, content).unwrap();
    path
}

/// Table config for a typed `users` table matching the CSV factories.
pub fn users_schema() -> Value {
    json!({
        "users": {
            "id": { "type": "integer", "pk": true },
            "name": { "type": "text" },
            "active": { "type": "boolean" }
        }
    })
}

/// Config with a foreign key and a many-to-many link, for DDL tests.
pub fn linked_schema() -> Value {
    json!({
        "users": {
            "id": { "type": "integer", "pk": true },
            "name": { "type": "text" },
            "team_id": {
                "type": "integer",
                "references": "teams",
                "referencesOn": "id"
            },
            "tags": {
                "type": "text",
                "references": "tags",
                "referencesOn": "id",
                "manyOn": "tag_ids"
            }
        },
        "teams": {
            "id": { "type": "integer", "pk": true },
            "name": { "type": "text" }
        },
        "tags": {
            "id": { "type": "integer", "pk": true },
            "label": { "type": "text" }
        }
    })
}
