// JSON Lines loader — the CLI's input format for documents, search-console
// rows and AI-overview snapshots.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use super::traits::VectorStore;
use super::{validate_documents, Document};

/// Read a JSON Lines file into a vector. Blank lines are skipped; a bad line
/// fails the whole load with its line number.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("{}:{}: invalid JSON row", path.display(), i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Document store backed by a JSON Lines file on disk.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VectorStore for JsonlStore {
    fn documents(&self) -> Result<Vec<Document>> {
        let docs: Vec<Document> = read_jsonl(&self.path)?;
        validate_documents(&docs)?;
        Ok(docs)
    }
}
