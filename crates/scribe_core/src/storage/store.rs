//! Transcript store implementations.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;

use super::{StoreError, StoreResult, TranscriptRecord, TranscriptStore};

/// One pretty-printed JSON document per transcript.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids are UUIDs; anything else could name a path outside the store.
    fn record_path(&self, id: &str) -> StoreResult<PathBuf> {
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn write(&self, record: &TranscriptRecord) -> StoreResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io("create store directory", e))?;

        let path = self.record_path(&record.id)?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json).map_err(|e| StoreError::io("write transcript", e))?;
        fs::rename(&temp_path, &path).map_err(|e| StoreError::io("rename transcript", e))?;

        tracing::debug!("Stored transcript '{}' at {}", record.id, path.display());
        Ok(())
    }
}

impl TranscriptStore for JsonFileStore {
    fn store(&self, text: &str, duration_secs: u64, language: &str) -> StoreResult<String> {
        let record = TranscriptRecord::new(text, duration_secs, language);
        self.write(&record)?;
        Ok(record.id)
    }

    fn get(&self, id: &str) -> StoreResult<TranscriptRecord> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::io("read transcript", e))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Serialize(e.to_string()))
    }

    fn list(&self) -> StoreResult<Vec<TranscriptRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| StoreError::io("list store", e))? {
            let path = entry.map_err(|e| StoreError::io("list store", e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| StoreError::io("read transcript", e))?;
            match serde_json::from_str::<TranscriptRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable transcript {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

/// Keeps records in memory. Used by tests and demo runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<TranscriptRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl TranscriptStore for MemoryStore {
    fn store(&self, text: &str, duration_secs: u64, language: &str) -> StoreResult<String> {
        let record = TranscriptRecord::new(text, duration_secs, language);
        let id = record.id.clone();
        self.records.lock().push(record);
        Ok(id)
    }

    fn get(&self, id: &str) -> StoreResult<TranscriptRecord> {
        self.records
            .lock()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> StoreResult<Vec<TranscriptRecord>> {
        let mut records = self.records.lock().clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

impl TranscriptRecord {
    fn new(text: &str, duration_secs: u64, language: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transcript: text.to_string(),
            duration_seconds: duration_secs,
            language: language.to_string(),
            created_at: Utc::now(),
        }
    }
}
