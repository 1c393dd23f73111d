//! State persistence

use crate::error::{RecorderError, Result};
use crate::state::{RecorderState, STATE_KEY};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Backend holding the single state document
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The stored document, `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<Value>>;

    async fn save(&self, state: &RecorderState) -> Result<()>;
}

// ===== FILE STORE =====

/// JSON file shaped like `{"autotestProState": {...}}`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/autotest-recorder/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("autotest-recorder").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document: Value = serde_json::from_str(&raw).map_err(|e| {
            RecorderError::Storage(format!("{} is not valid JSON: {}", self.path.display(), e))
        })?;
        match document {
            Value::Object(mut entries) => Ok(entries.remove(STATE_KEY).filter(|v| !v.is_null())),
            _ => Err(RecorderError::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, state: &RecorderState) -> Result<()> {
        let mut document = Map::new();
        document.insert(STATE_KEY.to_string(), serde_json::to_value(state)?);
        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write next to the target, then rename over it
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

// ===== MEMORY STORE =====

/// Keeps the document in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document (e.g. a legacy one)
    pub fn with_document(document: Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }

    pub async fn document(&self) -> Option<Value> {
        self.document.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<Value>> {
        Ok(self.document.lock().await.clone())
    }

    async fn save(&self, state: &RecorderState) -> Result<()> {
        *self.document.lock().await = Some(serde_json::to_value(state)?);
        Ok(())
    }
}
