//! File-backed storage and rule engine for the CLI host.
//!
//! `settings.json` plays the role of the browser's synced storage and
//! `rules.json` the role of the dynamic rule store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sb_core::engine::{apply_update, RuleEngine};
use sb_core::store::{merge_items, select_items, StorageArea, StorageChange, StorageMap, CHANGE_CHANNEL_CAPACITY};
use sb_core::{BlockerError, BlockingRule, Result};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

pub const SETTINGS_FILE: &str = "settings.json";
pub const RULES_FILE: &str = "rules.json";

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BlockerError::Storage(format!("Failed to read '{}': {}", path.display(), e))),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Write to a sibling temp file, then rename it over `path`.
async fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BlockerError::Storage(format!("Failed to create '{}': {}", parent.display(), e)))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, text)
        .await
        .map_err(|e| BlockerError::Storage(format!("Failed to write '{}': {}", tmp.display(), e)))?;

    // rename does not replace an existing file on Windows
    #[cfg(target_os = "windows")]
    {
        let _ = tokio::fs::remove_file(path).await;
    }
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| BlockerError::Storage(format!("Failed to replace '{}': {}", path.display(), e)))
}

// =============================================================================
// Settings File
// =============================================================================

pub struct FileStorage {
    path: PathBuf,
    changes: broadcast::Sender<StorageChange>,
    // Serializes read-modify-write within this process
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(state_dir: &Path) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: state_dir.join(SETTINGS_FILE),
            changes,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<StorageMap> {
        let text = match read_optional(&self.path).await? {
            Some(text) => text,
            None => return Ok(StorageMap::new()),
        };
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(BlockerError::Storage(format!(
                "'{}' does not hold a JSON object",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl StorageArea for FileStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap> {
        let _guard = self.lock.lock().await;
        let stored = self.load().await?;
        Ok(select_items(&stored, keys))
    }

    async fn set(&self, items: StorageMap) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut stored = self.load().await?;
        let changed = merge_items(&mut stored, items);
        if changed.is_empty() {
            return Ok(());
        }
        write_json(&self.path, &stored).await?;
        let _ = self.changes.send(StorageChange { keys: changed });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

// =============================================================================
// Rules File
// =============================================================================

pub struct FileRuleEngine {
    path: PathBuf,
    max_rules: usize,
    lock: Mutex<()>,
}

impl FileRuleEngine {
    pub fn new(state_dir: &Path, max_rules: usize) -> Self {
        Self {
            path: state_dir.join(RULES_FILE),
            max_rules,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<BlockingRule>> {
        match read_optional(&self.path).await? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl RuleEngine for FileRuleEngine {
    async fn dynamic_rules(&self) -> Result<Vec<BlockingRule>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn update_dynamic_rules(&self, remove_ids: &[u32], add_rules: Vec<BlockingRule>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rules = self.load().await?;
        apply_update(&mut rules, remove_ids, add_rules, self.max_rules)?;
        write_json(&self.path, &rules).await
    }
}
