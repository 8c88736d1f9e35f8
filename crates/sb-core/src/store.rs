//! Persisted settings store
//!
//! [`StorageArea`] is the raw key/value port (the browser's synced storage in
//! the extension, a JSON file in the CLI, a map in tests). [`SettingsStore`]
//! is the typed view every component goes through: it resolves defaults,
//! applies the daily counter reset, and writes partial updates.
//!
//! Nothing here caches settings. Another process (the popup) may write the
//! same storage at any time, so every handler reads fresh.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{BlockerError, Result};
use crate::types::{
    Settings, SettingsFields, SettingsPatch, KEY_BLOCKED_SITES, KEY_IS_ENABLED, KEY_LAST_RESET_DATE,
    KEY_TODAY_BLOCKS,
};

/// Raw storage record.
pub type StorageMap = serde_json::Map<String, Value>;

/// Buffered change notifications per subscriber.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Date format used for `lastResetDate`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Storage Port
// =============================================================================

/// Keys whose stored value changed in one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub keys: Vec<String>,
}

impl StorageChange {
    pub fn fields(&self) -> SettingsFields {
        SettingsFields::from_keys(self.keys.iter().map(String::as_str))
    }
}

/// Durable key/value storage shared between execution contexts.
#[async_trait]
pub trait StorageArea: Send + Sync {
    /// Fetch the given keys. Absent keys are simply missing from the result.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap>;

    /// Merge `items` into storage, last write wins per key.
    async fn set(&self, items: StorageMap) -> Result<()>;

    /// Subscribe to change notifications for writes from any caller.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Merge `items` into `target`, returning the keys whose value changed.
pub fn merge_items(target: &mut StorageMap, items: StorageMap) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, value) in items {
        if target.get(&key) != Some(&value) {
            changed.push(key.clone());
            target.insert(key, value);
        }
    }
    changed
}

/// Copy out the requested keys.
pub fn select_items(source: &StorageMap, keys: &[&str]) -> StorageMap {
    keys.iter()
        .filter_map(|key| source.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect()
}

// =============================================================================
// Memory Storage
// =============================================================================

/// In-process storage area.
pub struct MemoryStorage {
    items: Mutex<StorageMap>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_items(StorageMap::new())
    }

    /// Start from existing stored values.
    pub fn with_items(items: StorageMap) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { items: Mutex::new(items), changes }
    }

    /// Copy of everything stored.
    pub fn snapshot(&self) -> Result<StorageMap> {
        let items = self.lock()?;
        Ok(items.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StorageMap>> {
        self.items
            .lock()
            .map_err(|_| BlockerError::Storage("storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageArea for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap> {
        let items = self.lock()?;
        Ok(select_items(&items, keys))
    }

    async fn set(&self, items: StorageMap) -> Result<()> {
        let changed = {
            let mut stored = self.lock()?;
            merge_items(&mut stored, items)
        };
        if !changed.is_empty() {
            // No subscribers is fine
            let _ = self.changes.send(StorageChange { keys: changed });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the current calendar day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// System local date.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Settable clock for tests and deterministic hosts.
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today: Mutex::new(today) }
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap_or_else(|e| e.into_inner()) = today;
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = today.checked_add_days(chrono::Days::new(days)) {
            *today = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Settings Store
// =============================================================================

/// Typed settings access over a storage area.
#[derive(Clone)]
pub struct SettingsStore {
    area: Arc<dyn StorageArea>,
    clock: Arc<dyn Clock>,
}

impl SettingsStore {
    pub fn new(area: Arc<dyn StorageArea>, clock: Arc<dyn Clock>) -> Self {
        Self { area, clock }
    }

    /// In-memory store on the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(LocalClock))
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn area(&self) -> &Arc<dyn StorageArea> {
        &self.area
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.area.subscribe()
    }

    /// Read resolved settings.
    ///
    /// A counter last reset on another day is zeroed and the reset is
    /// persisted before the value is returned.
    pub async fn read(&self) -> Result<Settings> {
        let items = self.area.get(&SettingsFields::ALL.keys()).await?;
        let today = self.today();

        let defaults = Settings::defaults(today);
        let last_reset = decode_date(&items);
        let mut settings = Settings {
            blocked_sites: decode_field(&items, KEY_BLOCKED_SITES)?.unwrap_or(defaults.blocked_sites),
            is_enabled: decode_field(&items, KEY_IS_ENABLED)?.unwrap_or(defaults.is_enabled),
            today_blocks: decode_field(&items, KEY_TODAY_BLOCKS)?.unwrap_or(defaults.today_blocks),
            last_reset_date: last_reset.unwrap_or(today),
        };

        if last_reset != Some(today) {
            debug!(
                "Resetting daily block counter (last reset {:?}, today {})",
                last_reset, today
            );
            self.write(SettingsPatch::counter_reset(today)).await?;
            settings.today_blocks = 0;
            settings.last_reset_date = today;
        }

        Ok(settings)
    }

    /// Merge the provided fields; fields left `None` are untouched.
    pub async fn write(&self, patch: SettingsPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.area.set(encode_patch(&patch)?).await
    }

    /// Seed defaults for fields absent from storage; existing values are kept.
    ///
    /// Returns the fields that were seeded.
    pub async fn ensure_defaults(&self) -> Result<SettingsFields> {
        let items = self.area.get(&SettingsFields::ALL.keys()).await?;
        let defaults = Settings::defaults(self.today());

        let mut patch = SettingsPatch::default();
        if is_absent(&items, KEY_BLOCKED_SITES) {
            patch.blocked_sites = Some(defaults.blocked_sites);
        }
        if is_absent(&items, KEY_IS_ENABLED) {
            patch.is_enabled = Some(defaults.is_enabled);
        }
        if is_absent(&items, KEY_TODAY_BLOCKS) {
            patch.today_blocks = Some(defaults.today_blocks);
        }
        if is_absent(&items, KEY_LAST_RESET_DATE) {
            patch.last_reset_date = Some(defaults.last_reset_date);
        }

        let seeded = patch.fields();
        if !seeded.is_empty() {
            info!("Seeding default settings: {:?}", seeded.keys());
        }
        self.write(patch).await?;
        Ok(seeded)
    }

    /// Count one block for today and return the new total.
    pub async fn record_block(&self) -> Result<u64> {
        let settings = self.read().await?;
        let count = settings.today_blocks.saturating_add(1);
        self.write(SettingsPatch {
            today_blocks: Some(count),
            ..SettingsPatch::default()
        })
        .await?;
        Ok(count)
    }
}

fn is_absent(items: &StorageMap, key: &str) -> bool {
    matches!(items.get(key), None | Some(Value::Null))
}

fn decode_field<T: DeserializeOwned>(items: &StorageMap, key: &'static str) -> Result<Option<T>> {
    match items.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| BlockerError::Decode { field: key, reason: e.to_string() }),
    }
}

/// Unparseable dates count as "not today" so the counter gets reset.
fn decode_date(items: &StorageMap) -> Option<NaiveDate> {
    items
        .get(KEY_LAST_RESET_DATE)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
}

fn encode_patch(patch: &SettingsPatch) -> Result<StorageMap> {
    let mut items = StorageMap::new();
    if let Some(sites) = &patch.blocked_sites {
        items.insert(KEY_BLOCKED_SITES.to_string(), serde_json::to_value(sites)?);
    }
    if let Some(enabled) = patch.is_enabled {
        items.insert(KEY_IS_ENABLED.to_string(), Value::Bool(enabled));
    }
    if let Some(count) = patch.today_blocks {
        items.insert(KEY_TODAY_BLOCKS.to_string(), Value::from(count));
    }
    if let Some(date) = patch.last_reset_date {
        items.insert(
            KEY_LAST_RESET_DATE.to_string(),
            Value::String(date.format(DATE_FORMAT).to_string()),
        );
    }
    Ok(items)
}
