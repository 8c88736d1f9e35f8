//! Blocklist editing, as performed by the list-management UI
//!
//! Every operation validates its input before touching storage and writes a
//! single partial update. The resulting storage change is what drives the
//! synchronizer; nothing here talks to the rule engine.

use log::info;

use crate::domain::normalize;
use crate::error::{BlockerError, Result};
use crate::store::SettingsStore;
use crate::types::SettingsPatch;

/// Outcome of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Canonical domains appended to the list
    pub added: Vec<String>,
    /// Lines that did not normalize
    pub invalid: Vec<String>,
    /// Domains already present (or repeated in the input)
    pub duplicate: Vec<String>,
}

/// Numbers shown in the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStats {
    pub sites: usize,
    pub enabled: bool,
    pub today_blocks: u64,
}

pub struct BlocklistEditor {
    store: SettingsStore,
}

impl BlocklistEditor {
    pub fn new(store: SettingsStore) -> Self {
        Self { store }
    }

    /// Add a site. Returns the canonical domain stored.
    pub async fn add_site(&self, raw: &str) -> Result<String> {
        let domain = normalize(raw)?;
        let mut sites = self.store.read().await?.blocked_sites;
        if sites.contains(&domain) {
            return Err(BlockerError::AlreadyBlocked(domain));
        }

        sites.push(domain.clone());
        self.store.write(SettingsPatch::blocked_sites(sites)).await?;
        info!("Added {} to blocklist", domain);
        Ok(domain)
    }

    /// Remove a site. Returns the entry removed.
    pub async fn remove_site(&self, raw: &str) -> Result<String> {
        // Entries stored before validation existed may not normalize
        let domain = normalize(raw).unwrap_or_else(|_| raw.trim().to_ascii_lowercase());
        let mut sites = self.store.read().await?.blocked_sites;

        let before = sites.len();
        sites.retain(|site| site != &domain);
        if sites.len() == before {
            return Err(BlockerError::NotBlocked(domain));
        }

        self.store.write(SettingsPatch::blocked_sites(sites)).await?;
        info!("Removed {} from blocklist", domain);
        Ok(domain)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store.write(SettingsPatch::enabled(enabled)).await?;
        info!("Blocking {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Flip the enabled flag. Returns the new value.
    pub async fn toggle(&self) -> Result<bool> {
        let enabled = !self.store.read().await?.is_enabled;
        self.set_enabled(enabled).await?;
        Ok(enabled)
    }

    /// Empty the blocklist. Returns how many entries were removed.
    pub async fn clear(&self) -> Result<usize> {
        let count = self.store.read().await?.blocked_sites.len();
        if count > 0 {
            self.store.write(SettingsPatch::blocked_sites(Vec::new())).await?;
            info!("Cleared {} sites from blocklist", count);
        }
        Ok(count)
    }

    /// Import one site per line. Blank lines and `#`/`!` comments are skipped.
    pub async fn import(&self, text: &str) -> Result<ImportReport> {
        let mut sites = self.store.read().await?.blocked_sites;
        let mut report = ImportReport::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            match normalize(line) {
                Ok(domain) if sites.contains(&domain) => report.duplicate.push(domain),
                Ok(domain) => {
                    sites.push(domain.clone());
                    report.added.push(domain);
                }
                Err(_) => report.invalid.push(line.to_string()),
            }
        }

        if !report.added.is_empty() {
            self.store.write(SettingsPatch::blocked_sites(sites)).await?;
        }
        info!(
            "Imported {} sites ({} invalid, {} duplicate)",
            report.added.len(),
            report.invalid.len(),
            report.duplicate.len()
        );
        Ok(report)
    }

    pub async fn stats(&self) -> Result<BlockStats> {
        let settings = self.store.read().await?;
        Ok(BlockStats {
            sites: settings.blocked_sites.len(),
            enabled: settings.is_enabled,
            today_blocks: settings.today_blocks,
        })
    }
}
