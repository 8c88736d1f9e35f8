//! Toolbar badge showing how many sites are blocked.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{BlockerError, Result};
use crate::store::SettingsStore;
use crate::types::Settings;

/// Badge text for the given settings: the site count while blocking is
/// active, empty otherwise.
pub fn badge_text(settings: &Settings) -> String {
    badge_text_for(settings.blocked_sites.len(), settings.is_enabled)
}

#[inline]
pub fn badge_text_for(site_count: usize, enabled: bool) -> String {
    if enabled && site_count > 0 {
        site_count.to_string()
    } else {
        String::new()
    }
}

/// Where badge text ends up (the browser action, a terminal).
#[async_trait]
pub trait Badge: Send + Sync {
    async fn set_text(&self, text: &str) -> Result<()>;
}

/// Badge that just remembers its text.
#[derive(Debug, Default)]
pub struct MemoryBadge {
    text: Mutex<String>,
}

impl MemoryBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Badge for MemoryBadge {
    async fn set_text(&self, text: &str) -> Result<()> {
        let mut current = self
            .text
            .lock()
            .map_err(|_| BlockerError::Storage("badge lock poisoned".to_string()))?;
        *current = text.to_string();
        Ok(())
    }
}

/// Recompute the badge from fresh settings. Returns the text set.
pub async fn refresh_badge(store: &SettingsStore, badge: &dyn Badge) -> Result<String> {
    let text = badge_text(&store.read().await?);
    badge.set_text(&text).await?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::types::SettingsPatch;

    fn settings(sites: &[&str], enabled: bool) -> Settings {
        let mut settings = Settings::defaults(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        settings.blocked_sites = sites.iter().map(|s| s.to_string()).collect();
        settings.is_enabled = enabled;
        settings
    }

    #[test]
    fn test_badge_text() {
        assert_eq!(badge_text(&settings(&["facebook.com"], true)), "1");
        assert_eq!(badge_text(&settings(&["a.com", "b.com"], true)), "2");
        assert_eq!(badge_text(&settings(&["a.com"], false)), "");
        assert_eq!(badge_text(&settings(&[], true)), "");
    }

    #[tokio::test]
    async fn test_refresh_badge() {
        let store = SettingsStore::in_memory();
        let badge = MemoryBadge::new();
        store
            .write(SettingsPatch::blocked_sites(vec!["a.com".into(), "b.com".into()]))
            .await
            .unwrap();

        assert_eq!(refresh_badge(&store, &badge).await.unwrap(), "2");
        assert_eq!(badge.text(), "2");

        store.write(SettingsPatch::enabled(false)).await.unwrap();
        refresh_badge(&store, &badge).await.unwrap();
        assert_eq!(badge.text(), "");
    }
}
