//! Navigation Monitor
//!
//! Counts main-frame navigations that the installed rules block. The monitor
//! does not block anything itself; it attributes blocks for the statistics
//! display using the same site expansion the rules are generated from.

use log::{debug, info};
use tokio::sync::broadcast;

use crate::domain::{navigation_host, normalize_url_host};
use crate::error::Result;
use crate::matcher::find_blocking_site;
use crate::store::SettingsStore;
use crate::types::ResourceType;

/// Buffered block events per subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A navigation attempt reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub url: String,
    pub frame: ResourceType,
}

impl Navigation {
    pub fn main_frame(url: impl Into<String>) -> Self {
        Self { url: url.into(), frame: ResourceType::MainFrame }
    }

    pub fn sub_frame(url: impl Into<String>) -> Self {
        Self { url: url.into(), frame: ResourceType::SubFrame }
    }
}

/// A counted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    /// Canonical domain of the navigation target
    pub domain: String,
    /// Full navigation URL
    pub url: String,
    /// Blocklist entry that matched
    pub site: String,
    /// Today's count including this block
    pub today_blocks: u64,
}

pub struct NavigationMonitor {
    store: SettingsStore,
    events: broadcast::Sender<BlockEvent>,
}

impl NavigationMonitor {
    pub fn new(store: SettingsStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { store, events }
    }

    /// Listen for counted blocks (an open popup, the CLI).
    pub fn subscribe(&self) -> broadcast::Receiver<BlockEvent> {
        self.events.subscribe()
    }

    /// Handle one navigation attempt. Returns the event if it was counted.
    pub async fn on_navigation(&self, navigation: &Navigation) -> Result<Option<BlockEvent>> {
        if navigation.frame != ResourceType::MainFrame {
            return Ok(None);
        }

        let settings = self.store.read().await?;
        if !settings.is_enabled {
            return Ok(None);
        }

        // Match the host the rules see, before `www.` is dropped
        let host = match navigation_host(&navigation.url) {
            Ok(host) => host,
            Err(_) => {
                debug!("Ignoring navigation without a blockable host: {}", navigation.url);
                return Ok(None);
            }
        };

        let site = match find_blocking_site(&settings.blocked_sites, &host) {
            Some(site) => site.to_string(),
            None => return Ok(None),
        };
        let domain = normalize_url_host(&navigation.url).unwrap_or(host);

        let today_blocks = self.store.record_block().await?;
        info!("Blocked {} (matched {}), {} today", domain, site, today_blocks);

        let event = BlockEvent {
            domain,
            url: navigation.url.clone(),
            site,
            today_blocks,
        };
        // Delivery is best-effort
        let _ = self.events.send(event.clone());
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use crate::domain::normalize;
    use crate::matcher::{rule_matches_host, rules_for_sites, RuleTemplate};
    use crate::store::{ManualClock, MemoryStorage};
    use crate::types::SettingsPatch;

    async fn monitor_for(sites: &[&str], enabled: bool) -> (NavigationMonitor, SettingsStore) {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let store = SettingsStore::new(Arc::new(MemoryStorage::new()), Arc::new(ManualClock::new(today)));
        store
            .write(SettingsPatch {
                blocked_sites: Some(sites.iter().map(|s| s.to_string()).collect()),
                is_enabled: Some(enabled),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        (NavigationMonitor::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_subdomain_navigation_counted() {
        let (monitor, store) = monitor_for(&["reddit.com"], true).await;
        let mut events = monitor.subscribe();

        let event = monitor
            .on_navigation(&Navigation::main_frame("https://old.reddit.com/r/rust"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.domain, "old.reddit.com");
        assert_eq!(event.site, "reddit.com");
        assert_eq!(event.today_blocks, 1);
        assert_eq!(store.read().await.unwrap().today_blocks, 1);
        assert_eq!(events.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn test_unlisted_and_subframe_ignored() {
        let (monitor, store) = monitor_for(&["reddit.com"], true).await;

        let navigations = [
            Navigation::main_frame("https://example.com/"),
            Navigation::main_frame("https://notreddit.com/"),
            Navigation::sub_frame("https://reddit.com/embed"),
            Navigation::main_frame("chrome://extensions"),
            Navigation::main_frame("about:blank"),
        ];
        for navigation in &navigations {
            assert_eq!(monitor.on_navigation(navigation).await.unwrap(), None, "{navigation:?}");
        }
        assert_eq!(store.read().await.unwrap().today_blocks, 0);
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let (monitor, store) = monitor_for(&["reddit.com"], false).await;
        let result = monitor.on_navigation(&Navigation::main_frame("https://reddit.com/")).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(store.read().await.unwrap().today_blocks, 0);
    }

    #[tokio::test]
    async fn test_counts_exactly_what_rules_block() {
        let raw_entries = ["www.www.example.com", "https://www.Reddit.com/r/x", "www.com", "news.ycombinator.com"];
        let sites: Vec<String> = raw_entries.iter().map(|raw| normalize(raw).unwrap()).collect();
        assert_eq!(sites[0], "www.example.com");

        let site_refs: Vec<&str> = sites.iter().map(String::as_str).collect();
        let (monitor, _) = monitor_for(&site_refs, true).await;
        let rules = rules_for_sites(&sites, 1, &RuleTemplate::default());

        let urls = [
            "https://www.example.com/",
            "https://a.www.example.com/x",
            "https://example.com/",
            "https://www.reddit.com/",
            "https://reddit.com/",
            "https://old.reddit.com/",
            "https://www.com/",
            "https://WWW.News.Ycombinator.com:443/item",
            "https://ycombinator.com/",
        ];
        for url in urls {
            let host = navigation_host(url).unwrap();
            let by_rules = rules.iter().any(|rule| rule_matches_host(rule, &host));
            let counted = monitor.on_navigation(&Navigation::main_frame(url)).await.unwrap().is_some();
            assert_eq!(counted, by_rules, "url: {url}");
        }
    }

    #[tokio::test]
    async fn test_www_entry_event_reports_canonical_domain() {
        let (monitor, _) = monitor_for(&["www.example.com"], true).await;
        let event = monitor
            .on_navigation(&Navigation::main_frame("https://www.example.com/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.site, "www.example.com");
        assert_eq!(event.domain, "example.com");
    }

    #[tokio::test]
    async fn test_no_listener_is_fine() {
        let (monitor, _) = monitor_for(&["x.com"], true).await;
        let first = monitor.on_navigation(&Navigation::main_frame("https://www.x.com/home")).await.unwrap();
        let second = monitor.on_navigation(&Navigation::main_frame("http://x.com")).await.unwrap();
        assert_eq!(first.map(|e| e.today_blocks), Some(1));
        assert_eq!(second.map(|e| e.today_blocks), Some(2));
    }
}
