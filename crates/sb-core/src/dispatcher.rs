//! Trigger Dispatcher
//!
//! Browser callbacks (install, startup, storage change, navigation, runtime
//! message) become [`Event`] values handled by one [`Dispatcher`]. Handlers
//! catch and log their own failures; nothing escapes to the host.

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::badge::{refresh_badge, Badge};
use crate::config::BlockerConfig;
use crate::engine::RuleEngine;
use crate::matcher::RuleTemplate;
use crate::messages::{Request, Response};
use crate::monitor::{Navigation, NavigationMonitor};
use crate::store::{SettingsStore, StorageChange};
use crate::sync::RuleSynchronizer;
use crate::types::SettingsFields;

/// Why the extension was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update,
}

impl InstallReason {
    /// Parse the browser's `onInstalled` reason string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "install" => Self::Install,
            _ => Self::Update,
        }
    }
}

/// Everything the background reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Installed(InstallReason),
    Startup,
    StorageChanged(SettingsFields),
    Navigation(Navigation),
    Message(Request),
}

impl From<StorageChange> for Event {
    fn from(change: StorageChange) -> Self {
        Self::StorageChanged(change.fields())
    }
}

pub struct Dispatcher {
    store: SettingsStore,
    sync: RuleSynchronizer,
    monitor: NavigationMonitor,
    badge: Arc<dyn Badge>,
}

impl Dispatcher {
    pub fn new(
        store: SettingsStore,
        engine: Arc<dyn RuleEngine>,
        badge: Arc<dyn Badge>,
        config: &BlockerConfig,
    ) -> Self {
        Self {
            sync: RuleSynchronizer::new(store.clone(), engine, RuleTemplate::from_config(config)),
            monitor: NavigationMonitor::new(store.clone()),
            store,
            badge,
        }
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn synchronizer(&self) -> &RuleSynchronizer {
        &self.sync
    }

    pub fn monitor(&self) -> &NavigationMonitor {
        &self.monitor
    }

    /// Handle one event. Only messages produce a response.
    pub async fn dispatch(&self, event: Event) -> Option<Response> {
        match event {
            Event::Installed(reason) => {
                debug!("Installed ({:?})", reason);
                if let Err(e) = self.store.ensure_defaults().await {
                    error!("Failed to seed default settings: {}", e);
                }
                self.sync_rules().await;
                None
            }
            Event::Startup => {
                self.sync_rules().await;
                None
            }
            Event::StorageChanged(fields) => {
                if fields.intersects(SettingsFields::RULE_INPUTS) {
                    self.sync_rules().await;
                } else {
                    debug!("Storage change does not affect rules: {:?}", fields.keys());
                }
                None
            }
            Event::Navigation(navigation) => {
                if let Err(e) = self.monitor.on_navigation(&navigation).await {
                    warn!("Navigation check failed for {}: {}", navigation.url, e);
                }
                None
            }
            Event::Message(Request::UpdateRules) => Some(self.sync_rules().await),
            Event::Message(Request::GetBadgeInfo) => Some(self.update_badge().await),
        }
    }

    /// Drain events in order until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        debug!("Event channel closed");
    }

    async fn sync_rules(&self) -> Response {
        // The synchronizer logs its own failures
        let result = self.sync.reconcile().await;
        let badge = self.update_badge().await;
        match result {
            Ok(_) => badge,
            Err(e) => Response::failed(e),
        }
    }

    async fn update_badge(&self) -> Response {
        match refresh_badge(&self.store, self.badge.as_ref()).await {
            Ok(text) => {
                debug!("Badge set to {:?}", text);
                Response::ok()
            }
            Err(e) => {
                warn!("Badge update failed: {}", e);
                Response::failed(e)
            }
        }
    }
}
