//! SiteBlocker Core Library
//!
//! This crate keeps a browser's declarative blocking rules in step with a
//! user-edited list of blocked sites, and counts the navigations those rules
//! block.
//!
//! # Architecture
//!
//! Persisted settings are the single source of truth. Installed rules are a
//! disposable projection of them: every reconciliation removes all rules and
//! installs a freshly numbered batch. Storage and the rule engine sit behind
//! async ports so the state machine runs the same in the extension, the CLI,
//! and tests.
//!
//! # Modules
//!
//! - `domain`: Canonical domain extraction from user input and URLs
//! - `matcher`: Site-to-pattern expansion shared by rules and the monitor
//! - `store`: Storage port, clock, and the typed settings store
//! - `engine`: Rule engine port and an in-memory engine
//! - `sync`: Serialized rule reconciliation
//! - `monitor`: Main-frame navigation accounting
//! - `blocklist`: List editing as done by the popup
//! - `badge`: Toolbar badge projection
//! - `dispatcher`: Event routing for lifecycle, storage, navigation, messages
//! - `messages`: Runtime message shapes
//! - `types`: Shared type definitions

pub mod badge;
pub mod blocklist;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod messages;
pub mod monitor;
pub mod store;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use blocklist::BlocklistEditor;
pub use config::BlockerConfig;
pub use dispatcher::{Dispatcher, Event, InstallReason};
pub use domain::{navigation_host, normalize, normalize_url_host};
pub use engine::{MemoryRuleEngine, RuleEngine};
pub use error::{BlockerError, Result};
pub use matcher::{find_blocking_site, rules_for_sites, site_matches, RuleTemplate};
pub use monitor::{BlockEvent, Navigation, NavigationMonitor};
pub use store::{Clock, LocalClock, ManualClock, MemoryStorage, SettingsStore, StorageArea};
pub use sync::{ReconcileOutcome, RuleSynchronizer};
pub use types::{BlockingRule, ResourceType, RuleAction, Settings, SettingsFields, SettingsPatch};
