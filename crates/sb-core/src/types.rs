//! Core type definitions for SiteBlocker
//!
//! The rule types serialize to the shape the browser's declarative
//! network-request API expects; the settings types serialize to the
//! persisted key layout.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Rule Actions
// =============================================================================

/// What an installed rule does with a matching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Cancel the request
    Block,
    /// Send the tab to an extension page instead
    Redirect,
}

/// Redirect target inside the extension package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

/// Action half of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

impl RuleAction {
    pub fn block() -> Self {
        Self { kind: ActionType::Block, redirect: None }
    }

    pub fn redirect_to(extension_path: impl Into<String>) -> Self {
        Self {
            kind: ActionType::Redirect,
            redirect: Some(Redirect { extension_path: extension_path.into() }),
        }
    }
}

// =============================================================================
// Resource Types
// =============================================================================

/// Request/navigation resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level document
    MainFrame,
    /// iframe/frame
    SubFrame,
    Other,
}

impl ResourceType {
    /// Parse from browser request type string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MainFrame,
            "sub_frame" | "subdocument" => Self::SubFrame,
            _ => Self::Other,
        }
    }

    /// Map a `webNavigation` frame id (0 is the top-level frame).
    pub fn from_frame_id(frame_id: i64) -> Self {
        if frame_id == 0 {
            Self::MainFrame
        } else {
            Self::SubFrame
        }
    }
}

// =============================================================================
// Blocking Rule
// =============================================================================

/// Match half of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// A dynamic rule as installed in the browser's rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct BlockingRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

// =============================================================================
// Settings
// =============================================================================

/// The persisted settings record, with every field resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub blocked_sites: Vec<String>,
    pub is_enabled: bool,
    pub today_blocks: u64,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub last_reset_date: NaiveDate,
}

impl Settings {
    /// Settings a fresh install starts with.
    pub fn defaults(today: NaiveDate) -> Self {
        Self {
            blocked_sites: Vec::new(),
            is_enabled: true,
            today_blocks: 0,
            last_reset_date: today,
        }
    }

    /// True when the current settings call for installed rules.
    pub fn wants_rules(&self) -> bool {
        self.is_enabled && !self.blocked_sites.is_empty()
    }
}

/// Partial settings for merge-writes. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub blocked_sites: Option<Vec<String>>,
    pub is_enabled: Option<bool>,
    pub today_blocks: Option<u64>,
    pub last_reset_date: Option<NaiveDate>,
}

impl SettingsPatch {
    pub fn blocked_sites(sites: Vec<String>) -> Self {
        Self { blocked_sites: Some(sites), ..Self::default() }
    }

    pub fn enabled(is_enabled: bool) -> Self {
        Self { is_enabled: Some(is_enabled), ..Self::default() }
    }

    /// Counter reset to zero as of `today`.
    pub fn counter_reset(today: NaiveDate) -> Self {
        Self {
            today_blocks: Some(0),
            last_reset_date: Some(today),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Fields this patch touches.
    pub fn fields(&self) -> SettingsFields {
        let mut fields = SettingsFields::empty();
        fields.set(SettingsFields::BLOCKED_SITES, self.blocked_sites.is_some());
        fields.set(SettingsFields::IS_ENABLED, self.is_enabled.is_some());
        fields.set(SettingsFields::TODAY_BLOCKS, self.today_blocks.is_some());
        fields.set(SettingsFields::LAST_RESET_DATE, self.last_reset_date.is_some());
        fields
    }
}

// =============================================================================
// Settings Fields
// =============================================================================

pub const KEY_BLOCKED_SITES: &str = "blockedSites";
pub const KEY_IS_ENABLED: &str = "isEnabled";
pub const KEY_TODAY_BLOCKS: &str = "todayBlocks";
pub const KEY_LAST_RESET_DATE: &str = "lastResetDate";

bitflags::bitflags! {
    /// Set of settings fields, used for change notifications.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SettingsFields: u8 {
        const BLOCKED_SITES = 1 << 0;
        const IS_ENABLED = 1 << 1;
        const TODAY_BLOCKS = 1 << 2;
        const LAST_RESET_DATE = 1 << 3;

        /// Fields the installed rule set is derived from
        const RULE_INPUTS = Self::BLOCKED_SITES.bits() | Self::IS_ENABLED.bits();
        const ALL = 0x0F;
    }
}

impl SettingsFields {
    /// Map a storage key to its field. Unknown keys map to nothing.
    pub fn from_key(key: &str) -> Self {
        match key {
            KEY_BLOCKED_SITES => Self::BLOCKED_SITES,
            KEY_IS_ENABLED => Self::IS_ENABLED,
            KEY_TODAY_BLOCKS => Self::TODAY_BLOCKS,
            KEY_LAST_RESET_DATE => Self::LAST_RESET_DATE,
            _ => Self::empty(),
        }
    }

    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter().fold(Self::empty(), |acc, key| acc | Self::from_key(key))
    }

    /// Storage keys for the fields in this set.
    pub fn keys(self) -> Vec<&'static str> {
        let mut keys = Vec::with_capacity(4);
        if self.contains(Self::BLOCKED_SITES) {
            keys.push(KEY_BLOCKED_SITES);
        }
        if self.contains(Self::IS_ENABLED) {
            keys.push(KEY_IS_ENABLED);
        }
        if self.contains(Self::TODAY_BLOCKS) {
            keys.push(KEY_TODAY_BLOCKS);
        }
        if self.contains(Self::LAST_RESET_DATE) {
            keys.push(KEY_LAST_RESET_DATE);
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_serializes_to_engine_shape() {
        let rule = BlockingRule {
            id: 7,
            priority: 1,
            action: RuleAction::redirect_to("/blocked.html"),
            condition: RuleCondition {
                url_filter: "*://example.com/*".into(),
                resource_types: vec![ResourceType::MainFrame],
            },
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "priority": 1,
                "action": {"type": "redirect", "redirect": {"extensionPath": "/blocked.html"}},
                "condition": {"urlFilter": "*://example.com/*", "resourceTypes": ["main_frame"]}
            })
        );

        let block = serde_json::to_value(RuleAction::block()).unwrap();
        assert_eq!(block, serde_json::json!({"type": "block"}));
    }

    #[test]
    fn test_resource_type_from_str() {
        assert_eq!(ResourceType::from_str("main_frame"), ResourceType::MainFrame);
        assert_eq!(ResourceType::from_str("sub_frame"), ResourceType::SubFrame);
        assert_eq!(ResourceType::from_str("script"), ResourceType::Other);
        assert_eq!(ResourceType::from_frame_id(0), ResourceType::MainFrame);
        assert_eq!(ResourceType::from_frame_id(3), ResourceType::SubFrame);
    }

    #[test]
    fn test_settings_fields_keys() {
        let fields = SettingsFields::from_keys(["blockedSites", "todayBlocks", "unrelated"]);
        assert_eq!(fields, SettingsFields::BLOCKED_SITES | SettingsFields::TODAY_BLOCKS);
        assert!(fields.intersects(SettingsFields::RULE_INPUTS));
        assert!(!SettingsFields::TODAY_BLOCKS.intersects(SettingsFields::RULE_INPUTS));
        assert_eq!(SettingsFields::ALL.keys().len(), 4);
    }

    #[test]
    fn test_patch_fields() {
        assert!(SettingsPatch::default().is_empty());
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            SettingsPatch::counter_reset(today).fields(),
            SettingsFields::TODAY_BLOCKS | SettingsFields::LAST_RESET_DATE
        );
    }

    #[test]
    fn test_settings_round_trip_layout() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let json = serde_json::to_value(Settings::defaults(today)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "blockedSites": [],
                "isEnabled": true,
                "todayBlocks": 0,
                "lastResetDate": "2026-10-18"
            })
        );
    }
}
