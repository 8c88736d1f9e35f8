//! Runtime configuration for the blocker.

use serde::{Deserialize, Serialize};

use crate::error::{BlockerError, Result};

/// Default extension page blocked navigations are sent to.
pub const DEFAULT_REDIRECT_PAGE: &str = "/blocked.html";

/// Browser limit on dynamic rules per extension.
pub const DEFAULT_MAX_DYNAMIC_RULES: usize = 5000;

/// Tunables shared by the synchronizer and the rule engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockerConfig {
    /// Priority assigned to every generated rule.
    pub rule_priority: u32,
    /// Extension page to redirect to. `None` installs plain block rules.
    pub redirect_page: Option<String>,
    /// Quota enforced by rule engines.
    pub max_dynamic_rules: usize,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            rule_priority: 1,
            redirect_page: Some(DEFAULT_REDIRECT_PAGE.to_string()),
            max_dynamic_rules: DEFAULT_MAX_DYNAMIC_RULES,
        }
    }
}

impl BlockerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| BlockerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rule_priority == 0 {
            return Err(BlockerError::Config("rule_priority must be at least 1".to_string()));
        }
        if let Some(page) = &self.redirect_page {
            if !page.starts_with('/') {
                return Err(BlockerError::Config(format!(
                    "redirect_page must be an extension path starting with '/': {page}"
                )));
            }
        }
        Ok(())
    }
}
