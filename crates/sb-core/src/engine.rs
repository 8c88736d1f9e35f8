//! Rule engine port
//!
//! The browser owns the installed dynamic rules. The synchronizer only sees
//! them through [`RuleEngine`]: list everything, and apply one atomic update
//! that removes a set of ids and adds a batch.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::DEFAULT_MAX_DYNAMIC_RULES;
use crate::error::{BlockerError, Result};
use crate::types::BlockingRule;

/// Declarative network-rule engine holding dynamic rules.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// All currently installed dynamic rules.
    async fn dynamic_rules(&self) -> Result<Vec<BlockingRule>>;

    /// Remove `remove_ids`, then add `add_rules`, as one update.
    ///
    /// Either the whole update applies or nothing changes.
    async fn update_dynamic_rules(&self, remove_ids: &[u32], add_rules: Vec<BlockingRule>) -> Result<()>;
}

/// Validate and apply an update to `installed` the way the browser does.
///
/// Unknown ids in `remove_ids` are ignored. Duplicate ids (within the batch or
/// against surviving rules) and quota overflow reject the whole update.
pub fn apply_update(
    installed: &mut Vec<BlockingRule>,
    remove_ids: &[u32],
    add_rules: Vec<BlockingRule>,
    max_rules: usize,
) -> Result<()> {
    let removing: HashSet<u32> = remove_ids.iter().copied().collect();
    let mut next: Vec<BlockingRule> = installed
        .iter()
        .filter(|rule| !removing.contains(&rule.id))
        .cloned()
        .collect();

    let mut ids: HashSet<u32> = next.iter().map(|rule| rule.id).collect();
    for rule in &add_rules {
        if !ids.insert(rule.id) {
            return Err(BlockerError::DuplicateRuleId(rule.id));
        }
    }

    let requested = next.len() + add_rules.len();
    if requested > max_rules {
        return Err(BlockerError::RuleQuota { limit: max_rules, requested });
    }

    next.extend(add_rules);
    *installed = next;
    Ok(())
}

/// In-process rule engine with browser-like validation.
pub struct MemoryRuleEngine {
    rules: Mutex<Vec<BlockingRule>>,
    max_rules: usize,
}

impl MemoryRuleEngine {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_DYNAMIC_RULES)
    }

    pub fn with_limit(max_rules: usize) -> Self {
        Self { rules: Mutex::new(Vec::new()), max_rules }
    }

    /// Start with rules already installed, as after a browser restart.
    pub fn with_rules(rules: Vec<BlockingRule>) -> Self {
        Self { rules: Mutex::new(rules), max_rules: DEFAULT_MAX_DYNAMIC_RULES }
    }

    pub fn installed(&self) -> Result<Vec<BlockingRule>> {
        let rules = self.lock()?;
        Ok(rules.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<BlockingRule>>> {
        self.rules
            .lock()
            .map_err(|_| BlockerError::Engine("rule store lock poisoned".to_string()))
    }
}

impl Default for MemoryRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleEngine for MemoryRuleEngine {
    async fn dynamic_rules(&self) -> Result<Vec<BlockingRule>> {
        self.installed()
    }

    async fn update_dynamic_rules(&self, remove_ids: &[u32], add_rules: Vec<BlockingRule>) -> Result<()> {
        let mut rules = self.lock()?;
        apply_update(&mut rules, remove_ids, add_rules, self.max_rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{rules_for_sites, RuleTemplate};

    fn batch(sites: &[&str], first_id: u32) -> Vec<BlockingRule> {
        let sites: Vec<String> = sites.iter().map(|s| s.to_string()).collect();
        rules_for_sites(&sites, first_id, &RuleTemplate::default())
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let engine = MemoryRuleEngine::new();
        engine.update_dynamic_rules(&[], batch(&["a.com", "b.com"], 1)).await.unwrap();
        assert_eq!(engine.dynamic_rules().await.unwrap().len(), 4);

        engine.update_dynamic_rules(&[1, 2, 99], Vec::new()).await.unwrap();
        let ids: Vec<u32> = engine.dynamic_rules().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejects_whole_update() {
        let engine = MemoryRuleEngine::new();
        engine.update_dynamic_rules(&[], batch(&["a.com"], 1)).await.unwrap();

        let err = engine.update_dynamic_rules(&[], batch(&["b.com"], 2)).await.unwrap_err();
        assert_eq!(err, BlockerError::DuplicateRuleId(2));
        assert_eq!(engine.installed().unwrap().len(), 2);

        // Removing the clashing id in the same update makes it valid
        engine.update_dynamic_rules(&[1, 2], batch(&["b.com"], 2)).await.unwrap();
        assert_eq!(engine.installed().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_quota() {
        let engine = MemoryRuleEngine::with_limit(3);
        let err = engine.update_dynamic_rules(&[], batch(&["a.com", "b.com"], 1)).await.unwrap_err();
        assert_eq!(err, BlockerError::RuleQuota { limit: 3, requested: 4 });
        assert!(engine.installed().unwrap().is_empty());
    }
}
