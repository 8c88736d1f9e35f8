//! Site matching and rule generation
//!
//! Every blocked site expands to two URL patterns: the bare domain and any
//! subdomain of it. The same expansion feeds both the rules installed in the
//! browser's network layer and the navigation monitor's "is this blocked"
//! test, so the two cannot drift apart.

use crate::config::BlockerConfig;
use crate::types::{BlockingRule, ResourceType, RuleAction, RuleCondition};

// =============================================================================
// URL Patterns
// =============================================================================

/// One of the two patterns a blocked site expands to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UrlPattern {
    /// `*://<domain>/*`
    Exact(String),
    /// `*://*.<domain>/*`
    Subdomains(String),
}

impl UrlPattern {
    /// Render as a rule-engine URL filter.
    pub fn to_filter(&self) -> String {
        match self {
            Self::Exact(domain) => format!("*://{}/*", domain),
            Self::Subdomains(domain) => format!("*://*.{}/*", domain),
        }
    }

    /// Parse a URL filter produced by [`UrlPattern::to_filter`].
    pub fn parse(filter: &str) -> Option<Self> {
        let host = filter.strip_prefix("*://")?.strip_suffix("/*")?;
        match host.strip_prefix("*.") {
            Some(domain) if !domain.is_empty() && !domain.contains('*') => {
                Some(Self::Subdomains(domain.to_string()))
            }
            Some(_) => None,
            None if !host.is_empty() && !host.contains('*') => Some(Self::Exact(host.to_string())),
            None => None,
        }
    }

    /// Test a canonical host against this pattern.
    #[inline]
    pub fn matches_host(&self, host: &str) -> bool {
        match self {
            Self::Exact(domain) => host == domain,
            Self::Subdomains(domain) => host
                .strip_suffix(domain.as_str())
                .map_or(false, |prefix| prefix.len() > 1 && prefix.ends_with('.')),
        }
    }
}

/// Expand a blocked site into its exact and subdomain patterns.
#[inline]
pub fn site_patterns(site: &str) -> [UrlPattern; 2] {
    [
        UrlPattern::Exact(site.to_string()),
        UrlPattern::Subdomains(site.to_string()),
    ]
}

// =============================================================================
// Match Predicate
// =============================================================================

/// True if `host` is blocked by `site`.
#[inline]
pub fn site_matches(site: &str, host: &str) -> bool {
    site_patterns(site).iter().any(|pattern| pattern.matches_host(host))
}

/// Find the blocklist entry responsible for blocking `host`, if any.
pub fn find_blocking_site<'a>(sites: &'a [String], host: &str) -> Option<&'a str> {
    sites
        .iter()
        .map(String::as_str)
        .find(|site| site_matches(site, host))
}

// =============================================================================
// Rule Generation
// =============================================================================

/// Priority/action shared by every rule of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTemplate {
    pub priority: u32,
    pub action: RuleAction,
}

impl RuleTemplate {
    pub fn from_config(config: &BlockerConfig) -> Self {
        let action = match &config.redirect_page {
            Some(page) => RuleAction::redirect_to(page.clone()),
            None => RuleAction::block(),
        };
        Self { priority: config.rule_priority, action }
    }
}

impl Default for RuleTemplate {
    fn default() -> Self {
        Self::from_config(&BlockerConfig::default())
    }
}

/// Number of rules a blocklist of `site_count` entries expands to.
#[inline]
pub fn rule_count(site_count: usize) -> usize {
    site_count * 2
}

/// Synthesize the rule batch for `sites`, numbering ids upward from `first_id`.
///
/// Rules come out in list order, exact pattern first for each site.
pub fn rules_for_sites(sites: &[String], first_id: u32, template: &RuleTemplate) -> Vec<BlockingRule> {
    sites
        .iter()
        .flat_map(|site| site_patterns(site))
        .zip(first_id..)
        .map(|(pattern, id)| BlockingRule {
            id,
            priority: template.priority,
            action: template.action.clone(),
            condition: RuleCondition {
                url_filter: pattern.to_filter(),
                resource_types: vec![ResourceType::MainFrame],
            },
        })
        .collect()
}

/// Test a main-frame navigation to `host` against an installed rule.
pub fn rule_matches_host(rule: &BlockingRule, host: &str) -> bool {
    if !rule.condition.resource_types.contains(&ResourceType::MainFrame) {
        return false;
    }
    UrlPattern::parse(&rule.condition.url_filter).map_or(false, |pattern| pattern.matches_host(host))
}
