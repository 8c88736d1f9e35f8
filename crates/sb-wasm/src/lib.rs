//! WebAssembly bindings for SiteBlocker
//!
//! The background script owns the async browser APIs (storage, the
//! declarative rule engine); these bindings supply the pieces that must agree
//! with the native core: normalization, the match predicate, rule batches,
//! id allocation and badge text.

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::prelude::*;

use sb_core::{
    badge::badge_text_for,
    domain::{extract_host, navigation_host, normalize, normalize_url_host},
    matcher::{find_blocking_site, rules_for_sites, RuleTemplate},
    sync::{batch_end, batch_start},
    types::{ActionType, BlockingRule, ResourceType, RuleAction},
};

// =============================================================================
// Logging
// =============================================================================

/// `log` backend writing to the browser console.
struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&line),
            Level::Warn => web_sys::console::warn_1(&line),
            Level::Info => web_sys::console::info_1(&line),
            Level::Debug | Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

#[wasm_bindgen]
pub fn init_logging(level: Option<String>) -> Result<(), JsValue> {
    let filter = parse_level(level.as_deref());
    log::set_logger(&LOGGER)
        .map_err(|e| JsValue::from_str(&format!("Logger already installed: {}", e)))?;
    log::set_max_level(filter);
    Ok(())
}

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.map(str::to_ascii_lowercase).as_deref() {
        Some("off") => LevelFilter::Off,
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

// =============================================================================
// Domains
// =============================================================================

/// Normalize popup input. Throws the validation message on failure.
#[wasm_bindgen]
pub fn normalize_domain(input: &str) -> Result<String, JsValue> {
    normalize(input).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Canonical host of a navigation URL, or `undefined` for privileged/opaque URLs.
#[wasm_bindgen]
pub fn normalize_host(url: &str) -> Option<String> {
    normalize_url_host(url).ok()
}

#[wasm_bindgen]
pub fn extract_host_js(url: &str) -> Option<String> {
    extract_host(url).map(|h| h.to_string())
}

/// Blocklist entry that blocks `url`, if any.
#[wasm_bindgen]
pub fn blocking_site(url: &str, sites: JsValue) -> Option<String> {
    let host = navigation_host(url).ok()?;
    let sites = string_array(&sites);
    find_blocking_site(&sites, &host).map(|s| s.to_string())
}

#[wasm_bindgen]
pub fn is_blocked(url: &str, sites: JsValue) -> bool {
    blocking_site(url, sites).is_some()
}

// =============================================================================
// Rules
// =============================================================================

/// First id for the next batch, given the ids still installed.
#[wasm_bindgen]
pub fn next_rule_id(cursor: u32, installed_ids: &[u32]) -> u32 {
    batch_start(cursor, installed_ids.iter().copied().max())
}

/// Build the rule batch for the given settings.
///
/// Returns an empty array when blocking is disabled or the list is empty.
/// Throws when the batch would run past the last rule id.
#[wasm_bindgen]
pub fn build_rules(
    sites: JsValue,
    enabled: bool,
    first_id: u32,
    priority: u32,
    redirect_page: Option<String>,
) -> Result<JsValue, JsValue> {
    let sites = string_array(&sites);
    let result = js_sys::Array::new();
    if !enabled || sites.is_empty() {
        return Ok(result.into());
    }
    batch_end(first_id, sites.len()).map_err(|e| JsValue::from_str(&e.to_string()))?;

    let action = match redirect_page {
        Some(page) => RuleAction::redirect_to(page),
        None => RuleAction::block(),
    };
    let template = RuleTemplate { priority: priority.max(1), action };

    for rule in rules_for_sites(&sites, first_id, &template) {
        result.push(&rule_to_js(&rule));
    }
    Ok(result.into())
}

#[wasm_bindgen]
pub fn badge_text_js(sites: JsValue, enabled: bool) -> String {
    badge_text_for(string_array(&sites).len(), enabled)
}

fn rule_to_js(rule: &BlockingRule) -> JsValue {
    let obj = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&obj, &"id".into(), &JsValue::from(rule.id));
    let _ = js_sys::Reflect::set(&obj, &"priority".into(), &JsValue::from(rule.priority));

    let action = js_sys::Object::new();
    let kind = match rule.action.kind {
        ActionType::Block => "block",
        ActionType::Redirect => "redirect",
    };
    let _ = js_sys::Reflect::set(&action, &"type".into(), &JsValue::from_str(kind));
    if let Some(redirect) = &rule.action.redirect {
        let target = js_sys::Object::new();
        let _ = js_sys::Reflect::set(
            &target,
            &"extensionPath".into(),
            &JsValue::from_str(&redirect.extension_path),
        );
        let _ = js_sys::Reflect::set(&action, &"redirect".into(), &target);
    }
    let _ = js_sys::Reflect::set(&obj, &"action".into(), &action);

    let condition = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &condition,
        &"urlFilter".into(),
        &JsValue::from_str(&rule.condition.url_filter),
    );
    let resource_types = js_sys::Array::new();
    for resource_type in &rule.condition.resource_types {
        resource_types.push(&JsValue::from_str(resource_type_name(*resource_type)));
    }
    let _ = js_sys::Reflect::set(&condition, &"resourceTypes".into(), &resource_types);
    let _ = js_sys::Reflect::set(&obj, &"condition".into(), &condition);

    obj.into()
}

fn resource_type_name(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::MainFrame => "main_frame",
        ResourceType::SubFrame => "sub_frame",
        ResourceType::Other => "other",
    }
}

fn string_array(value: &JsValue) -> Vec<String> {
    js_sys::Array::from(value)
        .iter()
        .filter_map(|entry| entry.as_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), LevelFilter::Info);
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("off")), LevelFilter::Off);
        assert_eq!(parse_level(Some("verbose")), LevelFilter::Info);
    }

    #[test]
    fn test_resource_type_names() {
        assert_eq!(resource_type_name(ResourceType::MainFrame), "main_frame");
        assert_eq!(resource_type_name(ResourceType::SubFrame), "sub_frame");
    }

    #[test]
    fn test_next_rule_id() {
        assert_eq!(next_rule_id(1, &[]), 1);
        assert_eq!(next_rule_id(1, &[7, 3, 12]), 13);
        assert_eq!(next_rule_id(20, &[7, 3, 12]), 20);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    fn sites(list: &[&str]) -> JsValue {
        let array = js_sys::Array::new();
        for site in list {
            array.push(&JsValue::from_str(site));
        }
        array.into()
    }

    #[wasm_bindgen_test]
    fn test_build_rules() {
        let rules = js_sys::Array::from(&build_rules(sites(&["reddit.com"]), true, 5, 1, None).unwrap());
        assert_eq!(rules.length(), 2);
        let first = rules.get(0);
        let id = js_sys::Reflect::get(&first, &"id".into()).unwrap();
        assert_eq!(id.as_f64(), Some(5.0));

        let disabled = js_sys::Array::from(&build_rules(sites(&["reddit.com"]), false, 5, 1, None).unwrap());
        assert_eq!(disabled.length(), 0);

        assert!(build_rules(sites(&["reddit.com"]), true, u32::MAX - 1, 1, None).is_err());
    }

    #[wasm_bindgen_test]
    fn test_blocking_site() {
        let list = sites(&["reddit.com"]);
        assert_eq!(blocking_site("https://old.reddit.com/", list.clone()), Some("reddit.com".to_string()));
        assert!(!is_blocked("https://example.com/", list.clone()));
        assert_eq!(badge_text_js(list, true), "1");
    }
}
