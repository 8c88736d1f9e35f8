//! Runtime messages exchanged with the popup and other extension pages.

use serde::{Deserialize, Serialize};

use crate::monitor::BlockEvent;

/// Requests a page can send to the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Force a reconciliation
    UpdateRules,
    /// Refresh the toolbar badge
    GetBadgeInfo,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self { success: false, error: Some(error.to_string()) }
    }
}

impl<T, E: ToString> From<Result<T, E>> for Response {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::failed(e),
        }
    }
}

/// Broadcasts from the background to any open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Notification {
    SiteBlocked { domain: String, url: String },
}

impl From<&BlockEvent> for Notification {
    fn from(event: &BlockEvent) -> Self {
        Self::SiteBlocked {
            domain: event.domain.clone(),
            url: event.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: Request = serde_json::from_value(json!({"action": "updateRules"})).unwrap();
        assert_eq!(req, Request::UpdateRules);
        let req: Request = serde_json::from_value(json!({"action": "getBadgeInfo"})).unwrap();
        assert_eq!(req, Request::GetBadgeInfo);
        assert!(serde_json::from_value::<Request>(json!({"action": "dance"})).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        assert_eq!(serde_json::to_value(Response::ok()).unwrap(), json!({"success": true}));
        let failed: Response = Err::<(), _>("boom").into();
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            json!({"success": false, "error": "boom"})
        );
    }

    #[test]
    fn test_site_blocked_wire_format() {
        let event = BlockEvent {
            domain: "old.reddit.com".into(),
            url: "https://old.reddit.com/".into(),
            site: "reddit.com".into(),
            today_blocks: 1,
        };
        let json = serde_json::to_value(Notification::from(&event)).unwrap();
        assert_eq!(
            json,
            json!({"action": "siteBlocked", "domain": "old.reddit.com", "url": "https://old.reddit.com/"})
        );
    }
}
