//! FlowAction model: a single user-facing decision point surfaced by a flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::timestamp;

/// Action type whose completion payload carries a user request response.
pub const ACTION_TYPE_USER_REQUEST: &str = "user_request";

/// `actionParams` key selecting the request shape.
pub const PARAM_REQUEST_KIND: &str = "requestKind";

/// Request kind that requires non-empty free-form content on completion.
pub const REQUEST_KIND_FREE_FORM: &str = "free_form";

/// FlowAction status. `pending` transitions to `complete` or `failed` at
/// most once; both are absolute terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Complete,
    Failed,
}

impl ActionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown flow action status: {s}")),
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision point in a flow, optionally grouped under a subflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowAction {
    pub id: String,
    pub workspace_id: String,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subflow_name: Option<String>,
    /// Free string; some values drive specific validation
    /// (e.g. [`ACTION_TYPE_USER_REQUEST`]).
    pub action_type: String,
    pub action_status: ActionStatus,
    #[serde(default)]
    pub action_params: Map<String, Value>,
    /// Opaque result string. JSON once set by a completion or update.
    #[serde(default)]
    pub action_result: String,
    pub is_human_action: bool,
    pub is_callback_action: bool,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl FlowAction {
    /// The `requestKind` parameter, when present and a string.
    #[must_use]
    pub fn request_kind(&self) -> Option<&str> {
        self.action_params.get(PARAM_REQUEST_KIND).and_then(Value::as_str)
    }

    /// Whether this action is still awaiting its one allowed transition.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.action_status == ActionStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlowAction {
        let mut params = Map::new();
        params.insert(
            PARAM_REQUEST_KIND.to_string(),
            Value::String(REQUEST_KIND_FREE_FORM.to_string()),
        );
        FlowAction {
            id: "fa_1".to_string(),
            workspace_id: "ws_1".to_string(),
            flow_id: "flow_1".to_string(),
            subflow_id: None,
            subflow_name: None,
            action_type: ACTION_TYPE_USER_REQUEST.to_string(),
            action_status: ActionStatus::Pending,
            action_params: params,
            action_result: String::new(),
            is_human_action: true,
            is_callback_action: true,
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_request_kind_lookup() {
        let action = sample();
        assert_eq!(action.request_kind(), Some(REQUEST_KIND_FREE_FORM));
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["actionStatus"], "pending");
        assert_eq!(json["actionType"], "user_request");
        assert_eq!(json["isHumanAction"], true);
        assert_eq!(json["isCallbackAction"], true);
        assert_eq!(json["actionParams"]["requestKind"], "free_form");
        assert!(json.get("subflowId").is_none());
    }
}
