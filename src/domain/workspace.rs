//! Workspace model and its configuration sidecar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::timestamp;

/// A workspace binds tasks and flows to a local repository checkout.
/// Created on demand, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub local_repo_dir: String,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

/// Per-workspace configuration sidecar, stored next to the workspace
/// record. Read paths merge it into the workspace response; missing
/// sections come back as empty (never null) objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub llm_defaults: Map<String, Value>,
    #[serde(default)]
    pub embedding_defaults: Map<String, Value>,
    #[serde(default)]
    pub use_case_configs: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_are_empty_objects() {
        let config: WorkspaceConfig = serde_json::from_str("{}").unwrap();
        assert!(config.llm_defaults.is_empty());
        assert!(config.embedding_defaults.is_empty());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["llmDefaults"], serde_json::json!({}));
    }

    #[test]
    fn test_workspace_wire_shape() {
        let workspace = Workspace {
            id: "ws_1".to_string(),
            name: "demo".to_string(),
            local_repo_dir: "/tmp/demo".to_string(),
            created: chrono::Utc::now(),
            updated: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&workspace).unwrap();
        assert_eq!(json["localRepoDir"], "/tmp/demo");
        assert!(json["created"].as_str().unwrap().ends_with('Z'));
    }
}
