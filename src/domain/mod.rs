//! Core domain models.
//!
//! Everything the request layer persists or streams is defined here:
//! [`Workspace`], [`Task`], [`Flow`], [`FlowAction`], [`Subflow`] and the
//! [`FlowEvent`] stream payloads. Wire representation is camelCase JSON with
//! RFC3339 UTC timestamps (nanosecond precision, trailing `Z`).

pub mod event;
pub mod flow;
pub mod flow_action;
pub mod subflow;
pub mod task;
pub mod workspace;

pub use event::FlowEvent;
pub use flow::{Flow, Worktree};
pub use flow_action::{ActionStatus, FlowAction};
pub use subflow::Subflow;
pub use task::{AgentType, Task, TaskStatus};
pub use workspace::{Workspace, WorkspaceConfig};

use uuid::Uuid;

/// Entity id prefixes. Every persisted id carries one (invariant on read
/// paths and tests, stamped on create paths).
pub const WORKSPACE_ID_PREFIX: &str = "ws_";
pub const TASK_ID_PREFIX: &str = "task_";
pub const FLOW_ID_PREFIX: &str = "flow_";
pub const SUBFLOW_ID_PREFIX: &str = "sf_";
pub const FLOW_ACTION_ID_PREFIX: &str = "fa_";

/// Generate a prefixed entity id (`task_9f2c...`).
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Serde helpers for the wire timestamp format: RFC3339 in UTC with
/// nanosecond precision and a trailing `Z` (never an offset).
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    /// `Option<DateTime<Utc>>` variant, for fields like `Task::archived`.
    pub mod opt {
        use chrono::{DateTime, SecondsFormat, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(ts) => {
                    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                Some(s) => DateTime::parse_from_rfc3339(&s)
                    .map(|parsed| Some(parsed.with_timezone(&Utc)))
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
