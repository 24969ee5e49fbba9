//! Flow event stream payloads.
//!
//! Events are a tagged sum discriminated by `eventType`; decoding inspects
//! the tag before the variant body, so new event kinds can be added without
//! touching existing consumers. `parentId` scopes a logical sub-stream
//! within a flow; `end_stream` is the terminal marker for one sub-stream.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum FlowEvent {
    /// Incremental progress text for one sub-stream.
    #[serde(rename_all = "camelCase")]
    ProgressText { parent_id: String, text: String },
    /// Terminal marker: the sub-stream identified by `parentId` is closed.
    #[serde(rename_all = "camelCase")]
    EndStream { parent_id: String },
}

impl FlowEvent {
    /// The sub-stream this event belongs to.
    #[must_use]
    pub fn parent_id(&self) -> &str {
        match self {
            Self::ProgressText { parent_id, .. } | Self::EndStream { parent_id } => parent_id,
        }
    }

    /// Whether this event closes its sub-stream.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndStream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_event_type_tag() {
        let event: FlowEvent =
            serde_json::from_str(r#"{"eventType":"progress_text","parentId":"p1","text":"hi"}"#)
                .unwrap();
        assert_eq!(
            event,
            FlowEvent::ProgressText {
                parent_id: "p1".to_string(),
                text: "hi".to_string()
            }
        );
        assert_eq!(event.parent_id(), "p1");
    }

    #[test]
    fn test_end_stream_marker() {
        let event: FlowEvent =
            serde_json::from_str(r#"{"eventType":"end_stream","parentId":"p1"}"#).unwrap();
        assert!(event.is_end_of_stream());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "end_stream");
        assert_eq!(json["parentId"], "p1");
    }

    #[test]
    fn test_unknown_event_type_is_an_error() {
        let result = serde_json::from_str::<FlowEvent>(r#"{"eventType":"mystery","parentId":"p"}"#);
        assert!(result.is_err());
    }
}
