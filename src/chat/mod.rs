//! Chat-history hydration.
//!
//! Stored chat messages reference large content blocks by id instead of
//! inlining them. Hydration resolves those references from the key-value
//! store. A missing or malformed block never fails the request: it becomes
//! a text block reading `[hydrate error: …]` so the history stays usable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Storage;

/// One chat message, as stored in flow history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A piece of message content: inline text or a reference into the block
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    BlockRef { block_id: String },
}

/// KV key for one stored content block.
fn block_key(workspace_id: &str, flow_id: &str, block_id: &str) -> String {
    format!("blocks:{workspace_id}:{flow_id}:{block_id}")
}

/// Store a content block for later hydration. Blocks are written by
/// workflows as they trim chat history.
pub async fn put_block(
    storage: &dyn Storage,
    workspace_id: &str,
    flow_id: &str,
    block_id: &str,
    block: Value,
) -> Result<(), crate::storage::StorageError> {
    storage
        .put_kv(&block_key(workspace_id, flow_id, block_id), block)
        .await
}

/// Resolve every block reference in the given messages.
///
/// Infallible by contract: errors are embedded as text placeholders.
pub async fn hydrate_messages(
    storage: &dyn Storage,
    workspace_id: &str,
    flow_id: &str,
    messages: Vec<ChatMessage>,
) -> Vec<ChatMessage> {
    let mut hydrated = Vec::with_capacity(messages.len());
    for mut message in messages {
        let mut content = Vec::with_capacity(message.content.len());
        for block in message.content {
            match block {
                ContentBlock::Text { .. } => content.push(block),
                ContentBlock::BlockRef { block_id } => {
                    content.push(resolve_block(storage, workspace_id, flow_id, &block_id).await);
                }
            }
        }
        message.content = content;
        hydrated.push(message);
    }
    hydrated
}

async fn resolve_block(
    storage: &dyn Storage,
    workspace_id: &str,
    flow_id: &str,
    block_id: &str,
) -> ContentBlock {
    let stored = match storage
        .get_kv(&block_key(workspace_id, flow_id, block_id))
        .await
    {
        Ok(stored) => stored,
        Err(error) => {
            return ContentBlock::Text {
                text: format!("[hydrate error: failed to load content block {block_id}: {error}]"),
            };
        }
    };

    let Some(value) = stored else {
        return ContentBlock::Text {
            text: format!("[hydrate error: content block {block_id} not found]"),
        };
    };

    match serde_json::from_value::<ContentBlock>(value) {
        Ok(block) => block,
        Err(error) => ContentBlock::Text {
            text: format!("[hydrate error: malformed content block {block_id}: {error}]"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn message(content: Vec<ContentBlock>) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            content,
        }
    }

    #[tokio::test]
    async fn test_hydrates_block_references() {
        let storage = MemoryStorage::new();
        put_block(
            &storage,
            "ws_1",
            "flow_1",
            "b1",
            serde_json::json!({"type": "text", "text": "stored body"}),
        )
        .await
        .unwrap();

        let hydrated = hydrate_messages(
            &storage,
            "ws_1",
            "flow_1",
            vec![message(vec![
                ContentBlock::Text {
                    text: "inline".to_string(),
                },
                ContentBlock::BlockRef {
                    block_id: "b1".to_string(),
                },
            ])],
        )
        .await;

        assert_eq!(
            hydrated[0].content,
            vec![
                ContentBlock::Text {
                    text: "inline".to_string()
                },
                ContentBlock::Text {
                    text: "stored body".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_block_becomes_placeholder() {
        let storage = MemoryStorage::new();
        let hydrated = hydrate_messages(
            &storage,
            "ws_1",
            "flow_1",
            vec![message(vec![ContentBlock::BlockRef {
                block_id: "gone".to_string(),
            }])],
        )
        .await;

        match &hydrated[0].content[0] {
            ContentBlock::Text { text } => {
                assert!(text.starts_with("[hydrate error:"), "got {text}");
                assert!(text.contains("gone"));
            }
            other => panic!("expected text placeholder, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_block_becomes_placeholder() {
        let storage = MemoryStorage::new();
        put_block(
            &storage,
            "ws_1",
            "flow_1",
            "bad",
            serde_json::json!({"type": "mystery"}),
        )
        .await
        .unwrap();

        let hydrated = hydrate_messages(
            &storage,
            "ws_1",
            "flow_1",
            vec![message(vec![ContentBlock::BlockRef {
                block_id: "bad".to_string(),
            }])],
        )
        .await;

        match &hydrated[0].content[0] {
            ContentBlock::Text { text } => assert!(text.starts_with("[hydrate error:")),
            other => panic!("expected text placeholder, got {other:?}"),
        }
    }
}
