//! Request intake: decode the posted conversation and split off the latest
//! message.

use rateprof_core::{ChatMessage, Conversation, RagError};

/// Parse a JSON array of `{role, content}` objects.
///
/// Fails when the body is not such an array, when it is empty, or when any
/// message lacks a string `content`.
pub fn parse_conversation(body: &[u8]) -> Result<Conversation, RagError> {
    let raw: Vec<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| RagError::MalformedInput(format!("expected a JSON array of messages: {}", e)))?;

    if raw.is_empty() {
        return Err(RagError::MalformedInput("conversation is empty".to_string()));
    }

    let last = raw.len() - 1;
    if raw[last].get("content").and_then(|c| c.as_str()).is_none() {
        return Err(RagError::MalformedInput(
            "last message has no content".to_string(),
        ));
    }

    let mut messages = raw
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value::<ChatMessage>(value)
                .map_err(|e| RagError::MalformedInput(format!("message {}: {}", i, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Non-empty was checked above.
    let latest = messages.pop().ok_or_else(|| {
        RagError::MalformedInput("conversation is empty".to_string())
    })?;

    Ok(Conversation {
        history: messages,
        latest,
    })
}
