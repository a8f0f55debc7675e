//! Frames sent from this client to the remote endpoint.

use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};

/// Messages sent over the control channel to the remote endpoint.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Reconfigures the live session. Sent once, immediately after the
    /// control channel opens and before any other traffic.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Appends a conversation item (typically a typed user message).
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Asks the endpoint to generate a response to the conversation so far.
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseSpec },
}

/// One conversation item: a role plus ordered content blocks.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ConversationItem {
    /// Builds a plain-text user message item.
    pub fn user_text(text: &str) -> Self {
        Self {
            kind: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentBlock {
                kind: "input_text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

/// A single content block inside a conversation item.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Requested output modalities for a generated response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResponseSpec {
    pub modalities: Vec<String>,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
        }
    }
}
