//! Generic realtime chat: the session controller with caller-supplied
//! instructions and no stage machinery.

use std::sync::Arc;
use tracing::warn;
use voximate_realtime::{
    ChatMessage, MessageHandler, RealtimeSession, SessionDeps, SessionError, SessionHooks,
    SessionStatus,
};
use voximate_realtime_types::SessionConfig;

/// A free-form voice conversation.
pub struct RealtimeChat {
    session: RealtimeSession,
}

impl RealtimeChat {
    pub fn new(
        deps: SessionDeps,
        instructions: String,
        voice: Option<String>,
        on_message: Option<MessageHandler>,
    ) -> Self {
        let configure = Arc::new(move || SessionConfig {
            instructions: instructions.clone(),
            voice: voice.clone().unwrap_or_else(|| "alloy".to_string()),
            ..Default::default()
        });
        let mut hooks = SessionHooks::new(configure);
        if let Some(on_message) = on_message {
            hooks = hooks.with_message_handler(on_message);
        }
        Self {
            session: RealtimeSession::new(deps, hooks),
        }
    }

    /// Connects; a no-op while a session is already active.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.session.status() != SessionStatus::Disconnected {
            warn!("connect ignored: chat session already active");
            return Ok(());
        }
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub async fn send_message(&self, text: &str) {
        self.session.send_message(text).await;
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.last_error()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.session.messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voximate_realtime::{NullMediaSource, StaticCredentialProvider, TransportConfig};

    fn test_deps() -> SessionDeps {
        SessionDeps {
            transport: TransportConfig {
                signaling_url: "http://127.0.0.1:1/realtime".to_string(),
                model: "test-model".to_string(),
                guard_timeout: Duration::from_secs(1),
            },
            credential: Arc::new(StaticCredentialProvider::new("sk-test")),
            media: Arc::new(NullMediaSource),
        }
    }

    #[tokio::test]
    async fn test_chat_starts_disconnected_and_send_is_noop() {
        let chat = RealtimeChat::new(test_deps(), "Be helpful.".to_string(), None, None);
        assert_eq!(chat.status(), SessionStatus::Disconnected);

        chat.send_message("hello").await;
        assert!(chat.messages().is_empty());

        chat.disconnect().await;
        assert_eq!(chat.status(), SessionStatus::Disconnected);
    }
}
