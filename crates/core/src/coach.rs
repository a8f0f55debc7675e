//! Shared plumbing for the conversation policies.
//!
//! Both coaches interpret the same two stage-advance channels, explicit
//! function calls and inline text markers, and both schedule the caller's
//! close logic after a grace delay instead of disconnecting mid-audio.

use crate::stage::{Feedback, StageSequence};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use voximate_realtime::MessageHandler;

/// Delay between reaching the terminal stage and invoking the caller's close
/// logic, so trailing audio can finish playing.
pub const COMPLETION_GRACE: Duration = Duration::from_secs(3);

/// Invoked once, after the grace delay, when the conversation completes.
pub type CompleteFn = Arc<dyn Fn() + Send + Sync>;
/// Invoked on every stage or progress change.
pub type StageHandler<S> = Arc<dyn Fn(S, u8) + Send + Sync>;

/// Caller-facing hooks for a coach.
pub struct CoachHooks<S: StageSequence> {
    pub on_message: Option<MessageHandler>,
    pub on_stage: Option<StageHandler<S>>,
    pub on_complete: Option<CompleteFn>,
}

impl<S: StageSequence> Default for CoachHooks<S> {
    fn default() -> Self {
        Self {
            on_message: None,
            on_stage: None,
            on_complete: None,
        }
    }
}

impl<S: StageSequence> Clone for CoachHooks<S> {
    fn clone(&self) -> Self {
        Self {
            on_message: self.on_message.clone(),
            on_stage: self.on_stage.clone(),
            on_complete: self.on_complete.clone(),
        }
    }
}

impl<S: StageSequence> CoachHooks<S> {
    pub fn with_message_handler(mut self, handler: MessageHandler) -> Self {
        self.on_message = Some(handler);
        self
    }

    pub fn with_stage_handler(mut self, handler: StageHandler<S>) -> Self {
        self.on_stage = Some(handler);
        self
    }

    pub fn with_complete_handler(mut self, handler: CompleteFn) -> Self {
        self.on_complete = Some(handler);
        self
    }
}

/// Arguments of a progress-update function call, camelCase on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressUpdateArgs {
    pub current_stage: Option<String>,
    pub progress: Option<f64>,
    pub stage_title: Option<String>,
}

impl ProgressUpdateArgs {
    pub fn progress_value(&self) -> Option<u8> {
        self.progress.map(|p| p.clamp(0.0, 100.0) as u8)
    }
}

/// Arguments of a preference-recording function call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreferenceArgs {
    pub preference: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Arguments of an insight-recording function call.
#[derive(Debug, Deserialize)]
pub(crate) struct InsightArgs {
    pub insight: String,
}

/// Parses typed arguments out of a decoded argument map; a mismatch is
/// logged and the call ignored.
pub(crate) fn parse_args<T: DeserializeOwned>(name: &str, arguments: &Map<String, Value>) -> Option<T> {
    match serde_json::from_value(Value::Object(arguments.clone())) {
        Ok(args) => Some(args),
        Err(e) => {
            warn!(%name, "Ignoring function call with unexpected arguments: {}", e);
            None
        }
    }
}

/// Interprets a `[FEEDBACK_START]...[FEEDBACK_END]` payload: embedded JSON
/// when it parses, plain neutral text otherwise.
pub(crate) fn parse_feedback_payload(payload: &str) -> Feedback {
    serde_json::from_str::<Feedback>(payload).unwrap_or_else(|_| Feedback::neutral(payload))
}

/// Schedules the caller's close logic after the completion grace delay.
pub(crate) fn schedule_completion(on_complete: Option<CompleteFn>) {
    tokio::spawn(async move {
        tokio::time::sleep(COMPLETION_GRACE).await;
        if let Some(on_complete) = on_complete {
            on_complete();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FeedbackKind;
    use serde_json::json;

    #[test]
    fn test_parse_args_camel_case() {
        let mut arguments = Map::new();
        arguments.insert("currentStage".to_string(), json!("technical"));
        arguments.insert("progress".to_string(), json!(25.0));
        arguments.insert("stageTitle".to_string(), json!("Technical Skills"));

        let args: ProgressUpdateArgs = parse_args("updateInterviewProgress", &arguments).unwrap();
        assert_eq!(args.current_stage.as_deref(), Some("technical"));
        assert_eq!(args.progress_value(), Some(25));
        assert_eq!(args.stage_title.as_deref(), Some("Technical Skills"));
    }

    #[test]
    fn test_progress_value_clamps() {
        let args = ProgressUpdateArgs {
            current_stage: None,
            progress: Some(140.0),
            stage_title: None,
        };
        assert_eq!(args.progress_value(), Some(100));
    }

    #[test]
    fn test_feedback_payload_json() {
        let feedback = parse_feedback_payload(
            r#"{"type":"improvement","message":"Quantify your impact","improvements":["add numbers"]}"#,
        );
        assert_eq!(feedback.kind, FeedbackKind::Improvement);
        assert_eq!(feedback.improvements, vec!["add numbers"]);
    }

    #[test]
    fn test_feedback_payload_plain_text() {
        let feedback = parse_feedback_payload("Good pacing, keep it up.");
        assert_eq!(feedback.kind, FeedbackKind::Neutral);
        assert_eq!(feedback.message, "Good pacing, keep it up.");
    }
}
