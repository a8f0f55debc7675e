//! Control-channel event decoding and streamed-message reassembly.
//!
//! The decoder turns each inbound frame into normalized [`SessionEvent`]s and
//! finalized [`ChatMessage`]s. It owns the single [`PendingResponse`]
//! accumulator for the in-flight assistant turn. A frame that fails to parse
//! is logged and dropped; it never interrupts the session.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use voximate_realtime_types::{OutputItem, ServerEvent};

/// A normalized event delivered to the session's event handler.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The endpoint acknowledged the session.
    SessionCreated,
    /// The endpoint applied the session configuration.
    SessionUpdated,
    /// A streamed fragment of assistant text.
    TextDelta { delta: String },
    /// The endpoint invoked a declared tool, with arguments already parsed
    /// into a map so consumers never touch raw JSON strings.
    FunctionCall {
        name: String,
        arguments: Map<String, Value>,
    },
    /// The endpoint reported an error.
    Error {
        message: String,
        code: Option<String>,
    },
}

/// A finalized, immutable conversational turn.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_user: bool,
    /// Conversation-stage tag supplied by the policy layer, if any.
    pub stage: Option<String>,
}

impl ChatMessage {
    pub fn assistant(text: String) -> Self {
        Self {
            text,
            timestamp: Utc::now(),
            is_user: false,
            stage: None,
        }
    }

    pub fn user(text: String) -> Self {
        Self {
            text,
            timestamp: Utc::now(),
            is_user: true,
            stage: None,
        }
    }
}

/// Accumulator for one in-flight streamed assistant turn.
///
/// At most one exists per session. Once finalized it refuses further
/// mutation; the next turn starts from a fresh accumulator.
#[derive(Debug)]
pub struct PendingResponse {
    text: String,
    started_at: DateTime<Utc>,
    response_id: Option<String>,
    is_complete: bool,
}

impl PendingResponse {
    fn new(response_id: Option<String>) -> Self {
        Self {
            text: String::new(),
            started_at: Utc::now(),
            response_id,
            is_complete: false,
        }
    }

    /// Appends a delta. Ignored after finalization.
    pub fn append(&mut self, delta: &str) {
        if self.is_complete {
            warn!("Dropping delta for already-finalized response");
            return;
        }
        self.text.push_str(delta);
    }

    /// Replaces the accumulated text with the authoritative transcript.
    pub fn set_authoritative(&mut self, transcript: String) {
        if self.is_complete {
            return;
        }
        self.text = transcript;
    }

    /// Marks the turn complete and returns the final text, preferring the
    /// authoritative full text from the completion event when present.
    pub fn finalize(&mut self, authoritative: Option<String>) -> String {
        self.is_complete = true;
        match authoritative {
            Some(text) if !text.is_empty() => text,
            _ => self.text.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }
}

/// Output of decoding one frame.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub events: Vec<SessionEvent>,
    pub messages: Vec<ChatMessage>,
}

/// Stateful decoder: one per session, reset by dropping it with the pump.
#[derive(Default)]
pub struct EventDecoder {
    pending: Option<PendingResponse>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one raw frame. Malformed frames are logged and produce an
    /// empty outcome.
    pub fn decode(&mut self, frame: &str) -> DecodeOutcome {
        match serde_json::from_str::<ServerEvent>(frame) {
            Ok(event) => self.apply(event),
            Err(e) => {
                warn!("Dropping malformed control frame: {}", e);
                DecodeOutcome::default()
            }
        }
    }

    fn apply(&mut self, event: ServerEvent) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        match event {
            ServerEvent::SessionCreated { .. } => {
                outcome.events.push(SessionEvent::SessionCreated);
            }
            ServerEvent::SessionUpdated { .. } => {
                outcome.events.push(SessionEvent::SessionUpdated);
            }
            ServerEvent::AudioTranscriptDelta { response_id, delta } => {
                let pending = self
                    .pending
                    .get_or_insert_with(|| PendingResponse::new(response_id));
                pending.append(&delta);
                outcome.events.push(SessionEvent::TextDelta { delta });
            }
            ServerEvent::AudioTranscriptDone { transcript, .. } => {
                if let (Some(pending), Some(transcript)) = (self.pending.as_mut(), transcript) {
                    pending.set_authoritative(transcript);
                }
            }
            ServerEvent::ResponseDone { response } => {
                let summary = response.unwrap_or_default();

                let mut authoritative: Option<String> = None;
                for item in &summary.output {
                    if let OutputItem::Message { content } = item {
                        if let Some(text) = content.iter().find_map(|p| p.display_text()) {
                            authoritative = Some(text.to_string());
                        }
                    }
                }

                if let Some(mut pending) = self.pending.take() {
                    let text = pending.finalize(authoritative);
                    if !text.is_empty() {
                        outcome.messages.push(ChatMessage::assistant(text));
                    }
                } else if let Some(text) = authoritative {
                    // A turn can complete without any delta having streamed.
                    if !text.is_empty() {
                        outcome.messages.push(ChatMessage::assistant(text));
                    }
                }

                // Each function call's arguments are parsed independently so
                // one malformed call never suppresses its siblings.
                for item in summary.output {
                    if let OutputItem::FunctionCall {
                        name, arguments, ..
                    } = item
                    {
                        match serde_json::from_str::<Map<String, Value>>(&arguments) {
                            Ok(arguments) => {
                                debug!(%name, "Decoded function call");
                                outcome
                                    .events
                                    .push(SessionEvent::FunctionCall { name, arguments });
                            }
                            Err(e) => {
                                warn!(%name, "Dropping function call with malformed arguments: {}", e);
                            }
                        }
                    }
                }
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                if !transcript.is_empty() {
                    outcome.messages.push(ChatMessage::user(transcript));
                }
            }
            ServerEvent::Error { error } => {
                outcome.events.push(SessionEvent::Error {
                    message: error.message,
                    code: error.code,
                });
            }
            ServerEvent::Unknown => {
                debug!("Ignoring unrecognized server event");
            }
        }
        outcome
    }

    /// Whether a streamed turn is currently in flight.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut EventDecoder, frames: &[&str]) -> (Vec<SessionEvent>, Vec<ChatMessage>) {
        let mut events = Vec::new();
        let mut messages = Vec::new();
        for frame in frames {
            let outcome = decoder.decode(frame);
            events.extend(outcome.events);
            messages.extend(outcome.messages);
        }
        (events, messages)
    }

    #[test]
    fn test_deltas_concatenate_into_one_message() {
        let mut decoder = EventDecoder::new();
        let (_, messages) = decode_all(
            &mut decoder,
            &[
                r#"{"type":"response.audio_transcript.delta","delta":"Hel"}"#,
                r#"{"type":"response.audio_transcript.delta","delta":"lo"}"#,
                r#"{"type":"response.done"}"#,
            ],
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Hello");
        assert!(!messages[0].is_user);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_authoritative_text_preferred_over_deltas() {
        let mut decoder = EventDecoder::new();
        let (_, messages) = decode_all(
            &mut decoder,
            &[
                r#"{"type":"response.audio_transcript.delta","delta":"garbled par"}"#,
                r#"{"type":"response.done","response":{"output":[
                    {"type":"message","content":[{"type":"audio","transcript":"The full clean text."}]}
                ]}}"#,
            ],
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "The full clean text.");
    }

    #[test]
    fn test_finalized_response_rejects_further_deltas() {
        let mut pending = PendingResponse::new(None);
        pending.append("first");
        let text = pending.finalize(None);
        assert_eq!(text, "first");
        assert!(pending.is_complete());

        pending.append(" second");
        assert_eq!(pending.text(), "first");

        // Finalizing again yields the same text.
        assert_eq!(pending.finalize(None), "first");
    }

    #[test]
    fn test_fresh_accumulator_per_turn() {
        let mut decoder = EventDecoder::new();
        let (_, first) = decode_all(
            &mut decoder,
            &[
                r#"{"type":"response.audio_transcript.delta","delta":"one"}"#,
                r#"{"type":"response.done"}"#,
            ],
        );
        let (_, second) = decode_all(
            &mut decoder,
            &[
                r#"{"type":"response.audio_transcript.delta","delta":"two"}"#,
                r#"{"type":"response.done"}"#,
            ],
        );
        assert_eq!(first[0].text, "one");
        assert_eq!(second[0].text, "two");
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode("{not valid json at all");
        assert!(outcome.events.is_empty());
        assert!(outcome.messages.is_empty());

        // The decoder still works afterwards.
        let (_, messages) = decode_all(
            &mut decoder,
            &[
                r#"{"type":"response.audio_transcript.delta","delta":"ok"}"#,
                r#"{"type":"response.done"}"#,
            ],
        );
        assert_eq!(messages[0].text, "ok");
    }

    #[test]
    fn test_function_calls_surface_with_parsed_arguments() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode(
            r#"{"type":"response.done","response":{"output":[
                {"type":"function_call","name":"updateInterviewProgress",
                 "arguments":"{\"currentStage\":\"technical\",\"progress\":25,\"stageTitle\":\"Technical Skills\"}"}
            ]}}"#,
        );
        assert_eq!(outcome.events.len(), 1);
        match &outcome.events[0] {
            SessionEvent::FunctionCall { name, arguments } => {
                assert_eq!(name, "updateInterviewProgress");
                assert_eq!(arguments["currentStage"], "technical");
                assert_eq!(arguments["progress"], 25);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_function_call_does_not_suppress_siblings() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode(
            r#"{"type":"response.done","response":{"output":[
                {"type":"function_call","name":"broken","arguments":"{oops"},
                {"type":"function_call","name":"showFeedback","arguments":"{\"type\":\"positive\",\"message\":\"nice\"}"}
            ]}}"#,
        );
        assert_eq!(outcome.events.len(), 1);
        match &outcome.events[0] {
            SessionEvent::FunctionCall { name, .. } => assert_eq!(name, "showFeedback"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_user_transcription_becomes_user_message() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"I built the billing service."}"#,
        );
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].is_user);
        assert_eq!(outcome.messages[0].text, "I built the billing service.");
        // No accumulation is involved for user speech.
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_error_event_surfaces() {
        let mut decoder = EventDecoder::new();
        let outcome =
            decoder.decode(r#"{"type":"error","error":{"message":"boom","code":"server_error"}}"#);
        match &outcome.events[0] {
            SessionEvent::Error { message, code } => {
                assert_eq!(message, "boom");
                assert_eq!(code.as_deref(), Some("server_error"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_transcript_done_sets_authoritative_text() {
        let mut decoder = EventDecoder::new();
        let (_, messages) = decode_all(
            &mut decoder,
            &[
                r#"{"type":"response.audio_transcript.delta","delta":"partial"}"#,
                r#"{"type":"response.audio_transcript.done","transcript":"Complete sentence."}"#,
                r#"{"type":"response.done"}"#,
            ],
        );
        assert_eq!(messages[0].text, "Complete sentence.");
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode(r#"{"type":"output_audio_buffer.started"}"#);
        assert!(outcome.events.is_empty());
        assert!(outcome.messages.is_empty());
    }

    #[test]
    fn test_empty_turn_emits_no_message() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode(r#"{"type":"response.done"}"#);
        assert!(outcome.messages.is_empty());
    }
}
