//! Frames received from the remote endpoint, decoded as a closed tagged union.

use serde::Deserialize;
use serde_json::Value;

/// Every inbound control-channel frame decodes to exactly one variant.
///
/// The endpoint emits many more event types than the client acts on; anything
/// not listed here lands in [`ServerEvent::Unknown`] and is ignored upstream
/// rather than being half-matched field by field.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The endpoint acknowledged the session.
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Option<Value>,
    },

    /// The endpoint applied a `session.update`.
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: Option<Value>,
    },

    /// A streamed fragment of the assistant's spoken-transcript text.
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    /// The assistant transcript for one output item is final. Carries the
    /// authoritative full text, which supersedes accumulated deltas.
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        transcript: Option<String>,
    },

    /// The assistant turn is complete. The nested summary may carry message
    /// output and/or function-call descriptors.
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseSummary>,
    },

    /// Server-side transcription of the user's speech finished.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },

    /// The endpoint reported an error.
    #[serde(rename = "error")]
    Error { error: ErrorDetail },

    /// Any `type` value this client does not act on.
    #[serde(other)]
    Unknown,
}

/// Summary attached to a `response.done` frame.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ResponseSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

/// One output item of a completed response.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum OutputItem {
    /// The endpoint invoked a declared tool. `arguments` is a JSON-encoded
    /// string and is parsed separately per call, so one malformed call never
    /// poisons its siblings.
    #[serde(rename = "function_call")]
    FunctionCall {
        name: String,
        arguments: String,
        #[serde(default)]
        call_id: Option<String>,
    },

    /// A message output item with content parts.
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },

    #[serde(other)]
    Unknown,
}

/// A content part of a message output item.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ContentPart {
    /// The displayable text of this part, whichever field carries it.
    pub fn display_text(&self) -> Option<&str> {
        self.transcript.as_deref().or(self.text.as_deref())
    }
}

/// Error payload of a server `error` frame.
#[derive(Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_transcript_delta() {
        let frame = r#"{"type":"response.audio_transcript.delta","response_id":"resp_1","delta":"Hel"}"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        match event {
            ServerEvent::AudioTranscriptDelta { response_id, delta } => {
                assert_eq!(response_id.as_deref(), Some("resp_1"));
                assert_eq!(delta, "Hel");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_done_with_function_call() {
        let frame = r#"{
            "type": "response.done",
            "response": {
                "id": "resp_2",
                "output": [
                    {"type": "function_call", "name": "updateInterviewProgress",
                     "arguments": "{\"currentStage\":\"technical\"}", "call_id": "call_1"},
                    {"type": "message", "content": [{"type": "audio", "transcript": "Moving on."}]}
                ]
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        let ServerEvent::ResponseDone { response: Some(summary) } = event else {
            panic!("expected ResponseDone");
        };
        assert_eq!(summary.id.as_deref(), Some("resp_2"));
        assert_eq!(summary.output.len(), 2);
        match &summary.output[0] {
            OutputItem::FunctionCall { name, arguments, call_id } => {
                assert_eq!(name, "updateInterviewProgress");
                assert!(arguments.contains("technical"));
                assert_eq!(call_id.as_deref(), Some("call_1"));
            }
            other => panic!("unexpected item: {:?}", other),
        }
        match &summary.output[1] {
            OutputItem::Message { content } => {
                assert_eq!(content[0].display_text(), Some("Moving on."));
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn test_decode_user_transcription() {
        let frame = r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"I led a team of four."}"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        match event {
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                assert_eq!(transcript, "I led a team of four.");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_event() {
        let frame = r#"{"type":"error","error":{"message":"session expired","code":"session_expired"}}"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "session expired");
                assert_eq!(error.code.as_deref(), Some("session_expired"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_type_is_unknown() {
        let frame = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_unrecognized_output_item_is_unknown() {
        let frame = r#"{
            "type": "response.done",
            "response": {"output": [{"type": "audio", "data": "...."}]}
        }"#;
        let event: ServerEvent = serde_json::from_str(frame).unwrap();
        let ServerEvent::ResponseDone { response: Some(summary) } = event else {
            panic!("expected ResponseDone");
        };
        assert!(matches!(summary.output[0], OutputItem::Unknown));
    }

    #[test]
    fn test_content_part_prefers_transcript() {
        let part = ContentPart {
            kind: Some("audio".to_string()),
            text: Some("text field".to_string()),
            transcript: Some("transcript field".to_string()),
        };
        assert_eq!(part.display_text(), Some("transcript field"));
    }
}
