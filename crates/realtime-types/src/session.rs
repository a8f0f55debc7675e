//! Session configuration sent as the first frame after the control channel
//! opens, fixing the remote endpoint's behavior before any other traffic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration payload for a `session.update` frame.
///
/// The defaults mirror what the voice endpoints expect for a spoken
/// conversation: both modalities, PCM16 audio in both directions, and
/// server-side voice activity detection for turn taking.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: String::new(),
            voice: "alloy".to_string(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            input_audio_transcription: Some(AudioTranscription {
                model: "whisper-1".to_string(),
            }),
            turn_detection: Some(TurnDetection::default()),
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

/// Selects the model used for server-side transcription of user speech.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AudioTranscription {
    pub model: String,
}

/// Server-side voice activity detection thresholds.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 200,
            silence_duration_ms: 700,
        }
    }
}

/// A callable tool declared to the remote endpoint.
///
/// `parameters` is a JSON Schema object describing the argument shape the
/// endpoint must produce when it invokes the function.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Declares a function tool with the given JSON Schema parameters.
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}
