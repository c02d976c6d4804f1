//! Realtime speech service protocol
//!
//! Serde types for the event stream spoken over the WebSocket: inbound
//! server events tagged by their `type` field, and the outbound control
//! messages the session issues. Unrecognized inbound event types are
//! skipped, not fatal — the service adds event kinds faster than clients
//! update.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::debug;

/// Error type for session and connection operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout")]
    Timeout,

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Server-reported error payload.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiError {
    /// "Nothing to cancel" comes back every time a barge-in races the end
    /// of a response; it is expected traffic, not a fault.
    pub fn is_benign_cancel(&self) -> bool {
        let in_code = self
            .code
            .as_deref()
            .is_some_and(|c| c.contains("response_cancel_not_active"));
        let in_message = self
            .message
            .as_deref()
            .is_some_and(|m| m.contains("response_cancel_not_active"));
        in_code || in_message
    }
}

/// Token usage counters attached to a completed response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Summary of a finished response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponseSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

/// Inbound events from the realtime service.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "session.updated")]
    SessionUpdated,

    /// Server-side VAD detected the start of caller speech.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// A chunk of synthesized audio, base64 PCM.
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        delta: String,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Partial transcript of what the assistant is saying.
    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta {
        delta: String,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone {
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// The caller's own words, transcribed server-side.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    CallerTranscript {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseSummary>,
    },

    /// Authoritative confirmation that a cancellation took effect.
    #[serde(rename = "response.cancelled")]
    ResponseCancelled,

    /// The model wants a function executed; arguments are a JSON string.
    #[serde(rename = "response.function_call_arguments.done")]
    ToolCallDone {
        name: String,
        call_id: String,
        arguments: String,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },
}

/// Parse one inbound text payload.
///
/// `Ok(None)` means valid JSON carrying an event type this client does not
/// handle; malformed JSON is an error the caller logs and skips.
pub fn parse_server_event(text: &str) -> Result<Option<ServerEvent>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match serde_json::from_value::<ServerEvent>(value.clone()) {
        Ok(event) => Ok(Some(event)),
        Err(e) => {
            let kind = value
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("<missing type>");
            debug!("ignoring unhandled event type {}: {}", kind, e);
            Ok(None)
        }
    }
}

/// Server-side VAD tuning sent with the session configuration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub create_response: bool,
    pub interrupt_response: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranscriptionConfig {
    pub model: String,
}

/// The one-time session configuration payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionConfigPayload {
    pub modalities: Vec<String>,
    pub voice: String,
    pub instructions: String,
    pub input_audio_transcription: TranscriptionConfig,
    pub turn_detection: TurnDetection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
}

/// A conversation item created by the client; only tool results are sent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionCallOutput {
    #[serde(rename = "type")]
    pub kind: String,
    pub call_id: String,
    pub output: String,
}

impl FunctionCallOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            kind: "function_call_output".to_string(),
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Outbound control messages to the realtime service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfigPayload },

    /// Append base64 PCM to the remote input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    #[serde(rename = "response.cancel")]
    ResponseCancel,

    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: FunctionCallOutput },

    /// Ask the service to continue generating (after a tool result).
    #[serde(rename = "response.create")]
    ResponseCreate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_delta() {
        let text = r#"{"type":"response.audio.delta","response_id":"r1","item_id":"item_7","delta":"AAAA"}"#;
        match parse_server_event(text).unwrap() {
            Some(ServerEvent::AudioDelta { delta, item_id }) => {
                assert_eq!(delta, "AAAA");
                assert_eq!(item_id.as_deref(), Some("item_7"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_speech_started_with_extra_fields() {
        let text = r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120,"item_id":"i1"}"#;
        assert!(matches!(
            parse_server_event(text).unwrap(),
            Some(ServerEvent::SpeechStarted)
        ));
    }

    #[test]
    fn test_parse_tool_call() {
        let text = r#"{"type":"response.function_call_arguments.done","name":"get_doctor_details","call_id":"c42","arguments":"{\"doctor_name\":\"Anil\"}"}"#;
        match parse_server_event(text).unwrap() {
            Some(ServerEvent::ToolCallDone {
                name,
                call_id,
                arguments,
            }) => {
                assert_eq!(name, "get_doctor_details");
                assert_eq!(call_id, "c42");
                assert!(arguments.contains("Anil"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_done_usage() {
        let text = r#"{"type":"response.done","response":{"id":"r9","status":"completed","usage":{"input_tokens":120,"output_tokens":85,"total_tokens":205}}}"#;
        match parse_server_event(text).unwrap() {
            Some(ServerEvent::ResponseDone { response }) => {
                let usage = response.unwrap().usage.unwrap();
                assert_eq!(usage.input_tokens, 120);
                assert_eq!(usage.output_tokens, 85);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_type_is_skipped() {
        let text = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        assert!(parse_server_event(text).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_server_event("not json").is_err());
    }

    #[test]
    fn test_benign_cancel_error_detection() {
        let text = r#"{"type":"error","error":{"type":"invalid_request_error","code":"response_cancel_not_active","message":"Cancellation failed: no active response found"}}"#;
        match parse_server_event(text).unwrap() {
            Some(ServerEvent::Error { error }) => assert!(error.is_benign_cancel()),
            other => panic!("Unexpected event: {:?}", other),
        }

        let other = ApiError {
            code: Some("server_error".to_string()),
            message: Some("boom".to_string()),
        };
        assert!(!other.is_benign_cancel());
    }

    #[test]
    fn test_session_update_wire_shape() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfigPayload {
                modalities: vec!["text".to_string(), "audio".to_string()],
                voice: "coral".to_string(),
                instructions: "Be brief.".to_string(),
                input_audio_transcription: TranscriptionConfig {
                    model: "whisper-1".to_string(),
                },
                turn_detection: TurnDetection {
                    kind: "server_vad".to_string(),
                    threshold: 0.3,
                    prefix_padding_ms: 200,
                    silence_duration_ms: 400,
                    create_response: true,
                    interrupt_response: true,
                },
                tools: vec![],
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["voice"], "coral");
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        let threshold = value["session"]["turn_detection"]["threshold"]
            .as_f64()
            .unwrap();
        assert!((threshold - 0.3).abs() < 1e-6);
        assert_eq!(value["session"]["turn_detection"]["interrupt_response"], true);
        // Empty tool catalogue is omitted entirely.
        assert!(value["session"].get("tools").is_none());
    }

    #[test]
    fn test_tool_result_wire_shape() {
        let event = ClientEvent::ItemCreate {
            item: FunctionCallOutput::new("c42", "Dr. Anil Sharma - Orthopedics"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "c42");
    }
}
