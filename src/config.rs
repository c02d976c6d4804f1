//! Agent configuration
//!
//! One plain struct with defaults mirroring the reference deployment. The
//! API key is always read from the environment by the caller, never stored
//! here.

use crate::echo::{EchoConfig, EchoStrategy};
use crate::knowledge::HOSPITAL_NAME;
use crate::player::PlayerConfig;
use crate::protocol::{SessionConfigPayload, TranscriptionConfig, TurnDetection};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Server-side voice-activity-detection tuning.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Lower is more sensitive to caller speech.
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            prefix_padding_ms: 200,
            silence_duration_ms: 400,
        }
    }
}

/// Configuration for one voice agent session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub transcription_model: String,
    pub sample_rate: u32,
    /// Capture frame size in samples; 480 is 20 ms at 24 kHz.
    pub capture_frame_samples: usize,
    pub vad: VadConfig,
    pub echo_strategy: EchoStrategy,
    pub echo: EchoConfig,
    pub player: PlayerConfig,
    /// Window after the assistant stops speaking during which a
    /// server-reported speech start is treated as probable echo.
    pub speech_started_cooldown: Duration,
    /// Completed turns between conversation summarizations.
    pub summarize_after_turns: u32,
    /// Where usage logs land; `None` keeps accounting in memory only.
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: "coral".to_string(),
            instructions: default_instructions(),
            transcription_model: "whisper-1".to_string(),
            sample_rate: crate::audio::SAMPLE_RATE,
            capture_frame_samples: 480,
            vad: VadConfig::default(),
            echo_strategy: EchoStrategy::Correlation,
            echo: EchoConfig::default(),
            player: PlayerConfig::default(),
            speech_started_cooldown: Duration::from_millis(300),
            summarize_after_turns: 10,
            log_dir: Some(PathBuf::from("logs")),
        }
    }
}

impl AgentConfig {
    /// WebSocket endpoint for the configured model.
    pub fn endpoint(&self) -> String {
        format!("wss://api.openai.com/v1/realtime?model={}", self.model)
    }

    /// Build the one-time session configuration payload.
    pub fn session_payload(&self, tools: Vec<serde_json::Value>) -> SessionConfigPayload {
        SessionConfigPayload {
            modalities: vec!["text".to_string(), "audio".to_string()],
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            input_audio_transcription: TranscriptionConfig {
                model: self.transcription_model.clone(),
            },
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
                threshold: self.vad.threshold,
                prefix_padding_ms: self.vad.prefix_padding_ms,
                silence_duration_ms: self.vad.silence_duration_ms,
                create_response: true,
                interrupt_response: true,
            },
            tools,
        }
    }
}

/// Kept short on purpose: the data lives behind tools, not in the prompt.
fn default_instructions() -> String {
    format!(
        "You are a warm female voice assistant for {} (NABH-accredited, Kharkhoda, Sonipat).\n\
Convince hesitant patients towards visiting. Use natural Hinglish with feminine forms (hoon, sakti hoon).\n\
Style: Warm, caring, light-hearted. Short replies (2-3 lines). Use \"ji\" for respect.\n\
\n\
TOOLS (always use, never guess):\n\
- get_hospital_info: Address, phone, hours\n\
- get_facilities: ICU, lab, pharmacy, ambulance\n\
- get_all_doctors: List all doctors\n\
- get_doctor_details: Specific doctor info\n\
- get_department_info: Department details\n\
- get_specialties: Use when patient describes symptoms - YOU decide best department from the list!\n\
- get_second_opinion_info: FREE service at secondopinion.org (mention for surgery/diagnosis confusion!)\n\
\n\
When patient describes symptoms: Use get_specialties, then recommend the BEST matching department based on YOUR judgment.\n\
EMERGENCY (chest pain, breathing issue, major injury): ER immediately! Call {}",
        HOSPITAL_NAME,
        crate::knowledge::PRIMARY_PHONE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_carries_model() {
        let config = AgentConfig::default();
        assert!(config.endpoint().starts_with("wss://"));
        assert!(config.endpoint().contains(DEFAULT_REALTIME_MODEL));
    }

    #[test]
    fn test_session_payload_wires_vad_and_tools() {
        let config = AgentConfig::default();
        let payload = config.session_payload(vec![serde_json::json!({"name": "t"})]);
        assert_eq!(payload.voice, "coral");
        assert_eq!(payload.turn_detection.kind, "server_vad");
        assert_eq!(payload.turn_detection.silence_duration_ms, 400);
        assert!(payload.turn_detection.interrupt_response);
        assert_eq!(payload.tools.len(), 1);
    }
}
