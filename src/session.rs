//! Conversation session state machine
//!
//! The single consumer of inbound server events, and the only writer of
//! session state. Decisions leave as `ClientEvent`s pushed into the shared
//! outbound channel; side effects on audio go through the player and the
//! echo filter. Collaborators (tools, ledger, summarizer) are injected, so
//! the whole machine runs against a fake event source in tests.
//!
//! Per-event failures are logged and swallowed; only connection-level
//! failures end the event loop, and teardown runs each step regardless of
//! the others' success.

use crate::capture::AudioCaptureLoop;
use crate::client::RealtimeClient;
use crate::config::AgentConfig;
use crate::echo::EchoFilter;
use crate::ledger::{UsageEvent, UsageKind, UsageLedger, UsageUnit};
use crate::player::AudioOutputPlayer;
use crate::protocol::{
    ApiError, ClientEvent, FunctionCallOutput, ResponseSummary, Result, ServerEvent, SessionError,
};
use crate::summary::{Speaker, Summarizer, TurnRecord};
use crate::tools::ToolDispatcher;
use base64::engine::general_purpose;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Connection lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Active,
    Closing,
}

/// Session state, mutated only from the event-processing flow.
pub struct SessionState {
    pub connection: ConnectionState,
    pub ai_speaking: bool,
    pub ai_speech_end: Option<Instant>,
    pub turn_count: u32,
    pub conversation_summary: String,
    pub transcript_log: Vec<TurnRecord>,
    pub pending_transcripts: HashMap<String, String>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            ai_speaking: false,
            ai_speech_end: None,
            turn_count: 0,
            conversation_summary: String::new(),
            transcript_log: Vec::new(),
            pending_transcripts: HashMap::new(),
        }
    }
}

/// The central state machine driving one live conversation.
pub struct ConversationSession {
    config: AgentConfig,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    player: AudioOutputPlayer,
    echo: EchoFilter,
    tools: Arc<dyn ToolDispatcher>,
    ledger: Arc<dyn UsageLedger>,
    summarizer: Arc<dyn Summarizer>,
    state: SessionState,
    configured: bool,
    /// Synthesized samples received since the last completed response,
    /// for audio-output accounting.
    pending_output_samples: u64,
}

impl ConversationSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AgentConfig,
        player: AudioOutputPlayer,
        echo: EchoFilter,
        tools: Arc<dyn ToolDispatcher>,
        ledger: Arc<dyn UsageLedger>,
        summarizer: Arc<dyn Summarizer>,
        outbound: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            config,
            outbound,
            player,
            echo,
            tools,
            ledger,
            summarizer,
            state: SessionState::new(),
            configured: false,
            pending_output_samples: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn player(&self) -> &AudioOutputPlayer {
        &self.player
    }

    /// Send the one-time session configuration. Exactly once per
    /// connection; repeat calls are ignored.
    pub fn configure(&mut self) -> Result<()> {
        if self.configured {
            debug!("session already configured, not re-sending");
            return Ok(());
        }
        let payload = self.config.session_payload(self.tools.catalogue());
        self.outbound
            .send(ClientEvent::SessionUpdate { session: payload })
            .map_err(|_| SessionError::ChannelClosed)?;
        self.configured = true;
        Ok(())
    }

    /// Drive the session until the connection fails or a stop is requested,
    /// then tear everything down in order.
    pub async fn run(
        &mut self,
        client: &mut RealtimeClient,
        capture: &mut AudioCaptureLoop,
        stop_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        self.state.connection = ConnectionState::Active;
        self.configure()?;

        let outcome = loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    info!("stop requested, ending session");
                    break Ok(());
                }
                maybe_event = client.next_event() => match maybe_event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => {
                        error!("connection failure: {}", e);
                        break Err(e);
                    }
                    None => break Err(SessionError::ConnectionClosed),
                }
            }
        };

        self.state.connection = ConnectionState::Closing;
        self.teardown(client, capture);
        self.state.connection = ConnectionState::Disconnected;
        outcome
    }

    /// Teardown sequence: each step runs regardless of the others.
    fn teardown(&mut self, client: &mut RealtimeClient, capture: &mut AudioCaptureLoop) {
        info!("tearing down session");
        capture.stop();
        self.player.stop();
        client.close();
        self.flush_output_accounting();
        self.ledger.finish();
        info!(
            "session ended after {} turns, cost ${:.4}",
            self.state.turn_count,
            self.ledger.current_total()
        );
    }

    /// Process one inbound event. Never fails: transient problems are
    /// logged and the next event proceeds.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated => {
                info!("session established");
            }
            ServerEvent::SessionUpdated => {
                info!("session configured, listening for caller");
            }
            ServerEvent::SpeechStarted => self.on_speech_started(),
            ServerEvent::SpeechStopped => {
                debug!("caller speech stopped");
            }
            ServerEvent::AudioDelta { delta, .. } => self.on_audio_delta(&delta),
            ServerEvent::TranscriptDelta { delta, item_id } => {
                let key = item_id.unwrap_or_else(|| "default".to_string());
                self.state
                    .pending_transcripts
                    .entry(key)
                    .or_default()
                    .push_str(&delta);
            }
            ServerEvent::TranscriptDone {
                transcript,
                item_id,
            } => self.on_transcript_done(transcript, item_id),
            ServerEvent::CallerTranscript { transcript } => {
                if !transcript.trim().is_empty() {
                    info!("caller: {}", transcript.trim());
                    self.state.transcript_log.push(TurnRecord {
                        speaker: Speaker::Caller,
                        text: transcript.trim().to_string(),
                    });
                }
            }
            ServerEvent::ResponseDone { response } => self.on_response_done(response),
            ServerEvent::ResponseCancelled => {
                // Authoritative confirmation that the cancel took effect.
                self.player.cancel_current();
                self.state.ai_speaking = false;
                self.state.ai_speech_end = Some(Instant::now());
                self.echo.mark_playback_stopped();
            }
            ServerEvent::ToolCallDone {
                name,
                call_id,
                arguments,
            } => self.on_tool_call(&name, call_id, &arguments),
            ServerEvent::Error { error } => self.on_error(error),
        }
    }

    fn on_speech_started(&mut self) {
        let in_cooldown = self
            .state
            .ai_speech_end
            .map(|t| t.elapsed() < self.config.speech_started_cooldown)
            .unwrap_or(false);
        if self.state.ai_speaking || in_cooldown {
            // Probable echo of our own voice leaking into the microphone.
            debug!("speech start during assistant speech/cooldown, ignoring");
            return;
        }

        info!("caller speaking, interrupting playback");
        self.player.cancel_current();
        self.state.ai_speaking = false;
        // Cancel the in-flight response; "nothing to cancel" is expected
        // and comes back as a benign error event.
        let _ = self.outbound.send(ClientEvent::ResponseCancel);
    }

    fn on_audio_delta(&mut self, delta: &str) {
        match general_purpose::STANDARD.decode(delta) {
            Ok(bytes) => {
                let frame = crate::audio::pcm_bytes_to_samples(&bytes);
                if frame.is_empty() {
                    return;
                }
                self.pending_output_samples += frame.len() as u64;
                self.state.ai_speaking = true;
                // The player appends to the echo history at emit time, so
                // the history tracks the speakers rather than the network.
                self.player.enqueue(frame);
            }
            Err(e) => warn!("failed to decode audio delta: {}", e),
        }
    }

    fn on_transcript_done(&mut self, transcript: String, item_id: Option<String>) {
        let key = item_id.unwrap_or_else(|| "default".to_string());
        let accumulated = self.state.pending_transcripts.remove(&key);
        let text = if transcript.trim().is_empty() {
            accumulated.unwrap_or_default()
        } else {
            transcript
        };

        if !text.trim().is_empty() {
            info!("assistant: {}", text.trim());
            self.state.transcript_log.push(TurnRecord {
                speaker: Speaker::Assistant,
                text: text.trim().to_string(),
            });
        }

        self.state.ai_speaking = false;
        self.state.ai_speech_end = Some(Instant::now());
        self.echo.mark_playback_stopped();
        self.state.turn_count += 1;

        if self.config.summarize_after_turns > 0
            && self.state.turn_count % self.config.summarize_after_turns == 0
            && !self.state.transcript_log.is_empty()
        {
            self.summarize_history();
        }
    }

    /// Compress the detailed transcript into the running summary so the
    /// retained context stays bounded.
    fn summarize_history(&mut self) {
        let summary = self
            .summarizer
            .summarize(&self.state.conversation_summary, &self.state.transcript_log);
        debug!(
            turns = self.state.transcript_log.len(),
            summary_chars = summary.len(),
            "conversation history summarized"
        );
        self.state.conversation_summary = summary;
        self.state.transcript_log.clear();
    }

    fn on_response_done(&mut self, response: Option<ResponseSummary>) {
        if self.state.ai_speaking {
            self.state.ai_speaking = false;
            self.state.ai_speech_end = Some(Instant::now());
            self.echo.mark_playback_stopped();
        }

        self.flush_output_accounting();
        if let Some(usage) = response.and_then(|r| r.usage) {
            if usage.input_tokens > 0 {
                self.ledger.record(UsageEvent {
                    kind: UsageKind::TextInput,
                    quantity: usage.input_tokens as f64,
                    unit: UsageUnit::Tokens,
                    model: self.config.model.clone(),
                });
            }
            if usage.output_tokens > 0 {
                self.ledger.record(UsageEvent {
                    kind: UsageKind::TextOutput,
                    quantity: usage.output_tokens as f64,
                    unit: UsageUnit::Tokens,
                    model: self.config.model.clone(),
                });
            }
        }
    }

    fn flush_output_accounting(&mut self) {
        if self.pending_output_samples == 0 {
            return;
        }
        let seconds = self.pending_output_samples as f64 / self.config.sample_rate as f64;
        self.pending_output_samples = 0;
        self.ledger.record(UsageEvent {
            kind: UsageKind::AudioOutput,
            quantity: seconds,
            unit: UsageUnit::Seconds,
            model: self.config.model.clone(),
        });
    }

    fn on_tool_call(&mut self, name: &str, call_id: String, arguments: &str) {
        info!("tool call: {}", name);
        // Dispatch synchronously: the result must go back before the model
        // is asked to continue.
        let output = match serde_json::from_str::<serde_json::Value>(arguments) {
            Ok(args) => self.tools.invoke(name, &args),
            Err(e) => {
                warn!("malformed arguments for tool {}: {}", name, e);
                format!("Error: tool arguments were not valid JSON: {}", e)
            }
        };

        self.ledger.record(UsageEvent {
            kind: UsageKind::ToolCall,
            quantity: 1.0,
            unit: UsageUnit::Calls,
            model: name.to_string(),
        });

        let _ = self.outbound.send(ClientEvent::ItemCreate {
            item: FunctionCallOutput::new(call_id, output),
        });
        let _ = self.outbound.send(ClientEvent::ResponseCreate);
    }

    fn on_error(&mut self, error: ApiError) {
        if error.is_benign_cancel() {
            // Barge-in raced the end of the response; nothing was active.
            debug!("cancel had no active response (benign)");
            return;
        }
        warn!(
            "service error: code={:?} message={:?}",
            error.code, error.message
        );
    }
}
