//! medivoice - Real-time hospital voice assistant
//!
//! Entry point: verifies the environment (API key, audio devices), wires
//! the session together and runs it until the caller hangs up or Ctrl-C.

use anyhow::{bail, Result};
use medivoice::audio::{
    self, AudioCapturer, AudioError, AudioPlayback, CaptureSource, DeviceKind, OutputSink,
};
use medivoice::capture::{AudioCaptureLoop, CaptureConfig};
use medivoice::client::RealtimeClient;
use medivoice::config::AgentConfig;
use medivoice::echo::EchoFilter;
use medivoice::knowledge::HOSPITAL_NAME;
use medivoice::ledger::{CostLedger, UsageLedger};
use medivoice::player::AudioOutputPlayer;
use medivoice::session::ConversationSession;
use medivoice::summary::{Summarizer, TranscriptCondenser};
use medivoice::tools::{HospitalTools, ToolDispatcher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

fn check_api_key() -> Result<String> {
    let key = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => key,
        Err(_) => bail!("OPENAI_API_KEY is not set; export it before starting"),
    };
    if key.trim().is_empty() || key == "your_openai_api_key_here" {
        bail!("OPENAI_API_KEY is still a placeholder; set a real key");
    }
    Ok(key)
}

fn check_audio_devices() -> Result<()> {
    let inputs = audio::list_devices(DeviceKind::Capture)
        .map_err(|e| anyhow::anyhow!("audio input check failed: {}", e))?;
    match inputs.iter().find(|d| !d.is_monitor).or(inputs.first()) {
        Some(device) => info!("Input device: {}", device.description),
        None => bail!("no audio input device found; connect a microphone"),
    }

    let outputs = audio::list_devices(DeviceKind::Playback)
        .map_err(|e| anyhow::anyhow!("audio output check failed: {}", e))?;
    match outputs.first() {
        Some(device) => info!("Output device: {}", device.description),
        None => bail!("no audio output device found; connect speakers"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Welcome to the {} voice assistant", HOSPITAL_NAME);
    println!("Speak into your microphone to ask about doctors, departments,");
    println!("facilities, timings, or which specialist fits your symptoms.");
    println!("Press Ctrl+C to end the conversation.\n");

    let api_key = check_api_key()?;
    check_audio_devices()?;

    let config = AgentConfig::default();

    let echo = EchoFilter::new(config.echo_strategy, config.echo.clone());
    let mut player = AudioOutputPlayer::new(config.player.clone(), echo.clone());
    player
        .start(|| {
            AudioPlayback::new("medivoice")
                .map(|playback| Box::new(playback) as Box<dyn OutputSink>)
                .map_err(|e| AudioError::Other(e.to_string()))
        })
        .map_err(|e| anyhow::anyhow!("failed to start playback: {}", e))?;

    let mut client = RealtimeClient::connect(&config.endpoint(), &api_key).await?;

    let capture_config = CaptureConfig {
        frame_samples: config.capture_frame_samples,
        ..CaptureConfig::default()
    };
    let mut capture = AudioCaptureLoop::spawn(
        || {
            AudioCapturer::with_fallback("medivoice")
                .map(|capturer| Box::new(capturer) as Box<dyn CaptureSource>)
                .map_err(|e| AudioError::Other(e.to_string()))
        },
        echo.clone(),
        client.sender(),
        capture_config,
    )?;

    let ledger: Arc<dyn UsageLedger> = Arc::new(CostLedger::new(config.log_dir.clone()));
    let tools: Arc<dyn ToolDispatcher> = Arc::new(HospitalTools);
    let summarizer: Arc<dyn Summarizer> = Arc::new(TranscriptCondenser::default());

    let outbound = client.sender();
    let mut session = ConversationSession::new(
        config,
        player,
        echo,
        tools,
        ledger,
        summarizer,
        outbound,
    );

    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(()).await;
        }
    });

    match session.run(&mut client, &mut capture, &mut stop_rx).await {
        Ok(()) => {
            println!("\nGoodbye! Thank you for calling {}.", HOSPITAL_NAME);
        }
        Err(e) => {
            // The session already tore everything down; tell the caller the
            // conversation stopped rather than crashing out.
            error!("conversation ended: {}", e);
            println!("\nThe conversation has ended. Please call again.");
        }
    }
    Ok(())
}
