//! Microphone capture loop
//!
//! A dedicated OS thread blocks on the input device, runs each frame
//! through the echo discriminator, and forwards human frames into the
//! outbound network channel as base64 audio appends. The send path is an
//! unbounded channel, so capture never stalls on playback or network
//! state.

use crate::audio::{samples_to_pcm_bytes, CaptureSource};
use crate::echo::{EchoFilter, Verdict};
use crate::protocol::ClientEvent;
use base64::engine::general_purpose;
use base64::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Samples per capture frame; 480 is 20 ms at 24 kHz.
    pub frame_samples: usize,
    /// Consecutive read failures tolerated before the loop gives up.
    pub max_consecutive_errors: u32,
    /// Backoff between retries after a read failure.
    pub error_backoff: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_samples: 480,
            max_consecutive_errors: 10,
            error_backoff: Duration::from_millis(20),
        }
    }
}

/// Handle to the running capture thread.
pub struct AudioCaptureLoop {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioCaptureLoop {
    /// Spawn the capture thread. The input device is opened by the factory
    /// inside the thread, since PulseAudio streams stay on the thread that
    /// created them.
    pub fn spawn<F>(
        make_source: F,
        echo: EchoFilter,
        outbound: UnboundedSender<ClientEvent>,
        config: CaptureConfig,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn CaptureSource>, crate::audio::AudioError>
            + Send
            + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let source = match make_source() {
                    Ok(source) => source,
                    Err(e) => {
                        error!("failed to open input device: {}", e);
                        return;
                    }
                };
                run_capture_loop(source, echo, outbound, config, shutdown_clone)
            })?;
        info!("Audio capture started");
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal the thread to exit and wait for it, bounded.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The thread blocks at most one device read per iteration; give it
        // a second before abandoning the join.
        let deadline = Instant::now() + Duration::from_secs(1);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
            info!("Audio capture stopped");
        } else {
            warn!("capture thread did not exit within timeout, detaching");
        }
    }
}

impl Drop for AudioCaptureLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run_capture_loop(
    mut source: Box<dyn CaptureSource>,
    echo: EchoFilter,
    outbound: UnboundedSender<ClientEvent>,
    config: CaptureConfig,
    shutdown: Arc<AtomicBool>,
) {
    let mut frame = vec![0i16; config.frame_samples];
    let mut consecutive_errors = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        match source.read_frame(&mut frame) {
            Ok(()) => {
                consecutive_errors = 0;
                if echo.classify(&frame) == Verdict::Echo {
                    debug!("dropping echo frame");
                    continue;
                }
                let audio = general_purpose::STANDARD.encode(samples_to_pcm_bytes(&frame));
                if outbound.send(ClientEvent::InputAudioAppend { audio }).is_err() {
                    info!("outbound channel closed, capture loop exiting");
                    break;
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "audio read error ({}/{}): {}",
                    consecutive_errors, config.max_consecutive_errors, e
                );
                if consecutive_errors >= config.max_consecutive_errors {
                    error!("input device not recovering, capture loop exiting");
                    break;
                }
                std::thread::sleep(config.error_backoff);
            }
        }
    }
    debug!("capture thread exiting");
}
