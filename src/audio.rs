//! Audio device layer
//!
//! Capture and playback streams over PulseAudio's simple blocking API, plus
//! device enumeration for the startup checks and the `diagnose` binary.
//! All audio is 16-bit little-endian PCM, mono, at 24 kHz — the format the
//! realtime speech service expects on both directions.

use libpulse_binding::callbacks::ListResult;
use libpulse_binding::context::{Context, FlagSet as ContextFlagSet};
use libpulse_binding::def::Retval;
use libpulse_binding::mainloop::standard::{IterateResult, Mainloop};
use libpulse_binding::proplist::Proplist;
use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Sample rate required by the realtime speech service.
pub const SAMPLE_RATE: u32 = 24_000;

/// Represents an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device name (PulseAudio source/sink name)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Is this device a monitor (loopback of system playback) or a real device
    pub is_monitor: bool,
}

/// Which direction of device to enumerate or open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Microphones and other input sources
    Capture,
    /// Speakers and other output sinks
    Playback,
}

/// Custom error for audio operations
#[derive(Debug)]
pub enum AudioError {
    /// No audio devices were found
    NoDevicesFound,
    /// Failed to create PulseAudio context
    PulseContextError(String),
    /// Failed to connect to PulseAudio
    ConnectionError(String),
    /// Operation error
    OperationError(String),
    /// Other error
    Other(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::NoDevicesFound => write!(f, "No audio devices found"),
            AudioError::PulseContextError(msg) => write!(f, "PulseAudio context error: {}", msg),
            AudioError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            AudioError::OperationError(msg) => write!(f, "Operation error: {}", msg),
            AudioError::Other(msg) => write!(f, "Audio error: {}", msg),
        }
    }
}

impl Error for AudioError {}

fn stream_spec() -> Spec {
    Spec {
        format: Format::S16le,
        channels: 1,
        rate: SAMPLE_RATE,
    }
}

/// Convert raw little-endian PCM bytes to i16 samples.
pub fn pcm_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Convert i16 samples to raw little-endian PCM bytes.
pub fn samples_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// A blocking source of fixed-size capture frames.
///
/// Constructed inside the capture thread (PulseAudio streams stay on the
/// thread that opened them); the loop reads through this trait so tests can
/// drive it with a scripted source.
pub trait CaptureSource {
    /// Fill `samples` with the next frame, blocking until enough data is
    /// available.
    fn read_frame(&mut self, samples: &mut [i16]) -> Result<(), AudioError>;
}

/// A blocking audio output the playback thread writes to. Constructed
/// inside the playback thread, like [`CaptureSource`].
pub trait OutputSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError>;
}

/// Captures microphone audio from a PulseAudio source using the simple
/// blocking API.
pub struct AudioCapturer {
    simple: Simple,
    /// Current device name
    device_name: Option<String>,
}

impl AudioCapturer {
    /// Create a new `AudioCapturer` using the default input device.
    pub fn new(app_name: &str) -> Result<Self, Box<dyn Error>> {
        let simple = Simple::new(
            None,     // default server
            app_name, // application name
            Direction::Record,
            None,     // default device
            "record", // stream description
            &stream_spec(),
            None, // default channel map
            None, // default buffering
        )?;

        Ok(Self {
            simple,
            device_name: None,
        })
    }

    /// Create a new `AudioCapturer` using a specific input device.
    pub fn with_device(app_name: &str, device_name: &str) -> Result<Self, Box<dyn Error>> {
        info!("Creating audio capturer with device: {}", device_name);
        let simple = Simple::new(
            None,
            app_name,
            Direction::Record,
            Some(device_name),
            "record",
            &stream_spec(),
            None,
            None,
        )?;

        Ok(Self {
            simple,
            device_name: Some(device_name.to_string()),
        })
    }

    /// Create a new `AudioCapturer` with automatic device fallback.
    /// Tries real microphones first, then monitors, then the default device.
    pub fn with_fallback(app_name: &str) -> Result<Self, Box<dyn Error>> {
        let devices = list_devices(DeviceKind::Capture)?;

        if devices.is_empty() {
            return Err(Box::new(AudioError::NoDevicesFound));
        }

        for mic in devices.iter().filter(|d| !d.is_monitor) {
            info!("Trying microphone device: {}", mic.name);
            match Self::with_device(app_name, &mic.name) {
                Ok(capturer) => {
                    info!("Successfully connected to microphone: {}", mic.name);
                    return Ok(capturer);
                }
                Err(e) => {
                    warn!("Failed to connect to microphone {}: {}", mic.name, e);
                    // Continue to next device
                }
            }
        }

        for monitor in devices.iter().filter(|d| d.is_monitor) {
            info!("Trying monitor device: {}", monitor.name);
            match Self::with_device(app_name, &monitor.name) {
                Ok(capturer) => {
                    info!("Successfully connected to monitor: {}", monitor.name);
                    return Ok(capturer);
                }
                Err(e) => {
                    warn!("Failed to connect to monitor {}: {}", monitor.name, e);
                }
            }
        }

        info!("Trying default audio input device");
        match Self::new(app_name) {
            Ok(capturer) => {
                info!("Successfully connected to default device");
                Ok(capturer)
            }
            Err(e) => {
                error!("Failed to connect to any audio device");
                Err(e)
            }
        }
    }

    /// Read a chunk of raw PCM data into the provided buffer.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<(), Box<dyn Error>> {
        self.simple.read(buffer)?;
        Ok(())
    }

    /// Get the current device name, if any
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl CaptureSource for AudioCapturer {
    fn read_frame(&mut self, samples: &mut [i16]) -> Result<(), AudioError> {
        let mut buffer = vec![0u8; samples.len() * 2];
        self.simple
            .read(&mut buffer)
            .map_err(|e| AudioError::OperationError(format!("read failed: {}", e)))?;
        for (slot, chunk) in samples.iter_mut().zip(buffer.chunks_exact(2)) {
            *slot = i16::from_le_bytes([chunk[0], chunk[1]]);
        }
        Ok(())
    }
}

/// Plays audio to a PulseAudio sink using the simple blocking API.
pub struct AudioPlayback {
    simple: Simple,
    device_name: Option<String>,
}

impl AudioPlayback {
    /// Open the default output device.
    pub fn new(app_name: &str) -> Result<Self, Box<dyn Error>> {
        let simple = Simple::new(
            None,
            app_name,
            Direction::Playback,
            None,
            "playback",
            &stream_spec(),
            None,
            None,
        )?;

        Ok(Self {
            simple,
            device_name: None,
        })
    }

    /// Open a specific output device.
    pub fn with_device(app_name: &str, device_name: &str) -> Result<Self, Box<dyn Error>> {
        info!("Creating audio playback with device: {}", device_name);
        let simple = Simple::new(
            None,
            app_name,
            Direction::Playback,
            Some(device_name),
            "playback",
            &stream_spec(),
            None,
            None,
        )?;

        Ok(Self {
            simple,
            device_name: Some(device_name.to_string()),
        })
    }

    /// Block until the sink has played everything written so far.
    pub fn drain(&mut self) -> Result<(), AudioError> {
        self.simple
            .drain()
            .map_err(|e| AudioError::OperationError(format!("drain failed: {}", e)))
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl OutputSink for AudioPlayback {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        let bytes = samples_to_pcm_bytes(samples);
        self.simple
            .write(&bytes)
            .map_err(|e| AudioError::OperationError(format!("write failed: {}", e)))
    }
}

/// List available audio devices of the given kind.
pub fn list_devices(kind: DeviceKind) -> Result<Vec<AudioDevice>, Box<dyn Error>> {
    let devices = Arc::new(Mutex::new(Vec::new()));
    let devices_clone = devices.clone();

    let mut proplist = Proplist::new()
        .ok_or_else(|| AudioError::PulseContextError("Failed to create proplist".to_string()))?;
    proplist
        .set_str(
            libpulse_binding::proplist::properties::APPLICATION_NAME,
            "medivoice-device-lister",
        )
        .map_err(|e| AudioError::PulseContextError(format!("Failed to set proplist: {:?}", e)))?;

    let mut mainloop = Mainloop::new()
        .ok_or_else(|| AudioError::PulseContextError("Failed to create mainloop".to_string()))?;

    let mut context = Context::new_with_proplist(&mainloop, "medivoice-context", &proplist)
        .ok_or_else(|| AudioError::PulseContextError("Failed to create context".to_string()))?;

    context.connect(None, ContextFlagSet::NOFLAGS, None)?;

    // Wait for context to be ready
    loop {
        match mainloop.iterate(false) {
            IterateResult::Quit(_) | IterateResult::Err(_) => {
                return Err(Box::new(AudioError::PulseContextError(
                    "Mainloop iterate failed".to_string(),
                )));
            }
            IterateResult::Success(_) => {}
        }

        match context.get_state() {
            libpulse_binding::context::State::Ready => {
                break;
            }
            libpulse_binding::context::State::Failed
            | libpulse_binding::context::State::Terminated => {
                return Err(Box::new(AudioError::ConnectionError(
                    "Connection failed".to_string(),
                )));
            }
            _ => {} // Wait for Ready state
        }
    }

    // Flag to track operation completion
    let operation_done = Arc::new(Mutex::new(false));
    let operation_done_clone = operation_done.clone();

    let introspector = context.introspect();
    match kind {
        DeviceKind::Capture => {
            let _op = introspector.get_source_info_list(move |list| {
                match list {
                    ListResult::Item(source_info) => {
                        let is_monitor = source_info.monitor_of_sink.is_some()
                            || source_info
                                .name
                                .as_ref()
                                .map(|name| name.contains("monitor"))
                                .unwrap_or(false);

                        if let (Some(name), Some(description)) = (
                            source_info.name.as_ref().map(|s| s.to_string()),
                            source_info.description.as_ref().map(|s| s.to_string()),
                        ) {
                            if let Ok(mut devices) = devices_clone.lock() {
                                devices.push(AudioDevice {
                                    name,
                                    description,
                                    sample_rate: source_info.sample_spec.rate,
                                    channels: source_info.sample_spec.channels,
                                    is_monitor,
                                });
                            }
                        }
                    }
                    ListResult::End => {
                        if let Ok(mut done) = operation_done_clone.lock() {
                            *done = true;
                        }
                    }
                    ListResult::Error => {
                        if let Ok(mut done) = operation_done_clone.lock() {
                            *done = true;
                        }
                        error!("Error listing audio sources");
                    }
                }
            });
            wait_for_operation(&mut mainloop, &operation_done)?;
        }
        DeviceKind::Playback => {
            let _op = introspector.get_sink_info_list(move |list| {
                match list {
                    ListResult::Item(sink_info) => {
                        if let (Some(name), Some(description)) = (
                            sink_info.name.as_ref().map(|s| s.to_string()),
                            sink_info.description.as_ref().map(|s| s.to_string()),
                        ) {
                            if let Ok(mut devices) = devices_clone.lock() {
                                devices.push(AudioDevice {
                                    name,
                                    description,
                                    sample_rate: sink_info.sample_spec.rate,
                                    channels: sink_info.sample_spec.channels,
                                    is_monitor: false,
                                });
                            }
                        }
                    }
                    ListResult::End => {
                        if let Ok(mut done) = operation_done_clone.lock() {
                            *done = true;
                        }
                    }
                    ListResult::Error => {
                        if let Ok(mut done) = operation_done_clone.lock() {
                            *done = true;
                        }
                        error!("Error listing audio sinks");
                    }
                }
            });
            wait_for_operation(&mut mainloop, &operation_done)?;
        }
    }

    let result = if let Ok(devices) = devices.lock() {
        Ok(devices.clone())
    } else {
        Err(Box::new(AudioError::Other(
            "Failed to access devices list".to_string(),
        )))
    };

    // Clean up PulseAudio context and mainloop
    context.disconnect();
    mainloop.quit(Retval(0));

    Ok(result?)
}

/// Iterate the mainloop until the introspection callback reports done.
fn wait_for_operation(
    mainloop: &mut Mainloop,
    operation_done: &Arc<Mutex<bool>>,
) -> Result<(), Box<dyn Error>> {
    loop {
        match mainloop.iterate(false) {
            IterateResult::Quit(_) | IterateResult::Err(_) => {
                return Err(Box::new(AudioError::OperationError(
                    "Mainloop iterate failed".to_string(),
                )));
            }
            IterateResult::Success(_) => {}
        }

        if let Ok(done) = operation_done.lock() {
            if *done {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_sample_conversion_roundtrip() {
        let samples = vec![0i16, 100, -100, i16::MAX, i16::MIN];
        let bytes = samples_to_pcm_bytes(&samples);
        let samples2 = pcm_bytes_to_samples(&bytes);
        assert_eq!(samples, samples2);
    }

    #[test]
    fn test_pcm_bytes_ignore_trailing_odd_byte() {
        let bytes = [0x01, 0x00, 0xff];
        assert_eq!(pcm_bytes_to_samples(&bytes), vec![1i16]);
    }
}
