//! medivoice - Real-time hospital voice assistant
//!
//! Streams caller audio to a realtime speech-to-speech service over
//! WebSocket and plays the synthesized replies, with instant barge-in and
//! echo discrimination so the assistant never mistakes its own voice for a
//! new caller utterance.

#![forbid(unsafe_code)]

/// Audio device layer: PulseAudio capture/playback and device enumeration
pub mod audio;
/// Microphone capture loop with echo-filtered forwarding
pub mod capture;
/// WebSocket client for the realtime service
pub mod client;
/// Agent configuration
pub mod config;
/// Echo discrimination between caller speech and our own playback
pub mod echo;
/// Hospital knowledge base served through tool calls
pub mod knowledge;
/// Usage and cost accounting
pub mod ledger;
/// Threaded audio output player with instant cancellation
pub mod player;
/// Wire protocol types
pub mod protocol;
/// The conversation session state machine
pub mod session;
/// Conversation summarization boundary
pub mod summary;
/// Tool dispatch boundary
pub mod tools;
