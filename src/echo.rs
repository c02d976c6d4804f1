//! Echo discrimination
//!
//! Classifies captured microphone frames as genuine human speech or acoustic
//! echo of our own playback, so the assistant's synthesized voice never
//! re-triggers the service's turn detection as a new caller utterance.
//!
//! Two strategies sit behind one handle: correlation against a ring buffer
//! of recently played samples (default), or a coarse timing gate keyed off
//! the is-playing flag. Every ambiguous path resolves to `Human` — blocking
//! a real caller is the worse failure mode than letting some echo through.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Classification result for one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Genuine caller speech (or anything we are unwilling to suppress).
    Human,
    /// Acoustic echo of our own playback.
    Echo,
}

/// Which discrimination strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoStrategy {
    /// Energy-ratio plus normalized cross-correlation against played audio.
    Correlation,
    /// Suppress while playing and for a fixed window after playback stops.
    TimingGate,
}

/// Tunable parameters for echo discrimination.
///
/// The ratio and correlation thresholds are empirically tuned values carried
/// over from the reference deployment; they are configuration, not contract.
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// RMS below this is treated as harmless near-silence (16-bit scale).
    pub noise_floor: f32,
    /// Captured/played energy ratio above which the frame is a barge-in.
    pub barge_in_multiplier: f32,
    /// Captured/played energy ratio below which the frame is faint background.
    pub background_ratio: f32,
    /// Normalized cross-correlation above which comparable-energy audio is echo.
    pub correlation_threshold: f32,
    /// Quiescence window after the last played sample (correlation strategy).
    pub cooldown: Duration,
    /// Suppression window after playback stops (timing-gate strategy).
    pub gate_window: Duration,
    /// How much played audio to retain for comparison.
    pub history: Duration,
    pub sample_rate: u32,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            noise_floor: 100.0,
            barge_in_multiplier: 2.5,
            background_ratio: 0.3,
            correlation_threshold: 0.6,
            cooldown: Duration::from_millis(300),
            gate_window: Duration::from_millis(600),
            history: Duration::from_secs(2),
            sample_rate: crate::audio::SAMPLE_RATE,
        }
    }
}

struct EchoState {
    /// Ring of the most recently played samples, newest at the back.
    history: VecDeque<i16>,
    is_playing: bool,
    last_play: Option<Instant>,
    stopped_at: Option<Instant>,
}

struct Inner {
    strategy: EchoStrategy,
    config: EchoConfig,
    history_capacity: usize,
    state: Mutex<EchoState>,
}

/// Shared echo-discrimination handle.
///
/// Cheap to clone; the player thread writes played samples through it, the
/// capture loop classifies frames through it, and the session marks playback
/// boundaries. The inner lock is held only for a single append or compare.
#[derive(Clone)]
pub struct EchoFilter {
    inner: Arc<Inner>,
}

impl EchoFilter {
    pub fn new(strategy: EchoStrategy, config: EchoConfig) -> Self {
        let history_capacity =
            (config.sample_rate as f64 * config.history.as_secs_f64()) as usize;
        Self {
            inner: Arc::new(Inner {
                strategy,
                config,
                history_capacity,
                state: Mutex::new(EchoState {
                    history: VecDeque::with_capacity(history_capacity),
                    is_playing: false,
                    last_play: None,
                    stopped_at: None,
                }),
            }),
        }
    }

    /// Record samples that were just written to the output device.
    pub fn note_played(&self, samples: &[i16]) {
        let mut state = self.lock();
        state.is_playing = true;
        state.last_play = Some(Instant::now());
        state.stopped_at = None;
        for &s in samples {
            if state.history.len() == self.inner.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(s);
        }
    }

    /// Mark that the assistant has finished speaking.
    pub fn mark_playback_stopped(&self) {
        let mut state = self.lock();
        if state.is_playing {
            state.is_playing = false;
            state.stopped_at = Some(Instant::now());
        }
    }

    /// Classify one captured frame.
    pub fn classify(&self, frame: &[i16]) -> Verdict {
        match self.inner.strategy {
            EchoStrategy::Correlation => self.classify_by_correlation(frame),
            EchoStrategy::TimingGate => self.classify_by_timing(frame),
        }
    }

    fn classify_by_correlation(&self, frame: &[i16]) -> Verdict {
        let cfg = &self.inner.config;
        let state = self.lock();

        // Quiescent channel: nothing played recently, skip the signal math.
        let cooled = match state.last_play {
            None => true,
            Some(t) => t.elapsed() >= cfg.cooldown,
        };
        if cooled && !state.is_playing {
            return Verdict::Human;
        }

        let mic_rms = rms(frame);
        if mic_rms < cfg.noise_floor {
            // Near-silence is never suppressed.
            return Verdict::Human;
        }

        if state.history.len() < frame.len() || frame.is_empty() {
            // Not enough played audio to compare against: fail open.
            return Verdict::Human;
        }

        let start = state.history.len() - frame.len();
        let played: Vec<i16> = state.history.iter().skip(start).copied().collect();
        let played_rms = rms(&played);

        if played_rms > cfg.noise_floor {
            let ratio = mic_rms / (played_rms + f32::EPSILON);
            if ratio > cfg.barge_in_multiplier {
                // A real interrupting speaker is reliably louder than leakage.
                return Verdict::Human;
            }
            if ratio < cfg.background_ratio {
                return Verdict::Human;
            }
            if !state.is_playing {
                return Verdict::Human;
            }
        }

        if let Some(correlation) = normalized_correlation(frame, &played) {
            if correlation > cfg.correlation_threshold {
                debug!(correlation, mic_rms, played_rms, "frame correlates with playback");
                return Verdict::Echo;
            }
        }

        Verdict::Human
    }

    fn classify_by_timing(&self, frame: &[i16]) -> Verdict {
        let cfg = &self.inner.config;
        let state = self.lock();

        if rms(frame) < cfg.noise_floor {
            return Verdict::Human;
        }
        if state.is_playing {
            return Verdict::Echo;
        }
        match state.stopped_at {
            Some(t) if t.elapsed() < cfg.gate_window => Verdict::Echo,
            _ => Verdict::Human,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EchoState> {
        // A poisoned lock here means an audio thread panicked; the
        // discriminator keeps serving with whatever state remains.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Root-mean-square energy of a frame, on the raw 16-bit sample scale.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Normalized cross-correlation of two equal-length signals, in [0, 1].
///
/// Returns `None` when either signal has no variance, which callers must
/// treat as "no evidence of echo".
fn normalized_correlation(a: &[i16], b: &[i16]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a: f64 = a.iter().map(|&s| s as f64).sum::<f64>() / n;
    let mean_b: f64 = b.iter().map(|&s| s as f64).sum::<f64>() / n;

    let mut dot = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        dot += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some((dot.abs() / (var_a.sqrt() * var_b.sqrt())) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn sine(len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let phase = i as f32 * std::f32::consts::TAU / 48.0;
                (phase.sin() * amplitude) as i16
            })
            .collect()
    }

    fn scaled(frame: &[i16], factor: f32) -> Vec<i16> {
        frame
            .iter()
            .map(|&s| ((s as f32) * factor).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect()
    }

    fn correlation_filter() -> EchoFilter {
        EchoFilter::new(EchoStrategy::Correlation, EchoConfig::default())
    }

    #[test]
    fn test_empty_history_always_passes_human() {
        let filter = correlation_filter();
        // Playback has started but no samples are retained yet.
        filter.note_played(&[]);
        let loud = sine(480, 20_000.0);
        assert_eq!(filter.classify(&loud), Verdict::Human);
    }

    #[test]
    fn test_short_history_fails_open() {
        let filter = correlation_filter();
        filter.note_played(&sine(100, 700.0));
        let frame = sine(480, 700.0);
        assert_eq!(filter.classify(&frame), Verdict::Human);
    }

    #[test]
    fn test_quiet_frame_is_human_during_playback() {
        let filter = correlation_filter();
        filter.note_played(&sine(480, 10_000.0));
        let quiet = vec![3i16; 480];
        assert_eq!(filter.classify(&quiet), Verdict::Human);
    }

    #[test]
    fn test_quiescent_channel_skips_analysis() {
        let config = EchoConfig {
            cooldown: Duration::ZERO,
            ..EchoConfig::default()
        };
        let filter = EchoFilter::new(EchoStrategy::Correlation, config);
        filter.note_played(&sine(480, 700.0));
        filter.mark_playback_stopped();
        // Cooldown elapsed and nothing playing: even a perfect copy passes.
        assert_eq!(filter.classify(&sine(480, 700.0)), Verdict::Human);
    }

    #[test]
    fn test_correlated_comparable_energy_is_echo() {
        let filter = correlation_filter();
        // Played RMS ~500 (amplitude 707), captured a 1.04x copy of it.
        let played = sine(480, 707.0);
        filter.note_played(&played);
        let echo = scaled(&played, 1.04);
        assert_eq!(filter.classify(&echo), Verdict::Echo);
    }

    #[test]
    fn test_barge_in_beats_correlation() {
        let filter = correlation_filter();
        let played = sine(480, 707.0);
        filter.note_played(&played);
        // Same waveform at 3.2x the energy: too loud to be leakage.
        let barge_in = scaled(&played, 3.2);
        assert_eq!(filter.classify(&barge_in), Verdict::Human);
    }

    #[test]
    fn test_faint_background_is_human() {
        let config = EchoConfig {
            noise_floor: 50.0,
            ..EchoConfig::default()
        };
        let filter = EchoFilter::new(EchoStrategy::Correlation, config);
        let played = sine(480, 10_000.0);
        filter.note_played(&played);
        // Correlated but at 1% of the played energy.
        let faint = scaled(&played, 0.01);
        assert_eq!(filter.classify(&faint), Verdict::Human);
    }

    #[test]
    fn test_uncorrelated_speech_is_human() {
        let filter = correlation_filter();
        let played = sine(480, 707.0);
        filter.note_played(&played);

        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<i16> = (0..480).map(|_| rng.random_range(-1000..1000)).collect();
        assert_eq!(filter.classify(&noise), Verdict::Human);
    }

    #[test]
    fn test_thresholds_are_tunable() {
        // A stricter correlation threshold lets the same near-copy through.
        let config = EchoConfig {
            correlation_threshold: 1.1,
            ..EchoConfig::default()
        };
        let filter = EchoFilter::new(EchoStrategy::Correlation, config);
        let played = sine(480, 707.0);
        filter.note_played(&played);
        assert_eq!(filter.classify(&scaled(&played, 1.04)), Verdict::Human);
    }

    #[test]
    fn test_timing_gate_suppresses_while_playing() {
        let filter = EchoFilter::new(EchoStrategy::TimingGate, EchoConfig::default());
        filter.note_played(&sine(480, 700.0));
        assert_eq!(filter.classify(&sine(480, 700.0)), Verdict::Echo);
        // Silence passes even mid-playback.
        assert_eq!(filter.classify(&vec![0i16; 480]), Verdict::Human);
    }

    #[test]
    fn test_timing_gate_reopens_after_window() {
        let config = EchoConfig {
            gate_window: Duration::from_millis(1),
            ..EchoConfig::default()
        };
        let filter = EchoFilter::new(EchoStrategy::TimingGate, config);
        filter.note_played(&sine(480, 700.0));
        filter.mark_playback_stopped();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(filter.classify(&sine(480, 700.0)), Verdict::Human);
    }

    #[test]
    fn test_rms_of_known_signal() {
        assert_eq!(rms(&[]), 0.0);
        let r = rms(&[100, -100, 100, -100]);
        assert!((r - 100.0).abs() < 1e-3);
    }
}
