//! Threaded audio output player with instant cancellation
//!
//! Synthesized audio arrives as deltas from the network and is queued here;
//! a dedicated playback thread drains the queue into the output device in
//! small sub-chunks. Cancellation is cooperative: `cancel_current` engages a
//! guard deadline and clears the queue wholesale, and the thread re-checks
//! the guard between sub-chunks, so an interruption lands within tens of
//! milliseconds without ever playing stale audio.
//!
//! Every sub-chunk that reaches the device is also appended to the echo
//! history, which keeps the discriminator's view of "what the speakers are
//! doing" aligned with actual playback rather than with network arrival.

use crate::audio::{AudioError, OutputSink};
use crate::echo::EchoFilter;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Playback tuning knobs.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Sub-chunk size for device writes; the interrupt guard is re-checked
    /// between sub-chunks. 1200 samples is 50 ms at 24 kHz.
    pub chunk_samples: usize,
    /// How long the interrupt guard stays engaged after a cancellation, so
    /// in-flight deltas of the cancelled response are discarded.
    pub guard_interval: Duration,
    /// Queue poll timeout; bounds how long the thread sleeps while idle.
    pub pop_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_samples: 1200,
            guard_interval: Duration::from_millis(100),
            pop_timeout: Duration::from_millis(50),
        }
    }
}

struct PlayerShared {
    queue: Mutex<VecDeque<Vec<i16>>>,
    available: Condvar,
    stop: AtomicBool,
    /// Interrupt guard deadline; "set" means now is before the deadline.
    /// Evaluated on every access instead of being reset by a timer.
    guard_until: Mutex<Option<Instant>>,
}

impl PlayerShared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Vec<i16>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn interrupted(&self) -> bool {
        let guard = self
            .guard_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        matches!(*guard, Some(deadline) if Instant::now() < deadline)
    }

    fn engage_guard(&self, interval: Duration) {
        let mut guard = self
            .guard_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(Instant::now() + interval);
    }
}

/// Owns the playback queue and the playback thread.
pub struct AudioOutputPlayer {
    shared: Arc<PlayerShared>,
    config: PlayerConfig,
    echo: EchoFilter,
    handle: Option<JoinHandle<()>>,
}

impl AudioOutputPlayer {
    pub fn new(config: PlayerConfig, echo: EchoFilter) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                queue: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                stop: AtomicBool::new(false),
                guard_until: Mutex::new(None),
            }),
            config,
            echo,
            handle: None,
        }
    }

    /// Spawn the playback thread. The output device is opened by the
    /// factory inside the thread, since PulseAudio streams stay on the
    /// thread that created them.
    ///
    /// Calling this while the thread is already running is a caller error.
    pub fn start<F>(&mut self, make_sink: F) -> Result<(), AudioError>
    where
        F: FnOnce() -> Result<Box<dyn OutputSink>, AudioError> + Send + 'static,
    {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                return Err(AudioError::OperationError(
                    "playback thread already running".to_string(),
                ));
            }
        }
        self.shared.stop.store(false, Ordering::Relaxed);

        let shared = self.shared.clone();
        let echo = self.echo.clone();
        let config = self.config.clone();
        let handle = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let sink = match make_sink() {
                    Ok(sink) => sink,
                    Err(e) => {
                        error!("failed to open output device: {}", e);
                        return;
                    }
                };
                playback_loop(shared, sink, echo, config)
            })
            .map_err(|e| AudioError::Other(format!("failed to spawn playback thread: {}", e)))?;
        self.handle = Some(handle);
        info!("Audio output player started");
        Ok(())
    }

    /// Queue a frame for playback.
    ///
    /// Frames arriving while the interrupt guard is engaged belong to a
    /// response that was just cancelled; they are dropped silently. Never
    /// blocks the event-processing path.
    pub fn enqueue(&self, frame: Vec<i16>) {
        if self.shared.interrupted() {
            debug!(samples = frame.len(), "discarding frame during interrupt guard");
            return;
        }
        let mut queue = self.shared.lock_queue();
        queue.push_back(frame);
        drop(queue);
        self.shared.available.notify_one();
    }

    /// Cancel whatever is queued or in flight, immediately.
    ///
    /// Engages the interrupt guard for the configured interval and empties
    /// the queue. The playback thread stops writing within one sub-chunk.
    pub fn cancel_current(&self) {
        self.shared.engage_guard(self.config.guard_interval);
        let dropped = {
            let mut queue = self.shared.lock_queue();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            debug!(frames = dropped, "playback queue cleared on interruption");
        }
    }

    /// Whether the interrupt guard is currently engaged.
    pub fn interrupt_active(&self) -> bool {
        self.shared.interrupted()
    }

    /// Current queue depth.
    pub fn queue_len(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Signal the playback thread to exit and wait for it, bounded.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.shared.available.notify_all();

        let Some(handle) = self.handle.take() else {
            return;
        };
        // The thread's waits are all bounded, so it exits within one poll
        // interval; give it a second before abandoning the join.
        let deadline = Instant::now() + Duration::from_secs(1);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
            info!("Audio output player stopped");
        } else {
            warn!("playback thread did not exit within timeout, detaching");
        }
    }
}

impl Drop for AudioOutputPlayer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn playback_loop(
    shared: Arc<PlayerShared>,
    mut sink: Box<dyn OutputSink>,
    echo: EchoFilter,
    config: PlayerConfig,
) {
    loop {
        if shared.stop.load(Ordering::Relaxed) {
            break;
        }

        // Pop with a short timeout so the stop and interrupt flags are
        // polled even when the queue stays empty.
        let frame = {
            let mut queue = shared.lock_queue();
            if queue.is_empty() {
                let (guard, _timed_out) = shared
                    .available
                    .wait_timeout(queue, config.pop_timeout)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                queue = guard;
            }
            queue.pop_front()
        };

        let Some(frame) = frame else {
            continue;
        };

        if shared.interrupted() {
            // Stale frame from a cancelled response.
            continue;
        }

        for chunk in frame.chunks(config.chunk_samples) {
            if shared.stop.load(Ordering::Relaxed) || shared.interrupted() {
                break;
            }
            match sink.write(chunk) {
                Ok(()) => echo.note_played(chunk),
                Err(e) => {
                    // Skip the rest of this frame; the thread stays up.
                    warn!("output device write failed: {}", e);
                    break;
                }
            }
        }
    }
    debug!("playback thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::{EchoConfig, EchoStrategy, Verdict};

    struct MockSink {
        writes: Arc<Mutex<Vec<Vec<i16>>>>,
        write_delay: Duration,
    }

    impl MockSink {
        fn factory(
            writes: Arc<Mutex<Vec<Vec<i16>>>>,
            write_delay: Duration,
        ) -> impl FnOnce() -> Result<Box<dyn OutputSink>, AudioError> + Send + 'static {
            move || {
                Ok(Box::new(MockSink { writes, write_delay }) as Box<dyn OutputSink>)
            }
        }
    }

    impl OutputSink for MockSink {
        fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
            if !self.write_delay.is_zero() {
                std::thread::sleep(self.write_delay);
            }
            self.writes.lock().unwrap().push(samples.to_vec());
            Ok(())
        }
    }

    struct FailingSink {
        attempts: Arc<Mutex<usize>>,
    }

    impl OutputSink for FailingSink {
        fn write(&mut self, _samples: &[i16]) -> Result<(), AudioError> {
            *self.attempts.lock().unwrap() += 1;
            Err(AudioError::OperationError("device gone".to_string()))
        }
    }

    fn test_echo() -> EchoFilter {
        EchoFilter::new(EchoStrategy::Correlation, EchoConfig::default())
    }

    fn test_config() -> PlayerConfig {
        PlayerConfig {
            chunk_samples: 1200,
            guard_interval: Duration::from_millis(100),
            pop_timeout: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_cancel_clears_queue_then_guard_expires() {
        let player = AudioOutputPlayer::new(test_config(), test_echo());
        player.enqueue(vec![1i16; 480]);
        player.enqueue(vec![2i16; 480]);
        player.enqueue(vec![3i16; 480]);
        assert_eq!(player.queue_len(), 3);

        player.cancel_current();
        assert_eq!(player.queue_len(), 0);
        assert!(player.interrupt_active());

        // Still inside the guard window: new audio is discarded.
        player.enqueue(vec![4i16; 480]);
        assert_eq!(player.queue_len(), 0);

        std::thread::sleep(Duration::from_millis(150));
        assert!(!player.interrupt_active());
        player.enqueue(vec![5i16; 480]);
        assert_eq!(player.queue_len(), 1);
    }

    #[test]
    fn test_no_previously_queued_frame_survives_cancel() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut player = AudioOutputPlayer::new(test_config(), test_echo());

        player.enqueue(vec![1i16; 1200]);
        player.enqueue(vec![2i16; 1200]);
        player.enqueue(vec![3i16; 1200]);
        player.cancel_current();

        player
            .start(MockSink::factory(writes.clone(), Duration::ZERO))
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        player.stop();

        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mid_frame_interrupt_stops_within_one_chunk() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut player = AudioOutputPlayer::new(test_config(), test_echo());
        player
            .start(MockSink::factory(writes.clone(), Duration::from_millis(20)))
            .unwrap();

        // One frame spanning ten sub-chunks.
        player.enqueue(vec![7i16; 12_000]);

        // Wait until playback is underway.
        let deadline = Instant::now() + Duration::from_secs(1);
        while writes.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        let written_at_cancel = writes.lock().unwrap().len();
        assert!(written_at_cancel >= 1, "playback never started");

        player.cancel_current();
        std::thread::sleep(Duration::from_millis(200));
        let written_after = writes.lock().unwrap().len();
        player.stop();

        // At most the sub-chunk already in flight may complete.
        assert!(
            written_after <= written_at_cancel + 1,
            "wrote {} chunks after cancel at {}",
            written_after,
            written_at_cancel
        );
    }

    #[test]
    fn test_played_audio_reaches_echo_history() {
        let echo = test_echo();
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut player = AudioOutputPlayer::new(test_config(), echo.clone());
        player
            .start(MockSink::factory(writes.clone(), Duration::ZERO))
            .unwrap();

        let tone: Vec<i16> = (0..1200)
            .map(|i| ((i as f32 * std::f32::consts::TAU / 48.0).sin() * 707.0) as i16)
            .collect();
        player.enqueue(tone.clone());

        let deadline = Instant::now() + Duration::from_secs(1);
        while writes.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        player.stop();

        // A near-copy of what just played should now read as echo.
        let leaked: Vec<i16> = tone.iter().map(|&s| (s as f32 * 1.1) as i16).collect();
        assert_eq!(echo.classify(&leaked), Verdict::Echo);
    }

    #[test]
    fn test_write_failures_do_not_kill_the_thread() {
        let attempts = Arc::new(Mutex::new(0usize));
        let mut player = AudioOutputPlayer::new(test_config(), test_echo());
        let attempts_clone = attempts.clone();
        player
            .start(move || {
                Ok(Box::new(FailingSink {
                    attempts: attempts_clone,
                }) as Box<dyn OutputSink>)
            })
            .unwrap();

        player.enqueue(vec![1i16; 1200]);
        std::thread::sleep(Duration::from_millis(30));
        player.enqueue(vec![2i16; 1200]);
        std::thread::sleep(Duration::from_millis(30));
        player.stop();

        // The second frame was attempted, so the first failure did not
        // terminate the loop.
        assert!(*attempts.lock().unwrap() >= 2);
    }

    #[test]
    fn test_start_twice_is_a_caller_error() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut player = AudioOutputPlayer::new(test_config(), test_echo());
        player
            .start(MockSink::factory(writes.clone(), Duration::ZERO))
            .unwrap();
        assert!(player
            .start(MockSink::factory(writes, Duration::ZERO))
            .is_err());
        player.stop();
    }
}
