//! Random clip playback, continuous mode, and the lip-sync level signal.
//!
//! At most one clip is live at a time. Every start path stops the previous
//! clip first, and a generation counter fences off tasks (level loop,
//! completion watcher, in-flight preparation) that belong to a superseded
//! clip.

use crate::backends::{ClipHandle, ClipOutcome, PreparedClip, TrackSource};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTiming {
    /// How often continuous mode checks whether the clip ended.
    pub completion_poll: Duration,
    /// Upper bound on waiting for a single clip in continuous mode.
    pub max_track_wait: Duration,
    pub inter_track_pause: Duration,
    pub level_update: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            completion_poll: Duration::from_secs(1),
            max_track_wait: Duration::from_secs(60),
            inter_track_pause: Duration::from_secs(30),
            level_update: Duration::from_millis(50),
        }
    }
}

/// Published playback state.
///
/// `level` is 0 whenever `is_playing` is false, and `current_track_id` is
/// non-empty exactly while `is_playing` is true.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_continuous_mode: bool,
    pub current_track_id: String,
    pub level: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Preparing,
    Playing,
}

/// Wall-clock source for the level simulation.
pub trait WallClock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Synthetic mouth level for a wall-clock time in milliseconds.
///
/// Two sine waves with 800 ms and 200 ms periods, clamped to [0.1, 1.0].
/// Does not look at the audio at all.
pub fn simulated_level(millis: i64) -> f32 {
    let base = ((millis.rem_euclid(800)) as f64 * 0.01).sin() * 0.5 + 0.5;
    let variation = ((millis.rem_euclid(200)) as f64 * 0.03).sin() * 0.3;
    (base + variation).clamp(0.1, 1.0) as f32
}

#[derive(Clone)]
pub struct AudioPlaybackController {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn TrackSource>,
    timing: PlaybackTiming,
    clock: Arc<dyn WallClock>,
    state: watch::Sender<PlaybackState>,
    slot: Mutex<Slot>,
    rng: Mutex<StdRng>,
}

struct Slot {
    phase: PlaybackPhase,
    generation: u64,
    clip: Option<Box<dyn ClipHandle>>,
    level_cancel: Option<CancellationToken>,
    continuous: Option<CancellationToken>,
}

impl Slot {
    /// Stops and drops the live clip and its level loop.
    fn release_clip(&mut self) {
        if let Some(token) = self.level_cancel.take() {
            token.cancel();
        }
        if let Some(clip) = self.clip.take() {
            clip.stop();
        }
    }
}

impl AudioPlaybackController {
    pub fn new(source: Arc<dyn TrackSource>, timing: PlaybackTiming) -> Self {
        Self::with_parts(source, timing, Arc::new(SystemClock), StdRng::from_entropy())
    }

    /// Deterministic track selection, for tests and reproducible demos.
    pub fn with_seed(source: Arc<dyn TrackSource>, timing: PlaybackTiming, seed: u64) -> Self {
        Self::with_parts(source, timing, Arc::new(SystemClock), StdRng::seed_from_u64(seed))
    }

    pub fn with_parts(
        source: Arc<dyn TrackSource>,
        timing: PlaybackTiming,
        clock: Arc<dyn WallClock>,
        rng: StdRng,
    ) -> Self {
        let (state, _) = watch::channel(PlaybackState::default());
        Self {
            inner: Arc::new(Inner {
                source,
                timing,
                clock,
                state,
                slot: Mutex::new(Slot {
                    phase: PlaybackPhase::Idle,
                    generation: 0,
                    clip: None,
                    level_cancel: None,
                    continuous: None,
                }),
                rng: Mutex::new(rng),
            }),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.lock_slot().phase
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.borrow().is_playing
    }

    pub fn is_continuous_mode(&self) -> bool {
        self.inner.state.borrow().is_continuous_mode
    }

    /// Starts a uniformly chosen clip. Returns whether one started.
    ///
    /// A no-op while a clip is preparing or playing.
    pub async fn play_random(&self) -> bool {
        self.play_random_guarded(None).await
    }

    /// `guard` is the continuous-mode token; once it is cancelled no new
    /// clip may start. Checked under the slot lock so it serializes with
    /// `stop_continuous`.
    async fn play_random_guarded(&self, guard: Option<&CancellationToken>) -> bool {
        let (track_id, generation) = {
            let mut slot = self.lock_slot();
            if guard.is_some_and(|token| token.is_cancelled()) {
                return false;
            }
            if slot.phase != PlaybackPhase::Idle {
                debug!("Playback: already {:?}, ignoring request", slot.phase);
                return false;
            }
            let tracks = self.inner.source.list_tracks();
            let chosen = {
                let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
                tracks.choose(&mut *rng).cloned()
            };
            let Some(track_id) = chosen else {
                warn!("Playback: no tracks available from '{}'", self.inner.source.id());
                return false;
            };
            slot.release_clip();
            slot.generation += 1;
            slot.phase = PlaybackPhase::Preparing;
            (track_id, slot.generation)
        };

        info!("Playback: preparing '{}'", track_id);
        let prepared = self.inner.source.open(&track_id).await;

        let mut slot = self.lock_slot();
        if slot.generation != generation {
            debug!("Playback: '{}' was stopped while preparing", track_id);
            if let Ok(clip) = prepared {
                clip.handle.stop();
            }
            return false;
        }

        match prepared {
            Ok(PreparedClip { handle, finished }) => {
                let level_cancel = CancellationToken::new();
                slot.clip = Some(handle);
                slot.level_cancel = Some(level_cancel.clone());
                slot.phase = PlaybackPhase::Playing;
                self.inner.state.send_modify(|state| {
                    state.is_playing = true;
                    state.current_track_id = track_id.clone();
                });
                self.spawn_level_loop(generation, level_cancel);
                self.spawn_completion_watch(generation, track_id, finished);
                true
            }
            Err(e) => {
                warn!("Playback: failed to start '{}': {}", track_id, e);
                slot.phase = PlaybackPhase::Idle;
                self.publish_idle();
                false
            }
        }
    }

    /// Halts the current clip and resets to idle. Idempotent.
    pub fn stop(&self) {
        let mut slot = self.lock_slot();
        if slot.phase != PlaybackPhase::Idle {
            info!("Playback: stopping");
        }
        slot.generation += 1;
        slot.phase = PlaybackPhase::Idle;
        slot.release_clip();
        self.publish_idle();
    }

    pub fn start_continuous(&self) {
        let token = {
            let mut slot = self.lock_slot();
            if slot.continuous.is_some() {
                debug!("Playback: continuous mode already active");
                return;
            }
            let token = CancellationToken::new();
            slot.continuous = Some(token.clone());
            self.inner
                .state
                .send_modify(|state| state.is_continuous_mode = true);
            token
        };

        info!("Playback: continuous mode on");
        let controller = self.clone();
        tokio::spawn(async move { controller.run_continuous(token).await });
    }

    pub fn stop_continuous(&self) {
        {
            let mut slot = self.lock_slot();
            if let Some(token) = slot.continuous.take() {
                info!("Playback: continuous mode off");
                token.cancel();
            }
            self.inner.state.send_if_modified(|state| {
                let was_on = state.is_continuous_mode;
                state.is_continuous_mode = false;
                was_on
            });
        }
        self.stop();
    }

    /// Stops everything and drops the clip handle. Safe to call repeatedly.
    pub fn release(&self) {
        self.stop_continuous();
        debug!("Playback: resources released");
    }

    async fn run_continuous(&self, token: CancellationToken) {
        let timing = self.inner.timing;
        loop {
            self.play_random_guarded(Some(&token)).await;
            if token.is_cancelled() {
                break;
            }

            let mut waited = Duration::ZERO;
            while self.phase() != PlaybackPhase::Idle && waited < timing.max_track_wait {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(timing.completion_poll) => {}
                }
                waited += timing.completion_poll;
            }
            if self.phase() != PlaybackPhase::Idle {
                warn!(
                    "Playback: clip still running after {:?}, moving on",
                    timing.max_track_wait
                );
            }

            debug!("Playback: waiting {:?} before next clip", timing.inter_track_pause);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(timing.inter_track_pause) => {}
            }
        }
        debug!("Playback: continuous loop exited");
    }

    fn spawn_level_loop(&self, generation: u64, token: CancellationToken) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(controller.inner.timing.level_update);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let level = simulated_level(controller.inner.clock.now_millis());
                let slot = controller.lock_slot();
                if slot.generation != generation || slot.phase != PlaybackPhase::Playing {
                    break;
                }
                trace!("Playback: level {:.2}", level);
                controller.inner.state.send_modify(|state| state.level = level);
            }
        });
    }

    fn spawn_completion_watch(
        &self,
        generation: u64,
        track_id: String,
        finished: oneshot::Receiver<ClipOutcome>,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = finished.await.unwrap_or(ClipOutcome::Completed);
            let mut slot = controller.lock_slot();
            if slot.generation != generation {
                return;
            }
            match outcome {
                ClipOutcome::Completed => info!("Playback: '{}' completed", track_id),
                ClipOutcome::Failed(reason) => {
                    warn!("Playback: '{}' failed: {}", track_id, reason)
                }
            }
            slot.phase = PlaybackPhase::Idle;
            slot.release_clip();
            controller.publish_idle();
        });
    }

    fn publish_idle(&self) {
        self.inner.state.send_if_modified(|state| {
            let changed = state.is_playing || !state.current_track_id.is_empty() || state.level != 0.0;
            state.is_playing = false;
            state.current_track_id.clear();
            state.level = 0.0;
            changed
        });
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
