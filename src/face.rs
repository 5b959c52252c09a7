//! Eye blink sequencing and mouth openness for the character face.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeState {
    Open,
    Half,
    Closed,
}

impl EyeState {
    pub fn alpha(self) -> f32 {
        match self {
            EyeState::Open => 1.0,
            EyeState::Half => 0.7,
            EyeState::Closed => 0.3,
        }
    }
}

/// Each state is held for its duration before the next one is shown.
pub const BLINK_SEQUENCE: [(EyeState, Duration); 4] = [
    (EyeState::Half, Duration::from_millis(100)),
    (EyeState::Closed, Duration::from_millis(150)),
    (EyeState::Half, Duration::from_millis(100)),
    (EyeState::Open, Duration::ZERO),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkTiming {
    pub min_gap: Duration,
    pub max_gap: Duration,
}

impl Default for BlinkTiming {
    fn default() -> Self {
        Self {
            min_gap: Duration::from_secs(2),
            max_gap: Duration::from_secs(6),
        }
    }
}

impl BlinkTiming {
    fn next_gap(&self, rng: &mut StdRng) -> Duration {
        if self.max_gap <= self.min_gap {
            return self.min_gap;
        }
        rng.gen_range(self.min_gap..self.max_gap)
    }
}

pub struct Blinker {
    state: watch::Sender<EyeState>,
    cancel: CancellationToken,
}

impl Blinker {
    pub fn start(timing: BlinkTiming) -> Self {
        Self::start_with_rng(timing, StdRng::from_entropy())
    }

    pub fn start_with_rng(timing: BlinkTiming, mut rng: StdRng) -> Self {
        let (state, _) = watch::channel(EyeState::Open);
        let cancel = CancellationToken::new();

        let tx = state.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                let gap = timing.next_gap(&mut rng);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(gap) => {}
                }
                for (eye, hold) in BLINK_SEQUENCE {
                    tx.send_replace(eye);
                    trace!("Face: eyes {:?}", eye);
                    if hold.is_zero() {
                        continue;
                    }
                    tokio::select! {
                        _ = token.cancelled() => {
                            tx.send_replace(EyeState::Open);
                            return;
                        }
                        _ = sleep(hold) => {}
                    }
                }
            }
        });

        Self { state, cancel }
    }

    pub fn eyes(&self) -> EyeState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EyeState> {
        self.state.subscribe()
    }

    /// Stops blinking and leaves the eyes open.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.state.send_replace(EyeState::Open);
    }
}

impl Drop for Blinker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How far the mouth opens for a given lip-sync level.
pub fn mouth_openness(level: f32, is_playing: bool) -> f32 {
    if is_playing {
        (level * 0.8 + 0.2).clamp(0.2, 1.0)
    } else {
        0.2
    }
}

/// Period of the mouth's idle/speaking wobble.
pub fn speaking_period(is_playing: bool) -> Duration {
    if is_playing {
        Duration::from_millis(400)
    } else {
        Duration::from_millis(1200)
    }
}
