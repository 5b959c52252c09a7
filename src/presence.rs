//! Presence signal: instant on, delayed off.
//!
//! Sensors only ever report positive pulses. Absence is inferred by a
//! periodic checker once no pulse arrived within the timeout.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTiming {
    pub check_interval: Duration,
    pub timeout: Duration,
}

impl Default for PresenceTiming {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceState {
    pub present: bool,
    pub last_positive_at: Option<Instant>,
}

#[derive(Clone)]
pub struct PresenceSignal {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    timing: PresenceTiming,
    state: watch::Sender<PresenceState>,
    checker: Mutex<Option<CancellationToken>>,
}

impl PresenceSignal {
    pub fn new(timing: PresenceTiming) -> Self {
        let (state, _) = watch::channel(PresenceState::default());
        Self {
            inner: Arc::new(PresenceInner {
                timing,
                state,
                checker: Mutex::new(None),
            }),
        }
    }

    /// Records a positive reading from the sensor.
    pub fn report_pulse(&self) {
        self.mark_present("pulse");
    }

    /// Debug entry point: asserts presence without a sensor reading.
    pub fn force_present(&self) {
        info!("Presence: manual override");
        self.mark_present("override");
    }

    fn mark_present(&self, cause: &str) {
        let now = Instant::now();
        self.inner.state.send_modify(|state| {
            if !state.present {
                info!("Presence: visitor detected ({})", cause);
            }
            state.present = true;
            // Never move backwards
            state.last_positive_at = Some(match state.last_positive_at {
                Some(previous) if previous > now => previous,
                _ => now,
            });
        });
    }

    /// One decay step. Returns true if presence flipped to absent.
    pub fn check_timeout(&self, now: Instant) -> bool {
        let timeout = self.inner.timing.timeout;
        self.inner.state.send_if_modified(|state| {
            let expired = match state.last_positive_at {
                Some(last) => now.saturating_duration_since(last) >= timeout,
                None => true,
            };
            if state.present && expired {
                info!("Presence: visitor gone (timeout)");
                state.present = false;
                true
            } else {
                false
            }
        })
    }

    /// Spawns the periodic timeout checker. No-op if already running.
    pub fn start(&self) {
        let mut checker = self.lock_checker();
        if checker.is_some() {
            debug!("Presence: checker already running");
            return;
        }
        let token = CancellationToken::new();
        *checker = Some(token.clone());
        drop(checker);

        let signal = self.clone();
        let period = self.inner.timing.check_interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    now = ticker.tick() => {
                        signal.check_timeout(now);
                    }
                }
            }
            debug!("Presence: checker stopped");
        });
    }

    /// Cancels the checker and clears presence.
    pub fn stop(&self) {
        if let Some(token) = self.lock_checker().take() {
            token.cancel();
        }
        self.inner.state.send_if_modified(|state| {
            let was_present = state.present;
            state.present = false;
            was_present
        });
    }

    pub fn is_present(&self) -> bool {
        self.inner.state.borrow().present
    }

    pub fn state(&self) -> PresenceState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceState> {
        self.inner.state.subscribe()
    }

    fn lock_checker(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.inner
            .checker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
