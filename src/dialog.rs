//! Caption overlay: greetings and per-track captions with auto-hide.

use crate::catalog::TrackCatalog;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub const DEFAULT_GREETING: &str = "Welcome, visitor!";

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionTiming {
    /// How long a caption stays up.
    pub display: Duration,
    /// Minimum gap between the last caption of any kind and a greeting.
    pub cooldown: Duration,
}

impl Default for CaptionTiming {
    fn default() -> Self {
        Self {
            display: Duration::from_secs(4),
            cooldown: Duration::from_secs(8),
        }
    }
}

/// `visible == false` implies `text` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptionState {
    pub text: String,
    pub visible: bool,
    pub last_shown_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionEvent {
    Shown(String),
    Hidden,
}

#[derive(Clone)]
pub struct DialogCaptionController {
    inner: Arc<DialogInner>,
}

struct DialogInner {
    catalog: TrackCatalog,
    timing: CaptionTiming,
    greeting: String,
    state: watch::Sender<CaptionState>,
    events: broadcast::Sender<CaptionEvent>,
    slot: Mutex<HideSlot>,
}

struct HideSlot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl DialogCaptionController {
    pub fn new(catalog: TrackCatalog, timing: CaptionTiming) -> Self {
        Self::with_greeting(catalog, timing, DEFAULT_GREETING)
    }

    pub fn with_greeting(catalog: TrackCatalog, timing: CaptionTiming, greeting: impl Into<String>) -> Self {
        let (state, _) = watch::channel(CaptionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(DialogInner {
                catalog,
                timing,
                greeting: greeting.into(),
                state,
                events,
                slot: Mutex::new(HideSlot {
                    generation: 0,
                    timer: None,
                }),
            }),
        }
    }

    /// Shows the greeting unless a caption is up or one was shown within
    /// the cooldown. Returns whether it was shown.
    pub fn trigger_greeting(&self) -> bool {
        let mut slot = self.lock_slot();
        let now = Instant::now();
        let (visible, last_shown_at) = {
            let state = self.inner.state.borrow();
            (state.visible, state.last_shown_at)
        };
        if visible {
            debug!("Dialog: caption already visible, skipping greeting");
            return false;
        }
        if let Some(last) = last_shown_at {
            if now.saturating_duration_since(last) < self.inner.timing.cooldown {
                debug!("Dialog: greeting cooling down");
                return false;
            }
        }
        let greeting = self.inner.greeting.clone();
        self.show_locked(&mut slot, greeting, now);
        true
    }

    /// Shows the caption mapped to `track_id`, replacing whatever is up.
    /// Not subject to the greeting cooldown.
    pub fn show_for_track(&self, track_id: &str) -> bool {
        let Some(text) = self.inner.catalog.caption_for(track_id) else {
            debug!("Dialog: no caption for '{}'", track_id);
            return false;
        };
        let text = text.to_string();
        let mut slot = self.lock_slot();
        self.show_locked(&mut slot, text, Instant::now());
        true
    }

    /// Hides immediately. A pending auto-hide becomes a no-op.
    pub fn clear(&self) {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        self.hide();
    }

    pub fn state(&self) -> CaptionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptionState> {
        self.inner.state.subscribe()
    }

    /// Every show and hide, in order, without coalescing.
    pub fn events(&self) -> broadcast::Receiver<CaptionEvent> {
        self.inner.events.subscribe()
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.inner.catalog
    }

    fn show_locked(&self, slot: &mut HideSlot, text: String, now: Instant) {
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }

        info!("Dialog: showing \"{}\"", text);
        self.inner.state.send_modify(|state| {
            state.text = text.clone();
            state.visible = true;
            state.last_shown_at = Some(now);
        });
        let _ = self.inner.events.send(CaptionEvent::Shown(text));

        let controller = self.clone();
        let display = self.inner.timing.display;
        slot.timer = Some(tokio::spawn(async move {
            sleep(display).await;
            controller.expire(generation);
        }));
    }

    fn expire(&self, generation: u64) {
        let mut slot = self.lock_slot();
        if slot.generation != generation {
            return;
        }
        slot.timer = None;
        self.hide();
    }

    fn hide(&self) {
        let hidden = self.inner.state.send_if_modified(|state| {
            let was_visible = state.visible || !state.text.is_empty();
            state.visible = false;
            state.text.clear();
            was_visible
        });
        if hidden {
            debug!("Dialog: caption hidden");
            let _ = self.inner.events.send(CaptionEvent::Hidden);
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, HideSlot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
