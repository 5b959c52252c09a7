//! Rotating sign content: the visitor nickname in the "Hello ...!" banner
//! and the highlighted entry of the week's camp events.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub const VISITOR_NAMES: [&str; 13] = [
    "Dirty Hippie",
    "Degenerate",
    "Dusty Wanderer",
    "Sparkle Pony",
    "Corn Goblin",
    "Burner Trash",
    "Playa Casualty",
    "Desert Rat",
    "Radical Self-Expressionist",
    "Shiny Happy Person",
    "Beautiful Weirdo",
    "Glitter Goblin",
    "Nomadic Soul",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampEvent {
    pub day: String,
    pub title: String,
    pub time: String,
    pub location: String,
}

impl CampEvent {
    pub fn new(day: &str, title: &str, time: &str, location: &str) -> Self {
        Self {
            day: day.to_string(),
            title: title.to_string(),
            time: time.to_string(),
            location: location.to_string(),
        }
    }
}

pub fn default_events() -> Vec<CampEvent> {
    vec![
        CampEvent::new("MON", "Playa Postcards/Litterbox", "09:00-15:00", "Toxoplasmosis Bar"),
        CampEvent::new("TUE", "Litterbox", "09:00-15:00", "Toxoplasmosis Bar"),
        CampEvent::new("WED", "Litterbox", "09:00-15:00", "Toxoplasmosis Bar"),
        CampEvent::new("THU", "Litterbox", "09:00-15:00", "Toxoplasmosis Bar"),
        CampEvent::new("FRI", "Buttholes and Bourbon", "11:00-12:00", "Toxoplasmosis Bar"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignageTiming {
    pub name_period: Duration,
    pub event_period: Duration,
}

impl Default for SignageTiming {
    fn default() -> Self {
        Self {
            name_period: Duration::from_secs(10),
            event_period: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignageState {
    pub visitor_name: String,
    pub highlighted: usize,
}

impl SignageState {
    pub fn banner(&self) -> String {
        format!("Hello {}!", self.visitor_name)
    }
}

pub struct Signage {
    events: Arc<Vec<CampEvent>>,
    state: watch::Sender<SignageState>,
    cancel: CancellationToken,
}

impl Signage {
    pub fn start(timing: SignageTiming) -> Self {
        let names = VISITOR_NAMES.iter().map(|n| n.to_string()).collect();
        Self::start_with(names, default_events(), timing, StdRng::from_entropy())
    }

    pub fn start_with(
        names: Vec<String>,
        events: Vec<CampEvent>,
        timing: SignageTiming,
        mut rng: StdRng,
    ) -> Self {
        let first = names.choose(&mut rng).cloned().unwrap_or_default();
        let (state, _) = watch::channel(SignageState {
            visitor_name: first,
            highlighted: 0,
        });
        let events = Arc::new(events);
        let cancel = CancellationToken::new();

        let tx = state.clone();
        let token = cancel.clone();
        let event_count = events.len();
        tokio::spawn(async move {
            let now = Instant::now();
            let mut names_tick = interval_at(now + timing.name_period, timing.name_period);
            names_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut events_tick = interval_at(now + timing.event_period, timing.event_period);
            events_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = names_tick.tick() => {
                        if let Some(name) = names.choose(&mut rng) {
                            trace!("Signage: hello {}", name);
                            tx.send_modify(|s| s.visitor_name = name.clone());
                        }
                    }
                    _ = events_tick.tick() => {
                        if event_count > 0 {
                            tx.send_modify(|s| s.highlighted = (s.highlighted + 1) % event_count);
                        }
                    }
                }
            }
            debug!("Signage: stopped");
        });

        Self {
            events,
            state,
            cancel,
        }
    }

    pub fn state(&self) -> SignageState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SignageState> {
        self.state.subscribe()
    }

    pub fn highlighted_event(&self) -> Option<CampEvent> {
        self.events.get(self.state.borrow().highlighted).cloned()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Signage {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
