//! Wires presence, playback and captions together.
//!
//! The loop owns no state beyond the last value it saw on each watch
//! channel; it turns value changes into edges and forwards them.

use crate::dialog::DialogCaptionController;
use crate::playback::AudioPlaybackController;
use crate::presence::PresenceSignal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct OrchestrationLoop {
    presence: PresenceSignal,
    playback: AudioPlaybackController,
    dialog: DialogCaptionController,
}

impl OrchestrationLoop {
    pub fn new(
        presence: PresenceSignal,
        playback: AudioPlaybackController,
        dialog: DialogCaptionController,
    ) -> Self {
        Self {
            presence,
            playback,
            dialog,
        }
    }

    /// Greeting first, then the continuous-mode decision.
    pub fn on_presence_change(&self, present: bool) {
        if present {
            self.dialog.trigger_greeting();
            if !self.playback.is_continuous_mode() {
                self.playback.start_continuous();
            }
        } else if self.playback.is_continuous_mode() {
            self.playback.stop_continuous();
        }
    }

    pub fn on_track_change(&self, track_id: &str) {
        if !track_id.is_empty() {
            self.dialog.show_for_track(track_id);
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut presence_rx = self.presence.subscribe();
        let mut playback_rx = self.playback.subscribe();

        let mut last_present = false;
        let mut last_track = String::new();

        // Whatever is already true counts as an edge
        let present = presence_rx.borrow_and_update().present;
        self.dispatch_presence(&mut last_present, present);
        let track = playback_rx.borrow_and_update().current_track_id.clone();
        self.dispatch_track(&mut last_track, track);

        info!("Orchestrator: running");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = presence_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let present = presence_rx.borrow_and_update().present;
                    self.dispatch_presence(&mut last_present, present);
                }
                changed = playback_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let track = playback_rx.borrow_and_update().current_track_id.clone();
                    self.dispatch_track(&mut last_track, track);
                }
            }
        }
        info!("Orchestrator: stopped");
    }

    fn dispatch_presence(&self, last: &mut bool, present: bool) {
        if present == *last {
            return;
        }
        *last = present;
        debug!("Orchestrator: presence -> {}", present);
        self.on_presence_change(present);
    }

    fn dispatch_track(&self, last: &mut String, track: String) {
        if track == *last {
            return;
        }
        debug!("Orchestrator: track '{}' -> '{}'", last, track);
        self.on_track_change(&track);
        *last = track;
    }
}
