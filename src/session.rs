//! Lifecycle of a running kiosk: start the background tasks, tear them down.

use crate::detector::{spawn_frame_reader, BrightnessDetector};
use crate::dialog::{CaptionState, DialogCaptionController};
use crate::face::{BlinkTiming, Blinker, EyeState};
use crate::orchestrator::OrchestrationLoop;
use crate::playback::{AudioPlaybackController, PlaybackState};
use crate::presence::{PresenceSignal, PresenceState};
use crate::signage::{CampEvent, Signage, SignageState, SignageTiming};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct KioskComponents {
    pub presence: PresenceSignal,
    pub playback: AudioPlaybackController,
    pub dialog: DialogCaptionController,
    pub blink: BlinkTiming,
    pub signage: SignageTiming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KioskSnapshot {
    pub presence: PresenceState,
    pub playback: PlaybackState,
    pub caption: CaptionState,
    pub eyes: EyeState,
    pub signage: SignageState,
    pub highlighted_event: Option<CampEvent>,
}

pub struct KioskSession {
    presence: PresenceSignal,
    playback: AudioPlaybackController,
    dialog: DialogCaptionController,
    blinker: Blinker,
    signage: Signage,
    cancel: CancellationToken,
    orchestrator: JoinHandle<()>,
    frame_feed: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl KioskSession {
    pub fn start(components: KioskComponents) -> Self {
        let KioskComponents {
            presence,
            playback,
            dialog,
            blink,
            signage,
        } = components;

        presence.start();
        let blinker = Blinker::start(blink);
        let signage = Signage::start(signage);
        let cancel = CancellationToken::new();
        let orchestrator =
            OrchestrationLoop::new(presence.clone(), playback.clone(), dialog.clone())
                .spawn(cancel.clone());
        info!("Session: started");

        Self {
            presence,
            playback,
            dialog,
            blinker,
            signage,
            cancel,
            orchestrator,
            frame_feed: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn presence(&self) -> &PresenceSignal {
        &self.presence
    }

    pub fn playback(&self) -> &AudioPlaybackController {
        &self.playback
    }

    pub fn dialog(&self) -> &DialogCaptionController {
        &self.dialog
    }

    pub fn snapshot(&self) -> KioskSnapshot {
        KioskSnapshot {
            presence: self.presence.state(),
            playback: self.playback.state(),
            caption: self.dialog.state(),
            eyes: self.blinker.eyes(),
            signage: self.signage.state(),
            highlighted_event: self.signage.highlighted_event(),
        }
    }

    /// Starts feeding camera frames from `path` into presence. Stopped by
    /// `shutdown`. Replaces any feed attached earlier.
    pub fn attach_frame_feed(&self, path: PathBuf, frame_len: usize, detector: BrightnessDetector) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Session: closed, not attaching frame feed");
            return;
        }
        let handle = spawn_frame_reader(
            path,
            frame_len,
            detector,
            self.presence.clone(),
            self.cancel.child_token(),
        );
        if let Some(previous) = self.lock_feed().replace(handle) {
            previous.abort();
        }
    }

    /// Stops every background task and returns to the idle state.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Orchestrator first so the presence drop is not acted on
        self.cancel.cancel();
        self.orchestrator.abort();
        self.presence.stop();
        self.blinker.stop();
        self.signage.stop();
        self.playback.release();
        self.dialog.clear();
        info!("Session: shut down");
    }

    /// `shutdown`, then waits for the frame feed to exit so no late pulse
    /// can revive presence.
    pub async fn close(&self) {
        self.shutdown();
        let feed = self.lock_feed().take();
        if let Some(feed) = feed {
            let _ = feed.await;
            self.presence.stop();
        }
    }

    fn lock_feed(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.frame_feed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for KioskSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SilentSource, TrackSource};
    use crate::catalog::TrackCatalog;
    use crate::dialog::CaptionTiming;
    use crate::playback::PlaybackTiming;
    use crate::presence::PresenceTiming;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn components() -> KioskComponents {
        let source: Arc<dyn TrackSource> =
            Arc::new(SilentSource::new([("intro", Duration::from_secs(5))]));
        KioskComponents {
            presence: PresenceSignal::new(PresenceTiming::default()),
            playback: AudioPlaybackController::with_seed(source, PlaybackTiming::default(), 9),
            dialog: DialogCaptionController::new(
                TrackCatalog::from_phrases([("intro", "Welcome to our camp, friend!")]),
                CaptionTiming::default(),
            ),
            blink: BlinkTiming::default(),
            signage: SignageTiming::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_drives_session() {
        let session = KioskSession::start(components());
        session.presence().report_pulse();
        sleep(Duration::from_millis(10)).await;

        let snapshot = session.snapshot();
        assert!(snapshot.presence.present);
        assert!(snapshot.playback.is_continuous_mode);
        assert_eq!(snapshot.playback.current_track_id, "intro");
        assert_eq!(snapshot.caption.text, "Welcome to our camp, friend!");
        session.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let session = KioskSession::start(components());
        session.presence().force_present();
        sleep(Duration::from_millis(10)).await;

        session.shutdown();
        let first = session.snapshot();
        session.shutdown();
        let second = session.snapshot();

        assert_eq!(first, second);
        assert!(!second.presence.present);
        assert!(!second.playback.is_playing);
        assert!(!second.playback.is_continuous_mode);
        assert!(!second.caption.visible);
        assert_eq!(second.eyes, EyeState::Open);

        // Nothing restarts afterwards
        sleep(Duration::from_secs(60)).await;
        assert!(!session.playback().is_playing());
    }

    #[tokio::test]
    async fn test_close_stops_frame_feed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        {
            use std::io::Write;
            file.write_all(&[128u8; 64]).unwrap();
            file.flush().unwrap();
        }
        let session = KioskSession::start(components());
        let mut rx = session.presence().subscribe();
        session.attach_frame_feed(file.path().to_path_buf(), 64, BrightnessDetector::default());
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.present))
            .await
            .unwrap()
            .unwrap();

        session.close().await;
        assert!(!session.presence().is_present());
        assert!(!session.snapshot().playback.is_continuous_mode);

        // Attaching after close is refused
        session.attach_frame_feed(file.path().to_path_buf(), 64, BrightnessDetector::default());
        sleep(Duration::from_millis(50)).await;
        assert!(!session.presence().is_present());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_close_with_idle_fifo_returns() {
        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("frames.fifo");
        let made = std::process::Command::new("mkfifo").arg(&fifo).status();
        if !made.map(|s| s.success()).unwrap_or(false) {
            return;
        }
        let session = KioskSession::start(components());
        session.attach_frame_feed(fifo, 64, BrightnessDetector::default());
        sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), session.close())
            .await
            .expect("close hung on an idle FIFO");
        assert!(!session.presence().is_present());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_carries_signage() {
        let session = KioskSession::start(components());
        sleep(Duration::from_millis(3100)).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.signage.highlighted, 1);
        assert_eq!(snapshot.highlighted_event.map(|e| e.day), Some("TUE".to_string()));
        assert!(snapshot.signage.banner().starts_with("Hello "));
        session.shutdown();
    }
}
