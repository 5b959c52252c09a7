use super::{scan_wav_dir, ClipHandle, ClipOutcome, PreparedClip, TrackSource};
use crate::error::{KioskError, KioskResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Headless source: a clip "plays" by waiting out its duration.
///
/// Used on kiosks without a working output device and throughout the tests.
#[derive(Debug, Clone, Default)]
pub struct SilentSource {
    tracks: BTreeMap<String, Duration>,
}

impl SilentSource {
    pub fn new<K: Into<String>>(tracks: impl IntoIterator<Item = (K, Duration)>) -> Self {
        Self {
            tracks: tracks.into_iter().map(|(k, d)| (k.into(), d)).collect(),
        }
    }

    /// Reads clip lengths from the WAV headers in `dir`.
    /// Unreadable headers are skipped with a warning.
    pub fn from_dir(dir: &Path) -> KioskResult<Self> {
        let mut tracks = BTreeMap::new();
        for (id, path) in scan_wav_dir(dir)? {
            match wav_duration(&path) {
                Ok(duration) => {
                    tracks.insert(id, duration);
                }
                Err(e) => warn!("Silent: skipping {} ({})", path.display(), e),
            }
        }
        info!("Silent: {} clips available", tracks.len());
        Ok(Self { tracks })
    }

    pub fn duration_of(&self, track_id: &str) -> Option<Duration> {
        self.tracks.get(track_id).copied()
    }
}

fn wav_duration(path: &Path) -> KioskResult<Duration> {
    let reader = hound::WavReader::open(path)?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Err(KioskError::Decode(format!("{}: zero sample rate", path.display())));
    }
    Ok(Duration::from_secs_f64(reader.duration() as f64 / rate as f64))
}

struct SilentClip {
    cancel: CancellationToken,
}

impl ClipHandle for SilentClip {
    fn stop(&self) {
        self.cancel.cancel();
    }
}

#[async_trait::async_trait]
impl TrackSource for SilentSource {
    fn id(&self) -> &'static str {
        "silent"
    }

    fn list_tracks(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }

    async fn open(&self, track_id: &str) -> KioskResult<PreparedClip> {
        let duration = self
            .duration_of(track_id)
            .ok_or_else(|| KioskError::TrackNotFound(track_id.to_string()))?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    let _ = done_tx.send(ClipOutcome::Completed);
                }
                _ = token.cancelled() => {}
            }
        });

        Ok(PreparedClip {
            handle: Box::new(SilentClip { cancel }),
            finished: done_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, samples: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..samples {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_from_dir_reads_durations() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("intro.wav"), 8000, 16000);
        write_wav(&dir.path().join("short.wav"), 8000, 4000);
        std::fs::write(dir.path().join("broken.wav"), b"not a wav").unwrap();

        let source = SilentSource::from_dir(dir.path()).unwrap();
        assert_eq!(source.list_tracks(), vec!["intro", "short"]);
        assert_eq!(source.duration_of("intro"), Some(Duration::from_secs(2)));
        assert_eq!(source.duration_of("short"), Some(Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clip_completes_after_duration() {
        let source = SilentSource::new([("intro", Duration::from_secs(3))]);
        let clip = source.open("intro").await.unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(clip.finished.await.unwrap(), ClipOutcome::Completed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_clip_never_reports_completion() {
        let source = SilentSource::new([("intro", Duration::from_secs(3))]);
        let clip = source.open("intro").await.unwrap();
        clip.handle.stop();

        assert!(clip.finished.await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_track() {
        let source = SilentSource::new([("intro", Duration::from_secs(1))]);
        assert!(matches!(
            source.open("outro").await,
            Err(KioskError::TrackNotFound(id)) if id == "outro"
        ));
    }
}
