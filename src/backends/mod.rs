pub mod silent;
pub mod speaker;

pub use silent::SilentSource;
pub use speaker::SpeakerSource;

use crate::error::KioskResult;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

const TRACK_EXTENSION: &str = ".wav";

/// How a clip ended, reported once through `PreparedClip::finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipOutcome {
    Completed,
    Failed(String),
}

/// Control handle for a clip that is currently sounding.
pub trait ClipHandle: Send + Sync {
    /// Halts output. Must be safe to call after the clip already ended.
    fn stop(&self);
}

/// A clip that finished preparation and has started playing.
///
/// A `finished` sender dropped without a value counts as completion.
pub struct PreparedClip {
    pub handle: Box<dyn ClipHandle>,
    pub finished: oneshot::Receiver<ClipOutcome>,
}

/// Trait that all track sources must implement.
/// This lets the kiosk run against a real speaker or headless.
#[async_trait::async_trait]
pub trait TrackSource: Send + Sync {
    /// Returns the unique ID of the source (e.g., "rodio")
    fn id(&self) -> &'static str;

    /// Identifiers of every playable clip (file names without extension)
    fn list_tracks(&self) -> Vec<String>;

    /// Prepares the clip and starts it
    async fn open(&self, track_id: &str) -> KioskResult<PreparedClip>;
}

/// Strips the clip extension, returning `None` for non-clip files.
pub fn track_id(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(TRACK_EXTENSION)
        .filter(|stem| !stem.is_empty())
}

/// Lists `(track id, path)` for every `.wav` file in `dir`, sorted by id.
pub fn scan_wav_dir(dir: &Path) -> KioskResult<Vec<(String, PathBuf)>> {
    let mut tracks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(track_id) {
            tracks.push((id.to_string(), entry.path()));
        }
    }
    tracks.sort();
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_strips_extension() {
        assert_eq!(track_id("intro.wav"), Some("intro"));
        assert_eq!(track_id("mind_the_dust.wav"), Some("mind_the_dust"));
        assert_eq!(track_id("phrases.json"), None);
        assert_eq!(track_id(".wav"), None);
    }

    #[test]
    fn test_scan_wav_dir_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.wav", "a.wav", "phrases.json", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.wav")).unwrap();

        let ids: Vec<String> = scan_wav_dir(dir.path())
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_scan_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_wav_dir(&dir.path().join("absent")).is_err());
    }
}
