//! Caption lookup for audio tracks.
//!
//! The asset is a JSON object `{ "phrases": { "<track id>": "<caption>" } }`
//! where the track id is the clip's file name without the `.wav` extension.

use crate::error::{KioskError, KioskResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct PhraseFile {
    phrases: HashMap<String, String>,
}

/// Immutable track id -> caption table, shared cheaply between controllers.
#[derive(Debug, Clone)]
pub struct TrackCatalog {
    phrases: Arc<HashMap<String, String>>,
}

impl TrackCatalog {
    pub fn from_phrases<K, V>(phrases: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            phrases: Arc::new(
                phrases
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Built-in table used whenever the asset cannot be read.
    pub fn fallback() -> Self {
        Self::from_phrases([
            ("welcome", "Welcome to our camp, friend!"),
            ("hello", "Hey there, visitor!"),
        ])
    }

    pub fn parse(json: &str) -> KioskResult<Self> {
        let file: PhraseFile = serde_json::from_str(json)?;
        Ok(Self {
            phrases: Arc::new(file.phrases),
        })
    }

    pub fn load(path: &Path) -> KioskResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| KioskError::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::parse(&json)
    }

    pub fn load_or_fallback(path: &Path) -> Self {
        match Self::load(path) {
            Ok(catalog) => {
                info!("Catalog: loaded {} captions from {}", catalog.len(), path.display());
                catalog
            }
            Err(e) => {
                warn!("Catalog: using built-in captions ({})", e);
                Self::fallback()
            }
        }
    }

    pub fn caption_for(&self, track_id: &str) -> Option<&str> {
        self.phrases.get(track_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}
