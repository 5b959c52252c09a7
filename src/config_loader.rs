use crate::detector::BrightnessDetector;
use crate::dialog::CaptionTiming;
use crate::face::BlinkTiming;
use crate::playback::PlaybackTiming;
use crate::presence::PresenceTiming;
use crate::signage::SignageTiming;
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const AUDIO_BACKENDS: [&str; 2] = ["speaker", "silent"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub assets_dir: String,
    pub phrases_file: String,
    pub positions_db: String,
    pub audio_backend: String, // "speaker" or "silent"
    pub playback_volume: f32,  // 0.0 - 1.0
    // Presence
    pub presence_check_interval_ms: u64,
    pub presence_timeout_ms: u64,
    pub brightness_min: u8,
    pub brightness_max: u8,
    // Captions
    pub caption_duration_ms: u64,
    pub caption_cooldown_ms: u64,
    pub greeting_text: String,
    // Continuous playback
    pub completion_poll_ms: u64,
    pub max_track_wait_ms: u64,
    pub inter_track_pause_ms: u64,
    pub level_update_ms: u64,
    // Face
    pub blink_min_gap_ms: u64,
    pub blink_max_gap_ms: u64,
    // Signage
    pub greeting_name_period_ms: u64,
    pub event_highlight_period_ms: u64,
}

fn default_positions_db() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("campkiosk")
        .join("positions")
        .to_string_lossy()
        .into_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            assets_dir: "assets".to_string(),
            phrases_file: "assets/phrases.json".to_string(),
            positions_db: default_positions_db(),
            audio_backend: "speaker".to_string(),
            playback_volume: 1.0,
            presence_check_interval_ms: 2000,
            presence_timeout_ms: 5000,
            brightness_min: 30,
            brightness_max: 200,
            caption_duration_ms: 4000,
            caption_cooldown_ms: 8000,
            greeting_text: "Welcome, visitor!".to_string(),
            completion_poll_ms: 1000,
            max_track_wait_ms: 60_000,
            inter_track_pause_ms: 30_000,
            level_update_ms: 50,
            blink_min_gap_ms: 2000,
            blink_max_gap_ms: 6000,
            greeting_name_period_ms: 10_000,
            event_highlight_period_ms: 3000,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Defaults, then `Kiosk.*` in the working directory, then the user
    /// config dir, then `extra` (if given), then `KIOSK_*` variables.
    pub fn load(extra: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let user_config = dirs::config_dir()
            .unwrap_or_default()
            .join("campkiosk")
            .join("Kiosk");

        let mut builder = Config::builder()
            .set_default("assets_dir", defaults.assets_dir)?
            .set_default("phrases_file", defaults.phrases_file)?
            .set_default("positions_db", defaults.positions_db)?
            .set_default("audio_backend", defaults.audio_backend)?
            .set_default("playback_volume", defaults.playback_volume as f64)?
            .set_default("presence_check_interval_ms", defaults.presence_check_interval_ms)?
            .set_default("presence_timeout_ms", defaults.presence_timeout_ms)?
            .set_default("brightness_min", defaults.brightness_min as u64)?
            .set_default("brightness_max", defaults.brightness_max as u64)?
            .set_default("caption_duration_ms", defaults.caption_duration_ms)?
            .set_default("caption_cooldown_ms", defaults.caption_cooldown_ms)?
            .set_default("greeting_text", defaults.greeting_text)?
            .set_default("completion_poll_ms", defaults.completion_poll_ms)?
            .set_default("max_track_wait_ms", defaults.max_track_wait_ms)?
            .set_default("inter_track_pause_ms", defaults.inter_track_pause_ms)?
            .set_default("level_update_ms", defaults.level_update_ms)?
            .set_default("blink_min_gap_ms", defaults.blink_min_gap_ms)?
            .set_default("blink_max_gap_ms", defaults.blink_max_gap_ms)?
            .set_default("greeting_name_period_ms", defaults.greeting_name_period_ms)?
            .set_default("event_highlight_period_ms", defaults.event_highlight_period_ms)?
            .add_source(File::with_name("Kiosk").required(false))
            .add_source(File::with_name(&user_config.to_string_lossy()).required(false));

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        // e.g. KIOSK_PRESENCE_TIMEOUT_MS=9000
        let builder = builder.add_source(config::Environment::with_prefix("KIOSK").try_parsing(true));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !(0.0..=1.0).contains(&self.playback_volume) {
            return Err(config::ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        if !AUDIO_BACKENDS.contains(&self.audio_backend.as_str()) {
            return Err(config::ConfigError::Message(format!(
                "Unknown audio_backend '{}'. Expected one of {:?}",
                self.audio_backend, AUDIO_BACKENDS
            )));
        }
        let intervals = [
            ("presence_check_interval_ms", self.presence_check_interval_ms),
            ("presence_timeout_ms", self.presence_timeout_ms),
            ("caption_duration_ms", self.caption_duration_ms),
            ("completion_poll_ms", self.completion_poll_ms),
            ("max_track_wait_ms", self.max_track_wait_ms),
            ("level_update_ms", self.level_update_ms),
            ("greeting_name_period_ms", self.greeting_name_period_ms),
            ("event_highlight_period_ms", self.event_highlight_period_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(config::ConfigError::Message(format!(
                "{} must be greater than 0",
                name
            )));
        }
        if self.brightness_min > self.brightness_max {
            return Err(config::ConfigError::Message(format!(
                "brightness_min ({}) exceeds brightness_max ({})",
                self.brightness_min, self.brightness_max
            )));
        }
        if self.blink_min_gap_ms > self.blink_max_gap_ms {
            return Err(config::ConfigError::Message(format!(
                "blink_min_gap_ms ({}) exceeds blink_max_gap_ms ({})",
                self.blink_min_gap_ms, self.blink_max_gap_ms
            )));
        }
        Ok(())
    }

    pub fn presence_timing(&self) -> PresenceTiming {
        PresenceTiming {
            check_interval: Duration::from_millis(self.presence_check_interval_ms),
            timeout: Duration::from_millis(self.presence_timeout_ms),
        }
    }

    pub fn playback_timing(&self) -> PlaybackTiming {
        PlaybackTiming {
            completion_poll: Duration::from_millis(self.completion_poll_ms),
            max_track_wait: Duration::from_millis(self.max_track_wait_ms),
            inter_track_pause: Duration::from_millis(self.inter_track_pause_ms),
            level_update: Duration::from_millis(self.level_update_ms),
        }
    }

    pub fn caption_timing(&self) -> CaptionTiming {
        CaptionTiming {
            display: Duration::from_millis(self.caption_duration_ms),
            cooldown: Duration::from_millis(self.caption_cooldown_ms),
        }
    }

    pub fn blink_timing(&self) -> BlinkTiming {
        BlinkTiming {
            min_gap: Duration::from_millis(self.blink_min_gap_ms),
            max_gap: Duration::from_millis(self.blink_max_gap_ms),
        }
    }

    pub fn signage_timing(&self) -> SignageTiming {
        SignageTiming {
            name_period: Duration::from_millis(self.greeting_name_period_ms),
            event_period: Duration::from_millis(self.event_highlight_period_ms),
        }
    }

    pub fn brightness_detector(&self) -> BrightnessDetector {
        BrightnessDetector::new(self.brightness_min, self.brightness_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_config_load() {
        let settings = Settings::new().expect("Failed to load settings");
        assert!(settings.presence_timeout_ms > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        std::env::set_var("KIOSK_PRESENCE_TIMEOUT_MS", "9000");
        let settings = Settings::new();
        std::env::remove_var("KIOSK_PRESENCE_TIMEOUT_MS");

        let settings = settings.expect("Failed to load settings");
        assert_eq!(settings.presence_timing().timeout, Duration::from_secs(9));
    }

    #[test]
    #[serial]
    fn test_explicit_file_is_merged() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "inter_track_pause_ms = 1500").unwrap();
        writeln!(file, "greeting_text = \"G'day!\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.greeting_text, "G'day!");
        assert_eq!(
            settings.playback_timing().inter_track_pause,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_defaults_match_reference_cadence() {
        let settings = Settings::default();
        assert_eq!(settings.presence_timing(), PresenceTiming::default());
        assert_eq!(settings.playback_timing(), PlaybackTiming::default());
        assert_eq!(settings.caption_timing(), CaptionTiming::default());
        assert_eq!(settings.blink_timing(), BlinkTiming::default());
        assert_eq!(settings.signage_timing(), SignageTiming::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.playback_volume = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.audio_backend = "pulse".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.completion_poll_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.brightness_min = 210;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_blink_gaps() {
        let mut settings = Settings::default();
        settings.blink_min_gap_ms = 7000;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("blink_min_gap_ms"), "{}", err);

        // Equal bounds give a fixed gap
        settings.blink_max_gap_ms = 7000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        let zeroed: [(&str, fn(&mut Settings)); 4] = [
            ("presence_check_interval_ms", |s| s.presence_check_interval_ms = 0),
            ("level_update_ms", |s| s.level_update_ms = 0),
            ("greeting_name_period_ms", |s| s.greeting_name_period_ms = 0),
            ("event_highlight_period_ms", |s| s.event_highlight_period_ms = 0),
        ];
        for (name, zero) in zeroed {
            let mut settings = Settings::default();
            zero(&mut settings);
            let err = settings.validate().unwrap_err().to_string();
            assert!(err.contains(name), "{}: {}", name, err);
        }

        // Zero pause and zero cooldown stay allowed
        let mut settings = Settings::default();
        settings.inter_track_pause_ms = 0;
        settings.caption_cooldown_ms = 0;
        assert!(settings.validate().is_ok());
    }
}
