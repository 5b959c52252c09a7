use campkiosk::backends::{SilentSource, SpeakerSource, TrackSource};
use campkiosk::catalog::TrackCatalog;
use campkiosk::config_loader::Settings;
use campkiosk::console::ConsoleCommand;
use campkiosk::detector::DEFAULT_FRAME_LEN;
use campkiosk::dialog::DialogCaptionController;
use campkiosk::face::mouth_openness;
use campkiosk::playback::AudioPlaybackController;
use campkiosk::positions::{FaceLayout, MemoryPositionStore, PositionStore, SledPositionStore};
use campkiosk::presence::PresenceSignal;
use campkiosk::session::{KioskComponents, KioskSession, KioskSnapshot};
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "campkiosk=info";

#[derive(Parser, Debug)]
#[command(name = "campkiosk")]
#[command(version)]
#[command(about = "Talking campsite character for a front-facing tablet", long_about = None)]
struct Args {
    /// Extra config file merged over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of .wav tracks
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Caption table (JSON)
    #[arg(short, long)]
    phrases: Option<PathBuf>,

    /// Do not open the audio device
    #[arg(long)]
    silent: bool,

    /// Raw 160x120 luma frame feed (file or FIFO)
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Log filter, e.g. "campkiosk=debug". Overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

/// `--log-level`, else `RUST_LOG`, else `campkiosk=info`.
fn log_filter(flag: Option<&str>) -> EnvFilter {
    if let Some(directives) = flag {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring --log-level '{}': {}", directives, e),
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn open_source(settings: &Settings, assets: &Path, force_silent: bool) -> Arc<dyn TrackSource> {
    if !force_silent && settings.audio_backend == "speaker" {
        match SpeakerSource::new(assets, settings.playback_volume) {
            Ok(source) => return Arc::new(source),
            Err(e) => warn!("Audio device unavailable ({}), continuing silently", e),
        }
    }
    match SilentSource::from_dir(assets) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            warn!("Cannot read tracks from {}: {}", assets.display(), e);
            Arc::new(SilentSource::default())
        }
    }
}

fn open_positions(settings: &Settings) -> Arc<dyn PositionStore> {
    match SledPositionStore::open(Path::new(&settings.positions_db)) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Position store unavailable ({}), positions will not persist", e);
            Arc::new(MemoryPositionStore::default())
        }
    }
}

fn status_report(snapshot: &KioskSnapshot, layout: &FaceLayout) -> String {
    let mut report = format!(
        "present={} continuous={} playing={} track='{}' mouth={:.2} caption='{}' eyes={:?} ({:.1})\n{}\n",
        snapshot.presence.present,
        snapshot.playback.is_continuous_mode,
        snapshot.playback.is_playing,
        snapshot.playback.current_track_id,
        mouth_openness(snapshot.playback.level, snapshot.playback.is_playing),
        snapshot.caption.text,
        snapshot.eyes,
        snapshot.eyes.alpha(),
        snapshot.signage.banner(),
    );
    if let Some(event) = &snapshot.highlighted_event {
        report.push_str(&format!(
            "Up next: {} {} {} @ {}\n",
            event.day, event.title, event.time, event.location
        ));
    }
    report.push_str(&format!(
        "eyes at {:?}, mouth at {:?}",
        layout.eyes.position(),
        layout.mouth.position()
    ));
    report
}

fn print_status(session: &KioskSession, layout: &FaceLayout) {
    println!("{}", status_report(&session.snapshot(), layout));
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(log_filter(args.log_level.as_deref()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    // Tokio's stdin read sits on a blocking thread until the next line
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load(args.config.as_deref())?;
    let assets = args
        .assets
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.assets_dir));
    let phrases = args
        .phrases
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.phrases_file));

    let source = open_source(&settings, &assets, args.silent);
    info!(
        "Using '{}' audio with {} tracks",
        source.id(),
        source.list_tracks().len()
    );
    let catalog = TrackCatalog::load_or_fallback(&phrases);

    let presence = PresenceSignal::new(settings.presence_timing());
    let playback = AudioPlaybackController::new(source, settings.playback_timing());
    let dialog = DialogCaptionController::with_greeting(
        catalog,
        settings.caption_timing(),
        settings.greeting_text.clone(),
    );
    let mut layout = FaceLayout::load(open_positions(&settings));

    let session = KioskSession::start(KioskComponents {
        presence: presence.clone(),
        playback,
        dialog,
        blink: settings.blink_timing(),
        signage: settings.signage_timing(),
    });

    if let Some(frames) = args.frames.clone() {
        session.attach_frame_feed(frames, DEFAULT_FRAME_LEN, settings.brightness_detector());
    }

    info!("Kiosk running. Commands: pulse, test, status, place <eyes|mouth> <x> <y>, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Pulse) => presence.report_pulse(),
                    Ok(ConsoleCommand::Test) => presence.force_present(),
                    Ok(ConsoleCommand::Status) => print_status(&session, &layout),
                    Ok(ConsoleCommand::Place(element, position)) => {
                        let placed = layout.get_mut(element).update(position);
                        println!("{:?} placed at {:?}", element, placed);
                    }
                    Ok(ConsoleCommand::Quit) => break,
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    session.close().await;
    Ok(())
}
