use super::{scan_wav_dir, ClipHandle, ClipOutcome, PreparedClip, TrackSource};
use crate::error::{KioskError, KioskResult};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

const SINK_POLL: Duration = Duration::from_millis(100);

enum AudioCommand {
    Play {
        path: PathBuf,
        reply: oneshot::Sender<KioskResult<Arc<Sink>>>,
    },
}

/// Plays `.wav` clips from a directory on the default output device.
pub struct SpeakerSource {
    tracks: HashMap<String, PathBuf>,
    tx: mpsc::UnboundedSender<AudioCommand>,
}

impl SpeakerSource {
    pub fn new(dir: &Path, volume: f32) -> KioskResult<Self> {
        let tracks: HashMap<String, PathBuf> = scan_wav_dir(dir)?.into_iter().collect();
        info!("Speaker: found {} clips in {}", tracks.len(), dir.display());

        let (tx, mut rx) = mpsc::unbounded_channel::<AudioCommand>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<KioskResult<()>>();

        thread::Builder::new()
            .name("kiosk-audio".to_string())
            .spawn(move || {
                // Audio stream must live on this thread
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                while let Some(command) = rx.blocking_recv() {
                    match command {
                        AudioCommand::Play { path, reply } => {
                            debug!("Audio Thread: starting {}", path.display());
                            let _ = reply.send(start_clip(&handle, &path, volume));
                        }
                    }
                }
                debug!("Audio Thread: command channel closed");
            })?;

        ready_rx
            .recv()
            .map_err(|_| KioskError::AudioDevice("audio thread exited during startup".into()))??;

        Ok(Self { tracks, tx })
    }
}

fn start_clip(handle: &OutputStreamHandle, path: &Path, volume: f32) -> KioskResult<Arc<Sink>> {
    let file = BufReader::new(File::open(path)?);
    let source = Decoder::new(file)?;
    let sink = Sink::try_new(handle)?;
    sink.set_volume(volume);
    sink.append(source.convert_samples::<f32>());
    Ok(Arc::new(sink))
}

struct SinkClip(Arc<Sink>);

impl ClipHandle for SinkClip {
    fn stop(&self) {
        self.0.stop();
    }
}

#[async_trait::async_trait]
impl TrackSource for SpeakerSource {
    fn id(&self) -> &'static str {
        "rodio"
    }

    fn list_tracks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracks.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn open(&self, track_id: &str) -> KioskResult<PreparedClip> {
        let path = self
            .tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| KioskError::TrackNotFound(track_id.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AudioCommand::Play {
                path,
                reply: reply_tx,
            })
            .map_err(|_| KioskError::AudioDevice("audio thread is not running".into()))?;

        let sink = reply_rx
            .await
            .map_err(|_| KioskError::Playback("audio thread dropped the request".into()))??;

        let (done_tx, done_rx) = oneshot::channel();
        let watched = sink.clone();
        let id = track_id.to_string();
        tokio::spawn(async move {
            while !watched.empty() {
                if done_tx.is_closed() {
                    return;
                }
                tokio::time::sleep(SINK_POLL).await;
            }
            if done_tx.send(ClipOutcome::Completed).is_err() {
                debug!("Speaker: completion of '{}' went unobserved", id);
            }
        });

        Ok(PreparedClip {
            handle: Box::new(SinkClip(sink)),
            finished: done_rx,
        })
    }
}
