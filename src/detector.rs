//! Brightness-based presence heuristic.
//!
//! A front camera frame whose sampled luma average sits in a plausible
//! range is taken as "someone is standing there". Crude, but cheap enough
//! for old tablets.

use crate::presence::PresenceSignal;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const SAMPLE_WINDOW: usize = 1000;
const SAMPLE_STRIDE: usize = 10;

/// 160x120 luma plane.
pub const DEFAULT_FRAME_LEN: usize = 160 * 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessDetector {
    min: u8,
    max: u8,
}

impl Default for BrightnessDetector {
    fn default() -> Self {
        Self::new(30, 200)
    }
}

impl BrightnessDetector {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Mean of every 10th byte in the first 1000 bytes.
    pub fn average_brightness(luma: &[u8]) -> Option<u64> {
        let window = &luma[..luma.len().min(SAMPLE_WINDOW)];
        let (sum, count) = window
            .iter()
            .step_by(SAMPLE_STRIDE)
            .fold((0u64, 0u64), |(sum, count), &b| (sum + b as u64, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count)
        }
    }

    pub fn detect(&self, luma: &[u8]) -> bool {
        match Self::average_brightness(luma) {
            Some(avg) => {
                trace!("Detector: average brightness {}", avg);
                (self.min as u64..=self.max as u64).contains(&avg)
            }
            None => false,
        }
    }

    /// Runs the heuristic and pulses `presence` on a hit.
    pub fn process_frame(&self, luma: &[u8], presence: &PresenceSignal) -> bool {
        let hit = self.detect(luma);
        if hit {
            presence.report_pulse();
        }
        hit
    }
}

/// Opens a frame feed. FIFOs are opened non-blocking so a missing or idle
/// writer never pins a thread.
async fn open_feed(path: &Path) -> io::Result<Box<dyn AsyncRead + Unpin + Send>> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.file_type().is_fifo() {
            let mut options = tokio::net::unix::pipe::OpenOptions::new();
            // Keep the pipe open across writer restarts instead of seeing EOF
            #[cfg(target_os = "linux")]
            options.read_write(true);
            return Ok(Box::new(options.open_receiver(path)?));
        }
    }
    Ok(Box::new(tokio::fs::File::open(path).await?))
}

/// Feeds raw fixed-size luma frames from a file or FIFO into the detector.
///
/// Ends at EOF, on a read error, or once `cancel` fires. No pulse is
/// reported after cancellation.
pub fn spawn_frame_reader(
    path: PathBuf,
    frame_len: usize,
    detector: BrightnessDetector,
    presence: PresenceSignal,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut feed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            opened = open_feed(&path) => match opened {
                Ok(feed) => feed,
                Err(e) => {
                    warn!("Detector: cannot open frame feed {}: {}", path.display(), e);
                    return;
                }
            },
        };
        info!("Detector: reading {}-byte frames from {}", frame_len, path.display());

        let mut frame = vec![0u8; frame_len];
        let mut frames = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Detector: frame feed stopped after {} frames", frames);
                    break;
                }
                read = feed.read_exact(&mut frame) => match read {
                    Ok(_) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        frames += 1;
                        detector.process_frame(&frame, &presence);
                    }
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        debug!("Detector: frame feed ended after {} frames", frames);
                        break;
                    }
                    Err(e) => {
                        warn!("Detector: frame feed error: {}", e);
                        break;
                    }
                },
            }
        }
    })
}
