use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::capture::encode_wav;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
        }
    }
}

/// Fired by a sink once the last frame of a clip has been played.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: oneshot::Sender<()>,
}

impl CompletionSignal {
    pub fn complete(self) {
        // The receiver may already be gone if nobody waits for this clip.
        let _ = self.tx.send(());
    }
}

/// Resolves when playback of one clip ends naturally. There is no timeout.
#[derive(Debug)]
pub struct PlaybackCompletion {
    rx: oneshot::Receiver<()>,
}

impl PlaybackCompletion {
    pub fn pair() -> (CompletionSignal, PlaybackCompletion) {
        let (tx, rx) = oneshot::channel();
        (CompletionSignal { tx }, PlaybackCompletion { rx })
    }

    /// A completion that has already fired.
    pub fn ready() -> Self {
        let (signal, completion) = Self::pair();
        signal.complete();
        completion
    }

    pub async fn finished(self) {
        if self.rx.await.is_err() {
            warn!("playback sink dropped its completion signal; treating clip as finished");
        }
    }
}

/// Plays clips in two steps. `prepare` may block on decoding and opening the
/// device; `start` must return at once.
pub trait PlaybackSink: Send + Sync {
    fn prepare(&self, audio: Arc<[u8]>) -> Result<Box<dyn PreparedClip>>;
}

/// A clip ready to be heard. Dropping it without `start` releases the device
/// silently.
pub trait PreparedClip: Send {
    fn start(self: Box<Self>) -> Result<PlaybackCompletion>;
}

pub trait CaptureSource: Send + Sync {
    fn begin_capture(&self) -> Result<Box<dyn CaptureHandle>>;
}

pub trait CaptureHandle: Send {
    /// Ends the capture and returns the encoded recording.
    fn stop(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Silent backend: playback finishes at once, capture yields a short silent WAV.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend {
    pub config: StreamConfig,
}

impl PlaybackSink for NullBackend {
    fn prepare(&self, audio: Arc<[u8]>) -> Result<Box<dyn PreparedClip>> {
        debug!(bytes = audio.len(), "null sink preparing clip");
        Ok(Box::new(NullClip))
    }
}

struct NullClip;

impl PreparedClip for NullClip {
    fn start(self: Box<Self>) -> Result<PlaybackCompletion> {
        Ok(PlaybackCompletion::ready())
    }
}

impl CaptureSource for NullBackend {
    fn begin_capture(&self) -> Result<Box<dyn CaptureHandle>> {
        debug!(config = ?self.config, "opening null capture");
        Ok(Box::new(NullCapture {
            config: self.config,
        }))
    }
}

struct NullCapture {
    config: StreamConfig,
}

impl CaptureHandle for NullCapture {
    fn stop(self: Box<Self>) -> Result<Vec<u8>> {
        let frames = (self.config.sample_rate / 10) as usize;
        let silence = vec![0.0f32; frames * self.config.channels as usize];
        encode_wav(&silence, &self.config)
    }
}
