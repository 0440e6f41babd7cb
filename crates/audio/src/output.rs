use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tracing::{debug, warn};

use crate::backend::{PlaybackCompletion, PlaybackSink, PreparedClip};
use crate::devices::{find_device, Direction};
use crate::io::{AudioDecoder, AudioReader};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Time given to the device to flush its last buffer before the stream is dropped.
const FLUSH_TAIL: Duration = Duration::from_millis(50);

/// Plays clips on a cpal output device, one stream per clip.
#[derive(Clone, Debug, Default)]
pub struct CpalSink {
    device_name: Option<String>,
}

impl CpalSink {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl PlaybackSink for CpalSink {
    /// Decodes the clip and opens a paused stream on a dedicated thread.
    /// Blocks until the stream exists.
    fn prepare(&self, audio: Arc<[u8]>) -> Result<Box<dyn PreparedClip>> {
        let clip = AudioDecoder::decode(&audio[..], None).context("decode clip for playback")?;
        debug!(
            frames = clip.frames(),
            sample_rate = clip.sample_rate,
            channels = clip.channels,
            "preparing clip playback"
        );
        let (signal, completion) = PlaybackCompletion::pair();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        thread::Builder::new()
            .name("sprout-playback".into())
            .spawn(move || {
                let finished = Arc::new(AtomicBool::new(false));
                let stream = match open_output(device_name.as_deref(), clip, finished.clone()) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                if go_rx.recv().is_err() {
                    debug!("prepared clip dropped before it started");
                    return;
                }
                if let Err(err) = stream.play() {
                    warn!(%err, "failed to start output stream");
                    return;
                }
                while !finished.load(Ordering::Acquire) {
                    thread::sleep(POLL_INTERVAL);
                }
                thread::sleep(FLUSH_TAIL);
                drop(stream);
                signal.complete();
            })
            .context("spawn playback thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("playback thread exited before the stream opened"))??;
        Ok(Box::new(CpalClip {
            go: go_tx,
            completion,
        }))
    }
}

struct CpalClip {
    go: mpsc::Sender<()>,
    completion: PlaybackCompletion,
}

impl PreparedClip for CpalClip {
    fn start(self: Box<Self>) -> Result<PlaybackCompletion> {
        self.go
            .send(())
            .map_err(|_| anyhow!("playback thread exited before the clip started"))?;
        Ok(self.completion)
    }
}

/// Walks the decoded clip at the device rate, mapping channels by index.
struct ClipCursor {
    clip: AudioReader,
    position: f64,
    step: f64,
    finished: Arc<AtomicBool>,
}

impl ClipCursor {
    fn new(clip: AudioReader, device_rate: u32, finished: Arc<AtomicBool>) -> Self {
        let step = clip.sample_rate as f64 / device_rate.max(1) as f64;
        Self {
            clip,
            position: 0.0,
            step,
            finished,
        }
    }

    fn fill(&mut self, frame: &mut [f32]) {
        let index = self.position as usize;
        if index >= self.clip.frames() {
            frame.fill(0.0);
            self.finished.store(true, Ordering::Release);
            return;
        }
        let channels = self.clip.channels.max(1) as usize;
        let base = index * channels;
        for (channel, out) in frame.iter_mut().enumerate() {
            *out = self.clip.samples[base + channel.min(channels - 1)];
        }
        self.position += self.step;
    }
}

fn open_output(
    target: Option<&str>,
    clip: AudioReader,
    finished: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let device = find_device(Direction::Output, target)
        .ok_or_else(|| anyhow!("no audio output device available"))?;
    let supported = device
        .default_output_config()
        .context("query output config")?;
    let config: cpal::StreamConfig = supported.config();
    let cursor = ClipCursor::new(clip, config.sample_rate.0, finished);
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, cursor)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, cursor)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, cursor)?,
        other => bail!("unsupported output sample format {other:?}"),
    };
    // Some hosts run a stream as soon as it is built.
    if let Err(err) = stream.pause() {
        debug!(%err, "output stream cannot be paused before start");
    }
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut cursor: ClipCursor,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut frame = vec![0.0f32; channels];
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            for out in data.chunks_mut(channels) {
                cursor.fill(&mut frame);
                for (dst, &src) in out.iter_mut().zip(frame.iter()) {
                    *dst = T::from_sample(src);
                }
            }
        },
        |err| warn!(%err, "output stream error"),
        None,
    )?;
    Ok(stream)
}
