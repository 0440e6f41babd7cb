use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::{info, warn};

use crate::backend::{CaptureHandle, CaptureSource, StreamConfig};
use crate::devices::{find_device, Direction};
use crate::dsp::normalize_buffer;

const DRAIN_INTERVAL: Duration = Duration::from_millis(20);
const RING_SECONDS: usize = 2;
const NORMALIZE_TARGET: f32 = 0.9;

/// Encodes interleaved samples as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], config: &StreamConfig) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: config.channels.max(1),
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("start WAV stream")?;
        for &sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize().context("finalize WAV stream")?;
    }
    Ok(cursor.into_inner())
}

/// Records from a cpal input device until the handle is stopped.
#[derive(Clone, Debug, Default)]
pub struct CpalCapture {
    device_name: Option<String>,
    normalize: bool,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>, normalize: bool) -> Self {
        Self {
            device_name,
            normalize,
        }
    }
}

impl CaptureSource for CpalCapture {
    fn begin_capture(&self) -> Result<Box<dyn CaptureHandle>> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<StreamConfig>>();
        let device_name = self.device_name.clone();
        let normalize = self.normalize;
        let worker_stop = stop.clone();

        let worker = thread::Builder::new()
            .name("sprout-capture".into())
            .spawn(move || record(device_name.as_deref(), normalize, &worker_stop, ready_tx))
            .context("spawn capture thread")?;

        let config = ready_rx
            .recv()
            .map_err(|_| anyhow!("capture thread exited before the stream started"))??;
        info!(?config, "capture started");
        Ok(Box::new(CpalCaptureHandle {
            stop,
            worker: Some(worker),
        }))
    }
}

struct CpalCaptureHandle {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<Result<Vec<u8>>>>,
}

impl CaptureHandle for CpalCaptureHandle {
    fn stop(mut self: Box<Self>) -> Result<Vec<u8>> {
        self.stop.store(true, Ordering::Release);
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("capture already stopped"))?;
        worker
            .join()
            .map_err(|_| anyhow!("capture thread panicked"))?
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn record(
    target: Option<&str>,
    normalize: bool,
    stop: &AtomicBool,
    ready: mpsc::Sender<Result<StreamConfig>>,
) -> Result<Vec<u8>> {
    let overruns = Arc::new(AtomicUsize::new(0));
    let (stream, mut consumer, config) = match open_input(target, overruns.clone()) {
        Ok(opened) => opened,
        Err(err) => {
            let message = format!("{err:#}");
            let _ = ready.send(Err(err));
            bail!(message);
        }
    };
    let _ = ready.send(Ok(config));

    let mut samples = Vec::new();
    while !stop.load(Ordering::Acquire) {
        samples.extend(consumer.pop_iter());
        thread::sleep(DRAIN_INTERVAL);
    }
    drop(stream);
    samples.extend(consumer.pop_iter());

    let dropped = overruns.load(Ordering::Relaxed);
    if dropped > 0 {
        warn!(dropped, "capture ring buffer overran");
    }
    if normalize {
        normalize_buffer(&mut samples, NORMALIZE_TARGET);
    }
    info!(samples = samples.len(), "capture finished");
    encode_wav(&samples, &config)
}

fn open_input(
    target: Option<&str>,
    overruns: Arc<AtomicUsize>,
) -> Result<(cpal::Stream, HeapConsumer<f32>, StreamConfig)> {
    let device = find_device(Direction::Input, target)
        .ok_or_else(|| anyhow!("no audio input device available"))?;
    let supported = device
        .default_input_config()
        .context("query input config")?;
    let config: cpal::StreamConfig = supported.config();
    let capacity = config.sample_rate.0 as usize * config.channels as usize * RING_SECONDS;
    let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, producer, overruns)?,
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, producer, overruns)?,
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, producer, overruns)?,
        other => bail!("unsupported input sample format {other:?}"),
    };
    stream.play().context("start input stream")?;
    Ok((
        stream,
        consumer,
        StreamConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        },
    ))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProducer<f32>,
    overruns: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _| {
            for &sample in data {
                if producer.push(f32::from_sample(sample)).is_err() {
                    overruns.fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        |err| warn!(%err, "input stream error"),
        None,
    )?;
    Ok(stream)
}
