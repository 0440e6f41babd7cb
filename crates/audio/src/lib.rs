pub mod backend;
pub mod capture;
pub mod devices;
pub mod dsp;
pub mod io;
pub mod output;

pub use backend::{
    CaptureHandle, CaptureSource, CompletionSignal, NullBackend, PlaybackCompletion,
    PlaybackSink, PreparedClip, StreamConfig,
};
pub use capture::{encode_wav, CpalCapture};
pub use devices::{device_names, Direction};
pub use dsp::{normalize_buffer, PeakLevel};
pub use io::{AudioDecoder, AudioReader};
pub use output::CpalSink;
