//! talkback-audio – Audio-Pipeline des Clients
//!
//! - Mikrofon-Aufnahme via cpal, Opus-Kodierung in 20 ms Frames
//! - Transkodierung einer Aeusserung zu 16-bit Mono-PCM
//! - Lueckenlose Wiedergabe eingehender PCM-Stuecke
//! - Geraeteauswahl ueber Namensteile

pub mod capture;
pub mod codec;
pub mod container;
pub mod device;
pub mod error;
pub mod input;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod scheduler;
pub mod sink;
pub mod transcode;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{
    AudioInput, CaptureController, CaptureHandle, CaptureProgress, CaptureSettings, InputFormat,
    MockFehler, MockInput,
};
pub use codec::{OpusDecoder, OpusEncoder};
pub use container::{decode_container, CapturedUtterance, ContainerCodec, DecodedAudio};
pub use device::{list_devices, AudioDevice, Richtung};
pub use error::{AudioError, AudioResult, CaptureError, PlaybackError, TranscodeError};
pub use input::{CaptureConfig, CpalInput};
pub use pcm::PcmBuffer;
pub use playback::{CpalSink, PlaybackConfig};
pub use scheduler::{PlaybackStats, SchedulerConfig, StreamingPlaybackScheduler};
pub use sink::{BufferId, ManualSink, PlaybackEvent, PlaybackEventReceiver, PlaybackSink};
pub use transcode::PcmTranscoder;
