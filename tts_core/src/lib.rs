//! Text-to-speech for generated stories.
//!
//! Synthesis runs in an isolated worker thread reached through a
//! [`SynthesisChannel`]; finished audio comes back as a [`MediaHandle`]
//! whose file is released exactly once.

mod channel;
mod error;
mod media;
mod protocol;
mod service;
mod wav;
mod worker;
#[cfg(test)]
mod test_support;

pub use channel::{ChannelConfig, SynthesisChannel, DEFAULT_SYNTHESIS_TIMEOUT};
pub use error::{MediaError, SynthesisError};
pub use media::{AudioSink, MediaHandle, MediaSlots, MemorySink};
pub use protocol::{
    FailureKind, ProtocolViolation, Reply, ResourceRef, WorkerRequest, WorkerResponse,
};
pub use service::{
    AudioFormat, AudioPayload, OpenAiSpeechClient, SynthesisService, DEFAULT_TTS_MODEL,
    DEFAULT_VOICE,
};
pub use wav::{read_wav_info, AudioInfo};
pub use worker::{spawn_worker, WorkerLink};
