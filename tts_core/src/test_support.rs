//! Scripted synthesis service for unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SynthesisError;
use crate::service::{AudioFormat, AudioPayload, SynthesisService};

/// Encode mono f32 samples as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[derive(Debug, Clone)]
enum Outcome {
    Speak(Duration, AudioFormat),
    Fail { status: Option<u16>, message: String },
}

/// Answers each text according to its script entry.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSynth {
    scripts: HashMap<String, Outcome>,
}

impl ScriptedSynth {
    pub const SAMPLE_RATE: u32 = 8_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed for `text` after `delay`.
    pub fn speak(mut self, text: &str, delay: Duration) -> Self {
        self.scripts.insert(text.to_string(), Outcome::Speak(delay, AudioFormat::Wav));
        self
    }

    /// Succeed for `text` with the same bytes labelled as `format`.
    pub fn speak_as(mut self, text: &str, format: AudioFormat) -> Self {
        self.scripts.insert(text.to_string(), Outcome::Speak(Duration::ZERO, format));
        self
    }

    pub fn fail_status(mut self, text: &str, status: u16, message: &str) -> Self {
        self.scripts.insert(
            text.to_string(),
            Outcome::Fail { status: Some(status), message: message.to_string() },
        );
        self
    }

    pub fn fail_network(mut self, text: &str, message: &str) -> Self {
        self.scripts.insert(
            text.to_string(),
            Outcome::Fail { status: None, message: message.to_string() },
        );
        self
    }

    /// The audio this service produces for `text`; distinct per text.
    pub fn audio_for(text: &str) -> Vec<u8> {
        let level = text.bytes().map(f32::from).sum::<f32>() % 100.0 / 100.0;
        let frames = 800 * text.len().max(1);
        encode_wav(&vec![level; frames], Self::SAMPLE_RATE).unwrap()
    }
}

#[async_trait]
impl SynthesisService for ScriptedSynth {
    async fn synthesize(&self, text: &str, _credentials: &str) -> Result<AudioPayload, SynthesisError> {
        match self.scripts.get(text) {
            Some(Outcome::Speak(delay, format)) => {
                tokio::time::sleep(*delay).await;
                Ok(AudioPayload {
                    bytes: Self::audio_for(text),
                    format: *format,
                })
            }
            Some(Outcome::Fail { status: Some(status), message }) => Err(SynthesisError::HttpStatus {
                status: *status,
                message: message.clone(),
            }),
            Some(Outcome::Fail { status: None, message }) => {
                Err(SynthesisError::Network(message.clone()))
            }
            None => Err(SynthesisError::Remote(format!("no script for {text:?}"))),
        }
    }
}
