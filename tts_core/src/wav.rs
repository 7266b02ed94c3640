use std::io::Cursor;

use anyhow::Context;

/// What the WAV header says about a synthesized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub duration_ms: u64,
}

/// Read sample rate and duration from an in-memory RIFF/WAV payload.
pub fn read_wav_info(bytes: &[u8]) -> anyhow::Result<AudioInfo> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).context("payload is not a WAV file")?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        anyhow::bail!("WAV header declares a zero sample rate");
    }

    // duration() counts frames, so it is independent of the channel count
    let frames = u64::from(reader.duration());
    let duration_ms = frames * 1000 / u64::from(spec.sample_rate);

    Ok(AudioInfo {
        sample_rate: spec.sample_rate,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::encode_wav;

    #[test]
    fn test_wav_info_one_second_mono() {
        let bytes = encode_wav(&vec![0.0f32; 24_000], 24_000).unwrap();
        assert_eq!(
            read_wav_info(&bytes).unwrap(),
            AudioInfo { sample_rate: 24_000, duration_ms: 1000 }
        );
    }

    #[test]
    fn test_wav_info_half_second() {
        let bytes = encode_wav(&vec![0.25f32; 11_025], 22_050).unwrap();
        assert_eq!(read_wav_info(&bytes).unwrap().duration_ms, 500);
    }

    #[test]
    fn test_wav_info_rejects_non_wav() {
        assert!(read_wav_info(b"ID3\x04not a wav").is_err());
    }
}
