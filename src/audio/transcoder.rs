//! # Window Transcoder
//!
//! Turns a raw PCM window into an in-memory WAV container that speech services accept.
//!
//! ## Input format:
//! - **Encoding**: little-endian signed integers
//! - **Sample width**: 2 bytes (16-bit)
//! - **Channels**: mono
//!
//! Encoding is pure and deterministic. The only failure is a window whose length is
//! not a whole number of samples, which is reported instead of being truncated.

use crate::audio::Window;
use crate::config::AudioConfig;
use crate::error::PipelineError;
use byteorder::{ByteOrder, LittleEndian};
use std::io::Cursor;

/// A self-describing audio payload ready for the transcription service.
#[derive(Debug, Clone)]
pub struct AudioContainer {
    /// Complete RIFF/WAVE file bytes
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl AudioContainer {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }

    pub fn mime_type(&self) -> String {
        format!("audio/wav; rate={}", self.sample_rate)
    }
}

/// Encodes windows for one fixed audio format.
#[derive(Debug, Clone)]
pub struct WindowTranscoder {
    sample_rate: u32,
    sample_width: u16,
    channels: u16,
}

impl WindowTranscoder {
    #[cfg(test)]
    pub fn new(sample_rate: u32, sample_width: u16) -> Self {
        Self {
            sample_rate,
            sample_width,
            channels: 1,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            sample_width: config.sample_width,
            channels: config.channels,
        }
    }

    /// Decode the window's 16-bit samples and serialize them as a WAV file.
    pub fn encode(&self, window: &Window) -> Result<AudioContainer, PipelineError> {
        let bytes = window.as_bytes();
        let width = self.sample_width as usize;

        if width != 2 || bytes.len() % width != 0 {
            return Err(PipelineError::Format {
                len: bytes.len(),
                sample_width: self.sample_width,
            });
        }

        let mut samples = vec![0i16; bytes.len() / width];
        LittleEndian::read_i16_into(bytes, &mut samples);
        let sample_count = samples.len();

        let header = wav::Header::new(
            wav::header::WAV_FORMAT_PCM,
            self.channels,
            self.sample_rate,
            self.sample_width * 8,
        );

        let mut cursor = Cursor::new(Vec::with_capacity(bytes.len() + 44));
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut cursor)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;

        Ok(AudioContainer {
            bytes: cursor.into_inner(),
            sample_rate: self.sample_rate,
            sample_count,
        })
    }
}
