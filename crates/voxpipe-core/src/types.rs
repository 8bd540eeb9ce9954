use serde::{Deserialize, Serialize};

/// Fixed capture/playback sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Fixed channel count (mono).
pub const CHANNELS: u16 = 1;

/// One buffer of signed 16-bit little-endian PCM samples.
///
/// Frames are produced by the capture callback and handed through the
/// pipeline by value; nothing retains a frame after forwarding it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Serialize samples as little-endian bytes, the format the recognition
    /// service expects for LINEAR16 audio content.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    /// Frame duration in seconds at its own sample rate.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Recognition configuration, sent exactly once as the first message of a
/// session. Field names follow the service's wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: String,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    #[serde(default)]
    pub speech_context_id: String,
    #[serde(default)]
    pub substitution_rule_id: String,
}

impl RecognitionConfig {
    /// LINEAR16 config at the fixed pipeline sample rate.
    pub fn linear16(language_code: &str) -> Self {
        Self {
            encoding: "LINEAR16".to_string(),
            sample_rate_hertz: SAMPLE_RATE,
            language_code: language_code.to_string(),
            speech_context_id: String::new(),
            substitution_rule_id: String::new(),
        }
    }
}

/// One transcription result delivered by the service. Only the
/// highest-confidence alternative survives parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub confidence: f64,
    pub is_final: bool,
}
