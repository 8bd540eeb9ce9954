//! JSON wire messages exchanged with the recognition service.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use voxpipe_core::{RecognitionConfig, RecognitionResult, SessionError};

// ── Outbound ──────────────────────────────────────────────────

/// Everything the client ever sends: exactly one `Config`, then audio.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Config(RecognitionConfig),
    AudioChunk(Vec<u8>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfigRequest {
    pub streaming_config: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub config: RecognitionConfig,
}

impl OutboundMessage {
    /// Config goes out as a JSON text frame, audio as a raw binary frame.
    pub fn into_ws_message(self) -> Result<Message, SessionError> {
        match self {
            OutboundMessage::Config(config) => {
                let request = StreamingConfigRequest {
                    streaming_config: StreamingConfig { config },
                };
                Ok(Message::Text(serde_json::to_string(&request)?))
            }
            OutboundMessage::AudioChunk(bytes) => Ok(Message::Binary(bytes)),
        }
    }
}

// ── Inbound ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechAlternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResult {
    /// Alternatives ranked by confidence; only the first one is consumed.
    #[serde(default)]
    pub alternatives: Vec<SpeechAlternative>,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingRecognizeResponse {
    #[serde(default)]
    pub results: Vec<StreamingResult>,
}

/// Parse one service message into results, keeping the top alternative of
/// each and preserving result order. Results without alternatives are
/// skipped.
pub fn parse_response(text: &str) -> Result<Vec<RecognitionResult>, SessionError> {
    let response: StreamingRecognizeResponse = serde_json::from_str(text)?;
    let mut results = Vec::with_capacity(response.results.len());
    for result in response.results {
        let is_final = result.is_final;
        if let Some(top) = result.alternatives.into_iter().next() {
            results.push(RecognitionResult {
                transcript: top.transcript,
                confidence: top.confidence,
                is_final,
            });
        }
    }
    Ok(results)
}
