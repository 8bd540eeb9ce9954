pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, AudioConfig, GeneralConfig, RecognitionSettings};
pub use error::{AudioError, ConfigError, SessionError};
pub use types::{AudioFrame, RecognitionConfig, RecognitionResult, CHANNELS, SAMPLE_RATE};
