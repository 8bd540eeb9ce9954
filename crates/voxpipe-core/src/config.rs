use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub recognition: RecognitionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Capture/playback buffer size in samples. When absent, the device's
    /// reported minimum is used.
    #[serde(default)]
    pub buffer_size: Option<u32>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sample_rate: default_sample_rate(),
            buffer_size: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_device_name")]
    pub input_device: String,

    #[serde(default = "default_device_name")]
    pub output_device: String,

    /// Play captured microphone audio back through the output device.
    #[serde(default)]
    pub monitor: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: default_device_name(),
            output_device: default_device_name(),
            monitor: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecognitionSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Per-call API key. Usually written as "${VOXPIPE_API_KEY}" so the
    /// secret stays out of the config file.
    #[serde(default)]
    pub api_key: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            language: default_language(),
            api_key: String::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> u32 {
    crate::types::SAMPLE_RATE
}

fn default_device_name() -> String {
    "default".to_string()
}

fn default_endpoint() -> String {
    "wss://aiq.skelterlabs.com:443".to_string()
}

fn default_language() -> String {
    "ko-KR".to_string()
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = input.to_string();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let value = std::env::var(var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        Ok(config)
    }
}
