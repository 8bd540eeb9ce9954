use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxpipe_audio::{CpalCapture, CpalPlayback};
use voxpipe_core::RecognitionConfig;
use voxpipe_pipeline::{ControllerConfig, SessionController};
use voxpipe_session::api_key_provider;

#[derive(Parser)]
#[command(name = "voxpipe", about = "Streaming speech recognition from the microphone")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured recognition language code
    #[arg(short, long)]
    language: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }

    let config = voxpipe_core::AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("voxpipe starting");

    let language = cli
        .language
        .as_deref()
        .unwrap_or(&config.recognition.language);

    let controller = SessionController::new(
        ControllerConfig {
            endpoint: config.recognition.endpoint.clone(),
            recognition: RecognitionConfig::linear16(language),
            monitor: config.audio.monitor,
        },
        api_key_provider(&config.recognition.api_key),
        Box::new(CpalCapture::new(
            &config.audio.input_device,
            config.general.sample_rate,
            config.general.buffer_size,
        )),
        Box::new(CpalPlayback::new(
            &config.audio.output_device,
            config.general.sample_rate,
            config.general.buffer_size,
        )),
        Arc::new(|result| {
            if result.is_final {
                println!("{}", result.transcript);
            } else {
                tracing::debug!(confidence = result.confidence, "partial: {}", result.transcript);
            }
        }),
        Arc::new(|e| tracing::error!("recognition stream failed: {e}")),
    );

    controller.start().await.context("failed to start pipeline")?;
    tracing::info!("listening — press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    tracing::info!("shutting down");
    controller.stop().await;

    Ok(())
}

fn list_devices() -> Result<()> {
    let manager = voxpipe_audio::DeviceManager::new();

    println!("Input devices:");
    for (name, _) in manager
        .list_input_devices()
        .context("failed to enumerate input devices")?
    {
        println!("  - {name}");
    }

    println!("Output devices:");
    for (name, _) in manager
        .list_output_devices()
        .context("failed to enumerate output devices")?
    {
        println!("  - {name}");
    }

    Ok(())
}
