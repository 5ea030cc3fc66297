//! Process-wide tracing subscriber.
//!
//! Records from the index crate go through the `log` facade and are picked up
//! by `tracing-subscriber`'s log bridge, so both crates end up in one stream.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogConfig, LogFormat};
use crate::error::{ServiceError, ServiceResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the filter from `RUST_LOG` when set, otherwise from the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &LogConfig) -> ServiceResult<()> {
    let mut layers: Vec<BoxedLayer> = vec![match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stdout).boxed(),
        LogFormat::Plain => fmt::layer().with_writer(std::io::stdout).boxed(),
    }];

    if let Some(path) = &config.file_path {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = Mutex::new(file);
        layers.push(match config.format {
            LogFormat::Json => fmt::layer().json().with_ansi(false).with_writer(writer).boxed(),
            LogFormat::Plain => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&config.level))
        .try_init()
        .map_err(|error| ServiceError::Logging(error.to_string()))?;

    if let Some(path) = &config.file_path {
        tracing::info!(log_file = %path.display(), "logging to file");
    }
    Ok(())
}
