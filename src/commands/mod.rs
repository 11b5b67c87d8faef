//! Subcommands and the setup they share

use std::path::Path;

use modelrt_runtime::{LogFormat, LoggingConfig, RuntimeConfig, RuntimeError};

pub mod inspect;
pub mod predict;

/// Defaults, then the optional TOML file, then environment variables
pub fn load_config(path: Option<&Path>) -> RuntimeConfig {
    let base = match path {
        Some(path) => RuntimeConfig::from_file(path),
        None => Ok(RuntimeConfig::default()),
    };
    let config = base
        .and_then(RuntimeConfig::with_env_overrides)
        .and_then(|config| config.validate().map(|_| config));

    match config {
        Ok(config) => config,
        Err(e) => fail(&RuntimeError::from(e)),
    }
}

/// Install the fmt subscriber; `RUST_LOG` wins over the configured level
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Read a file or exit with an internal error body
pub fn read_file(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| {
        fail(&RuntimeError::Internal(format!(
            "failed to read {}: {}",
            path.display(),
            e
        )))
    })
}

/// Print the structured error body and exit 1
pub fn fail(error: &RuntimeError) -> ! {
    match serde_json::to_string_pretty(&error.to_body()) {
        Ok(body) => eprintln!("{}", body),
        Err(_) => eprintln!("Error: {}", error),
    }
    std::process::exit(1);
}

/// Print a JSON document to stdout
pub fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(&RuntimeError::Internal(format!("failed to encode output: {}", e))),
    }
}
