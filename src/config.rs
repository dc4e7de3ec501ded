//! # Configuration Management
//!
//! Loads the capture server configuration from several layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` in the working directory
//! - Environment variables with the `APP_` prefix
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (plain variables set by deployment platforms)
//! 2. `APP_` variables, nested keys separated by `__`
//!    (e.g. `APP_STORAGE__OUTPUT_DIR=/srv/captures`)
//! 3. `config.toml`
//! 4. Defaults
//!
//! The audio section is fixed for the life of the process: clients do not
//! negotiate sample rate or format, they stream mono `f32` samples and the
//! server decides how the container is written.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
}

/// Listener and connection settings.
///
/// ## Fields:
/// - `host` / `port`: bind address. The capture protocol has always lived on 8081.
/// - `workers`: actix worker threads. One worker means a single event loop
///   serving every connection.
/// - `max_frame_bytes`: largest WebSocket frame accepted (one audio message).
/// - `heartbeat_interval_secs`: how often the server pings each client.
/// - `client_timeout_secs`: silence after which a client is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_frame_bytes: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

/// Where captures land.
///
/// `scratch_dir` defaults to a hidden directory inside `output_dir` so that
/// committing a capture is a same-volume rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub reset_on_startup: bool,
}

/// Sample encoding used when writing containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit signed integer PCM (WAV format tag 1)
    Int16,
    /// 32-bit IEEE float (WAV format tag 3)
    Float32,
}

impl SampleFormat {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        }
    }
}

/// Container settings. Channel count is always 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
                workers: 1,
                max_frame_bytes: 16 * 1024 * 1024,
                heartbeat_interval_secs: 15,
                client_timeout_secs: 60,
            },
            storage: StorageConfig {
                output_dir: PathBuf::from("../data"),
                scratch_dir: None,
                reset_on_startup: true,
            },
            audio: AudioConfig {
                sample_rate: 44_100,
                sample_format: SampleFormat::Int16,
            },
        }
    }
}

impl StorageConfig {
    /// Directory holding in-progress captures.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".scratch"))
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=9000`
    /// - `APP_STORAGE__RESET_ON_STARTUP=false`
    /// - `APP_AUDIO__SAMPLE_FORMAT=float32`
    /// - `HOST=127.0.0.1`, `PORT=9000`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.workers == 0 {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        if self.server.max_frame_bytes < 4 {
            return Err(anyhow::anyhow!(
                "Max frame size must hold at least one sample (4 bytes)"
            ));
        }

        if self.server.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.server.client_timeout_secs <= self.server.heartbeat_interval_secs {
            return Err(anyhow::anyhow!(
                "Client timeout ({}s) must be longer than the heartbeat interval ({}s)",
                self.server.client_timeout_secs,
                self.server.heartbeat_interval_secs
            ));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.storage.output_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Output directory must not be empty"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
