use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;

/// Bytes per mono S16LE sample.
pub const BYTES_PER_SAMPLE: usize = 2;

#[derive(Debug, Clone)]
pub struct Config {
    // Network
    pub ws_url: String,
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub beta_header: String,
    pub connect_timeout_ms: u64,
    pub reconnect_attempts: u32,

    // Audio
    pub capture_device: String,
    pub playback_device: String,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub reengage_delay_ms: u64,
    /// 0 means unbounded.
    pub frame_queue_capacity: usize,

    // Session
    pub modalities: Vec<String>,
    pub instructions: String,

    // Recording
    pub recording_enabled: bool,
    pub recording_dir: PathBuf,
    pub recording_prefix: String,

    pub join_timeout_ms: u64,
}

impl Config {
    /// Build the configuration from values baked in at compile time.
    /// All of them come from `config.toml` through `build.rs`.
    pub fn new() -> Result<Self> {
        Ok(Self {
            ws_url: env!("WS_URL").to_string(),
            api_key_env: env!("API_KEY_ENV").to_string(),
            api_key: None,
            beta_header: env!("BETA_HEADER").to_string(),
            connect_timeout_ms: env!("CONNECT_TIMEOUT_MS")
                .parse()
                .context("Failed to parse CONNECT_TIMEOUT_MS")?,
            reconnect_attempts: env!("RECONNECT_ATTEMPTS")
                .parse()
                .context("Failed to parse RECONNECT_ATTEMPTS")?,

            capture_device: env!("CAPTURE_DEVICE").to_string(),
            playback_device: env!("PLAYBACK_DEVICE").to_string(),
            sample_rate: env!("SAMPLE_RATE")
                .parse()
                .context("Failed to parse SAMPLE_RATE")?,
            chunk_size: env!("CHUNK_SIZE")
                .parse()
                .context("Failed to parse CHUNK_SIZE")?,
            reengage_delay_ms: env!("REENGAGE_DELAY_MS")
                .parse()
                .context("Failed to parse REENGAGE_DELAY_MS")?,
            frame_queue_capacity: env!("FRAME_QUEUE_CAPACITY")
                .parse()
                .context("Failed to parse FRAME_QUEUE_CAPACITY")?,

            modalities: parse_list(env!("SESSION_MODALITIES")),
            instructions: env!("SESSION_INSTRUCTIONS").to_string(),

            recording_enabled: env!("RECORDING_ENABLED")
                .parse()
                .context("Failed to parse RECORDING_ENABLED")?,
            recording_dir: PathBuf::from(env!("RECORDING_DIR")),
            recording_prefix: env!("RECORDING_PREFIX").to_string(),

            join_timeout_ms: env!("JOIN_TIMEOUT_MS")
                .parse()
                .context("Failed to parse JOIN_TIMEOUT_MS")?,
        }
        .validated()?)
    }

    /// Apply runtime overrides. `lookup` is normally `std::env::var(..).ok()`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key = lookup(&self.api_key_env).filter(|k| !k.trim().is_empty());

        if let Some(url) = lookup("REALTIME_WS_URL") {
            self.ws_url = url;
        }
        if let Some(path) = lookup("REALTIME_INSTRUCTIONS_FILE") {
            self.instructions = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read instructions file '{}'", path))?;
        }
        if let Some(dir) = lookup("REALTIME_RECORDING_DIR") {
            self.recording_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn validated(self) -> Result<Self> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        Ok(self)
    }

    /// Size in bytes of one captured frame / one playback chunk.
    pub fn frame_bytes(&self) -> usize {
        self.chunk_size * BYTES_PER_SAMPLE
    }

    /// Wall-clock length of one audio quantum.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate as f64)
    }

    pub fn reengage_delay(&self) -> Duration {
        Duration::from_millis(self.reengage_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.openai.com/v1/realtime".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            beta_header: "realtime=v1".to_string(),
            connect_timeout_ms: 10_000,
            reconnect_attempts: 0,
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
            sample_rate: 24_000,
            chunk_size: 1024,
            reengage_delay_ms: 500,
            frame_queue_capacity: 0,
            modalities: vec!["audio".to_string(), "text".to_string()],
            instructions: String::new(),
            recording_enabled: true,
            recording_dir: PathBuf::from("."),
            recording_prefix: "response".to_string(),
            join_timeout_ms: 2_000,
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
