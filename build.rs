use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    network: Network,
    audio: Audio,
    session: Session,
    recording: Recording,
    lifecycle: Lifecycle,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    api_key_env: String,
    beta_header: String,
    connect_timeout_ms: u64,
    reconnect_attempts: u32,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    chunk_size: usize,
    reengage_delay_ms: u64,
    frame_queue_capacity: usize,
}

#[derive(Deserialize)]
struct Session {
    modalities: Vec<String>,
    instructions: String,
}

#[derive(Deserialize)]
struct Recording {
    enabled: bool,
    output_dir: String,
    file_prefix: String,
}

#[derive(Deserialize)]
struct Lifecycle {
    join_timeout_ms: u64,
}

// rustc-env values must fit on one line
fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 网络配置
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=API_KEY_ENV={}", config.network.api_key_env);
    println!("cargo:rustc-env=BETA_HEADER={}", config.network.beta_header);
    println!("cargo:rustc-env=CONNECT_TIMEOUT_MS={}", config.network.connect_timeout_ms);
    println!("cargo:rustc-env=RECONNECT_ATTEMPTS={}", config.network.reconnect_attempts);

    // 音频配置
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=CHUNK_SIZE={}", config.audio.chunk_size);
    println!("cargo:rustc-env=REENGAGE_DELAY_MS={}", config.audio.reengage_delay_ms);
    println!("cargo:rustc-env=FRAME_QUEUE_CAPACITY={}", config.audio.frame_queue_capacity);

    // 会话配置
    println!("cargo:rustc-env=SESSION_MODALITIES={}", config.session.modalities.join(","));
    println!(
        "cargo:rustc-env=SESSION_INSTRUCTIONS={}",
        single_line(&config.session.instructions)
    );

    // 录音配置
    println!("cargo:rustc-env=RECORDING_ENABLED={}", config.recording.enabled);
    println!("cargo:rustc-env=RECORDING_DIR={}", config.recording.output_dir);
    println!("cargo:rustc-env=RECORDING_PREFIX={}", config.recording.file_prefix);

    println!("cargo:rustc-env=JOIN_TIMEOUT_MS={}", config.lifecycle.join_timeout_ms);
}
