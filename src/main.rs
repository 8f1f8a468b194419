use realtime_duplex::Config;
use realtime_duplex::audio::{CaptureOpener, PlaybackOpener};
use realtime_duplex::controller::Controller;
use tokio::signal;

#[cfg(feature = "alsa")]
fn device_openers(config: &Config) -> anyhow::Result<(CaptureOpener, PlaybackOpener)> {
    use realtime_duplex::audio::{AlsaCapture, AlsaPlayback, CaptureDevice, PlaybackDevice};

    let (capture_device, playback_device) =
        (config.capture_device.clone(), config.playback_device.clone());
    let (rate, period) = (config.sample_rate, config.chunk_size);

    let open_capture: CaptureOpener = Box::new(move || {
        Ok(Box::new(AlsaCapture::open(&capture_device, rate, period)?) as Box<dyn CaptureDevice>)
    });
    let open_playback: PlaybackOpener = Box::new(move || {
        Ok(Box::new(AlsaPlayback::open(&playback_device, rate, period)?) as Box<dyn PlaybackDevice>)
    });
    Ok((open_capture, open_playback))
}

#[cfg(not(feature = "alsa"))]
fn device_openers(_config: &Config) -> anyhow::Result<(CaptureOpener, PlaybackOpener)> {
    anyhow::bail!("built without an audio backend, enable the `alsa` feature")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 加载配置
    let mut config = Config::new()?;
    config.apply_overrides(|key| std::env::var(key).ok())?;

    log::info!(
        "{} {} starting: {}Hz, {} samples per frame, mic re-engage after {}ms",
        env!("APP_NAME"),
        env!("APP_VERSION"),
        config.sample_rate,
        config.chunk_size,
        config.reengage_delay_ms
    );

    let (open_capture, open_playback) = device_openers(&config)?;

    let summary = Controller::new(config)
        .run(open_capture, open_playback, async {
            // 监听 Ctrl+C 信号
            if let Err(e) = signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    log::info!(
        "Session {}: uplink {:?}, downlink {:?}. Exiting.",
        summary.final_state,
        summary.uplink,
        summary.downlink
    );
    Ok(())
}
