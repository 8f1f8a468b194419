//! ALSA PCM devices for the capture and playback loops.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use super::device::{CaptureDevice, PlaybackDevice, le_bytes_to_samples, samples_to_le_bytes};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames
    pub period_size: usize,
}

pub struct AlsaCapture {
    pcm: PCM,
    samples: Vec<i16>,
}

pub struct AlsaPlayback {
    pcm: PCM,
    samples: Vec<i16>,
}

impl AlsaCapture {
    pub fn open(device: &str, sample_rate: u32, period_size: usize) -> Result<Self> {
        let (pcm, params) = open_pcm(device, Direction::Capture, sample_rate, period_size, "Capture")?;
        Ok(Self {
            pcm,
            samples: vec![0i16; params.period_size],
        })
    }
}

impl AlsaPlayback {
    pub fn open(device: &str, sample_rate: u32, period_size: usize) -> Result<Self> {
        let (pcm, params) =
            open_pcm(device, Direction::Playback, sample_rate, period_size, "Playback")?;
        Ok(Self {
            pcm,
            samples: Vec::with_capacity(params.period_size),
        })
    }
}

impl CaptureDevice for AlsaCapture {
    fn read_period(&mut self, pcm: &mut [u8]) -> Result<usize> {
        let wanted = pcm.len() / 2;
        if self.samples.len() < wanted {
            self.samples.resize(wanted, 0);
        }
        let io = self.pcm.io_i16()?;
        let frames = io.readi(&mut self.samples[..wanted])?;
        Ok(samples_to_le_bytes(&self.samples[..frames], pcm))
    }

    fn recover(&mut self) -> Result<()> {
        self.pcm.prepare().context("Failed to recover PCM capture")
    }
}

impl PlaybackDevice for AlsaPlayback {
    fn write_period(&mut self, pcm: &[u8]) -> Result<()> {
        le_bytes_to_samples(pcm, &mut self.samples);
        let io = self.pcm.io_i16()?;
        // short writes are normal, loop until the period is queued
        let mut written = 0;
        while written < self.samples.len() {
            written += io.writei(&self.samples[written..])?;
        }
        Ok(())
    }

    fn recover(&mut self) -> Result<()> {
        self.pcm.prepare().context("Failed to recover PCM playback")
    }
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    period_size: usize,
    dir_name: &str,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters: mono S16LE, one period per audio quantum
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(1)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(period_size as alsa::pcm::Frames, ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let params = {
        let hwp = pcm.hw_params_current()?;
        AlsaParams {
            sample_rate: hwp.get_rate()?,
            channels: hwp.get_channels()?,
            period_size: hwp.get_period_size()? as usize,
        }
    };

    if params.sample_rate != sample_rate {
        log::warn!(
            "ALSA {}: requested {}Hz but device runs at {}Hz",
            dir_name,
            sample_rate,
            params.sample_rate
        );
    }

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    Ok((pcm, params))
}
