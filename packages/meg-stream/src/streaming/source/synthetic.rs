// Synthetic sinusoid source
//
// Generates `amplitude · (channel + 1) · sin(2π f t)` on every channel with a
// continuous phase across blocks, optionally paced to simulate a live device.

use super::{SampleSource, SourceMetadata};
use crate::streaming::types::{StreamError, StreamResult};
use crate::types::SampleBlock;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticConfig {
    #[serde(default = "default_channels")]
    pub channels: usize,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Sinusoid frequency in Hz
    #[serde(default = "default_frequency")]
    pub frequency: f64,

    /// Amplitude of channel 0; channel `i` gets `(i + 1)` times this
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,

    /// Stop after this many blocks (`None` = endless)
    #[serde(default)]
    pub max_blocks: Option<u64>,

    /// Delay between blocks in milliseconds (simulates real-time)
    #[serde(default)]
    pub rate_limit_ms: Option<u64>,
}

fn default_channels() -> usize {
    8
}
fn default_sample_rate() -> f64 {
    1000.0
}
fn default_block_size() -> usize {
    100
}
fn default_frequency() -> f64 {
    10.0
}
fn default_amplitude() -> f64 {
    1.0
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            frequency: default_frequency(),
            amplitude: default_amplitude(),
            max_blocks: None,
            rate_limit_ms: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    position: u64,
    blocks_emitted: u64,
    is_connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            position: 0,
            blocks_emitted: 0,
            is_connected: false,
        }
    }

    pub fn blocks_emitted(&self) -> u64 {
        self.blocks_emitted
    }
}

impl SampleSource for SyntheticSource {
    fn connect(&mut self) -> StreamResult<()> {
        if self.config.channels == 0 || self.config.block_size == 0 {
            return Err(StreamError::Source(format!(
                "synthetic source needs channels and block size > 0, got {} x {}",
                self.config.channels, self.config.block_size
            )));
        }
        if !self.config.sample_rate.is_finite() || self.config.sample_rate <= 0.0 {
            return Err(StreamError::Source(format!(
                "invalid sample rate {}",
                self.config.sample_rate
            )));
        }

        log::info!(
            "Synthetic source connected: {} channels @ {} Hz, {} Hz tone",
            self.config.channels,
            self.config.sample_rate,
            self.config.frequency
        );
        self.is_connected = true;
        Ok(())
    }

    fn next_block(&mut self) -> StreamResult<Option<SampleBlock>> {
        if !self.is_connected {
            return Err(StreamError::Source("source not connected".to_string()));
        }
        if let Some(max) = self.config.max_blocks {
            if self.blocks_emitted >= max {
                return Ok(None);
            }
        }

        if let Some(delay) = self.config.rate_limit_ms {
            super::pace(delay);
        }

        let SyntheticConfig {
            channels,
            sample_rate,
            block_size,
            frequency,
            amplitude,
            ..
        } = self.config;
        let start = self.position;

        let data = DMatrix::from_fn(channels, block_size, |ch, s| {
            let t = (start + s as u64) as f64 / sample_rate;
            amplitude * (ch + 1) as f64 * (2.0 * PI * frequency * t).sin()
        });

        self.position += block_size as u64;
        self.blocks_emitted += 1;

        SampleBlock::new(data, sample_rate).map(Some)
    }

    fn stop(&mut self) -> StreamResult<()> {
        log::debug!(
            "Synthetic source stopped after {} blocks",
            self.blocks_emitted
        );
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            channels: self.config.channels,
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
        }
    }
}
