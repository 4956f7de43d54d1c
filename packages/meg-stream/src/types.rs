use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::streaming::estimator::SpectrumScale;
use crate::streaming::types::{StreamError, StreamResult};

/// Memory order of a flat sample buffer handed over by an acquisition driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatrixLayout {
    /// All samples of channel 0 first, then channel 1, ...
    RowMajor,
    /// All channels of sample 0 first, then sample 1, ...
    ColumnMajor,
}

/// A block of multichannel samples
///
/// Rows are channels in catalog order, columns are time samples. A block is
/// immutable once built; the pipeline assigns its sequence number on submit.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    data: DMatrix<f64>,
    sample_rate: f64,
    sequence: u64,
    timestamp: f64,
}

impl SampleBlock {
    pub fn new(data: DMatrix<f64>, sample_rate: f64) -> StreamResult<Self> {
        if data.nrows() == 0 {
            return Err(StreamError::InvalidBlock(
                "block must have at least one channel".to_string(),
            ));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(StreamError::InvalidBlock(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }

        Ok(Self {
            data,
            sample_rate,
            sequence: 0,
            timestamp: now_seconds(),
        })
    }

    /// Build a block from a flat driver buffer
    pub fn from_slice(
        data: &[f64],
        layout: MatrixLayout,
        n_channels: usize,
        sample_rate: f64,
    ) -> StreamResult<Self> {
        if n_channels == 0 {
            return Err(StreamError::InvalidBlock(
                "channel count must be at least 1".to_string(),
            ));
        }
        if data.len() % n_channels != 0 {
            return Err(StreamError::InvalidBlock(format!(
                "{} values cannot be split into {} channels",
                data.len(),
                n_channels
            )));
        }

        let n_samples = data.len() / n_channels;
        let matrix = match layout {
            MatrixLayout::RowMajor => DMatrix::from_row_slice(n_channels, n_samples, data),
            MatrixLayout::ColumnMajor => DMatrix::from_column_slice(n_channels, n_samples, data),
        };

        Self::new(matrix, sample_rate)
    }

    /// Build a block from per-channel sample vectors
    pub fn from_channels(channels: Vec<Vec<f64>>, sample_rate: f64) -> StreamResult<Self> {
        let n_samples = channels.first().map(|ch| ch.len()).unwrap_or(0);
        if let Some(idx) = channels.iter().position(|ch| ch.len() != n_samples) {
            return Err(StreamError::InvalidBlock(format!(
                "channel {} has {} samples, expected {}",
                idx,
                channels[idx].len(),
                n_samples
            )));
        }

        let matrix = DMatrix::from_fn(channels.len(), n_samples, |r, c| channels[r][c]);
        Self::new(matrix, sample_rate)
    }

    /// Same block with a new sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Copy of this block's metadata around new sample data of the same shape
    pub(crate) fn with_data(&self, data: DMatrix<f64>) -> Self {
        debug_assert_eq!(data.shape(), self.data.shape());
        Self {
            data,
            sample_rate: self.sample_rate,
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Unix timestamp (seconds) at which the block was created
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Samples of one channel, oldest first
    pub fn channel(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.n_channels()).then(|| self.data.row(index).iter().copied().collect())
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sample_rate
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.data
    }
}

/// Frequency-domain estimate of one window, one row per channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumEstimate {
    /// Position of this spectrum in the estimator's output order
    pub sequence: u64,

    pub channel_count: usize,

    pub sample_rate: f64,

    /// Transform length `N`
    pub window_length: usize,

    /// Index of the window's first sample since accumulation (re)started
    pub window_start: u64,

    pub scale: SpectrumScale,

    /// Bin centre frequencies in Hz (`N/2 + 1` entries)
    pub frequencies: Vec<f64>,

    /// `[channel][bin]`
    pub values: Vec<Vec<f64>>,

    pub timestamp: f64,
}

impl SpectrumEstimate {
    pub fn frequency_resolution(&self) -> f64 {
        self.sample_rate / self.window_length as f64
    }

    pub fn num_bins(&self) -> usize {
        self.frequencies.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.values.get(index).map(Vec::as_slice)
    }

    /// Bin index of the largest value in a channel, DC excluded
    pub fn peak_bin(&self, channel: usize) -> Option<usize> {
        let values = self.values.get(channel)?;
        values
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(bin, _)| bin)
    }

    pub fn peak_frequency(&self, channel: usize) -> Option<f64> {
        self.peak_bin(channel)
            .and_then(|bin| self.frequencies.get(bin).copied())
    }
}

/// Payloads the pipeline hands to the display side
#[derive(Debug, Clone)]
pub enum Measurement {
    Samples(SampleBlock),
    Spectrum(SpectrumEstimate),
    Projected(SampleBlock),
}

impl Measurement {
    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::Samples(_) => "samples",
            Measurement::Spectrum(_) => "spectrum",
            Measurement::Projected(_) => "projected",
        }
    }
}

pub(crate) fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
