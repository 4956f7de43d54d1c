// Streaming spectral estimator
//
// Accumulates incoming blocks into a fixed-length window per channel and
// computes a one-sided spectrum every time the window fills. Channels are
// transformed in parallel with Rayon against a single pre-planned FFT.

use crate::streaming::buffer::{CircularBuffer, OverflowStrategy};
use crate::streaming::types::{ResyncEvent, StreamError, StreamResult};
use crate::types::{now_seconds, SampleBlock, SpectrumEstimate};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Lowest value reported on the decibel scale (silent bins)
pub const DECIBEL_FLOOR: f64 = -300.0;

/// Taper applied to each window before the transform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
}

impl WindowFunction {
    pub fn coefficients(&self, n: usize) -> Vec<f64> {
        match self {
            WindowFunction::Rectangular => vec![1.0; n],
            WindowFunction::Hann if n < 2 => vec![1.0; n],
            WindowFunction::Hann => (0..n)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos()))
                .collect(),
        }
    }
}

/// Output scale of spectrum values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumScale {
    /// Amplitude in signal units; a sinusoid of amplitude A reads A at its bin
    #[default]
    Magnitude,
    /// Squared magnitude
    Power,
    /// `10·log10(power)`, floored at `DECIBEL_FLOOR`
    Decibel,
}

impl SpectrumScale {
    fn apply(&self, magnitude: f64) -> f64 {
        match self {
            SpectrumScale::Magnitude => magnitude,
            SpectrumScale::Power => magnitude * magnitude,
            SpectrumScale::Decibel if magnitude > 0.0 => {
                (20.0 * magnitude.log10()).max(DECIBEL_FLOOR)
            }
            SpectrumScale::Decibel => DECIBEL_FLOOR,
        }
    }
}

/// Configuration for the spectral estimator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimatorConfig {
    /// Transform length `N` in samples (power of two)
    #[serde(default = "default_window_length")]
    pub window_length: usize,

    /// Overlap between consecutive windows (0.0 to 1.0, exclusive)
    /// e.g., 0.5 = 50% overlap, 0.0 = non-overlapping
    #[serde(default)]
    pub window_overlap: f64,

    #[serde(default)]
    pub window_function: WindowFunction,

    #[serde(default)]
    pub scale: SpectrumScale,

    /// Finished spectra kept while waiting to be published
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
}

fn default_window_length() -> usize {
    1024
}
fn default_pending_capacity() -> usize {
    8
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_length: default_window_length(),
            window_overlap: 0.0,
            window_function: WindowFunction::default(),
            scale: SpectrumScale::default(),
            pending_capacity: default_pending_capacity(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.window_length < 2 || !self.window_length.is_power_of_two() {
            return Err(StreamError::InvalidConfig(format!(
                "window length must be a power of two >= 2, got {}",
                self.window_length
            )));
        }
        if !(0.0..1.0).contains(&self.window_overlap) {
            return Err(StreamError::InvalidConfig(format!(
                "window overlap must be in [0, 1), got {}",
                self.window_overlap
            )));
        }
        if self.pending_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "pending spectrum capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Samples the window advances after each transform
    pub fn hop(&self) -> usize {
        let overlap = (self.window_length as f64 * self.window_overlap).round() as usize;
        self.window_length.saturating_sub(overlap).max(1)
    }
}

/// Estimator lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorState {
    /// No block seen yet; the first one defines the channel layout
    Idle,
    Accumulating,
    /// A full window is being transformed
    Ready,
    /// Terminal; blocks are ignored
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowLayout {
    channels: usize,
    sample_rate: f64,
}

impl WindowLayout {
    fn of(block: &SampleBlock) -> Self {
        Self {
            channels: block.n_channels(),
            sample_rate: block.sample_rate(),
        }
    }

    fn matches(&self, other: &WindowLayout) -> bool {
        self.channels == other.channels
            && (self.sample_rate - other.sample_rate).abs() <= 1e-9 * self.sample_rate.max(1.0)
    }
}

/// What a single `accumulate` call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimatorOutcome {
    pub spectra_completed: usize,
    pub resync: Option<ResyncEvent>,
}

/// Rolling-window spectral estimator
///
/// `accumulate_with` hands each spectrum to a sink as its window completes.
/// `accumulate` instead parks finished spectra in a short drop-oldest queue
/// that callers drain with `drain_pending`.
pub struct SpectralEstimator {
    config: EstimatorConfig,
    fft: Arc<dyn Fft<f64>>,
    taper: Vec<f64>,
    taper_gain: f64,
    hop: usize,

    state: EstimatorState,
    layout: Option<WindowLayout>,
    window: Vec<Vec<f64>>,
    window_start: u64,
    next_sequence: u64,
    pending: CircularBuffer<SpectrumEstimate>,
}

impl SpectralEstimator {
    pub fn new(config: EstimatorConfig) -> StreamResult<Self> {
        config.validate()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.window_length);
        let taper = config.window_function.coefficients(config.window_length);
        let taper_gain = taper.iter().sum::<f64>();

        Ok(Self {
            hop: config.hop(),
            pending: CircularBuffer::new(config.pending_capacity, OverflowStrategy::DropOldest),
            config,
            fft,
            taper,
            taper_gain,
            state: EstimatorState::Idle,
            layout: None,
            window: Vec::new(),
            window_start: 0,
            next_sequence: 0,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Channel count of the current window, once the first block arrived
    pub fn channel_count(&self) -> Option<usize> {
        self.layout.map(|layout| layout.channels)
    }

    /// Samples per channel waiting for the window to fill
    pub fn buffered_samples(&self) -> usize {
        self.window.first().map(Vec::len).unwrap_or(0)
    }

    /// Bin centre frequencies for a given sample rate
    pub fn frequencies(&self, sample_rate: f64) -> Vec<f64> {
        let n = self.config.window_length;
        (0..n / 2 + 1)
            .map(|k| k as f64 * sample_rate / n as f64)
            .collect()
    }

    /// Append a block and queue every spectrum it completes
    pub fn accumulate(&mut self, block: &SampleBlock) -> EstimatorOutcome {
        let mut finished = Vec::new();
        let outcome = self.accumulate_with(block, |spectrum| finished.push(spectrum));
        for spectrum in finished {
            if self.pending.push(spectrum).is_some() {
                log::warn!("Pending spectrum queue full, oldest estimate dropped");
            }
        }
        outcome
    }

    /// Check `block` against the current layout and restart the window if the
    /// channel count or sample rate changed
    ///
    /// Returns `None` when the layout is unchanged, on the first block, and
    /// once stopped.
    pub fn align(&mut self, block: &SampleBlock) -> Option<ResyncEvent> {
        if self.state == EstimatorState::Stopped {
            return None;
        }

        let incoming = WindowLayout::of(block);
        match self.layout {
            Some(current) if current.matches(&incoming) => None,
            Some(current) => {
                let event = ResyncEvent {
                    previous_channels: current.channels,
                    channels: incoming.channels,
                    previous_sample_rate: current.sample_rate,
                    sample_rate: incoming.sample_rate,
                    discarded_samples: self.buffered_samples(),
                };
                log::warn!(
                    "Channel layout changed from {} ch @ {} Hz to {} ch @ {} Hz, discarding {} buffered samples",
                    event.previous_channels,
                    event.previous_sample_rate,
                    event.channels,
                    event.sample_rate,
                    event.discarded_samples
                );
                self.begin(incoming);
                Some(event)
            }
            None => {
                log::debug!(
                    "Estimator initialised for {} channels @ {} Hz",
                    incoming.channels,
                    incoming.sample_rate
                );
                self.begin(incoming);
                None
            }
        }
    }

    /// Append a block and pass every spectrum it completes to `sink`, oldest
    /// window first
    pub fn accumulate_with<F>(&mut self, block: &SampleBlock, mut sink: F) -> EstimatorOutcome
    where
        F: FnMut(SpectrumEstimate),
    {
        let mut outcome = EstimatorOutcome::default();

        if self.state == EstimatorState::Stopped {
            log::debug!("Estimator stopped, ignoring block {}", block.sequence());
            return outcome;
        }

        outcome.resync = self.align(block);
        let incoming = WindowLayout::of(block);

        for (channel, row) in self.window.iter_mut().zip(block.data().row_iter()) {
            channel.extend(row.iter().copied());
        }

        while self.buffered_samples() >= self.config.window_length {
            self.state = EstimatorState::Ready;

            let spectrum = SpectrumEstimate {
                sequence: self.next_sequence,
                channel_count: incoming.channels,
                sample_rate: incoming.sample_rate,
                window_length: self.config.window_length,
                window_start: self.window_start,
                scale: self.config.scale,
                frequencies: self.frequencies(incoming.sample_rate),
                values: self.transform_window(),
                timestamp: now_seconds(),
            };
            log::debug!(
                "Spectrum {} computed for window starting at sample {}",
                spectrum.sequence,
                spectrum.window_start
            );

            sink(spectrum);

            for channel in &mut self.window {
                channel.drain(..self.hop);
            }
            self.window_start += self.hop as u64;
            self.next_sequence += 1;
            outcome.spectra_completed += 1;
            self.state = EstimatorState::Accumulating;
        }

        outcome
    }

    /// Take every finished spectrum, oldest first
    pub fn drain_pending(&self) -> Vec<SpectrumEstimate> {
        self.pending.drain(self.pending.capacity())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enter the terminal state and drop any partial window
    pub fn stop(&mut self) {
        if self.state != EstimatorState::Stopped {
            log::debug!(
                "Estimator stopping with {} buffered samples discarded",
                self.buffered_samples()
            );
        }
        self.state = EstimatorState::Stopped;
        self.window.clear();
    }

    /// Back to `Idle` with empty window and queue
    pub fn reset(&mut self) {
        self.state = EstimatorState::Idle;
        self.layout = None;
        self.window.clear();
        self.window_start = 0;
        self.next_sequence = 0;
        self.pending.clear();
    }

    fn begin(&mut self, layout: WindowLayout) {
        let capacity = self.config.window_length + self.hop;
        self.layout = Some(layout);
        self.window = (0..layout.channels)
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        self.window_start = 0;
        self.state = EstimatorState::Accumulating;
    }

    /// One-sided spectrum of the first `N` buffered samples of every channel
    fn transform_window(&self) -> Vec<Vec<f64>> {
        let n = self.config.window_length;
        let n_bins = n / 2 + 1;
        let scale = self.config.scale;
        let gain = self.taper_gain;
        let fft = &self.fft;
        let taper = &self.taper;

        self.window
            .par_iter()
            .map(|samples| {
                let mut buffer: Vec<Complex<f64>> = samples[..n]
                    .iter()
                    .zip(taper)
                    .map(|(&x, &w)| Complex::new(x * w, 0.0))
                    .collect();
                let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
                fft.process_with_scratch(&mut buffer, &mut scratch);

                buffer[..n_bins]
                    .iter()
                    .enumerate()
                    .map(|(k, c)| {
                        // DC and Nyquist have no mirrored negative-frequency twin
                        let fold = if k == 0 || k == n / 2 { 1.0 } else { 2.0 };
                        scale.apply(fold * c.norm() / gain)
                    })
                    .collect()
            })
            .collect()
    }
}
