// Real-time acquisition, buffering and spectral estimation
//
// Architecture:
// - `source`: Pull-style producers (synthetic generator, replay) behind the `SampleSource` trait
// - `buffer`: Bounded blocking FIFO between producer and estimator, plus a lock-free drop-oldest queue
// - `estimator`: Rolling-window FFT spectra, channels transformed in parallel with Rayon
// - `pipeline`: Lifecycle management and coordination of the producer and estimator threads

pub mod buffer;
pub mod estimator;
pub mod pipeline;
pub mod source;
pub mod types;

pub use buffer::{BoundedSampleBuffer, BufferMetrics, CircularBuffer, OverflowStrategy};
pub use estimator::{
    EstimatorConfig, EstimatorOutcome, EstimatorState, SpectralEstimator, SpectrumScale,
    WindowFunction, DECIBEL_FLOOR,
};
pub use pipeline::StreamingPipeline;
pub use source::{ReplaySource, SampleSource, SourceMetadata, SyntheticConfig, SyntheticSource};
pub use types::{
    PipelineEvent, PipelineState, PipelineStats, ResyncEvent, StreamError, StreamResult,
};
