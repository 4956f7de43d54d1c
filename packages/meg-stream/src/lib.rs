pub mod catalog;
pub mod config;
pub mod error;
pub mod projector;
pub mod session;
pub mod streaming;
pub mod types;

pub use catalog::{CatalogError, ChannelCatalog, ChannelDescriptor, ChannelKind};
pub use config::{PipelineConfig, ProjectionStage};
pub use error::{MegStreamError, Result};
pub use projector::{
    ActiveProjector, ProjectionVector, Projector, ProjectorBuilder, ProjectorConfig,
    ProjectorError, ProjectorResult,
};
pub use session::SessionInfo;
pub use streaming::{
    BoundedSampleBuffer, EstimatorConfig, PipelineEvent, PipelineState, SampleSource,
    SpectralEstimator, SpectrumScale, StreamError, StreamResult, StreamingPipeline,
    WindowFunction,
};
pub use types::{MatrixLayout, Measurement, SampleBlock, SpectrumEstimate};
