// Common types for the streaming module

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::projector::ProjectorError;
use crate::streaming::buffer::BufferMetrics;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur during streaming operations
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample block: {0}")]
    InvalidBlock(String),

    /// The buffer was released for shutdown; the call did not transfer a block
    #[error("Buffer released")]
    Released,

    #[error("Pipeline is not running")]
    NotRunning,

    #[error("Source error: {0}")]
    Source(String),

    #[error("Projection failed: {0}")]
    Projection(#[from] ProjectorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Current lifecycle state of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", content = "data")]
pub enum PipelineState {
    /// Constructed, never started
    #[default]
    Idle,

    Running {
        started_at: f64,
    },

    /// `stop()` is releasing the buffer and joining workers
    Stopping,

    Stopped,
}

/// Emitted when the incoming channel layout changes mid-stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResyncEvent {
    pub previous_channels: usize,
    pub channels: usize,
    pub previous_sample_rate: f64,
    pub sample_rate: f64,
    /// Samples per channel thrown away with the partial window
    pub discarded_samples: usize,
}

/// Statistics about a pipeline session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineStats {
    pub blocks_received: u64,
    pub blocks_processed: u64,
    pub spectra_published: u64,
    pub resyncs: u64,
    pub buffer: BufferMetrics,
    pub uptime_seconds: Option<f64>,
}

/// Status events reported to the display side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    StateChanged {
        pipeline_id: String,
        state: PipelineState,
    },
    Resync {
        pipeline_id: String,
        event: ResyncEvent,
    },
    SpectrumPublished {
        pipeline_id: String,
        sequence: u64,
    },
    ProjectorRebuilt {
        pipeline_id: String,
        rank: usize,
        dimension: usize,
    },
    ProjectorFailed {
        pipeline_id: String,
        error: String,
    },
    Error {
        pipeline_id: String,
        error: String,
    },
}
