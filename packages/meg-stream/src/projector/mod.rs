//! Signal-space projection (SSP)
//!
//! Builds the operator `P = I - U·Uᵀ` that removes the subspace spanned by the
//! active projection vectors from the good channels of a recording.

mod active;
mod builder;

pub use active::ActiveProjector;
pub use builder::{Projector, ProjectorBuilder, ProjectorConfig};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectorError {
    #[error("SVD did not converge for a {rows}x{cols} projection matrix")]
    SvdNotConverged { rows: usize, cols: usize },

    #[error("Projection vector '{vector}' has a non-finite weight for channel '{channel}'")]
    NonFiniteWeight { vector: String, channel: String },

    #[error("Projector built for {expected} channels applied to a block with {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Invalid projector configuration: {0}")]
    InvalidConfig(String),
}

pub type ProjectorResult<T> = std::result::Result<T, ProjectorError>;

/// One artifact direction in channel space
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionVector {
    pub name: String,

    /// `(channel name, weight)` pairs; names missing from the catalog are ignored
    pub weights: Vec<(String, f64)>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ProjectionVector {
    pub fn new<S: Into<String>>(name: impl Into<String>, weights: Vec<(S, f64)>) -> Self {
        Self {
            name: name.into(),
            weights: weights
                .into_iter()
                .map(|(channel, weight)| (channel.into(), weight))
                .collect(),
            active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}
