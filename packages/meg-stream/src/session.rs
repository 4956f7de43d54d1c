//! Channel metadata and stored projection vectors of a measurement session

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::catalog::ChannelCatalog;
use crate::error::Result;
use crate::projector::ProjectionVector;

/// What the measurement-file reader hands to the pipeline
///
/// ```json
/// {
///   "channels": [{"name": "MEG0111", "kind": "meg"}, {"name": "MEG0112", "kind": "meg", "bad": true}],
///   "projections": [{"name": "ecg", "weights": [["MEG0111", 0.7], ["MEG0112", -0.7]]}]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub channels: ChannelCatalog,

    #[serde(default)]
    pub projections: Vec<ProjectionVector>,
}

impl SessionInfo {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let session = Self::from_json_str(&fs::read_to_string(path)?)?;
        log::info!(
            "Loaded session {}: {} channels ({} bad), {} projection vectors",
            path.display(),
            session.channels.len(),
            session.channels.bad_names().len(),
            session.projections.len()
        );
        Ok(session)
    }

    /// Vectors with `active` set
    pub fn active_projections(&self) -> Vec<&ProjectionVector> {
        self.projections.iter().filter(|v| v.active).collect()
    }
}
