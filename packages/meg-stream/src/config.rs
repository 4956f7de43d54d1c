use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::projector::ProjectorConfig;
use crate::streaming::{EstimatorConfig, StreamError, StreamResult};

/// Where the active projector is applied to incoming blocks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStage {
    /// Blocks are never projected
    #[default]
    None,
    /// On the producer side, before the block enters the buffer
    BeforeBuffer,
    /// On the consumer side; published as `Measurement::Projected`
    BeforeDisplay,
}

/// Settings for one streaming pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Blocks held between producer and estimator
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default)]
    pub estimator: EstimatorConfig,

    #[serde(default)]
    pub projector: ProjectorConfig,

    #[serde(default)]
    pub projection_stage: ProjectionStage,

    /// Publish every raw block as `Measurement::Samples` (ignored with
    /// `BeforeDisplay`, which publishes the projected block instead)
    #[serde(default)]
    pub publish_samples: bool,
}

fn default_buffer_capacity() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            estimator: EstimatorConfig::default(),
            projector: ProjectorConfig::default(),
            projection_stage: ProjectionStage::default(),
            publish_samples: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.buffer_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        self.estimator.validate()?;
        self.projector.validate()?;
        Ok(())
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::debug!("Saved pipeline config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MegStreamError;
    use crate::streaming::SpectrumScale;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.estimator.window_length, 1024);
        assert_eq!(config.projector.relative_tolerance, 1e-6);
        assert_eq!(config.projection_stage, ProjectionStage::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let config = PipelineConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StreamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"buffer_capacity": 16, "estimator": {"window_length": 256, "scale": "decibel"}, "projection_stage": "before_display"}"#,
        )
        .unwrap();

        assert_eq!(config.buffer_capacity, 16);
        assert_eq!(config.estimator.window_length, 256);
        assert_eq!(config.estimator.scale, SpectrumScale::Decibel);
        assert_eq!(config.estimator.pending_capacity, 8);
        assert_eq!(config.projection_stage, ProjectionStage::BeforeDisplay);
    }

    #[test]
    fn test_save_and_load_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.buffer_capacity = 12;
        config.estimator.window_overlap = 0.5;
        config.save(&path).unwrap();

        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_reports_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"estimator": {"window_length": 1000}}"#).unwrap();

        assert!(matches!(
            PipelineConfig::load(&path),
            Err(MegStreamError::Stream(StreamError::InvalidConfig(_)))
        ));
        assert!(matches!(
            PipelineConfig::load(dir.path().join("missing.json")),
            Err(MegStreamError::IoError(_))
        ));
    }
}
