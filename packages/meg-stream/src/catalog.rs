//! Per-session channel metadata
//!
//! The catalog fixes the row order used by every sample block and by the
//! projector. It is handed out as a read-only snapshot; changing the bad
//! list produces a new catalog instead of mutating the shared one.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::types::SampleBlock;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Duplicate channel name: {0}")]
    DuplicateChannel(String),

    #[error("Channel at index {0} has an empty name")]
    EmptyName(usize),

    #[error("Block has {actual} channels but the catalog has {expected}")]
    RowMismatch { expected: usize, actual: usize },
}

/// Broad channel category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Meg,
    Eeg,
    Stim,
    Eog,
    Ecg,
    Emg,
    #[default]
    Misc,
}

/// Static description of one acquisition channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelDescriptor {
    pub name: String,

    #[serde(default)]
    pub kind: ChannelKind,

    /// Calibration factor converting raw units to physical units
    #[serde(default = "default_scale")]
    pub calibration: f64,

    /// Range factor applied together with the calibration
    #[serde(default = "default_scale")]
    pub range: f64,

    /// Physical unit label, e.g. "T", "T/m", "V"
    #[serde(default)]
    pub unit: String,

    /// Sensor/coil type code as reported by the device
    #[serde(default)]
    pub coil_type: i32,

    #[serde(default)]
    pub bad: bool,
}

fn default_scale() -> f64 {
    1.0
}

impl ChannelDescriptor {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            calibration: 1.0,
            range: 1.0,
            unit: String::new(),
            coil_type: 0,
            bad: false,
        }
    }

    pub fn with_calibration(mut self, calibration: f64, range: f64) -> Self {
        self.calibration = calibration;
        self.range = range;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_coil_type(mut self, coil_type: i32) -> Self {
        self.coil_type = coil_type;
        self
    }

    pub fn marked_bad(mut self) -> Self {
        self.bad = true;
        self
    }

    /// Combined raw-to-physical scale factor
    pub fn scale(&self) -> f64 {
        self.calibration * self.range
    }
}

/// Ordered, name-unique list of channels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<ChannelDescriptor>", into = "Vec<ChannelDescriptor>")]
pub struct ChannelCatalog {
    channels: Vec<ChannelDescriptor>,
}

impl ChannelCatalog {
    pub fn new(channels: Vec<ChannelDescriptor>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(channels.len());
        for (idx, channel) in channels.iter().enumerate() {
            if channel.name.is_empty() {
                return Err(CatalogError::EmptyName(idx));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(CatalogError::DuplicateChannel(channel.name.clone()));
            }
        }

        Ok(Self { channels })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn get(&self, index: usize) -> Option<&ChannelDescriptor> {
        self.channels.get(index)
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|ch| ch.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|ch| ch.name == name)
    }

    pub fn good_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|ch| !ch.bad)
            .map(|ch| ch.name.clone())
            .collect()
    }

    pub fn bad_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|ch| ch.bad)
            .map(|ch| ch.name.clone())
            .collect()
    }

    /// New catalog whose bad flags are exactly `bads`; unknown names are ignored
    pub fn with_bads<S: AsRef<str>>(&self, bads: &[S]) -> Self {
        let bads: HashSet<&str> = bads.iter().map(AsRef::as_ref).collect();
        let channels = self
            .channels
            .iter()
            .map(|ch| ChannelDescriptor {
                bad: bads.contains(ch.name.as_str()),
                ..ch.clone()
            })
            .collect();

        Self { channels }
    }

    /// Lookup table from channel name to row index
    pub fn index_map(&self) -> HashMap<&str, usize> {
        self.channels
            .iter()
            .enumerate()
            .map(|(idx, ch)| (ch.name.as_str(), idx))
            .collect()
    }

    /// Scale every row of a raw block by its channel's calibration and range
    pub fn calibrate(&self, block: &SampleBlock) -> Result<SampleBlock, CatalogError> {
        if block.n_channels() != self.len() {
            return Err(CatalogError::RowMismatch {
                expected: self.len(),
                actual: block.n_channels(),
            });
        }

        let mut data = block.data().clone();
        for (mut row, channel) in data.row_iter_mut().zip(&self.channels) {
            row *= channel.scale();
        }

        Ok(block.with_data(data))
    }
}

impl TryFrom<Vec<ChannelDescriptor>> for ChannelCatalog {
    type Error = CatalogError;

    fn try_from(channels: Vec<ChannelDescriptor>) -> Result<Self, Self::Error> {
        Self::new(channels)
    }
}

impl From<ChannelCatalog> for Vec<ChannelDescriptor> {
    fn from(catalog: ChannelCatalog) -> Self {
        catalog.channels
    }
}
