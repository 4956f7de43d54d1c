use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{ProjectionVector, ProjectorError, ProjectorResult};
use crate::catalog::ChannelCatalog;
use crate::types::SampleBlock;

/// Numerical settings for projector construction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectorConfig {
    /// Singular values at or below `relative_tolerance · σ_max` are treated as
    /// linearly dependent and do not add to the rank
    #[serde(default = "default_relative_tolerance")]
    pub relative_tolerance: f64,

    /// SVD iteration cap; exceeding it is reported as non-convergence
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_relative_tolerance() -> f64 {
    1e-6
}
fn default_max_iterations() -> usize {
    1000
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: default_relative_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl ProjectorConfig {
    pub fn validate(&self) -> ProjectorResult<()> {
        if !(self.relative_tolerance > 0.0 && self.relative_tolerance < 1.0) {
            return Err(ProjectorError::InvalidConfig(format!(
                "relative tolerance must be in (0, 1), got {}",
                self.relative_tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(ProjectorError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A projection operator over the good channels of a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Projector {
    matrix: DMatrix<f64>,
    rank: usize,
    /// Full channel ordering the projector was built against
    channel_names: Vec<String>,
    /// Positions of the good channels within `channel_names`
    good_indices: Vec<usize>,
    applied_vectors: Vec<String>,
    dropped_vectors: Vec<String>,
}

impl Projector {
    /// The no-op projector for a channel list
    pub fn identity<S: AsRef<str>, B: AsRef<str>>(channel_names: &[S], bad_channels: &[B]) -> Self {
        let (channel_names, good_indices) = split_good(channel_names, bad_channels);
        let n_good = good_indices.len();

        Self {
            matrix: DMatrix::identity(n_good, n_good),
            rank: 0,
            channel_names,
            good_indices,
            applied_vectors: Vec::new(),
            dropped_vectors: Vec::new(),
        }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of directions removed
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Side length of the matrix (good channel count)
    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_identity(&self) -> bool {
        self.rank == 0
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn good_indices(&self) -> &[usize] {
        &self.good_indices
    }

    pub fn good_channels(&self) -> Vec<String> {
        self.good_indices
            .iter()
            .map(|&idx| self.channel_names[idx].clone())
            .collect()
    }

    /// Active vectors that contributed at least one good-channel weight
    pub fn applied_vectors(&self) -> &[String] {
        &self.applied_vectors
    }

    /// Active vectors that had no weight left on good channels
    pub fn dropped_vectors(&self) -> &[String] {
        &self.dropped_vectors
    }

    pub fn into_parts(self) -> (DMatrix<f64>, usize) {
        (self.matrix, self.rank)
    }

    /// Project a single good-channel sample vector
    pub fn project(&self, x: &DVector<f64>) -> ProjectorResult<DVector<f64>> {
        if x.len() != self.dimension() {
            return Err(ProjectorError::ChannelMismatch {
                expected: self.dimension(),
                actual: x.len(),
            });
        }
        Ok(&self.matrix * x)
    }

    /// Project the good rows of a full block; bad rows pass through unchanged
    pub fn apply(&self, block: &SampleBlock) -> ProjectorResult<SampleBlock> {
        if block.n_channels() != self.channel_names.len() {
            return Err(ProjectorError::ChannelMismatch {
                expected: self.channel_names.len(),
                actual: block.n_channels(),
            });
        }
        if self.is_identity() {
            return Ok(block.clone());
        }

        let data = block.data();
        let projected = &self.matrix * data.select_rows(&self.good_indices);

        let mut output = data.clone();
        for (row, &idx) in self.good_indices.iter().enumerate() {
            output.row_mut(idx).copy_from(&projected.row(row));
        }

        Ok(block.with_data(output))
    }
}

/// Builds projectors from projection vectors
#[derive(Debug, Clone, Default)]
pub struct ProjectorBuilder {
    config: ProjectorConfig,
}

impl ProjectorBuilder {
    pub fn new(config: ProjectorConfig) -> ProjectorResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Build against a catalog's channel order and bad flags
    pub fn build_for_catalog(
        &self,
        vectors: &[ProjectionVector],
        catalog: &ChannelCatalog,
    ) -> ProjectorResult<Projector> {
        self.build(vectors, &catalog.names(), &catalog.bad_names())
    }

    /// Build `P = I - U·Uᵀ` over the channels in `channel_names` that are not in
    /// `bad_channels`
    ///
    /// Inactive vectors are skipped. Weights on bad or unknown channels are
    /// dropped, and a vector left without any weight is dropped silently (it is
    /// listed in `Projector::dropped_vectors`). If a vector names the same
    /// channel twice the last weight wins.
    pub fn build<S: AsRef<str>, B: AsRef<str>>(
        &self,
        vectors: &[ProjectionVector],
        channel_names: &[S],
        bad_channels: &[B],
    ) -> ProjectorResult<Projector> {
        let mut projector = Projector::identity(channel_names, bad_channels);
        let n_good = projector.dimension();

        let column_of: HashMap<&str, usize> = projector
            .good_indices
            .iter()
            .enumerate()
            .map(|(col, &idx)| (projector.channel_names[idx].as_str(), col))
            .collect();

        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut applied = Vec::new();
        let mut dropped = Vec::new();

        for vector in vectors.iter().filter(|v| v.active) {
            let mut row = vec![0.0; n_good];
            for (channel, weight) in &vector.weights {
                let Some(&col) = column_of.get(channel.as_str()) else {
                    continue;
                };
                if !weight.is_finite() {
                    return Err(ProjectorError::NonFiniteWeight {
                        vector: vector.name.clone(),
                        channel: channel.clone(),
                    });
                }
                row[col] = *weight;
            }

            // Unit norm so vectors in different physical units weigh the same
            let norm = row.iter().map(|w| w * w).sum::<f64>().sqrt();
            if norm == 0.0 {
                dropped.push(vector.name.clone());
                continue;
            }
            row.iter_mut().for_each(|w| *w /= norm);
            rows.push(row);
            applied.push(vector.name.clone());
        }

        if !dropped.is_empty() {
            log::info!(
                "Dropped {} projection vector(s) with no weight on good channels: {:?}",
                dropped.len(),
                dropped
            );
        }
        projector.applied_vectors = applied;
        projector.dropped_vectors = dropped;

        if rows.is_empty() {
            log::debug!("No usable projection vectors, using identity ({} channels)", n_good);
            return Ok(projector);
        }

        let n_rows = rows.len();
        let stacked = DMatrix::from_fn(n_rows, n_good, |r, c| rows[r][c]);
        let not_converged = ProjectorError::SvdNotConverged {
            rows: n_rows,
            cols: n_good,
        };

        let svd = stacked
            .try_svd(false, true, f64::EPSILON, self.config.max_iterations)
            .ok_or_else(|| not_converged.clone())?;
        let v_t = svd.v_t.ok_or(not_converged)?;

        let sigma_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
        let cutoff = self.config.relative_tolerance * sigma_max;
        let kept: Vec<usize> = svd
            .singular_values
            .iter()
            .enumerate()
            .filter(|(_, &sigma)| sigma > cutoff)
            .map(|(idx, _)| idx)
            .collect();
        let rank = kept.len();

        // Columns of U are the retained right singular vectors
        let basis = DMatrix::from_fn(n_good, rank, |r, c| v_t[(kept[c], r)]);
        let matrix = DMatrix::identity(n_good, n_good) - &basis * basis.transpose();

        projector.matrix = (&matrix + matrix.transpose()) * 0.5;
        projector.rank = rank;

        log::info!(
            "Built projector: {} vector(s), rank {}, {} good channels",
            n_rows,
            rank,
            n_good
        );

        Ok(projector)
    }
}

fn split_good<S: AsRef<str>, B: AsRef<str>>(
    channel_names: &[S],
    bad_channels: &[B],
) -> (Vec<String>, Vec<usize>) {
    let bads: HashSet<&str> = bad_channels.iter().map(AsRef::as_ref).collect();
    let names: Vec<String> = channel_names
        .iter()
        .map(|name| name.as_ref().to_string())
        .collect();
    let good_indices = names
        .iter()
        .enumerate()
        .filter(|(_, name)| !bads.contains(name.as_str()))
        .map(|(idx, _)| idx)
        .collect();

    (names, good_indices)
}
