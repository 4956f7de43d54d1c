use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{ProjectionVector, Projector, ProjectorBuilder, ProjectorResult};
use crate::catalog::ChannelCatalog;

/// The projector currently in use by a running pipeline
///
/// Readers take a cheap `Arc` snapshot. A rebuild runs without holding the
/// lock and only replaces the current projector when it succeeds, so a failed
/// rebuild leaves the previous operator in place.
pub struct ActiveProjector {
    builder: ProjectorBuilder,
    current: RwLock<Arc<Projector>>,
    generation: AtomicU64,
}

impl ActiveProjector {
    /// Start with the identity for the catalog's good channels
    pub fn new(builder: ProjectorBuilder, catalog: &ChannelCatalog) -> Self {
        let identity = Projector::identity(&catalog.names(), &catalog.bad_names());
        Self {
            builder,
            current: RwLock::new(Arc::new(identity)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<Projector> {
        Arc::clone(&self.current.read())
    }

    /// Number of successful rebuilds so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn rebuild(
        &self,
        vectors: &[ProjectionVector],
        catalog: &ChannelCatalog,
    ) -> ProjectorResult<Arc<Projector>> {
        let projector = match self.builder.build_for_catalog(vectors, catalog) {
            Ok(projector) => Arc::new(projector),
            Err(e) => {
                log::error!("Projector rebuild failed, keeping previous projector: {}", e);
                return Err(e);
            }
        };

        *self.current.write() = Arc::clone(&projector);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::info!(
            "Projector generation {} active (rank {}, {} good channels)",
            generation,
            projector.rank(),
            projector.dimension()
        );

        Ok(projector)
    }
}
