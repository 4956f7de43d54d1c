// Pull-style sample producers
//
// A `SampleSource` stands in for the acquisition driver when the pipeline owns
// the producer thread. Drivers that push on their own thread call
// `StreamingPipeline::on_samples` instead and need no source.
//
// Current implementations:
// - Synthetic: phase-continuous sinusoids, one amplitude per channel
// - Replay: a fixed list of recorded blocks

mod replay;
mod synthetic;

use crate::streaming::types::StreamResult;
use crate::types::SampleBlock;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

pub use replay::ReplaySource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Layout a source will produce
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceMetadata {
    pub channels: usize,

    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Samples per channel in each block (the last block may be shorter)
    pub block_size: usize,
}

/// Wait out a pacing delay on the producer thread
///
/// Returns early when the thread is unparked, which `StreamingPipeline::stop`
/// does before joining the producer.
pub(crate) fn pace(delay_ms: u64) {
    thread::park_timeout(Duration::from_millis(delay_ms));
}

/// Trait for all sample producers
///
/// The pipeline calls `connect` once before spawning its producer thread,
/// then `next_block` until it returns `Ok(None)` or the pipeline stops, and
/// finally `stop` from the producer thread.
pub trait SampleSource: Send {
    fn connect(&mut self) -> StreamResult<()> {
        Ok(())
    }

    /// Next block in acquisition order, `None` once the source is exhausted
    fn next_block(&mut self) -> StreamResult<Option<SampleBlock>>;

    fn stop(&mut self) -> StreamResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool;

    fn metadata(&self) -> SourceMetadata;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn connect(&mut self) -> StreamResult<()> {
        (**self).connect()
    }

    fn next_block(&mut self) -> StreamResult<Option<SampleBlock>> {
        (**self).next_block()
    }

    fn stop(&mut self) -> StreamResult<()> {
        (**self).stop()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn metadata(&self) -> SourceMetadata {
        (**self).metadata()
    }
}
