// Replays a fixed list of recorded blocks

use super::{SampleSource, SourceMetadata};
use crate::streaming::types::StreamResult;
use crate::types::SampleBlock;
use std::collections::VecDeque;

pub struct ReplaySource {
    blocks: VecDeque<SampleBlock>,
    metadata: SourceMetadata,
    rate_limit_ms: Option<u64>,
    is_connected: bool,
}

impl ReplaySource {
    pub fn new(blocks: Vec<SampleBlock>) -> Self {
        let metadata = blocks
            .first()
            .map(|block| SourceMetadata {
                channels: block.n_channels(),
                sample_rate: block.sample_rate(),
                block_size: block.n_samples(),
            })
            .unwrap_or(SourceMetadata {
                channels: 0,
                sample_rate: 0.0,
                block_size: 0,
            });

        Self {
            blocks: blocks.into(),
            metadata,
            rate_limit_ms: None,
            is_connected: false,
        }
    }

    /// Delay between blocks in milliseconds
    pub fn with_rate_limit(mut self, rate_limit_ms: u64) -> Self {
        self.rate_limit_ms = Some(rate_limit_ms);
        self
    }

    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

impl SampleSource for ReplaySource {
    fn connect(&mut self) -> StreamResult<()> {
        log::info!("Replay source connected with {} blocks", self.blocks.len());
        self.is_connected = true;
        Ok(())
    }

    fn next_block(&mut self) -> StreamResult<Option<SampleBlock>> {
        let Some(block) = self.blocks.pop_front() else {
            return Ok(None);
        };
        if let Some(delay) = self.rate_limit_ms {
            super::pace(delay);
        }
        Ok(Some(block))
    }

    fn stop(&mut self) -> StreamResult<()> {
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn metadata(&self) -> SourceMetadata {
        self.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(channels: usize, samples: usize) -> SampleBlock {
        SampleBlock::from_channels(vec![vec![0.25; samples]; channels], 500.0).unwrap()
    }

    #[test]
    fn test_replays_in_order_then_ends() {
        let mut source = ReplaySource::new(vec![block(3, 10).with_sequence(4), block(3, 10).with_sequence(5)]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.metadata().channels, 3);
        assert_eq!(source.metadata().block_size, 10);

        source.connect().unwrap();
        assert!(source.is_connected());
        assert_eq!(source.next_block().unwrap().map(|b| b.sequence()), Some(4));
        assert_eq!(source.next_block().unwrap().map(|b| b.sequence()), Some(5));
        assert!(source.next_block().unwrap().is_none());
        assert_eq!(source.remaining(), 0);

        source.stop().unwrap();
        assert!(!source.is_connected());
    }

    #[test]
    fn test_empty_replay_has_blank_metadata() {
        let source = ReplaySource::new(Vec::new()).with_rate_limit(5);
        assert_eq!(source.metadata().channels, 0);
        assert_eq!(source.metadata().sample_rate, 0.0);
        assert_eq!(source.rate_limit_ms, Some(5));
    }
}
