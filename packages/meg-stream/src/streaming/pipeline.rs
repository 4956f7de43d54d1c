// Streaming pipeline - orchestrates acquisition, buffering and spectral estimation
//
// The pipeline manages:
// - Producer lifecycle (driver pushes from its own thread, or a `SampleSource` thread)
// - Flow control through the bounded sample buffer
// - The estimator thread and publication of its spectra
// - Projector application before buffering or before display
// - Event emission to the display side
// - State management

use crate::catalog::ChannelCatalog;
use crate::config::{PipelineConfig, ProjectionStage};
use crate::projector::{
    ActiveProjector, ProjectionVector, Projector, ProjectorBuilder, ProjectorResult,
};
use crate::streaming::{
    buffer::BoundedSampleBuffer,
    estimator::SpectralEstimator,
    source::SampleSource,
    types::{PipelineEvent, PipelineState, PipelineStats, StreamError, StreamResult},
};
use crate::types::{now_seconds, MatrixLayout, Measurement, SampleBlock};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Publisher = Box<dyn Fn(Measurement) + Send + Sync>;
type EventCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// State shared between the pipeline handle and its worker threads
struct Shared {
    id: String,
    stage: ProjectionStage,
    publish_samples: bool,

    state: RwLock<PipelineState>,
    stop_signal: AtomicBool,
    producer_active: AtomicBool,

    // Statistics
    next_sequence: AtomicU64,
    blocks_received: AtomicU64,
    blocks_processed: AtomicU64,
    spectra_published: AtomicU64,
    resyncs: AtomicU64,
    start_time: RwLock<Option<Instant>>,

    publisher: RwLock<Option<Publisher>>,
    event_callback: RwLock<Option<EventCallback>>,
    projector: RwLock<Option<Arc<ActiveProjector>>>,
}

struct Workers {
    consumer: JoinHandle<()>,
    producer: Option<JoinHandle<()>>,
}

/// Producer → buffer → estimator → publisher
///
/// Exactly one estimator thread pops from the buffer. Blocks come either from
/// the caller (`on_samples`/`push_block`) or from a `SampleSource` running on a
/// producer thread owned by the pipeline.
pub struct StreamingPipeline {
    pub id: String,
    config: PipelineConfig,
    buffer: Arc<BoundedSampleBuffer>,
    shared: Arc<Shared>,

    // Serializes start and stop
    lifecycle: Mutex<Option<Workers>>,
}

impl StreamingPipeline {
    pub fn new(config: PipelineConfig) -> StreamResult<Self> {
        config.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        let buffer = Arc::new(BoundedSampleBuffer::new(config.buffer_capacity)?);

        let shared = Arc::new(Shared {
            id: id.clone(),
            stage: config.projection_stage,
            publish_samples: config.publish_samples,
            state: RwLock::new(PipelineState::Idle),
            stop_signal: AtomicBool::new(false),
            producer_active: AtomicBool::new(false),
            next_sequence: AtomicU64::new(0),
            blocks_received: AtomicU64::new(0),
            blocks_processed: AtomicU64::new(0),
            spectra_published: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            start_time: RwLock::new(None),
            publisher: RwLock::new(None),
            event_callback: RwLock::new(None),
            projector: RwLock::new(None),
        });

        Ok(Self {
            id,
            config,
            buffer,
            shared,
            lifecycle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Set the display-side consumer of samples and spectra
    ///
    /// Called from the estimator thread; it must not block.
    pub fn set_publisher<F>(&self, publisher: F)
    where
        F: Fn(Measurement) + Send + Sync + 'static,
    {
        *self.shared.publisher.write() = Some(Box::new(publisher));
    }

    /// Set event callback function
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        *self.shared.event_callback.write() = Some(Box::new(callback));
    }

    pub fn set_projector(&self, projector: Arc<ActiveProjector>) {
        *self.shared.projector.write() = Some(projector);
    }

    pub fn projector(&self) -> Option<Arc<ActiveProjector>> {
        self.shared.projector.read().clone()
    }

    /// Rebuild the projector from a catalog snapshot and its vectors
    ///
    /// Creates the active projector on first use. On failure the previous
    /// projector stays in effect and `ProjectorFailed` is emitted.
    pub fn rebuild_projector(
        &self,
        catalog: &ChannelCatalog,
        vectors: &[ProjectionVector],
    ) -> ProjectorResult<Arc<Projector>> {
        let active = match self.projector() {
            Some(active) => active,
            None => {
                let builder = ProjectorBuilder::new(self.config.projector.clone())?;
                let active = Arc::new(ActiveProjector::new(builder, catalog));
                self.set_projector(Arc::clone(&active));
                active
            }
        };

        match active.rebuild(vectors, catalog) {
            Ok(projector) => {
                self.shared.emit_event(PipelineEvent::ProjectorRebuilt {
                    pipeline_id: self.id.clone(),
                    rank: projector.rank(),
                    dimension: projector.dimension(),
                });
                Ok(projector)
            }
            Err(e) => {
                self.shared.emit_event(PipelineEvent::ProjectorFailed {
                    pipeline_id: self.id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Start the estimator thread; the driver pushes blocks itself
    ///
    /// A no-op while already running.
    pub fn start(&self) -> StreamResult<()> {
        self.launch(None)
    }

    /// Start the estimator thread plus a producer thread pulling from `source`
    pub fn start_with_source<S>(&self, source: S) -> StreamResult<()>
    where
        S: SampleSource + 'static,
    {
        let source: Box<dyn SampleSource> = Box::new(source);
        self.launch(Some(source))
    }

    fn launch(&self, source: Option<Box<dyn SampleSource>>) -> StreamResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            log::debug!("Pipeline {} already running, start ignored", self.id);
            return Ok(());
        }

        let mut source = source;
        if let Some(source) = source.as_mut() {
            source.connect()?;
            let metadata = source.metadata();
            log::info!(
                "Source metadata: {} channels @ {} Hz, {} samples per block",
                metadata.channels,
                metadata.sample_rate,
                metadata.block_size
            );
        }

        log::info!("Starting pipeline: {}", self.id);

        let estimator = SpectralEstimator::new(self.config.estimator.clone())?;

        self.buffer.clear();
        self.buffer.reset();
        self.buffer.reset_metrics();
        self.shared.reset_counters();

        let consumer = {
            let shared = Arc::clone(&self.shared);
            let buffer = Arc::clone(&self.buffer);
            thread::Builder::new()
                .name("meg-stream-estimator".to_string())
                .spawn(move || run_consumer(shared, buffer, estimator))?
        };

        let producer = match source {
            Some(source) => {
                self.shared.producer_active.store(true, Ordering::Release);
                let shared = Arc::clone(&self.shared);
                let buffer = Arc::clone(&self.buffer);
                let spawned = thread::Builder::new()
                    .name("meg-stream-producer".to_string())
                    .spawn(move || run_producer(shared, buffer, source));

                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        self.shared.producer_active.store(false, Ordering::Release);
                        self.shared.stop_signal.store(true, Ordering::Release);
                        self.buffer.release();
                        if consumer.join().is_err() {
                            log::error!("Estimator thread panicked");
                        }
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        *self.shared.start_time.write() = Some(Instant::now());
        self.shared.set_state(PipelineState::Running {
            started_at: now_seconds(),
        });
        *lifecycle = Some(Workers { consumer, producer });

        log::info!("Pipeline started successfully");
        Ok(())
    }

    /// Stop the pipeline and wait for its threads
    ///
    /// Queued blocks and any partial window are discarded. Idempotent.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let Some(workers) = lifecycle.take() else {
            return;
        };

        log::info!("Stopping pipeline: {}", self.id);
        self.shared.set_state(PipelineState::Stopping);

        self.shared.stop_signal.store(true, Ordering::Release);
        self.buffer.release();

        if let Some(producer) = workers.producer {
            // Cut short any pacing delay in the source
            producer.thread().unpark();
            if producer.join().is_err() {
                log::error!("Producer thread panicked");
            }
        }
        if workers.consumer.join().is_err() {
            log::error!("Estimator thread panicked");
        }

        let discarded = self.buffer.clear();
        if discarded > 0 {
            log::info!("Discarded {} unprocessed blocks", discarded);
        }
        self.shared.producer_active.store(false, Ordering::Release);

        self.shared.set_state(PipelineState::Stopped);
        log::info!("Pipeline stopped");
    }

    /// Wait until every submitted block has been processed
    ///
    /// Returns `false` if `timeout` elapsed first. With a source, also waits
    /// for the source to be exhausted.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let producer_done = !self.shared.producer_active.load(Ordering::Acquire);
            let received = self.shared.blocks_received.load(Ordering::Acquire);
            let processed = self.shared.blocks_processed.load(Ordering::Acquire);

            if producer_done && self.buffer.is_empty() && processed >= received {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Driver entry point: hand over a flat sample buffer
    ///
    /// Blocks while the buffer is full. Returns `NotRunning` before the first
    /// start and `Released` once the pipeline is stopping or stopped.
    pub fn on_samples(
        &self,
        data: &[f64],
        layout: MatrixLayout,
        n_channels: usize,
        sample_rate: f64,
    ) -> StreamResult<()> {
        self.ensure_accepting()?;
        let block = SampleBlock::from_slice(data, layout, n_channels, sample_rate)?;
        self.shared.submit(&self.buffer, block)
    }

    /// Driver entry point for an already-built block
    pub fn push_block(&self, block: SampleBlock) -> StreamResult<()> {
        self.ensure_accepting()?;
        self.shared.submit(&self.buffer, block)
    }

    fn ensure_accepting(&self) -> StreamResult<()> {
        match *self.shared.state.read() {
            PipelineState::Running { .. } => Ok(()),
            PipelineState::Idle => Err(StreamError::NotRunning),
            PipelineState::Stopping | PipelineState::Stopped => Err(StreamError::Released),
        }
    }

    /// Get current pipeline state
    pub fn state(&self) -> PipelineState {
        self.shared.state.read().clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), PipelineState::Running { .. })
    }

    /// Get current statistics
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            blocks_received: self.shared.blocks_received.load(Ordering::Relaxed),
            blocks_processed: self.shared.blocks_processed.load(Ordering::Relaxed),
            spectra_published: self.shared.spectra_published.load(Ordering::Relaxed),
            resyncs: self.shared.resyncs.load(Ordering::Relaxed),
            buffer: self.buffer.get_metrics(),
            uptime_seconds: self
                .shared
                .start_time
                .read()
                .as_ref()
                .map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

impl Drop for StreamingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn set_state(&self, state: PipelineState) {
        *self.state.write() = state.clone();
        self.emit_event(PipelineEvent::StateChanged {
            pipeline_id: self.id.clone(),
            state,
        });
    }

    /// Emit an event
    fn emit_event(&self, event: PipelineEvent) {
        if let Some(callback) = self.event_callback.read().as_ref() {
            callback(event);
        }
    }

    fn emit_error(&self, error: String) {
        self.emit_event(PipelineEvent::Error {
            pipeline_id: self.id.clone(),
            error,
        });
    }

    fn publish(&self, measurement: Measurement) {
        if let Some(publisher) = self.publisher.read().as_ref() {
            publisher(measurement);
        }
    }

    fn reset_counters(&self) {
        self.stop_signal.store(false, Ordering::Release);
        self.next_sequence.store(0, Ordering::Relaxed);
        self.blocks_received.store(0, Ordering::Relaxed);
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.spectra_published.store(0, Ordering::Relaxed);
        self.resyncs.store(0, Ordering::Relaxed);
    }

    fn projector_snapshot(&self) -> Option<Arc<Projector>> {
        self.projector.read().as_ref().map(|active| active.snapshot())
    }

    /// Project `block` if a projector is set; on a layout mismatch the block
    /// is returned unchanged and an error event is emitted
    fn project(&self, block: SampleBlock) -> SampleBlock {
        let Some(projector) = self.projector_snapshot() else {
            return block;
        };
        match projector.apply(&block) {
            Ok(projected) => projected,
            Err(e) => {
                log::warn!("Block {} not projected: {}", block.sequence(), e);
                self.emit_error(e.to_string());
                block
            }
        }
    }

    /// Number, optionally project, and enqueue one block (producer side)
    fn submit(&self, buffer: &BoundedSampleBuffer, block: SampleBlock) -> StreamResult<()> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let mut block = block.with_sequence(sequence);
        if self.stage == ProjectionStage::BeforeBuffer {
            block = self.project(block);
        }

        // A block is counted before the consumer can pop it
        self.blocks_received.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = buffer.push(block) {
            self.blocks_received.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }
        Ok(())
    }

    /// Consumer side handling of one popped block
    fn process_block(&self, estimator: &mut SpectralEstimator, block: SampleBlock) {
        match self.stage {
            ProjectionStage::BeforeDisplay => {
                self.publish(Measurement::Projected(self.project(block.clone())));
            }
            _ if self.publish_samples => self.publish(Measurement::Samples(block.clone())),
            _ => {}
        }

        if let Some(event) = estimator.align(&block) {
            self.resyncs.fetch_add(1, Ordering::Relaxed);
            self.emit_event(PipelineEvent::Resync {
                pipeline_id: self.id.clone(),
                event,
            });
        }

        estimator.accumulate_with(&block, |spectrum| {
            let sequence = spectrum.sequence;
            self.publish(Measurement::Spectrum(spectrum));
            self.spectra_published.fetch_add(1, Ordering::Relaxed);
            self.emit_event(PipelineEvent::SpectrumPublished {
                pipeline_id: self.id.clone(),
                sequence,
            });
        });

        self.blocks_processed.fetch_add(1, Ordering::Release);
    }
}

/// Estimator thread: pop, accumulate, publish until released
fn run_consumer(shared: Arc<Shared>, buffer: Arc<BoundedSampleBuffer>, mut estimator: SpectralEstimator) {
    log::debug!("Estimator thread started");

    loop {
        if shared.stop_signal.load(Ordering::Acquire) {
            break;
        }

        let block = match buffer.pop() {
            Ok(block) => block,
            Err(StreamError::Released) => break,
            Err(e) => {
                log::error!("Buffer error: {}", e);
                shared.emit_error(e.to_string());
                break;
            }
        };

        if shared.stop_signal.load(Ordering::Acquire) {
            break;
        }
        shared.process_block(&mut estimator, block);
    }

    estimator.stop();
    log::info!("Estimator thread stopped");
}

/// Producer thread: pull from the source until exhausted or stopped
fn run_producer(shared: Arc<Shared>, buffer: Arc<BoundedSampleBuffer>, mut source: Box<dyn SampleSource>) {
    log::debug!("Producer thread started");

    while !shared.stop_signal.load(Ordering::Acquire) {
        match source.next_block() {
            Ok(Some(block)) => match shared.submit(&buffer, block) {
                Ok(()) => {}
                Err(StreamError::Released) => break,
                Err(e) => {
                    log::error!("Failed to submit block: {}", e);
                    shared.emit_error(e.to_string());
                    break;
                }
            },
            Ok(None) => {
                log::info!("Source exhausted");
                break;
            }
            Err(e) => {
                log::error!("Source streaming error: {}", e);
                shared.emit_error(e.to_string());
                break;
            }
        }
    }

    if let Err(e) = source.stop() {
        log::warn!("Source did not stop cleanly: {}", e);
    }
    shared.producer_active.store(false, Ordering::Release);
    log::info!("Producer thread stopped");
}
