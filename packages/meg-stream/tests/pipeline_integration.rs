use meg_stream::catalog::{ChannelDescriptor, ChannelKind};
use meg_stream::streaming::{ReplaySource, ResyncEvent, SyntheticConfig, SyntheticSource};
use meg_stream::{
    ChannelCatalog, EstimatorConfig, MatrixLayout, Measurement, PipelineConfig, PipelineEvent,
    PipelineState, ProjectionStage, ProjectionVector, SampleBlock, StreamError,
    StreamingPipeline, WindowFunction,
};
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(capacity: usize, window_length: usize) -> PipelineConfig {
    PipelineConfig {
        buffer_capacity: capacity,
        estimator: EstimatorConfig {
            window_length,
            window_function: WindowFunction::Rectangular,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn filled_block(channels: usize, samples: usize, value: f64) -> SampleBlock {
    SampleBlock::from_channels(vec![vec![value; samples]; channels], 1000.0).unwrap()
}

#[test]
fn test_blocks_published_once_and_in_order() {
    init_logging();
    let pipeline = StreamingPipeline::new(PipelineConfig {
        projection_stage: ProjectionStage::BeforeDisplay,
        ..config(4, 256)
    })
    .unwrap();

    let (tx, rx) = mpsc::channel();
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Projected(block) = measurement {
            tx.send((block.sequence(), block.data()[(7, 99)])).ok();
        }
    });
    pipeline.start().unwrap();

    for index in 0..10 {
        pipeline
            .push_block(filled_block(8, 100, index as f64))
            .unwrap();
    }
    assert!(pipeline.drain(Duration::from_secs(10)));
    pipeline.stop();

    let seen: Vec<(u64, f64)> = rx.try_iter().collect();
    let expected: Vec<(u64, f64)> = (0..10).map(|i| (i as u64, i as f64)).collect();
    assert_eq!(seen, expected);

    let stats = pipeline.stats();
    assert_eq!(stats.blocks_received, 10);
    assert_eq!(stats.blocks_processed, 10);
    assert!(stats.buffer.peak_size <= 4);
    // 1000 samples with N = 256: three full windows
    assert_eq!(stats.spectra_published, 3);
}

#[test]
fn test_long_block_publishes_every_window() {
    init_logging();
    let pipeline = StreamingPipeline::new(config(4, 8)).unwrap();
    assert_eq!(pipeline.config().estimator.pending_capacity, 8);

    let (tx, rx) = mpsc::channel();
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Spectrum(spectrum) = measurement {
            tx.send(spectrum.sequence).ok();
        }
    });
    pipeline.start().unwrap();

    // 200 samples with N = 8 and no overlap: 25 windows from one block
    pipeline.push_block(filled_block(2, 200, 0.5)).unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)));
    pipeline.stop();

    let published: Vec<u64> = rx.try_iter().collect();
    assert_eq!(published, (0..25).collect::<Vec<u64>>());
    assert_eq!(pipeline.stats().spectra_published, 25);
}

#[test]
fn test_flat_driver_buffers() {
    init_logging();
    let pipeline = StreamingPipeline::new(PipelineConfig {
        publish_samples: true,
        ..config(2, 64)
    })
    .unwrap();

    let (tx, rx) = mpsc::channel();
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Samples(block) = measurement {
            tx.send(block.channel(1)).ok();
        }
    });
    pipeline.start().unwrap();

    // Interleaved: sample-major, 2 channels x 3 samples
    pipeline
        .on_samples(&[1.0, 10.0, 2.0, 20.0, 3.0, 30.0], MatrixLayout::ColumnMajor, 2, 500.0)
        .unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)));
    pipeline.stop();

    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Some(vec![10.0, 20.0, 30.0])]);
}

#[test]
fn test_stop_unblocks_waiting_driver() {
    init_logging();
    let pipeline = StreamingPipeline::new(PipelineConfig {
        publish_samples: true,
        ..config(2, 1024)
    })
    .unwrap();
    // Slow display side so the buffer fills up
    pipeline.set_publisher(|_| thread::sleep(Duration::from_millis(50)));
    pipeline.start().unwrap();

    let result = thread::scope(|scope| {
        let driver = scope.spawn(|| {
            for index in 0..1000 {
                pipeline.push_block(filled_block(4, 32, index as f64))?;
            }
            Ok::<(), StreamError>(())
        });

        thread::sleep(Duration::from_millis(150));
        let started = Instant::now();
        pipeline.stop();
        assert!(started.elapsed() < Duration::from_secs(2));

        driver.join().unwrap()
    });

    assert!(matches!(result, Err(StreamError::Released)));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn test_stop_interrupts_paced_sources() {
    init_logging();
    let pipeline = StreamingPipeline::new(config(4, 64)).unwrap();

    let synthetic = SyntheticSource::new(SyntheticConfig {
        channels: 2,
        rate_limit_ms: Some(60_000),
        ..Default::default()
    });
    pipeline.start_with_source(synthetic).unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    pipeline.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    let replay = ReplaySource::new(vec![filled_block(2, 16, 0.0); 3]).with_rate_limit(60_000);
    pipeline.start_with_source(replay).unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    pipeline.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_drain_waits_for_blocked_driver() {
    init_logging();
    let pipeline = StreamingPipeline::new(PipelineConfig {
        publish_samples: true,
        ..config(1, 64)
    })
    .unwrap();

    // Each published block waits for a token, holding the consumer
    let (gate, tokens) = mpsc::channel::<()>();
    let tokens = Mutex::new(tokens);
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Samples(_) = measurement {
            if let Ok(tokens) = tokens.lock() {
                tokens.recv().ok();
            }
        }
    });
    pipeline.start().unwrap();

    thread::scope(|scope| {
        pipeline.push_block(filled_block(2, 16, 0.0)).unwrap();
        pipeline.push_block(filled_block(2, 16, 1.0)).unwrap();
        let driver = scope.spawn(|| pipeline.push_block(filled_block(2, 16, 2.0)));

        // The third block is counted while its push is still waiting
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.stats().blocks_received < 3 {
            assert!(Instant::now() < deadline, "driver push never counted");
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!pipeline.drain(Duration::from_millis(30)));

        for _ in 0..3 {
            gate.send(()).unwrap();
        }
        driver.join().unwrap().unwrap();
    });

    assert!(pipeline.drain(Duration::from_secs(5)));
    pipeline.stop();

    let stats = pipeline.stats();
    assert_eq!(stats.blocks_received, 3);
    assert_eq!(stats.blocks_processed, 3);
}

#[test]
fn test_restart_begins_fresh_session() {
    init_logging();
    let pipeline = StreamingPipeline::new(config(4, 64)).unwrap();
    let (tx, rx) = mpsc::channel();
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Spectrum(spectrum) = measurement {
            tx.send(spectrum.sequence).ok();
        }
    });

    for _ in 0..2 {
        pipeline.start().unwrap();
        // Leave a partial window behind; it must not leak into the next session
        for _ in 0..3 {
            pipeline.push_block(filled_block(2, 40, 1.0)).unwrap();
        }
        assert!(pipeline.drain(Duration::from_secs(5)));
        pipeline.stop();

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(pipeline.stats().blocks_received, 3);
    }
}

#[test]
fn test_channel_change_reports_resync() {
    init_logging();
    let pipeline = StreamingPipeline::new(config(4, 128)).unwrap();

    let (tx, rx) = mpsc::channel();
    pipeline.set_event_callback(move |event| {
        if let PipelineEvent::Resync { event, .. } = event {
            tx.send(event).ok();
        }
    });
    pipeline.start().unwrap();

    pipeline.push_block(filled_block(4, 100, 0.5)).unwrap();
    pipeline.push_block(filled_block(2, 100, 0.5)).unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)));
    pipeline.stop();

    let events: Vec<ResyncEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_channels, 4);
    assert_eq!(events[0].channels, 2);
    assert_eq!(events[0].discarded_samples, 100);

    let stats = pipeline.stats();
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.spectra_published, 0);
}

#[test]
fn test_replayed_rate_change_resyncs() {
    init_logging();
    let at_rate = |rate: f64| SampleBlock::from_channels(vec![vec![1.0; 64]; 4], rate).unwrap();
    let blocks = vec![at_rate(1000.0), at_rate(1000.0), at_rate(1000.0), at_rate(500.0), at_rate(500.0)];

    let pipeline = StreamingPipeline::new(config(2, 128)).unwrap();
    let (tx, rx) = mpsc::channel();
    pipeline.set_event_callback(move |event| {
        if let PipelineEvent::Resync { event, .. } = event {
            tx.send(event).ok();
        }
    });
    pipeline
        .start_with_source(ReplaySource::new(blocks).with_rate_limit(1))
        .unwrap();

    assert!(pipeline.drain(Duration::from_secs(10)));
    pipeline.stop();

    let events: Vec<ResyncEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_sample_rate, 1000.0);
    assert_eq!(events[0].sample_rate, 500.0);
    assert_eq!(events[0].discarded_samples, 64);

    let stats = pipeline.stats();
    assert_eq!(stats.blocks_received, 5);
    // one window at each rate
    assert_eq!(stats.spectra_published, 2);
}

#[test]
fn test_projection_before_buffer() {
    init_logging();
    let pipeline = StreamingPipeline::new(PipelineConfig {
        projection_stage: ProjectionStage::BeforeBuffer,
        publish_samples: true,
        ..config(4, 64)
    })
    .unwrap();

    let catalog = ChannelCatalog::new(vec![
        ChannelDescriptor::new("MEG0111", ChannelKind::Meg),
        ChannelDescriptor::new("MEG0112", ChannelKind::Meg),
        ChannelDescriptor::new("EEG001", ChannelKind::Eeg),
    ])
    .unwrap()
    .with_bads(&["EEG001"]);
    let common_mode = ProjectionVector::new("common", vec![("MEG0111", 1.0), ("MEG0112", 1.0)]);
    pipeline.rebuild_projector(&catalog, &[common_mode]).unwrap();

    let (tx, rx) = mpsc::channel();
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Samples(block) = measurement {
            tx.send(block).ok();
        }
    });
    pipeline.start().unwrap();

    let block = SampleBlock::from_channels(vec![vec![1.0, 5.0], vec![3.0, 5.0], vec![7.0, 7.0]], 250.0)
        .unwrap();
    pipeline.push_block(block).unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)));
    pipeline.stop();

    let published: Vec<SampleBlock> = rx.try_iter().collect();
    assert_eq!(published.len(), 1);
    let data = published[0].data();
    // Common mode removed from the good channels, bad channel untouched
    let expected = [[-1.0, 0.0], [1.0, 0.0], [7.0, 7.0]];
    for (row, values) in expected.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            assert!((data[(row, col)] - value).abs() < 1e-12);
        }
    }
}

#[test]
fn test_projector_layout_mismatch_passes_block_through() {
    init_logging();
    let pipeline = StreamingPipeline::new(PipelineConfig {
        projection_stage: ProjectionStage::BeforeDisplay,
        ..config(4, 64)
    })
    .unwrap();

    let catalog = ChannelCatalog::new(vec![
        ChannelDescriptor::new("A", ChannelKind::Meg),
        ChannelDescriptor::new("B", ChannelKind::Meg),
    ])
    .unwrap();
    pipeline
        .rebuild_projector(&catalog, &[ProjectionVector::new("a", vec![("A", 1.0)])])
        .unwrap();

    let (event_tx, event_rx) = mpsc::channel();
    pipeline.set_event_callback(move |event| {
        if let PipelineEvent::Error { error, .. } = event {
            event_tx.send(error).ok();
        }
    });
    let (tx, rx) = mpsc::channel();
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Projected(block) = measurement {
            tx.send(block.n_channels()).ok();
        }
    });
    pipeline.start().unwrap();

    pipeline.push_block(filled_block(3, 10, 1.0)).unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)));
    pipeline.stop();

    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![3]);
    assert_eq!(event_rx.try_iter().count(), 1);
}
