use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use meg_stream::streaming::{PipelineStats, SyntheticConfig, SyntheticSource};
use meg_stream::{
    Measurement, PipelineConfig, ProjectionStage, SessionInfo, SpectrumEstimate, StreamError,
    StreamingPipeline,
};
use serde::Serialize;
use std::sync::mpsc;
use std::time::Duration;

/// One line of `run` output
#[derive(Debug, Serialize, PartialEq)]
struct SpectrumSummary {
    sequence: u64,
    window_start: u64,
    channel: usize,
    peak_bin: Option<usize>,
    peak_frequency: Option<f64>,
    peak_value: Option<f64>,
}

impl SpectrumSummary {
    fn of(spectrum: &SpectrumEstimate, channel: usize) -> Self {
        let peak_bin = spectrum.peak_bin(channel);
        Self {
            sequence: spectrum.sequence,
            window_start: spectrum.window_start,
            channel,
            peak_bin,
            peak_frequency: spectrum.peak_frequency(channel),
            peak_value: peak_bin.and_then(|bin| spectrum.channel(channel).map(|values| values[bin])),
        }
    }
}

#[derive(Serialize)]
struct RunSummary {
    pipeline_id: String,
    spectra: usize,
    frequency_resolution: f64,
    projector_rank: Option<usize>,
    stats: PipelineStats,
    last: Option<SpectrumSummary>,
}

/// Config file (if any) with command-line overrides applied on top
fn resolve_config(args: &RunArgs) -> Result<PipelineConfig, String> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .map_err(|e| format!("invalid config '{}': {}", path, e))?,
        None => PipelineConfig::default(),
    };

    if let Some(capacity) = args.capacity {
        config.buffer_capacity = capacity;
    }
    if let Some(window) = args.window {
        config.estimator.window_length = window;
    }
    if let Some(overlap) = args.overlap {
        config.estimator.window_overlap = overlap;
    }
    if let Some(taper) = args.taper {
        config.estimator.window_function = taper.into();
    }
    if let Some(scale) = args.scale {
        config.estimator.scale = scale.into();
    }
    if let Some(stage) = args.stage {
        config.projection_stage = stage.into();
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn execute(args: RunArgs) -> i32 {
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let session = match args
        .session
        .as_deref()
        .map(|path| SessionInfo::from_json_file(path))
        .transpose()
    {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: failed to read session: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    if let Some(session) = &session {
        if session.channels.len() != args.channels {
            eprintln!(
                "Error: session has {} channels but --channels is {}",
                session.channels.len(),
                args.channels
            );
            return exit_codes::INPUT_ERROR;
        }
        if config.projection_stage == ProjectionStage::None {
            log::warn!("Session projectors are built but not applied (projection stage is none)");
        }
    }

    let frequency_resolution = args.sample_rate / config.estimator.window_length as f64;
    let pipeline = match StreamingPipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let projector_rank = match &session {
        Some(session) => match pipeline.rebuild_projector(&session.channels, &session.projections) {
            Ok(projector) => Some(projector.rank()),
            Err(e) => {
                eprintln!("Projector construction failed: {}", e);
                return exit_codes::NUMERICAL_ERROR;
            }
        },
        None => None,
    };

    let (tx, rx) = mpsc::channel();
    let report_channel = args.report_channel;
    pipeline.set_publisher(move |measurement| {
        if let Measurement::Spectrum(spectrum) = measurement {
            tx.send(SpectrumSummary::of(&spectrum, report_channel)).ok();
        }
    });

    let source = SyntheticSource::new(SyntheticConfig {
        channels: args.channels,
        sample_rate: args.sample_rate,
        block_size: args.block_size,
        frequency: args.frequency,
        amplitude: args.amplitude,
        max_blocks: Some(args.blocks),
        rate_limit_ms: args.rate_limit_ms,
    });

    if !args.quiet {
        eprintln!(
            "Streaming {} blocks of {} x {} @ {} Hz...",
            args.blocks, args.channels, args.block_size, args.sample_rate
        );
    }

    if let Err(e) = pipeline.start_with_source(source) {
        eprintln!("Error: {}", e);
        return match e {
            StreamError::Source(_) => exit_codes::INPUT_ERROR,
            _ => exit_codes::EXECUTION_ERROR,
        };
    }

    let drained = pipeline.drain(Duration::from_secs(args.timeout));
    pipeline.stop();
    let spectra: Vec<SpectrumSummary> = rx.try_iter().collect();

    if !drained {
        eprintln!("Error: pipeline did not finish within {} s", args.timeout);
        return exit_codes::DRAIN_TIMEOUT;
    }
    if !args.quiet {
        eprintln!("Published {} spectra", spectra.len());
    }

    let written = if args.summary {
        let summary = RunSummary {
            pipeline_id: pipeline.id.clone(),
            spectra: spectra.len(),
            frequency_resolution,
            projector_rank,
            stats: pipeline.stats(),
            last: spectra.into_iter().last(),
        };
        output::emit(&summary, args.compact, args.output.as_deref())
    } else {
        match output::write_lines(&spectra, args.output.as_deref()) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Error: {}", e);
                false
            }
        }
    };

    if !written {
        return exit_codes::EXECUTION_ERROR;
    }
    exit_codes::SUCCESS
}
