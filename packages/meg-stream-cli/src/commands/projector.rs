use crate::cli::ProjectorArgs;
use crate::exit_codes;
use crate::output;
use meg_stream::{ProjectorBuilder, ProjectorConfig, SessionInfo};
use serde::Serialize;

#[derive(Serialize)]
struct ProjectorOutput {
    rank: usize,
    dimension: usize,
    good_channels: Vec<String>,
    bad_channels: Vec<String>,
    applied_vectors: Vec<String>,
    dropped_vectors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matrix: Option<Vec<Vec<f64>>>,
}

pub fn execute(args: ProjectorArgs) -> i32 {
    let session = match SessionInfo::from_json_file(&args.session) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: failed to read session '{}': {}", args.session, e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let catalog = match &args.bads {
        Some(bads) => session.channels.with_bads(bads),
        None => session.channels.clone(),
    };

    let builder = match ProjectorBuilder::new(ProjectorConfig {
        relative_tolerance: args.tolerance,
        ..Default::default()
    }) {
        Ok(builder) => builder,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let projector = match builder.build_for_catalog(&session.projections, &catalog) {
        Ok(projector) => projector,
        Err(e) => {
            eprintln!("Projector construction failed: {}", e);
            return exit_codes::NUMERICAL_ERROR;
        }
    };

    let matrix: Option<Vec<Vec<f64>>> = args.matrix.then(|| {
        projector
            .matrix()
            .row_iter()
            .map(|row| row.iter().copied().collect::<Vec<f64>>())
            .collect()
    });

    let result = ProjectorOutput {
        rank: projector.rank(),
        dimension: projector.dimension(),
        good_channels: projector.good_channels(),
        bad_channels: catalog.bad_names(),
        applied_vectors: projector.applied_vectors().to_vec(),
        dropped_vectors: projector.dropped_vectors().to_vec(),
        matrix,
    };

    if !output::emit(&result, args.compact, args.output.as_deref()) {
        return exit_codes::EXECUTION_ERROR;
    }
    exit_codes::SUCCESS
}
