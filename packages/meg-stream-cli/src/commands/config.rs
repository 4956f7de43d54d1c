use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;
use meg_stream::PipelineConfig;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = match &args.input {
        Some(path) => match PipelineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: invalid config '{}': {}", path, e);
                return exit_codes::INPUT_ERROR;
            }
        },
        None => PipelineConfig::default(),
    };

    if let Some(path) = &args.output {
        if let Err(e) = config.save(path) {
            eprintln!("Error: failed to write '{}': {}", path, e);
            return exit_codes::EXECUTION_ERROR;
        }
        return exit_codes::SUCCESS;
    }

    if !output::emit(&config, args.compact, None) {
        return exit_codes::EXECUTION_ERROR;
    }
    exit_codes::SUCCESS
}
