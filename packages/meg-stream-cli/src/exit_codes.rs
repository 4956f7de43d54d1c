pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
/// Bad arguments, unreadable or invalid config/session files
pub const INPUT_ERROR: i32 = 2;
/// Projector construction failed (non-finite weights, SVD non-convergence)
pub const NUMERICAL_ERROR: i32 = 3;
/// The pipeline did not finish processing before `--timeout`
pub const DRAIN_TIMEOUT: i32 = 4;
