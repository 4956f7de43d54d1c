use clap::{Args, Parser, Subcommand, ValueEnum};
use meg_stream::{ProjectionStage, SpectrumScale, WindowFunction};

#[derive(Parser)]
#[command(
    name = "megstream",
    version,
    about = "Multichannel sensor streaming, spectral estimation and SSP projection",
    long_about = "Drive the meg-stream acquisition core from the command line.\n\
                  `run` streams a synthetic multichannel sinusoid through the buffer and\n\
                  spectral estimator; `projector` builds an SSP operator from a session file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stream a synthetic signal through the pipeline and print spectra
    Run(RunArgs),
    /// Build the projector for a session file
    Projector(ProjectorArgs),
    /// Print a pipeline configuration as JSON
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Number of synthetic channels
    #[arg(long, default_value_t = 8)]
    pub channels: usize,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 1000.0)]
    pub sample_rate: f64,

    /// Samples per channel in each block
    #[arg(long, default_value_t = 100)]
    pub block_size: usize,

    /// Number of blocks to stream
    #[arg(long, default_value_t = 50)]
    pub blocks: u64,

    /// Sinusoid frequency in Hz
    #[arg(long, default_value_t = 10.0)]
    pub frequency: f64,

    /// Amplitude of channel 0 (channel i gets i + 1 times this)
    #[arg(long, default_value_t = 1.0)]
    pub amplitude: f64,

    /// Delay between blocks in milliseconds
    #[arg(long)]
    pub rate_limit_ms: Option<u64>,

    /// Pipeline configuration file (JSON); flags below override it
    #[arg(long, env = "MEGSTREAM_CONFIG")]
    pub config: Option<String>,

    /// Buffer capacity in blocks
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Transform length in samples (power of two)
    #[arg(long)]
    pub window: Option<usize>,

    /// Window overlap fraction in [0, 1)
    #[arg(long)]
    pub overlap: Option<f64>,

    /// Window taper
    #[arg(long, value_enum)]
    pub taper: Option<TaperArg>,

    /// Output scale of spectrum values
    #[arg(long, value_enum)]
    pub scale: Option<ScaleArg>,

    /// Session file (JSON) whose projection vectors are applied
    #[arg(long)]
    pub session: Option<String>,

    /// Where the projector is applied
    #[arg(long, value_enum)]
    pub stage: Option<StageArg>,

    /// Channel whose peak is reported per spectrum
    #[arg(long, default_value_t = 0)]
    pub report_channel: usize,

    /// Print one summary object instead of one line per spectrum
    #[arg(long, default_value_t = false)]
    pub summary: bool,

    /// Seconds to wait for the pipeline to process every block
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ProjectorArgs {
    /// Session file (JSON) with channels and projection vectors
    #[arg(long)]
    pub session: String,

    /// Replace the session's bad channel list
    #[arg(long, num_args = 0..)]
    pub bads: Option<Vec<String>>,

    /// Relative singular-value tolerance for the rank decision
    #[arg(long, default_value_t = 1e-6)]
    pub tolerance: f64,

    /// Include the projection matrix in the output
    #[arg(long, default_value_t = false)]
    pub matrix: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Validate this config file and print it with defaults filled in
    #[arg(long)]
    pub input: Option<String>,

    /// Write the configuration to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TaperArg {
    Rectangular,
    Hann,
}

impl From<TaperArg> for WindowFunction {
    fn from(arg: TaperArg) -> Self {
        match arg {
            TaperArg::Rectangular => WindowFunction::Rectangular,
            TaperArg::Hann => WindowFunction::Hann,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ScaleArg {
    Magnitude,
    Power,
    Decibel,
}

impl From<ScaleArg> for SpectrumScale {
    fn from(arg: ScaleArg) -> Self {
        match arg {
            ScaleArg::Magnitude => SpectrumScale::Magnitude,
            ScaleArg::Power => SpectrumScale::Power,
            ScaleArg::Decibel => SpectrumScale::Decibel,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StageArg {
    None,
    BeforeBuffer,
    BeforeDisplay,
}

impl From<StageArg> for ProjectionStage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::None => ProjectionStage::None,
            StageArg::BeforeBuffer => ProjectionStage::BeforeBuffer,
            StageArg::BeforeDisplay => ProjectionStage::BeforeDisplay,
        }
    }
}
