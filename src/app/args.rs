//! Command-line arguments for the demo runner

use clap::{ArgAction, Parser};
use queue_listener::core::logging::LogFormat;
use std::path::PathBuf;
use std::str::FromStr;

/// Runs listener containers against seeded in-memory queues
#[derive(Parser, Debug, Clone)]
#[command(name = "queue-listener", version, about)]
pub struct Args {
    /// Configuration file path
    #[arg(long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Number of containers (and queues) to run
    #[arg(long = "containers", value_name = "N", default_value_t = 1)]
    pub containers: usize,

    /// Messages seeded into each queue
    #[arg(long = "messages", value_name = "N", default_value_t = 100)]
    pub messages: usize,

    /// Spread messages over this many FIFO groups (implies --fifo)
    #[arg(long = "groups", value_name = "N")]
    pub groups: Option<usize>,

    /// Use FIFO queues
    #[arg(long = "fifo", action = ArgAction::SetTrue)]
    pub fifo: bool,

    /// Simulated processing time per message
    #[arg(long = "work-ms", value_name = "MS", default_value_t = 10)]
    pub work_ms: u64,

    /// Fail the first delivery of every Nth message
    #[arg(long = "fail-every", value_name = "N")]
    pub fail_every: Option<usize>,

    /// Lease length of the in-memory queues
    #[arg(long = "visibility-timeout-ms", value_name = "MS", default_value_t = 1000)]
    pub visibility_timeout_ms: u64,

    /// Stop after this long even if messages remain
    #[arg(long = "run-for-ms", value_name = "MS")]
    pub run_for_ms: Option<u64>,

    /// Messages requested per poll (overrides the configuration file)
    #[arg(long = "batch-size", value_name = "N")]
    pub batch_size: Option<usize>,

    /// Maximum messages in flight per container (overrides the configuration file)
    #[arg(long = "total-permits", value_name = "N")]
    pub total_permits: Option<usize>,

    /// Summary output format
    #[arg(long = "output", value_name = "FORMAT", default_value = "text", value_parser = ["text", "json"])]
    pub output: String,

    /// Verbose output (can be used multiple times for more verbosity)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (can be used multiple times for less verbosity)
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Force colored output
    #[arg(long = "color", action = ArgAction::SetTrue)]
    pub color: bool,

    /// Disable colored output
    #[arg(long = "no-color", action = ArgAction::SetTrue)]
    pub no_color: bool,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log level, or a full flexi_logger spec
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn is_fifo(&self) -> bool {
        self.fifo || self.groups.is_some_and(|groups| groups > 0)
    }

    /// Requested log format, `text` when not given
    pub fn log_format(&self) -> Result<LogFormat, strum::ParseError> {
        self.log_format
            .as_deref()
            .map_or(Ok(LogFormat::Text), LogFormat::from_str)
    }

    /// Log level from the explicit flag, or from -v / -q counts
    pub fn effective_log_level(&self) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        let verbosity = self.verbose as i8 - self.quiet as i8;
        match verbosity {
            i8::MIN..=-2 => "error",
            -1 => "warn",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string()
    }
}
