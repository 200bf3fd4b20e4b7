//! Command-line interface for mouthpiece
//!
//! Handles argument parsing and logging configuration.

use clap::{Parser, Subcommand};
use log::LevelFilter;

/// Mouthpiece - speak text or your own voice through a virtual microphone
#[derive(Parser, Debug)]
#[command(name = "mouthpiece")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List input and output audio devices
    Devices,

    /// Synthesize text and play it on the configured devices
    Speak {
        /// The text to speak
        text: String,

        /// Override the configured voice
        #[arg(long)]
        voice: Option<String>,
    },

    /// Record from the microphone, transcribe, and optionally speak back
    Record {
        /// Drop the recording when stopping instead of transcribing it
        #[arg(long)]
        discard: bool,

        /// Speak the transcript back through the output devices
        #[arg(long)]
        play: bool,
    },

    /// Replay the last synthesized audio
    Replay,

    /// Run text through the configured copy-editing rules
    Rewrite {
        /// The text to rewrite
        text: String,
    },
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    // Set our modules to the requested verbosity level
    builder.filter_module("mouthpiece", args.log_level());

    // Audio and HTTP plumbing only at -vvvv (very verbose)
    if args.verbose >= 4 {
        builder.filter_module("cpal", args.log_level());
        builder.filter_module("reqwest", args.log_level());
        builder.filter_module("hyper", args.log_level());
    }

    builder.format_timestamp_millis().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(verbose: u8, quiet: bool) -> Args {
        Args {
            verbose,
            quiet,
            command: Command::Devices,
        }
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(args(0, false).log_level(), LevelFilter::Warn);
        assert_eq!(args(1, false).log_level(), LevelFilter::Info);
        assert_eq!(args(2, false).log_level(), LevelFilter::Debug);
        assert_eq!(args(3, false).log_level(), LevelFilter::Trace);
        assert_eq!(args(7, false).log_level(), LevelFilter::Trace);
    }

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(args(3, true).log_level(), LevelFilter::Error);
    }
}
