use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fwseal")]
#[command(about = "Firmware image checksum and digest utility", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log level, overrides --verbose
    #[arg(long, value_enum, env = "FWSEAL_LOG", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display the header and segment table of an image
    Info {
        /// Path to the image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,
    },

    /// Check the stored checksum and digest of one or more images
    Verify {
        /// Paths to the image files
        #[arg(value_name = "IMAGE", required = true)]
        image_paths: Vec<PathBuf>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Recompute the checksum and digest of an image
    Reseal {
        /// Path to the image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Output file (defaults to IMAGE.resealed)
        #[arg(short, long, value_name = "FILE", conflicts_with = "in_place")]
        output: Option<PathBuf>,

        /// Rewrite the image file itself
        #[arg(long)]
        in_place: bool,
    },

    /// Explain where the checksum of an edited image should be
    Diagnose {
        /// Path to the known-good image
        #[arg(value_name = "ORIGINAL")]
        original: PathBuf,

        /// Path to the edited image
        #[arg(value_name = "MODIFIED")]
        modified: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn in_place_conflicts_with_output() {
        let result = Cli::try_parse_from(["fwseal", "reseal", "a.bin", "-o", "b.bin", "--in-place"]);
        assert!(result.is_err());
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::try_parse_from(["fwseal", "-vv", "verify", "a.bin", "b.bin"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Verify { image_paths, quiet } => {
                assert_eq!(image_paths.len(), 2);
                assert!(!quiet);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
