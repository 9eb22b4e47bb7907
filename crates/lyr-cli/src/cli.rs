use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lyr",
    author,
    version,
    about = "Keep the FaaS supervisor layer packaged and published",
    disable_help_subcommand = true
)]
#[allow(clippy::struct_excessive_bools)]
pub struct LyrCli {
    #[arg(
        long,
        value_name = "PATH",
        help = "Configuration file (defaults to ./lyr.toml)",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: LyrCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LyrCommand {
    #[command(
        about = "Create the supervisor layer, or republish it when it is older than the configured version."
    )]
    Check,
    #[command(about = "Print the ARN of the latest layer version (empty when absent).")]
    Arn,
    #[command(about = "List published layers with their latest version.")]
    List,
    #[command(about = "Exit 0 when the layer exists, 1 otherwise.")]
    Exists {
        #[arg(value_name = "NAME", help = "Layer name (defaults to the configured one)")]
        name: Option<String>,
    },
    #[command(about = "Delete a layer version (the latest one unless --version is given).")]
    Delete {
        #[arg(value_name = "NAME", help = "Layer name (defaults to the configured one)")]
        name: Option<String>,
        #[arg(long, value_name = "N", help = "Version number to delete")]
        version: Option<i64>,
    },
    #[command(about = "Build the layer archive for the configured version without publishing.")]
    Package {
        #[arg(long, value_name = "PATH", help = "Where to write the layer zip")]
        out: PathBuf,
    },
}

impl LyrCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Arn => "arn",
            Self::List => "list",
            Self::Exists { .. } => "exists",
            Self::Delete { .. } => "delete",
            Self::Package { .. } => "package",
        }
    }
}
