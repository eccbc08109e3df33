//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::SourceSpec;
use crate::producer::Profile;

/// Card overlay and webcam broadcaster for OBS browser sources
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: cardcast.toml)
    #[arg(short = 'C', long, global = true, default_value = "cardcast.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Show debug output (client connects, frame drops, lifecycle detail)
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the overlay server with the operator console on stdin
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
}

/// Serve command arguments. Each one overrides `cardcast.toml`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(short, long)]
    pub interface: Option<IpAddr>,

    /// Port number to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Capture profile
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Video source: `test-pattern` or a PNG/JPEG path
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub source: Option<SourceSpec>,

    /// Start with video capture disabled
    #[arg(long)]
    pub no_video: bool,

    /// Wait for `start` instead of serving at launch
    #[arg(long)]
    pub no_autostart: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from([
            "cardcast", "-V", "-C", "show.toml", "serve", "-p", "4000", "--profile", "local",
            "--source", "still.png", "--no-video",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("show.toml"));

        let Commands::Serve { args } = cli.command;
        assert_eq!(args.port, Some(4000));
        assert_eq!(args.profile, Some(Profile::Local));
        assert_eq!(args.source, Some(SourceSpec::Image(PathBuf::from("still.png"))));
        assert!(args.no_video);
        assert!(!args.no_autostart);
        assert_eq!(args.interface, None);
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::parse_from(["cardcast", "serve"]);
        assert_eq!(cli.config, PathBuf::from("cardcast.toml"));
        assert!(!cli.verbose);
    }
}
