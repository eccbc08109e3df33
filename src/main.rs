//! Cardcast - live card overlay and webcam broadcaster for OBS browser sources.

#![allow(dead_code)]

mod bridge;
mod cli;
mod config;
mod crop;
mod embed;
mod logger;
mod overlay;
mod producer;
mod server;
mod service;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Serve { args } => cli::serve::run(&cli, args),
    }
}
