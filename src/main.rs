use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;

mod args;
mod buckets;
mod builder;
mod config;
mod env;
mod http;
mod logging;
mod login;
mod query;
mod ui;
mod utils;

use crate::args::CLIArgs;

const DEFAULT_DEV_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-dev");
const CLI_VERSION: &str = match option_env!("FLUXQB_VERSION_STRING") {
    Some(version) => version,
    None => DEFAULT_DEV_VERSION,
};

#[derive(Debug, Parser)]
#[command(
    name = "fluxqb",
    about = "Build tag queries against time-series buckets",
    version = CLI_VERSION
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List buckets
    Buckets(CLIArgs<buckets::BucketsArgs>),
    /// Select tags non-interactively and print the builder state
    Tags(CLIArgs<query::TagsArgs>),
    /// Build a query interactively
    Explore(CLIArgs<query::ExploreArgs>),
    /// Render the Flux script for a saved query
    Script(CLIArgs<query::ScriptArgs>),
    /// View and modify configuration
    Config(CLIArgs<config::ConfigArgs>),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Commands::Buckets(cmd) => cmd.base.verbose,
            Commands::Tags(cmd) => cmd.base.verbose,
            Commands::Explore(cmd) => cmd.base.verbose,
            Commands::Script(cmd) => cmd.base.verbose,
            Commands::Config(cmd) => cmd.base.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);
    logging::init(cli.command.verbose());

    match cli.command {
        Commands::Buckets(cmd) => buckets::run(cmd.base, cmd.args).await?,
        Commands::Tags(cmd) => query::run_tags(cmd.base, cmd.args).await?,
        Commands::Explore(cmd) => query::run_explore(cmd.base, cmd.args).await?,
        Commands::Script(cmd) => query::run_script(cmd.base, cmd.args)?,
        Commands::Config(cmd) => config::run(cmd.base, cmd.args)?,
    }

    Ok(())
}
