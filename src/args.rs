use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_HOST: &str = "http://localhost:9999";

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Server URL (or via INFLUX_HOST)
    #[arg(long, env = "INFLUX_HOST", hide_env_values = true, global = true)]
    pub host: Option<String>,

    /// Organization name (or via INFLUX_ORG)
    #[arg(short = 'o', long, env = "INFLUX_ORG", global = true)]
    pub org: Option<String>,

    /// API token (or via INFLUX_TOKEN)
    #[arg(long, env = "INFLUX_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Log lookups and retries to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "FLUXQB_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
