use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::args::BaseArgs;
use crate::builder::flux;

use super::load_query;

#[derive(Debug, Clone, Args)]
pub struct ScriptArgs {
    /// Saved query file (as written by `tags --save` or `explore --save`)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// How far back the query reaches, e.g. 15m, 1h, 7d
    #[arg(long, short = 'r', default_value = "1h")]
    range: String,

    /// Override the bucket stored in the file
    #[arg(long, short = 'b')]
    bucket: Option<String>,
}

pub fn run(base: BaseArgs, args: ScriptArgs) -> Result<()> {
    let mut config = load_query(&args.file)?;
    if let Some(bucket) = args.bucket {
        config.buckets = vec![bucket];
    }
    let query = flux::build_query(&config, &args.range)?;

    if base.json {
        println!(
            "{}",
            serde_json::to_string(&json!({ "query": query, "range": args.range }))?
        );
    } else {
        println!("{query}");
    }
    Ok(())
}
