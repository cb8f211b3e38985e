use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::console;

use crate::args::BaseArgs;
use crate::builder::{FluxGateway, MetadataGateway};
use crate::http::ApiClient;
use crate::login;
use crate::ui::{apply_column_padding, header, styled_table, with_spinner};
use crate::utils::counted;

#[derive(Debug, Clone, Args)]
pub struct BucketsArgs {}

pub async fn run(base: BaseArgs, _args: BucketsArgs) -> Result<()> {
    let ctx = login::resolve(&base)?;
    let gateway = FluxGateway::new(ApiClient::new(&ctx)?);

    let buckets = with_spinner("Loading buckets...", gateway.find_buckets())
        .await
        .with_context(|| format!("failed to list buckets on {}", ctx.host))?;

    if base.json {
        println!("{}", serde_json::to_string(&buckets)?);
    } else {
        print!("{}", render(&buckets, &ctx.host, ctx.bucket.as_deref())?);
    }
    Ok(())
}

fn render(buckets: &[String], host: &str, default: Option<&str>) -> Result<String> {
    let mut output = String::new();
    writeln!(
        output,
        "{} found on {}\n",
        console::style(counted(buckets.len(), "bucket", None)),
        console::style(host).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![header("Name"), header("Default")]);
    apply_column_padding(&mut table, (0, 6));
    for bucket in buckets {
        let marker = if default == Some(bucket.as_str()) { "*" } else { "" };
        table.add_row(vec![bucket.as_str(), marker]);
    }
    writeln!(output, "{table}")?;
    Ok(output)
}
