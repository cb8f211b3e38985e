use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{builder::PossibleValuesParser, Args};
use tracing::warn;

use crate::args::BaseArgs;
use crate::builder::{BuilderConfig, BuilderState, Coordinator, RemoteDataState, FUNCTIONS};
use crate::ui::{print_command_status, with_watched_spinner, CommandStatus};

use super::{connect, failed_lookups, progress_message, render_state, save_query, session};

/// One `--tag` argument: a key and the values to select for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagArg {
    key: String,
    values: Vec<String>,
}

fn parse_tag(raw: &str) -> Result<TagArg, String> {
    let (key, values) = match raw.split_once('=') {
        Some((key, values)) => (key.trim(), values),
        None => (raw.trim(), ""),
    };
    if key.is_empty() {
        return Err("tag key must not be empty".to_string());
    }
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    Ok(TagArg {
        key: key.to_string(),
        values,
    })
}

#[derive(Debug, Clone, Args)]
pub struct TagsArgs {
    /// Bucket to browse (defaults to the configured bucket, else the first one)
    #[arg(long, short = 'b')]
    bucket: Option<String>,

    /// Tag selection as KEY or KEY=VALUE[,VALUE...]; repeat to chain selectors
    #[arg(long = "tag", short = 't', value_name = "KEY[=VALUES]", value_parser = parse_tag)]
    tags: Vec<TagArg>,

    /// Aggregate function to add to the query; repeatable
    #[arg(long = "fn", value_name = "FUNCTION", value_parser = PossibleValuesParser::new(FUNCTIONS.iter().copied()))]
    functions: Vec<String>,

    /// Write the resulting query to FILE as JSON
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,
}

pub async fn run(base: BaseArgs, args: TagsArgs) -> Result<()> {
    let (ctx, gateway) = connect(&base)?;
    let mut config = BuilderConfig::default();
    if let Some(bucket) = &args.bucket {
        config.buckets = vec![bucket.clone()];
    }
    let coordinator = session(gateway, config, ctx.bucket.clone());

    let updates = coordinator.store().subscribe();
    with_watched_spinner(updates, progress_message, apply(&coordinator, &args)).await?;

    let state = coordinator.snapshot();
    if base.json {
        println!("{}", serde_json::to_string(&state)?);
    } else {
        print!("{}", render_state(&state));
    }

    let failed = failed_lookups(&state);
    if !failed.is_empty() {
        bail!("lookup failed: {}", failed.join(", "));
    }

    if let Some(path) = &args.save {
        save_query(path, &state.config)?;
        print_command_status(
            CommandStatus::Success,
            &format!("Saved query to {}", path.display()),
        );
    }
    Ok(())
}

/// Drive the coordinator the way a user would: pick the bucket, then for each
/// `--tag` pick the key and toggle each value on the next selector.
async fn apply(coordinator: &Coordinator, args: &TagsArgs) -> Result<()> {
    coordinator.load_buckets().await;
    let state = coordinator.snapshot();
    if state.buckets_status == RemoteDataState::Error {
        bail!("failed to load buckets");
    }
    if let Some(wanted) = &args.bucket {
        if !state.buckets.contains(wanted) {
            bail!("bucket {wanted} not found");
        }
    }
    if state.config.bucket().is_none() {
        bail!("no buckets available");
    }

    for (slot, tag) in args.tags.iter().enumerate() {
        if slot >= coordinator.store().read(BuilderState::slot_count) {
            coordinator.add_tag_selector().await;
        }
        let known_key = coordinator
            .store()
            .selector_state(slot)
            .is_some_and(|ui| ui.keys.contains(&tag.key));
        if !known_key {
            warn!(key = %tag.key, slot, "tag key not among the candidates");
        }

        coordinator.select_tag_key(slot, &tag.key).await;
        for value in &tag.values {
            let known_value = coordinator
                .store()
                .selector_state(slot)
                .is_some_and(|ui| ui.values.contains(value));
            if !known_value {
                warn!(key = %tag.key, %value, "tag value not among the candidates");
            }
            coordinator.select_tag_value(slot, value).await;
        }
    }

    for function in &args.functions {
        if !coordinator.store().read(|s| s.config.functions.contains(function)) {
            coordinator.select_function(function);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::builder::testing::{strings, MockGateway};

    fn args(bucket: Option<&str>, tags: &[&str]) -> TagsArgs {
        TagsArgs {
            bucket: bucket.map(str::to_string),
            tags: tags.iter().map(|t| parse_tag(t).unwrap()).collect(),
            functions: vec!["mean".into()],
            save: None,
        }
    }

    #[test]
    fn tag_arguments_parse() {
        assert_eq!(
            parse_tag("host=a, b,").unwrap(),
            TagArg {
                key: "host".into(),
                values: strings(&["a", "b"]),
            }
        );
        assert_eq!(parse_tag("region").unwrap().values, Vec::<String>::new());
        assert!(parse_tag("=a").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tags_are_applied_in_order() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_buckets(Duration::ZERO, Ok(strings(&["_monitoring", "telegraf"])));
        // slot 0 keys and values
        gateway.push_keys(Duration::ZERO, Ok(strings(&["host", "region"])));
        gateway.push_values(Duration::ZERO, Ok(strings(&["a", "b"])));
        let coordinator = session(gateway.clone(), BuilderConfig::default(), None);

        apply(&coordinator, &args(Some("telegraf"), &["host=a"]))
            .await
            .unwrap();

        let state = coordinator.snapshot();
        assert_eq!(state.config.bucket(), Some("telegraf"));
        assert_eq!(state.selected_key(0), Some("host"));
        assert_eq!(state.selected_values(0), ["a"]);
        assert_eq!(state.slot_count(), 2);
        assert_eq!(state.config.functions, vec!["mean"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_bucket_is_an_error() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_buckets(Duration::ZERO, Ok(strings(&["telegraf"])));
        let coordinator = session(gateway, BuilderConfig::default(), None);

        let err = apply(&coordinator, &args(Some("nope"), &[])).await.unwrap_err();
        assert!(err.to_string().contains("bucket nope not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_bucket_is_the_default() {
        let gateway = Arc::new(MockGateway::new());
        gateway.push_buckets(Duration::ZERO, Ok(strings(&["_monitoring", "telegraf"])));
        let coordinator = session(
            gateway,
            BuilderConfig::default(),
            Some("telegraf".to_string()),
        );

        apply(&coordinator, &args(None, &[])).await.unwrap();
        assert_eq!(coordinator.snapshot().config.bucket(), Some("telegraf"));
    }
}
