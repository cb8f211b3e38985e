use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::args::BaseArgs;
use crate::builder::{
    BuilderConfig, BuilderState, Coordinator, FluxGateway, MetadataGateway, RemoteDataState,
};
use crate::http::ApiClient;
use crate::login::{self, LoginContext};
use crate::ui::{apply_column_padding, header, styled_table, truncate};

mod explore;
mod script;
mod tags;

pub use explore::{run as run_explore, ExploreArgs};
pub use script::{run as run_script, ScriptArgs};
pub use tags::{run as run_tags, TagsArgs};

const CANDIDATES_WIDTH: usize = 60;

fn connect(base: &BaseArgs) -> Result<(LoginContext, Arc<dyn MetadataGateway>)> {
    let ctx = login::resolve(base)?;
    let gateway: Arc<dyn MetadataGateway> = Arc::new(FluxGateway::new(ApiClient::new(&ctx)?));
    Ok((ctx, gateway))
}

fn session(
    gateway: Arc<dyn MetadataGateway>,
    mut config: BuilderConfig,
    default_bucket: Option<String>,
) -> Coordinator {
    if config.bucket().is_none() {
        if let Some(bucket) = default_bucket {
            config.buckets = vec![bucket];
        }
    }
    Coordinator::new(gateway, BuilderState::from_config(config))
}

pub(crate) fn load_query(path: &Path) -> Result<BuilderConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub(crate) fn save_query(path: &Path, config: &BuilderConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut json = serde_json::to_string_pretty(config)?;
    json.push('\n');
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Spinner text describing the first lookup still in flight.
fn progress_message(state: &BuilderState) -> String {
    if state.buckets_status == RemoteDataState::Loading {
        return "Loading buckets...".to_string();
    }
    for (slot, tag) in state.tags.iter().enumerate() {
        if tag.keys_status == RemoteDataState::Loading {
            return format!("Loading tag keys for selector {}...", slot + 1);
        }
        if tag.values_status == RemoteDataState::Loading {
            let key = state.selected_key(slot).unwrap_or("?");
            return format!("Loading values of {key}...");
        }
    }
    "Loading...".to_string()
}

fn status_label(status: RemoteDataState, count: usize) -> String {
    match status {
        RemoteDataState::NotStarted => "-".to_string(),
        RemoteDataState::Loading => "loading".to_string(),
        RemoteDataState::Done => count.to_string(),
        RemoteDataState::Error => "error".to_string(),
    }
}

/// Human-readable view of a builder session.
fn render_state(state: &BuilderState) -> String {
    let bucket = state.config.bucket().unwrap_or("-");
    let mut output = format!("bucket: {bucket}\n");
    if !state.config.functions.is_empty() {
        output.push_str(&format!("functions: {}\n", state.config.functions.join(", ")));
    }
    output.push('\n');

    let mut table = styled_table();
    table.set_header(vec![
        header("#"),
        header("Key"),
        header("Selected"),
        header("Keys"),
        header("Values"),
        header("Candidates"),
    ]);
    apply_column_padding(&mut table, (0, 3));

    for (slot, ui) in state.tags.iter().enumerate() {
        let selected = state.selected_values(slot).join(",");
        table.add_row(vec![
            (slot + 1).to_string(),
            state.selected_key(slot).unwrap_or("-").to_string(),
            if selected.is_empty() { "-".to_string() } else { truncate(&selected, CANDIDATES_WIDTH) },
            status_label(ui.keys_status, ui.keys.len()),
            status_label(ui.values_status, ui.values.len()),
            truncate(&ui.values.join(","), CANDIDATES_WIDTH),
        ]);
    }
    output.push_str(&table.to_string());
    output.push('\n');
    output
}

fn failed_lookups(state: &BuilderState) -> Vec<String> {
    let mut failed = Vec::new();
    if state.buckets_status == RemoteDataState::Error {
        failed.push("buckets".to_string());
    }
    for (slot, ui) in state.tags.iter().enumerate() {
        if ui.keys_status == RemoteDataState::Error {
            failed.push(format!("keys of selector {}", slot + 1));
        }
        if ui.values_status == RemoteDataState::Error {
            failed.push(format!("values of selector {}", slot + 1));
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn state() -> BuilderState {
        let config: BuilderConfig = serde_json::from_value(json!({
            "buckets": ["telegraf"],
            "tags": [{"key": "host", "values": ["a", "b"]}, {"values": []}],
            "functions": ["mean"],
        }))
        .unwrap();
        let mut state = BuilderState::from_config(config);
        let first = &mut state.tags[0];
        first.keys = vec!["host".into(), "region".into()];
        first.keys_status = RemoteDataState::Done;
        first.values = vec!["a".into(), "b".into(), "c".into()];
        first.values_status = RemoteDataState::Done;
        state.tags[1].keys_status = RemoteDataState::Loading;
        state
    }

    #[test]
    fn render_lists_every_slot() {
        let out = render_state(&state());
        assert!(out.starts_with("bucket: telegraf\nfunctions: mean\n"));
        let first = out.lines().find(|l| l.trim_start().starts_with('1')).unwrap();
        assert!(first.contains("host"));
        assert!(first.contains("a,b,c"));
        let second = out.lines().find(|l| l.trim_start().starts_with('2')).unwrap();
        assert!(second.contains("loading"));
    }

    #[test]
    fn progress_names_the_pending_lookup() {
        assert_eq!(progress_message(&state()), "Loading tag keys for selector 2...");

        let mut state = state();
        state.tags[1].keys_status = RemoteDataState::Done;
        state.tags[0].values_status = RemoteDataState::Loading;
        assert_eq!(progress_message(&state), "Loading values of host...");
    }

    #[test]
    fn failed_lookups_are_reported() {
        let mut state = state();
        assert!(failed_lookups(&state).is_empty());
        state.tags[1].values_status = RemoteDataState::Error;
        assert_eq!(failed_lookups(&state), vec!["values of selector 2"]);
    }

    #[test]
    fn saved_queries_load_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queries").join("cpu.json");
        let config = state().config;

        save_query(&path, &config).unwrap();
        assert_eq!(load_query(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("q.json");
        fs::write(&path, r#"{"buckets": ["telegraf"]}"#).unwrap();

        let config = load_query(&path).unwrap();
        assert_eq!(config.bucket(), Some("telegraf"));
        assert_eq!(config.tags, BuilderConfig::default().tags);
        assert!(config.functions.is_empty());
    }
}
