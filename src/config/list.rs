use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::args::BaseArgs;

use super::{display_value, read_file, Config, ConfigPaths, Scope, KNOWN_KEYS};

struct Source {
    label: String,
    entries: Vec<(&'static str, String)>,
}

pub fn run(base: BaseArgs, paths: &ConfigPaths, scope: Scope, by_source: bool) -> Result<()> {
    let output = if by_source {
        format_sources(&collect_sources(paths, scope), base.json)?
    } else {
        format_entries(&masked(&paths.load(scope)), base.json)?
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn masked(config: &Config) -> Vec<(&'static str, String)> {
    KNOWN_KEYS
        .iter()
        .filter_map(|&key| {
            config
                .get_field(key)
                .map(|value| (key, display_value(key, value)))
        })
        .collect()
}

fn relative_label(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| pathdiff::diff_paths(path, cwd))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn collect_sources(paths: &ConfigPaths, scope: Scope) -> Vec<Source> {
    let global = paths
        .global
        .as_ref()
        .filter(|_| scope != Scope::Local)
        .map(|path| (path.display().to_string(), path));
    let local = paths
        .local
        .as_ref()
        .filter(|_| scope != Scope::Global)
        .map(|path| (relative_label(path), path));

    global
        .into_iter()
        .chain(local)
        .map(|(label, path)| Source {
            label,
            entries: masked(&read_file(path)),
        })
        .filter(|source| !source.entries.is_empty())
        .collect()
}

fn entries_object(entries: &[(&str, String)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect()
}

fn format_entries(entries: &[(&str, String)], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string(&entries_object(entries))?);
    }
    Ok(entries
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn format_sources(sources: &[Source], json: bool) -> Result<String> {
    if json {
        let map: Map<String, Value> = sources
            .iter()
            .map(|s| (s.label.clone(), Value::Object(entries_object(&s.entries))))
            .collect();
        return Ok(serde_json::to_string(&map)?);
    }
    Ok(sources
        .iter()
        .map(|source| {
            let mut group = source.label.clone();
            for (key, value) in &source.entries {
                group.push_str(&format!("\n  {key}: {value}"));
            }
            group
        })
        .collect::<Vec<_>>()
        .join("\n\n"))
}
