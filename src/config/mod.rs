//! Connection defaults stored in JSON files.
//!
//! Two files are consulted: a per-user one under `$XDG_CONFIG_HOME/fluxqb/`
//! and a per-project `.fluxqb/config.json` found by walking up from the
//! working directory. Project values override user values.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::args::BaseArgs;

mod get;
mod list;
mod set;

const CONFIG_DIR_NAME: &str = "fluxqb";
const LOCAL_DIR_NAME: &str = ".fluxqb";
const FILE_NAME: &str = "config.json";

pub const KNOWN_KEYS: &[&str] = &["host", "org", "token", "bucket"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Keys this version does not know about; written back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "host" => Some(&mut self.host),
            "org" => Some(&mut self.org),
            "token" => Some(&mut self.token),
            "bucket" => Some(&mut self.bucket),
            _ => None,
        }
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        let value = match key {
            "host" => &self.host,
            "org" => &self.org,
            "token" => &self.token,
            "bucket" => &self.bucket,
            _ => return None,
        };
        value.as_deref()
    }

    pub fn set_field(&mut self, key: &str, value: String) -> bool {
        self.slot(key).map(|slot| *slot = Some(value)).is_some()
    }

    pub fn unset_field(&mut self, key: &str) -> bool {
        self.slot(key).map(|slot| *slot = None).is_some()
    }

    /// Values set in `top` replace ours.
    fn overlay(mut self, top: Config) -> Config {
        for &key in KNOWN_KEYS {
            if let Some(value) = top.get_field(key) {
                self.set_field(key, value.to_string());
            }
        }
        self.extra.extend(top.extra);
        self
    }
}

/// Mask secrets for display.
pub fn display_value(key: &str, value: &str) -> String {
    if key != "token" {
        return value.to_string();
    }
    let visible: String = value.chars().take(4).collect();
    format!("{visible}****")
}

/// Which file(s) a command reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Reads merge both files; writes go to the local file when one exists.
    Merged,
    Global,
    Local,
}

impl Scope {
    fn from_flags(global: bool, local: bool) -> Self {
        match (global, local) {
            (true, _) => Self::Global,
            (_, true) => Self::Local,
            _ => Self::Merged,
        }
    }
}

/// Where the config files live for the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub global: Option<PathBuf>,
    pub local: Option<PathBuf>,
    cwd: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
        Ok(Self::discover_from(cwd, dirs::home_dir(), xdg))
    }

    fn discover_from(cwd: PathBuf, home: Option<PathBuf>, xdg: Option<PathBuf>) -> Self {
        let global = xdg
            .or_else(|| home.as_ref().map(|home| home.join(".config")))
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(FILE_NAME));

        let mut local = None;
        for dir in cwd.ancestors() {
            let candidate = dir.join(LOCAL_DIR_NAME);
            if candidate.is_dir() {
                local = Some(candidate.join(FILE_NAME));
                break;
            }
            // Searching stops at the repository root or the home directory.
            if dir.join(".git").exists() || Some(dir) == home.as_deref() {
                break;
            }
        }

        Self { global, local, cwd }
    }

    pub fn load(&self, scope: Scope) -> Config {
        let read = |path: &Option<PathBuf>| path.as_deref().map(read_file).unwrap_or_default();
        match scope {
            Scope::Global => read(&self.global),
            Scope::Local => read(&self.local),
            Scope::Merged => read(&self.global).overlay(read(&self.local)),
        }
    }

    /// File a `set`/`unset` in `scope` writes to. `Local` without an existing
    /// project file targets `.fluxqb/` in the working directory.
    pub fn write_target(&self, scope: Scope) -> Result<PathBuf> {
        let global = || -> Result<PathBuf> {
            match &self.global {
                Some(path) => Ok(path.clone()),
                None => bail!("$HOME not configured"),
            }
        };
        match (scope, &self.local) {
            (Scope::Global, _) => global(),
            (_, Some(local)) => Ok(local.clone()),
            (Scope::Local, None) => Ok(self.cwd.join(LOCAL_DIR_NAME).join(FILE_NAME)),
            (Scope::Merged, None) => global(),
        }
    }
}

/// Read one config file. A missing file is empty; an unreadable one is
/// reported and treated as empty.
pub fn read_file(path: &Path) -> Config {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read config");
            return Config::default();
        }
    };
    let config: Config = match serde_json::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not parse config");
            return Config::default();
        }
    };
    for key in config.extra.keys() {
        warn!(path = %path.display(), %key, "unknown config key");
    }
    config
}

/// Replace `path` atomically with `config`.
pub fn write_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut json = serde_json::to_string_pretty(config)?;
    json.push('\n');

    let staged = path.with_extension("json.tmp");
    fs::write(&staged, json).with_context(|| format!("failed to write {}", staged.display()))?;
    fs::rename(&staged, path).with_context(|| format!("failed to replace {}", path.display()))
}

/// Merged config for the current directory.
pub fn load() -> Result<Config> {
    Ok(ConfigPaths::discover()?.load(Scope::Merged))
}

// --- CLI commands ---

#[derive(Debug, Clone, Args)]
pub struct ScopeArgs {
    /// Apply to global config (~/.config/fluxqb/config.json)
    #[arg(long, short = 'g', conflicts_with = "local")]
    global: bool,

    /// Apply to local config (.fluxqb/config.json)
    #[arg(long, short = 'l')]
    local: bool,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::from_flags(self.global, self.local)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommands {
    /// List config values
    List {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Show config values grouped by source file
        #[arg(long)]
        sources: bool,
    },
    /// Get a config value
    Get {
        /// Config key (host, org, token, bucket)
        #[arg(value_parser = clap::builder::PossibleValuesParser::new(KNOWN_KEYS.iter().copied()))]
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Set a config value
    Set {
        /// Config key (host, org, token, bucket)
        key: String,
        /// Value to set
        value: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Remove a config value
    Unset {
        /// Config key (host, org, token, bucket)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn validate_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!(
            "Unknown config key: {key}\nValid keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    Ok(())
}

pub fn run(base: BaseArgs, args: ConfigArgs) -> Result<()> {
    let paths = ConfigPaths::discover()?;
    match args.command {
        None => list::run(base, &paths, Scope::Merged, false),
        Some(ConfigCommands::List { scope, sources }) => {
            list::run(base, &paths, scope.scope(), sources)
        }
        Some(ConfigCommands::Get { key, scope }) => get::run(base, &paths, &key, scope.scope()),
        Some(ConfigCommands::Set { key, value, scope }) => {
            validate_key(&key)?;
            set::run(&paths, &key, Some(value), scope.scope())
        }
        Some(ConfigCommands::Unset { key, scope }) => {
            validate_key(&key)?;
            set::run(&paths, &key, None, scope.scope())
        }
    }
}
