use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn bootstrap_from_args(args: &[OsString]) -> Result<()> {
    let explicit_env_file =
        extract_env_file_arg(args).or_else(|| std::env::var_os("FLUXQB_ENV_FILE").map(PathBuf::from));
    load_env(explicit_env_file.as_ref())
}

/// Load `.env` files into the process environment. Variables that are
/// already set are never overwritten.
pub fn load_env(explicit_env_file: Option<&PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let mut loaded = HashMap::new();

    for env_file in resolve_env_files(&cwd, explicit_env_file) {
        if !env_file.exists() && explicit_env_file.is_none() {
            continue;
        }

        let parsed = dotenvy::from_path_iter(&env_file)
            .with_context(|| format!("failed to read env file {}", env_file.display()))?;
        for item in parsed {
            let (key, value) =
                item.with_context(|| format!("failed to parse env file {}", env_file.display()))?;
            if std::env::var_os(&key).is_some() {
                continue;
            }
            // Later files have higher precedence.
            loaded.insert(key, value);
        }
    }

    let mut envs: Vec<(String, String)> = loaded.into_iter().collect();
    envs.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
    Ok(())
}

fn extract_env_file_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut explicit = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let Some(arg) = arg.to_str() else {
            continue;
        };
        if arg == "--" {
            break;
        }
        if arg == "--env-file" {
            explicit = iter.next().map(PathBuf::from);
        } else if let Some(value) = arg.strip_prefix("--env-file=") {
            explicit = Some(PathBuf::from(value));
        }
    }
    explicit
}

fn resolve_env_files(cwd: &Path, explicit_env_file: Option<&PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit_env_file {
        return vec![if path.is_absolute() {
            path.clone()
        } else {
            cwd.join(path)
        }];
    }

    let mut files = vec![cwd.join(".env")];
    match std::env::var("FLUXQB_ENV").ok().filter(|env| !env.is_empty()) {
        Some(env) => {
            files.push(cwd.join(format!(".env.{env}")));
            files.push(cwd.join(".env.local"));
            files.push(cwd.join(format!(".env.{env}.local")));
        }
        None => files.push(cwd.join(".env.local")),
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn env_file_flag_forms_are_recognized() {
        assert_eq!(
            extract_env_file_arg(&args(&["fluxqb", "--env-file", "a.env", "tags"])),
            Some(PathBuf::from("a.env"))
        );
        assert_eq!(
            extract_env_file_arg(&args(&["fluxqb", "tags", "--env-file=b.env"])),
            Some(PathBuf::from("b.env"))
        );
        assert_eq!(
            extract_env_file_arg(&args(&["fluxqb", "--", "--env-file", "c.env"])),
            None
        );
    }

    #[test]
    fn explicit_file_is_resolved_against_cwd() {
        let cwd = Path::new("/work");
        let explicit = PathBuf::from("conf/dev.env");
        assert_eq!(
            resolve_env_files(cwd, Some(&explicit)),
            vec![PathBuf::from("/work/conf/dev.env")]
        );
    }
}
