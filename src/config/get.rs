use anyhow::{bail, Result};

use crate::args::BaseArgs;

use super::{ConfigPaths, Scope};

pub fn run(base: BaseArgs, paths: &ConfigPaths, key: &str, scope: Scope) -> Result<()> {
    let config = paths.load(scope);
    let Some(value) = config.get_field(key) else {
        bail!("{key} is not set");
    };
    if base.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}
