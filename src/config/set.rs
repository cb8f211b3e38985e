use anyhow::Result;

use crate::ui::{print_command_status, CommandStatus};

use super::{display_value, read_file, write_file, ConfigPaths, Scope};

/// Set `key` to `value`, or remove it when `value` is `None`.
pub fn run(paths: &ConfigPaths, key: &str, value: Option<String>, scope: Scope) -> Result<()> {
    let path = paths.write_target(scope)?;
    let mut config = read_file(&path);

    let message = match value {
        Some(value) => {
            let message = format!(
                "Set {key} = {} in {}",
                display_value(key, &value),
                path.display()
            );
            config.set_field(key, value);
            message
        }
        None => {
            config.unset_field(key);
            format!("Unset {key}")
        }
    };
    write_file(&path, &config)?;

    print_command_status(CommandStatus::Success, &message);
    Ok(())
}
