use std::io::IsTerminal;

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, FuzzySelect, Input, MultiSelect};

fn require_tty() -> Result<()> {
    if !std::io::stdin().is_terminal() {
        bail!("interactive mode requires TTY");
    }
    Ok(())
}

/// Fuzzy select from a list of items. Requires TTY.
pub fn fuzzy_select<T: ToString>(prompt: &str, items: &[T], default: usize) -> Result<usize> {
    require_tty()?;
    if items.is_empty() {
        bail!("no items to select from");
    }

    let labels: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    let selection = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&labels)
        .default(default.min(labels.len() - 1))
        .interact()?;

    Ok(selection)
}

/// Pick any number of items; `checked[i]` pre-selects item `i`.
pub fn multi_select<T: ToString>(prompt: &str, items: &[T], checked: &[bool]) -> Result<Vec<usize>> {
    require_tty()?;
    if items.is_empty() {
        bail!("no items to select from");
    }

    let labels: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    let selection = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&labels)
        .defaults(checked)
        .interact()?;

    Ok(selection)
}

/// Free-text prompt; an empty answer is allowed.
pub fn input(prompt: &str, initial: &str) -> Result<String> {
    require_tty()?;
    let text = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .with_initial_text(initial)
        .allow_empty(true)
        .interact_text()?;
    Ok(text)
}
