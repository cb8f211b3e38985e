use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;

use crate::args::BaseArgs;
use crate::builder::{
    flux, BuilderConfig, BuilderState, Coordinator, TagSelectorState, FUNCTIONS,
};
use crate::ui::{
    fuzzy_select, input, multi_select, print_command_status, with_watched_spinner, CommandStatus,
};

use super::{connect, load_query, progress_message, render_state, save_query, session};

#[derive(Debug, Clone, Args)]
pub struct ExploreArgs {
    /// Start from a saved query
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// Where the query is saved; also written on quit
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,

    /// Range used for script previews, e.g. 15m, 1h, 7d
    #[arg(long, short = 'r', default_value = "1h")]
    range: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    SelectBucket,
    SelectKey,
    ToggleValues,
    SearchKeys,
    SearchValues,
    AddSelector,
    RemoveSelector,
    Functions,
    Preview,
    Save,
    Quit,
}

const MENU: &[MenuItem] = &[
    MenuItem::SelectKey,
    MenuItem::ToggleValues,
    MenuItem::SearchKeys,
    MenuItem::SearchValues,
    MenuItem::AddSelector,
    MenuItem::RemoveSelector,
    MenuItem::SelectBucket,
    MenuItem::Functions,
    MenuItem::Preview,
    MenuItem::Save,
    MenuItem::Quit,
];

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SelectBucket => "Select bucket",
            Self::SelectKey => "Select tag key",
            Self::ToggleValues => "Toggle tag values",
            Self::SearchKeys => "Filter tag keys",
            Self::SearchValues => "Filter tag values",
            Self::AddSelector => "Add selector",
            Self::RemoveSelector => "Remove selector",
            Self::Functions => "Aggregate functions",
            Self::Preview => "Preview script",
            Self::Save => "Save query",
            Self::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// Indices whose membership in `chosen` differs from `is_selected`.
fn toggled<T>(items: &[T], is_selected: impl Fn(&T) -> bool, chosen: &[usize]) -> Vec<usize> {
    (0..items.len())
        .filter(|i| chosen.contains(i) != is_selected(&items[*i]))
        .collect()
}

struct Explorer {
    coordinator: Coordinator,
    save: Option<PathBuf>,
    range: String,
}

impl Explorer {
    fn read<R>(&self, f: impl FnOnce(&BuilderState) -> R) -> R {
        self.coordinator.store().read(f)
    }

    fn selector(&self, slot: usize) -> TagSelectorState {
        self.coordinator
            .store()
            .selector_state(slot)
            .unwrap_or_default()
    }

    async fn busy<F: Future<Output = ()>>(&self, fut: F) {
        with_watched_spinner(self.coordinator.store().subscribe(), progress_message, fut).await;
    }

    fn pick_slot(&self, prompt: &str) -> Result<usize> {
        let labels: Vec<String> = self.read(|s| {
            (0..s.slot_count())
                .map(|slot| format!("{}: {}", slot + 1, s.selected_key(slot).unwrap_or("-")))
                .collect()
        });
        if labels.len() == 1 {
            return Ok(0);
        }
        fuzzy_select(prompt, &labels, labels.len() - 1)
    }

    async fn on_select_bucket(&self) -> Result<()> {
        let (buckets, current) =
            self.read(|s| (s.buckets.clone(), s.config.bucket().map(str::to_string)));
        if buckets.is_empty() {
            print_command_status(CommandStatus::Warning, "no buckets loaded");
            return Ok(());
        }
        let default = current
            .and_then(|bucket| buckets.iter().position(|b| *b == bucket))
            .unwrap_or(0);
        let index = fuzzy_select("Bucket", &buckets, default)?;
        self.busy(self.coordinator.select_bucket(&buckets[index]))
            .await;
        Ok(())
    }

    async fn on_select_tag_key(&self) -> Result<()> {
        let slot = self.pick_slot("Selector")?;
        let keys = self.selector(slot).keys;
        if keys.is_empty() {
            print_command_status(CommandStatus::Warning, "no tag keys to choose from");
            return Ok(());
        }
        let current = self.read(|s| s.selected_key(slot).map(str::to_string));
        let default = current
            .and_then(|key| keys.iter().position(|k| *k == key))
            .unwrap_or(0);
        let index = fuzzy_select("Tag key", &keys, default)?;
        self.busy(self.coordinator.select_tag_key(slot, &keys[index]))
            .await;
        Ok(())
    }

    async fn on_toggle_tag_value(&self) -> Result<()> {
        let slot = self.pick_slot("Selector")?;
        let values = self.selector(slot).values;
        let selected = self.read(|s| s.selected_values(slot).to_vec());
        if values.is_empty() {
            print_command_status(CommandStatus::Warning, "no tag values to choose from");
            return Ok(());
        }
        let checked: Vec<bool> = values.iter().map(|v| selected.contains(v)).collect();
        let chosen = multi_select("Tag values", &values, &checked)?;
        for index in toggled(&values, |v| selected.contains(v), &chosen) {
            self.busy(self.coordinator.select_tag_value(slot, &values[index]))
                .await;
        }
        Ok(())
    }

    async fn on_search_keys(&self) -> Result<()> {
        let slot = self.pick_slot("Selector")?;
        let term = input("Key filter", &self.selector(slot).keys_search_term)?;
        self.coordinator.set_keys_search_term(slot, &term);
        self.busy(self.coordinator.search_tag_keys(slot)).await;
        Ok(())
    }

    async fn on_search_values(&self) -> Result<()> {
        let slot = self.pick_slot("Selector")?;
        let term = input("Value filter", &self.selector(slot).values_search_term)?;
        self.coordinator.set_values_search_term(slot, &term);
        self.busy(self.coordinator.search_tag_values(slot)).await;
        Ok(())
    }

    async fn on_add_selector(&self) {
        self.busy(self.coordinator.add_tag_selector()).await;
    }

    async fn on_remove_selector(&self) -> Result<()> {
        let slot = self.pick_slot("Remove selector")?;
        self.busy(self.coordinator.remove_tag_selector(slot)).await;
        Ok(())
    }

    fn on_toggle_functions(&self) -> Result<()> {
        let selected = self.read(|s| s.config.functions.clone());
        let checked: Vec<bool> = FUNCTIONS
            .iter()
            .map(|f| selected.iter().any(|s| s == f))
            .collect();
        let chosen = multi_select("Aggregate functions", FUNCTIONS, &checked)?;
        for index in toggled(FUNCTIONS, |f| selected.iter().any(|s| s == f), &chosen) {
            self.coordinator.select_function(FUNCTIONS[index]);
        }
        Ok(())
    }

    fn on_preview(&self) {
        let config = self.coordinator.store().active_query();
        match flux::build_query(&config, &self.range) {
            Ok(query) => println!("\n{query}\n"),
            Err(err) => print_command_status(CommandStatus::Error, &format!("{err:#}")),
        }
    }

    fn on_save(&mut self) -> Result<()> {
        let path = match &self.save {
            Some(path) => path.clone(),
            None => PathBuf::from(input("Save to", "query.json")?),
        };
        self.write(&path)?;
        self.save = Some(path);
        Ok(())
    }

    fn write(&self, path: &Path) -> Result<()> {
        save_query(path, &self.coordinator.store().active_query())?;
        print_command_status(
            CommandStatus::Success,
            &format!("Saved query to {}", path.display()),
        );
        Ok(())
    }
}

pub async fn run(base: BaseArgs, args: ExploreArgs) -> Result<()> {
    let config = match &args.load {
        Some(path) => load_query(path)?,
        None => BuilderConfig::default(),
    };
    let (ctx, gateway) = connect(&base)?;
    let mut explorer = Explorer {
        coordinator: session(gateway, config, ctx.bucket.clone()),
        save: args.save.clone(),
        range: args.range.clone(),
    };

    explorer.busy(explorer.coordinator.load_buckets()).await;

    loop {
        eprintln!("\n{}", explorer.read(render_state));
        let index = fuzzy_select("Action", MENU, 0)?;
        match MENU[index] {
            MenuItem::SelectBucket => explorer.on_select_bucket().await?,
            MenuItem::SelectKey => explorer.on_select_tag_key().await?,
            MenuItem::ToggleValues => explorer.on_toggle_tag_value().await?,
            MenuItem::SearchKeys => explorer.on_search_keys().await?,
            MenuItem::SearchValues => explorer.on_search_values().await?,
            MenuItem::AddSelector => explorer.on_add_selector().await,
            MenuItem::RemoveSelector => explorer.on_remove_selector().await?,
            MenuItem::Functions => explorer.on_toggle_functions()?,
            MenuItem::Preview => explorer.on_preview(),
            MenuItem::Save => explorer.on_save()?,
            MenuItem::Quit => break,
        }
    }

    if let Some(path) = &explorer.save {
        explorer.write(path)?;
    }
    if base.json {
        println!("{}", serde_json::to_string(&explorer.coordinator.snapshot())?);
    }
    Ok(())
}
