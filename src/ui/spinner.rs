use std::future::Future;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

const MIN_SPINNER_DURATION: Duration = Duration::from_millis(600);

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

async fn finish(spinner: ProgressBar, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed < MIN_SPINNER_DURATION {
        tokio::time::sleep(MIN_SPINNER_DURATION - elapsed).await;
    }
    spinner.finish_and_clear();
}

/// Run an async operation with a spinner showing the given message.
/// Only shows spinner if stderr is a terminal.
pub async fn with_spinner<T, F: Future<Output = T>>(message: &str, fut: F) -> T {
    if !std::io::stderr().is_terminal() {
        return fut.await;
    }

    let spinner = spinner(message);
    let start = Instant::now();
    let result = fut.await;
    finish(spinner, start).await;
    result
}

/// Like [`with_spinner`], but the message follows a watched value while the
/// operation runs.
pub async fn with_watched_spinner<S, T, F>(
    mut updates: watch::Receiver<S>,
    describe: impl Fn(&S) -> String,
    fut: F,
) -> T
where
    F: Future<Output = T>,
{
    if !std::io::stderr().is_terminal() {
        return fut.await;
    }

    let spinner = spinner(&describe(&updates.borrow()));
    let start = Instant::now();
    tokio::pin!(fut);
    let result = loop {
        tokio::select! {
            result = &mut fut => break result,
            changed = updates.changed() => {
                if changed.is_err() {
                    break fut.await;
                }
                spinner.set_message(describe(&updates.borrow_and_update()));
            }
        }
    };
    finish(spinner, start).await;
    result
}
