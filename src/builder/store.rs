use tokio::sync::watch;
use tracing::trace;

use super::state::{reduce, BuilderAction};
use super::types::{BuilderConfig, BuilderState, TagSelectorState};

/// Owner of one editing session's builder state.
///
/// Reads go through the selector methods; writes are [`BuilderAction`]s
/// dispatched by the coordinator. Subscribers get a fresh snapshot after
/// every dispatched action.
pub struct BuilderStore {
    state: watch::Sender<BuilderState>,
}

impl BuilderStore {
    pub fn new(initial: BuilderState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn snapshot(&self) -> BuilderState {
        self.state.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&BuilderState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn active_query(&self) -> BuilderConfig {
        self.read(|state| state.config.clone())
    }

    pub fn selector_state(&self, slot: usize) -> Option<TagSelectorState> {
        self.read(|state| state.tags.get(slot).cloned())
    }

    pub fn subscribe(&self) -> watch::Receiver<BuilderState> {
        self.state.subscribe()
    }

    pub(super) fn dispatch(&self, action: BuilderAction) {
        trace!(?action, "dispatch");
        self.state
            .send_modify(|state| *state = reduce(std::mem::take(state), action));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_dispatched_actions() {
        let store = BuilderStore::new(BuilderState::default());
        let mut updates = store.subscribe();

        store.dispatch(BuilderAction::SelectBucket("telegraf".into()));

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow().config.bucket(), Some("telegraf"));
        assert_eq!(store.active_query().bucket(), Some("telegraf"));
    }

    #[test]
    fn dispatch_without_subscribers_still_updates() {
        let store = BuilderStore::new(BuilderState::default());
        store.dispatch(BuilderAction::AddSelector);
        assert_eq!(store.snapshot().slot_count(), 2);
        assert!(store.selector_state(1).is_some());
        assert!(store.selector_state(2).is_none());
    }
}
