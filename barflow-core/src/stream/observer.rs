//! Observer/observable seam between providers and hubs.

use std::sync::{Arc, Weak};

use crate::error::StreamResult;

use super::change::Change;

/// Receives change notifications from exactly one upstream.
pub trait Observer: Send + Sync {
    fn on_change(&self, change: Change);
}

/// The provider face: anything hubs can subscribe to.
///
/// Implemented by `QuoteProvider` (items are bars) and by `Hub` (items are the
/// hub's own results).
pub trait Observable<T>: Send + Sync {
    /// Register `observer` and hand it the current backlog.
    ///
    /// `backlog` runs while the items are read-locked, and registration
    /// happens before the lock is released, so no change can slip between
    /// the initial compute and the first notification.
    fn subscribe(
        &self,
        observer: Weak<dyn Observer>,
        backlog: &mut dyn FnMut(&[T]),
    ) -> StreamResult<SubscriberId>;

    /// Detach a subscriber. Returns false if it was not registered.
    fn unsubscribe(&self, id: SubscriberId) -> bool;

    /// Read the current items under a shared lock.
    fn read_items(&self, reader: &mut dyn FnMut(&[T]));

    fn item_count(&self) -> usize;

    fn label(&self) -> String;
}

/// Handle identifying one subscription on one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Non-owning subscriber handles in subscription order.
#[derive(Default)]
pub struct SubscriberList {
    next_id: u64,
    entries: Vec<(SubscriberId, Weak<dyn Observer>)>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Weak<dyn Observer>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Upgrade every live handle, dropping the ones whose hub is gone.
    pub fn live(&mut self) -> Vec<Arc<dyn Observer>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(observer) => {
                live.push(observer);
                true
            }
            None => false,
        });
        live
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Count of registered handles whose hub is still alive.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("subscribers", &self.len())
            .finish()
    }
}
