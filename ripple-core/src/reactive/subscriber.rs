//! Subscriber identity and dependency sets.
//!
//! A [`Dep`] is the set of subscribers that read one `(target, key)` pair.
//! Subscribers are held weakly: a dependency set never keeps an effect alive.
//!
//! Each set also carries two generation bitmasks, one bit per run nesting
//! depth. While a subscriber runs at depth `d`, bit `1 << d` in `was_tracked`
//! marks the sets it belonged to before the run and the same bit in
//! `new_tracked` marks the sets it has read during the run. Reconciling the
//! two after the run tells which memberships to drop, without scanning the
//! membership of every set on every read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::runtime::Reactive;

/// Unique identifier for a subscriber.
///
/// Each subscriber (plain effect or memo) gets a unique ID when created. This
/// ID is used to deduplicate notifications and detect self-triggering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of subscribers that depend on one observed `(target, key)` pair.
pub struct Dep {
    state: Mutex<DepState>,
}

struct DepState {
    subscribers: IndexMap<SubscriberId, Weak<dyn Reactive>>,
    was_tracked: u32,
    new_tracked: u32,
}

impl Dep {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DepState {
                subscribers: IndexMap::new(),
                was_tracked: 0,
                new_tracked: 0,
            }),
        })
    }

    /// Number of subscribers in the set.
    pub fn len(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().subscribers.is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.state.lock().subscribers.contains_key(&id)
    }

    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.state.lock().subscribers.keys().copied().collect()
    }

    pub(crate) fn insert(&self, id: SubscriberId, subscriber: Weak<dyn Reactive>) {
        self.state.lock().subscribers.insert(id, subscriber);
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        // Membership order carries no meaning, so the O(1) removal is fine.
        self.state.lock().subscribers.swap_remove(&id);
    }

    /// Live subscribers, in insertion order. Dead weak entries are skipped.
    pub(crate) fn subscribers(&self) -> Vec<Arc<dyn Reactive>> {
        self.state
            .lock()
            .subscribers
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.state.lock().was_tracked & bit != 0
    }

    pub(crate) fn new_tracked(&self, bit: u32) -> bool {
        self.state.lock().new_tracked & bit != 0
    }

    pub(crate) fn mark_was_tracked(&self, bit: u32) {
        self.state.lock().was_tracked |= bit;
    }

    pub(crate) fn mark_new_tracked(&self, bit: u32) {
        self.state.lock().new_tracked |= bit;
    }

    pub(crate) fn clear_markers(&self, bit: u32) {
        let mut state = self.state.lock();
        state.was_tracked &= !bit;
        state.new_tracked &= !bit;
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("subscribers", &self.subscriber_ids())
            .finish()
    }
}
