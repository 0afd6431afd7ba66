//! State-change notification channel

use std::fmt;

use crate::state::DrowsinessState;

/// Callback invoked with the state that was just assigned
pub type StateCallback = Box<dyn FnMut(DrowsinessState) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    /// None = every state
    filter: Option<DrowsinessState>,
    callback: StateCallback,
}

/// Publish/subscribe keyed by state value.
///
/// Callbacks run synchronously on the publishing thread, in subscription
/// order.
#[derive(Default)]
pub struct StateBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl StateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one state
    pub fn subscribe<F>(&mut self, state: DrowsinessState, callback: F) -> SubscriptionId
    where
        F: FnMut(DrowsinessState) + Send + 'static,
    {
        self.insert(Some(state), Box::new(callback))
    }

    /// Register a callback for every state
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(DrowsinessState) + Send + 'static,
    {
        self.insert(None, Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Deliver `state` to matching subscribers, returning how many ran
    pub fn publish(&mut self, state: DrowsinessState) -> usize {
        let mut delivered = 0;
        for subscriber in &mut self.subscribers {
            if subscriber.filter.map_or(true, |f| f == state) {
                (subscriber.callback)(state);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn insert(&mut self, filter: Option<DrowsinessState>, callback: StateCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            filter,
            callback,
        });
        id
    }
}

impl fmt::Debug for StateBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
