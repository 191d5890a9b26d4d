//! State-change event bus
//!
//! Subscribers register interest in a set of entity ids together with the
//! sending half of a bounded inbox. Each state change is routed to every
//! subscription tracking that entity. Delivery never blocks the writer: when
//! an inbox is full the change is dropped, the entity id is recorded on the
//! inbox, and the receiver is told which entities to re-read once its queue
//! has drained.
//!
//! Subscriptions are identified by a [`ListenerId`] in the subscription
//! table; [`Subscription`] wraps one in a scoped token that releases it
//! exactly once.

use dashmap::{DashMap, DashSet};
use ha_core::StateChangedData;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace, warn};

/// Default capacity for subscriber inboxes
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

pub use mpsc::error::TryRecvError;

/// Entities whose changes did not fit into an inbox
#[derive(Debug, Default)]
struct Overflow {
    missed: DashSet<String>,
    notify: Notify,
}

impl Overflow {
    fn record(&self, entity_id: &str) {
        self.missed.insert(entity_id.to_string());
        self.notify.notify_one();
    }

    fn take(&self) -> Vec<String> {
        let mut taken = Vec::new();
        self.missed.retain(|id| {
            taken.push(id.clone());
            false
        });
        taken.sort();
        taken
    }
}

/// Sending half of a subscriber inbox
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: mpsc::Sender<StateChangedData>,
    overflow: Arc<Overflow>,
}

/// What an [`Inbox`] hands out next
#[derive(Debug, Clone)]
pub enum Delivery {
    Change(StateChangedData),
    /// Changes to these entities were dropped; their current state must be
    /// read back from the store
    Missed(Vec<String>),
}

/// Receiving half of a subscriber inbox
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<StateChangedData>,
    overflow: Arc<Overflow>,
}

impl Inbox {
    /// Next queued change, ignoring overflow
    pub async fn recv(&mut self) -> Option<StateChangedData> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<StateChangedData, TryRecvError> {
        self.rx.try_recv()
    }

    /// Next delivery. Queued changes come first; dropped entities are
    /// reported only once the queue is empty, so a re-read never precedes
    /// an older queued change. `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => return Some(Delivery::Change(change)),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {}
            }
            let missed = self.overflow.take();
            if !missed.is_empty() {
                return Some(Delivery::Missed(missed));
            }
            tokio::select! {
                change = self.rx.recv() => return change.map(Delivery::Change),
                () = self.overflow.notify.notified() => {}
            }
        }
    }
}

/// Create a bounded inbox for state-change deliveries
pub fn inbox(capacity: usize) -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::channel(capacity);
    let overflow = Arc::new(Overflow::default());
    (
        InboxSender {
            tx,
            overflow: Arc::clone(&overflow),
        },
        Inbox { rx, overflow },
    )
}

/// A unique identifier for an event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Listener {
    entity_ids: HashSet<String>,
    inbox: InboxSender,
    /// Skip attribute-only updates
    value_changes_only: bool,
}

/// Routes state changes to the subscribers tracking each entity
pub struct EventBus {
    listeners: DashMap<ListenerId, Listener>,
    next_listener_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Track `entity_ids`, delivering their changes into `inbox`
    pub fn subscribe<I, S>(&self, entity_ids: I, inbox: InboxSender) -> ListenerId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_listener(entity_ids, inbox, false)
    }

    /// Like [`subscribe`](Self::subscribe), but only changes of the state
    /// value are delivered
    pub fn subscribe_value_changes<I, S>(&self, entity_ids: I, inbox: InboxSender) -> ListenerId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert_listener(entity_ids, inbox, true)
    }

    fn insert_listener<I, S>(&self, entity_ids: I, inbox: InboxSender, value_changes_only: bool) -> ListenerId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        let entity_ids: HashSet<String> = entity_ids.into_iter().map(Into::into).collect();
        debug!(listener = %id, entities = entity_ids.len(), value_changes_only, "Subscribing to state changes");
        self.listeners.insert(
            id,
            Listener {
                entity_ids,
                inbox,
                value_changes_only,
            },
        );
        id
    }

    /// Remove a subscription.
    ///
    /// Returns `false` if it was already removed, so a second call is harmless.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            debug!(listener = %id, "Unsubscribed");
        } else {
            trace!(listener = %id, "Unsubscribe of unknown listener ignored");
        }
        removed
    }

    /// Deliver a state change to every subscription tracking its entity
    pub fn fire_state_changed(&self, data: StateChangedData) {
        let entity_id = data.entity_id.to_string();
        trace!(entity_id = %entity_id, "Firing state_changed");

        let value_changed = data.value_changed();

        for listener in self.listeners.iter() {
            if !listener.entity_ids.contains(&entity_id)
                || (listener.value_changes_only && !value_changed)
            {
                continue;
            }
            match listener.inbox.tx.try_send(data.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        listener = %listener.key(),
                        entity_id = %entity_id,
                        "Inbox full, dropping state change"
                    );
                    listener.inbox.overflow.record(&entity_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(listener = %listener.key(), "Inbox closed");
                }
            }
        }
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of live subscriptions tracking `entity_id`
    pub fn listeners_for(&self, entity_id: &str) -> usize {
        self.listeners
            .iter()
            .filter(|l| l.entity_ids.contains(entity_id))
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Scoped subscription token.
///
/// Unsubscribes on [`Subscription::release`] or when dropped, whichever
/// comes first.
pub struct Subscription {
    bus: SharedEventBus,
    id: Option<ListenerId>,
}

impl Subscription {
    /// Subscribe and wrap the listener in a token
    pub fn new<I, S>(bus: SharedEventBus, entity_ids: I, inbox: InboxSender) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = bus.subscribe(entity_ids, inbox);
        Self { bus, id: Some(id) }
    }

    /// Token for [`EventBus::subscribe_value_changes`]
    pub fn value_changes<I, S>(bus: SharedEventBus, entity_ids: I, inbox: InboxSender) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = bus.subscribe_value_changes(entity_ids, inbox);
        Self { bus, id: Some(id) }
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Release the subscription. Returns `true` only on the first call.
    pub fn release(&mut self) -> bool {
        match self.id.take() {
            Some(id) => self.bus.unsubscribe(id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
