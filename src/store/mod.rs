//! Durable key-value storage shared by every open tab of one profile.
//!
//! A [`Scope`] is the storage area itself. Each tab opens its own context on
//! it with [`Scope::context`] and talks to it through the [`PersistentStore`]
//! trait, so the quiz and pack logic can be driven by a fake store in tests.
//! Writes made through one context are announced to all the others.

mod scope;

pub use scope::{Scope, StoreHandle};

use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

pub type ContextId = u64;

/// A single key changing in a shared scope. `value` is `None` when the key
/// was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    pub value: Option<String>,
    origin: ContextId,
}

impl StoreEvent {
    pub fn new(key: impl Into<String>, value: Option<String>, origin: ContextId) -> Self {
        Self {
            key: key.into(),
            value,
            origin,
        }
    }

    pub fn origin(&self) -> ContextId {
        self.origin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Changed(StoreEvent),
    /// The receiver fell behind and this many events were dropped. The full
    /// snapshot has to be re-read.
    Missed(u64),
}

/// Change feed of one context. Events written by the context itself are
/// skipped, the way a browser only fires `storage` events in other tabs.
pub struct Subscription {
    receiver: broadcast::Receiver<StoreEvent>,
    context: ContextId,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<StoreEvent>, context: ContextId) -> Self {
        Self { receiver, context }
    }

    /// Waits for the next foreign change. `None` once the scope is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.origin == self.context => continue,
                Ok(event) => return Some(Notification::Changed(event)),
                Err(RecvError::Lagged(missed)) => return Some(Notification::Missed(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.origin == self.context => continue,
                Ok(event) => return Some(Notification::Changed(event)),
                Err(TryRecvError::Lagged(missed)) => return Some(Notification::Missed(missed)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// What the quiz and pack state machines need from local storage.
///
/// None of the operations can fail from the caller's point of view: a store
/// that cannot persist keeps working in memory.
pub trait PersistentStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn subscribe(&self) -> Subscription;
}
