use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use log::{debug, info, warn};
use tokio::sync::broadcast;

use super::{ContextId, PersistentStore, StoreEvent, Subscription};
use crate::error::StoreError;

const EVENT_CAPACITY: usize = 64;

struct Backing {
    entries: BTreeMap<String, String>,
    file: Option<PathBuf>,
}

struct Shared {
    backing: Mutex<Backing>,
    events: broadcast::Sender<StoreEvent>,
    next_context: AtomicU64,
}

/// One storage area. Cloning a `Scope` gives another reference to the same
/// area, not a copy.
#[derive(Clone)]
pub struct Scope {
    shared: Arc<Shared>,
}

impl Scope {
    pub fn in_memory() -> Self {
        Self::with_backing(BTreeMap::new(), None)
    }

    /// Opens a scope persisted to `path`.
    ///
    /// A missing file starts empty. A file that cannot be parsed is replaced
    /// on the next write. A file that cannot be read at all leaves the scope
    /// in memory only.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match load(&path) {
            Ok(entries) => {
                info!("Loaded {} stored keys from {}", entries.len(), path.display());
                Self::with_backing(entries, Some(path))
            }
            Err(StoreError::Corrupt(e)) => {
                warn!("Ignoring unreadable store content in {}: {e}", path.display());
                Self::with_backing(BTreeMap::new(), Some(path))
            }
            Err(e) => {
                warn!("Store unavailable, progress will not survive a restart: {e}");
                Self::in_memory()
            }
        }
    }

    fn with_backing(entries: BTreeMap<String, String>, file: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                backing: Mutex::new(Backing { entries, file }),
                events,
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a new execution context (one tab) on this scope.
    pub fn context(&self) -> StoreHandle {
        let id = self.shared.next_context.fetch_add(1, Ordering::Relaxed);
        StoreHandle {
            shared: self.shared.clone(),
            id,
        }
    }

    pub fn is_durable(&self) -> bool {
        lock(&self.shared.backing).file.is_some()
    }
}

/// A tab's view of a [`Scope`].
pub struct StoreHandle {
    shared: Arc<Shared>,
    id: ContextId,
}

impl StoreHandle {
    pub fn context_id(&self) -> ContextId {
        self.id
    }

    fn write(&self, key: &str, value: Option<&str>) {
        let mut backing = lock(&self.shared.backing);
        let previous = match value {
            Some(value) => backing.entries.insert(key.to_string(), value.to_string()),
            None => backing.entries.remove(key),
        };
        if previous.as_deref() == value {
            return;
        }

        if let Some(path) = backing.file.clone() {
            if let Err(e) = persist(&path, &backing.entries) {
                warn!("Store unavailable, keeping state in memory only: {e}");
                backing.file = None;
            }
        }

        debug!("Context {} changed {key}", self.id);
        // Sent under the lock so every tab sees writes in the order they happened.
        // An error only means nobody is listening.
        let _ = self
            .shared
            .events
            .send(StoreEvent::new(key, value.map(str::to_string), self.id));
    }
}

impl PersistentStore for StoreHandle {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.shared.backing).entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.write(key, Some(value));
    }

    fn remove(&self, key: &str) {
        self.write(key, None);
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.shared.events.subscribe(), self.id)
    }
}

fn lock(backing: &Mutex<Backing>) -> MutexGuard<'_, Backing> {
    backing.lock().unwrap_or_else(PoisonError::into_inner)
}

fn load(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Blocking. Runs on the caller's thread under the scope lock; the file only
/// ever holds the few quiz and pack keys.
fn persist(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Notification;

    #[test]
    fn writes_are_visible_to_every_context() {
        let scope = Scope::in_memory();
        let first = scope.context();
        let second = scope.context();

        first.set("quiz.completed", "true");
        assert_eq!(second.get("quiz.completed").as_deref(), Some("true"));

        second.remove("quiz.completed");
        assert_eq!(first.get("quiz.completed"), None);
    }

    #[test]
    fn only_other_contexts_are_notified() {
        let scope = Scope::in_memory();
        let writer = scope.context();
        let reader = scope.context();
        let mut own = writer.subscribe();
        let mut other = reader.subscribe();

        writer.set("giftpack.selected", "B");

        assert_eq!(own.try_recv(), None);
        match other.try_recv() {
            Some(Notification::Changed(event)) => {
                assert_eq!(event.key, "giftpack.selected");
                assert_eq!(event.value.as_deref(), Some("B"));
                assert_eq!(event.origin(), writer.context_id());
            }
            other => panic!("expected a change, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_values_do_not_notify() {
        let scope = Scope::in_memory();
        let writer = scope.context();
        let mut reader = scope.context().subscribe();

        writer.remove("quiz.lockout.endTimestamp");
        writer.set("quiz.started", "true");
        writer.set("quiz.started", "true");

        assert!(matches!(reader.try_recv(), Some(Notification::Changed(_))));
        assert_eq!(reader.try_recv(), None);
    }

    #[test]
    fn removal_carries_no_value() {
        let scope = Scope::in_memory();
        let writer = scope.context();
        writer.set("quiz.lockout.endTimestamp", "1799");
        let mut reader = scope.context().subscribe();

        writer.remove("quiz.lockout.endTimestamp");

        match reader.try_recv() {
            Some(Notification::Changed(event)) => assert_eq!(event.value, None),
            other => panic!("expected a removal, got {other:?}"),
        }
    }

    #[test]
    fn file_scope_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let scope = Scope::open(&path);
        assert!(scope.is_durable());
        scope.context().set("quiz.currentQuestionIndex", "2");
        drop(scope);

        let reopened = Scope::open(&path);
        assert_eq!(
            reopened.context().get("quiz.currentQuestionIndex").as_deref(),
            Some("2")
        );
    }

    #[test]
    fn corrupt_file_starts_empty_and_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();

        let scope = Scope::open(&path);
        let handle = scope.context();
        assert_eq!(handle.get("quiz.completed"), None);

        handle.set("quiz.completed", "true");
        let reopened = Scope::open(&path);
        assert_eq!(reopened.context().get("quiz.completed").as_deref(), Some("true"));
    }

    #[test]
    fn unreadable_path_degrades_to_memory() {
        let dir = tempfile::tempdir().unwrap();

        // A directory cannot be read as a file.
        let scope = Scope::open(dir.path());
        assert!(!scope.is_durable());

        let handle = scope.context();
        handle.set("quiz.started", "true");
        assert_eq!(handle.get("quiz.started").as_deref(), Some("true"));
    }
}
