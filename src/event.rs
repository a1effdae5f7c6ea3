//! Named-event pub/sub with `on`/`once`/`off`/`off_all`/`emit`.
//!
//! Removal by function identity isn't available for Rust closures, so
//! `on`/`once` return a `ListenerId` and `off` takes that id back instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type ListenerId = u64;

#[derive(Clone, Copy)]
enum Persistence {
    Persistent,
    OneShot,
}

/// Wrapped in its own `Mutex` so a bucket can be cloned out from under the
/// emitter's lock (cheap `Arc` bumps) without cloning the closure itself;
/// invoking the callback then only needs this per-listener lock, not the
/// emitter-wide one.
type Callback<E> = Arc<Mutex<Box<dyn FnMut(E) + Send>>>;

struct ListenerEntry<E> {
    id: ListenerId,
    persistence: Persistence,
    callback: Callback<E>,
}

impl<E> Clone for ListenerEntry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            persistence: self.persistence,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// A bucket-per-name event emitter. `E` is the payload type shared by every
/// event name registered on one emitter (callers needing heterogeneous
/// payloads define an enum, as `client.rs`/`request_state.rs` do).
pub struct EventEmitter<E> {
    listeners: Mutex<HashMap<String, Vec<ListenerEntry<E>>>>,
    next_id: Mutex<ListenerId>,
}

impl<E: Clone> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        id
    }

    /// Register a persistent listener for `name`.
    pub fn on(&self, name: impl Into<String>, callback: impl FnMut(E) + Send + 'static) -> ListenerId {
        self.register(name, Persistence::Persistent, callback)
    }

    /// Register a one-shot listener for `name`; it is removed immediately
    /// after its first invocation.
    pub fn once(&self, name: impl Into<String>, callback: impl FnMut(E) + Send + 'static) -> ListenerId {
        self.register(name, Persistence::OneShot, callback)
    }

    fn register(
        &self,
        name: impl Into<String>,
        persistence: Persistence,
        callback: impl FnMut(E) + Send + 'static,
    ) -> ListenerId {
        let id = self.allocate_id();
        let entry = ListenerEntry {
            id,
            persistence,
            callback: Arc::new(Mutex::new(Box::new(callback) as Box<dyn FnMut(E) + Send>)),
        };
        self.listeners
            .lock()
            .unwrap()
            .entry(name.into())
            .or_default()
            .push(entry);
        id
    }

    /// Remove the listener with the given id from `name`'s bucket. Emits
    /// `removeListener` exactly once if a listener was actually removed.
    pub fn off(&self, name: &str, id: ListenerId)
    where
        E: RemoveListenerPayload,
    {
        let removed = {
            let mut guard = self.listeners.lock().unwrap();
            if let Some(bucket) = guard.get_mut(name) {
                let before = bucket.len();
                bucket.retain(|entry| entry.id != id);
                bucket.len() != before
            } else {
                false
            }
        };
        if removed {
            self.emit("removeListener", E::remove_listener(Some(name.to_string())));
        }
    }

    /// Empty one bucket (`Some(name)`) or every bucket (`None`), emitting
    /// `removeListener` first.
    pub fn off_all(&self, name: Option<&str>)
    where
        E: RemoveListenerPayload,
    {
        self.emit(
            "removeListener",
            E::remove_listener(name.map(|s| s.to_string())),
        );
        let mut guard = self.listeners.lock().unwrap();
        match name {
            Some(n) => {
                guard.remove(n);
            }
            None => guard.clear(),
        }
    }

    /// Invoke every listener registered for `name`, in insertion order, with
    /// a clone of `payload`. One-shot listeners are removed after they run.
    /// Returns `true` iff at least one listener existed for `name`.
    ///
    /// The bucket is cloned (an `Arc` bump per listener, not a move) while
    /// holding the emitter-wide lock, so the live bucket is never emptied —
    /// a concurrent `emit` of the same name on another thread always sees
    /// the full listener set, not a transient gap. Callbacks then run
    /// against that snapshot through each listener's own lock, so listeners
    /// registered mid-emit (by a callback) join only the live bucket and
    /// are picked up by the next `emit`, not this one. A callback must not
    /// call back into this same emitter (`on`/`off`/`emit`) for the event
    /// it's handling — that would deadlock on the listener's own lock.
    pub fn emit(&self, name: &str, payload: E) -> bool {
        let snapshot: Vec<ListenerEntry<E>> = {
            let guard = self.listeners.lock().unwrap();
            match guard.get(name) {
                Some(bucket) if !bucket.is_empty() => bucket.clone(),
                _ => return false,
            }
        };

        let mut fired_once = Vec::new();
        for entry in &snapshot {
            (entry.callback.lock().unwrap())(payload.clone());
            if matches!(entry.persistence, Persistence::OneShot) {
                fired_once.push(entry.id);
            }
        }

        if !fired_once.is_empty() {
            let mut guard = self.listeners.lock().unwrap();
            if let Some(bucket) = guard.get_mut(name) {
                bucket.retain(|entry| !fired_once.contains(&entry.id));
                if bucket.is_empty() {
                    guard.remove(name);
                }
            }
        }

        true
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .get(name)
            .map(|b| b.len())
            .unwrap_or(0)
    }
}

/// Lets `EventEmitter<E>::off`/`off_all` synthesize the `removeListener`
/// payload for an arbitrary event type `E`.
pub trait RemoveListenerPayload {
    fn remove_listener(name: Option<String>) -> Self;
}
