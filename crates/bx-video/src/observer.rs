//! Weak observer registry
//!
//! Observers are held weakly, in insertion order, behind a single lock.
//! Dispatch never runs with the lock held: callers iterate over a snapshot
//! of strong handles, so an observer may add or remove observers (itself
//! included) from inside a callback. Each entry carries a liveness flag that
//! `remove` clears under the lock, which keeps an in-flight dispatch from
//! reaching an observer that was removed after the snapshot was taken.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Per-registration bookkeeping shared between the set and its snapshots
pub struct Slot<S> {
    active: AtomicBool,
    state: S,
}

struct Entry<T: ?Sized, S> {
    observer: Weak<T>,
    slot: Arc<Slot<S>>,
}

impl<T: ?Sized, S> Entry<T, S> {
    fn is(&self, observer: &Arc<T>) -> bool {
        std::ptr::addr_eq(self.observer.as_ptr(), Arc::as_ptr(observer))
    }

    fn is_alive(&self) -> bool {
        self.observer.strong_count() > 0
    }
}

/// Strong handle to a registered observer, valid for one dispatch pass
pub struct Registered<T: ?Sized, S = ()> {
    observer: Arc<T>,
    slot: Arc<Slot<S>>,
}

impl<T: ?Sized, S> Registered<T, S> {
    pub fn observer(&self) -> &T {
        &self.observer
    }

    /// Per-registration state
    pub fn state(&self) -> &S {
        &self.slot.state
    }

    /// False once the observer has been removed from the set
    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }
}

/// Ordered set of weakly referenced observers
///
/// `S` is per-registration state owned by the set's user, created with
/// `S::default()` when an observer is added.
pub struct ObserverSet<T: ?Sized, S = ()> {
    entries: Mutex<Vec<Entry<T, S>>>,
}

impl<T: ?Sized, S: Default> ObserverSet<T, S> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer. Returns false if it was already registered.
    pub fn add(&self, observer: &Arc<T>) -> bool {
        let mut entries = self.entries.lock();
        prune(&mut entries);

        if entries.iter().any(|e| e.is(observer)) {
            return false;
        }

        entries.push(Entry {
            observer: Arc::downgrade(observer),
            slot: Arc::new(Slot {
                active: AtomicBool::new(true),
                state: S::default(),
            }),
        });
        true
    }

    /// Unregister an observer. Returns false if it was not registered.
    pub fn remove(&self, observer: &Arc<T>) -> bool {
        let mut entries = self.entries.lock();

        match entries.iter().position(|e| e.is(observer)) {
            Some(index) => {
                let entry = entries.remove(index);
                entry.slot.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, observer: &Arc<T>) -> bool {
        self.entries.lock().iter().any(|e| e.is(observer) && e.is_alive())
    }

    /// Number of registered observers that are still alive
    pub fn len(&self) -> usize {
        self.entries.lock().iter().filter(|e| e.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for entry in entries.drain(..) {
            entry.slot.active.store(false, Ordering::Release);
        }
    }

    /// Strong handles to every live observer, in insertion order
    pub fn snapshot(&self) -> Vec<Registered<T, S>> {
        let mut entries = self.entries.lock();
        prune(&mut entries);

        entries
            .iter()
            .filter_map(|e| {
                e.observer.upgrade().map(|observer| Registered {
                    observer,
                    slot: Arc::clone(&e.slot),
                })
            })
            .collect()
    }

    /// Call `f` for every observer that is still registered when its turn
    /// comes. Returns the number of observers reached.
    pub fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Registered<T, S>),
    {
        let snapshot = self.snapshot();
        let mut delivered = 0;

        for registered in &snapshot {
            if registered.is_active() {
                f(registered);
                delivered += 1;
            }
        }

        delivered
    }
}

impl<T: ?Sized, S: Default> Default for ObserverSet<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop entries whose observer has been deallocated
fn prune<T: ?Sized, S>(entries: &mut Vec<Entry<T, S>>) {
    entries.retain(|e| {
        let alive = e.is_alive();
        if !alive {
            e.slot.active.store(false, Ordering::Release);
        }
        alive
    });
}
