#![forbid(unsafe_code)]

//! Lifecycle-gated, thread-safe key/value store.
//!
//! [`ConcurrentScopedData`] maps typed [`DataKey`]s to values. Every key is
//! bound to exactly one [`Lifecycle`]; a value can only be inserted while
//! that lifecycle is active, and stopping the lifecycle removes (and
//! disposes) every value bound to it or to any of its active descendants.
//!
//! # Locking
//!
//! The store has two locks:
//!
//! - an **exclusive lock** (reentrant, see [`ConcurrentScopedData::lock`]).
//!   Every mutation takes it, and the renderer holds it for a whole render
//!   pass, so a render never observes a half-applied update.
//! - a **data lock** (read/write) guarding the map itself. Lookups only take
//!   the shared side of it and therefore never wait on the exclusive lock.
//!
//! Because the exclusive lock is reentrant, a thread that already holds it
//! (e.g. a run body batching several updates) can keep calling mutating
//! methods without deadlocking.
//!
//! A long-lived holder can step out of the lock with
//! [`unlocked`](ConcurrentScopedData::unlocked) (every level it holds is
//! released, then restored when the closure returns) or give it up for good
//! with [`release_held`](ConcurrentScopedData::release_held). A run body
//! holds the lock for its whole execution and steps out only while it
//! waits, so updates made between two waits land in one frame.
//!
//! # Disposal
//!
//! Disposers run after the data lock has been released but while the
//! exclusive lock is still held by the stopping thread. A disposer may
//! therefore write back into the same store; other threads stay serialized
//! behind it until it returns.
//!
//! # Failure Modes
//!
//! - Closures passed to [`with`](ConcurrentScopedData::with) and
//!   [`update`](ConcurrentScopedData::update) run while the data lock is
//!   held. They must not mutate the same store.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace};

use crate::lifecycle::Lifecycle;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

type AnyValue = Box<dyn Any + Send + Sync>;
type Disposer = Box<dyn FnOnce(AnyValue) + Send>;
type DeactivationListener = Arc<dyn Fn(&Lifecycle) + Send + Sync>;

/// A typed, identity-compared address into a [`ConcurrentScopedData`].
pub struct DataKey<T> {
    id: u64,
    name: &'static str,
    lifecycle: Lifecycle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DataKey<T> {
    /// Create a new key bound to `lifecycle`.
    ///
    /// Every call produces a distinct key, even for the same name.
    #[must_use]
    pub fn new(name: &'static str, lifecycle: &Lifecycle) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name,
            lifecycle: lifecycle.clone(),
            _marker: PhantomData,
        }
    }

    /// The lifecycle this key is bound to.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Debug name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for DataKey<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            lifecycle: self.lifecycle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for DataKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for DataKey<T> {}

impl<T> fmt::Debug for DataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle.name())
            .finish()
    }
}

/// Errors reported by [`ConcurrentScopedData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopedDataError {
    /// The key's lifecycle is not active, so no value may be stored.
    InactiveLifecycle {
        key: &'static str,
        lifecycle: &'static str,
    },
    /// A value was required but none is stored.
    MissingValue { key: &'static str },
    /// The stored value is not of the key's type.
    TypeMismatch { key: &'static str },
}

impl fmt::Display for ScopedDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InactiveLifecycle { key, lifecycle } => {
                write!(f, "cannot store `{key}`: lifecycle `{lifecycle}` is not active")
            }
            Self::MissingValue { key } => write!(f, "no value stored for `{key}`"),
            Self::TypeMismatch { key } => write!(f, "value stored for `{key}` has the wrong type"),
        }
    }
}

impl std::error::Error for ScopedDataError {}

struct Entry {
    lifecycle: Lifecycle,
    value: AnyValue,
    // `Disposer` is only `Send`; the mutex makes the entry `Sync`.
    dispose: Option<Mutex<Disposer>>,
}

#[derive(Default)]
struct Store {
    active: HashMap<u64, Lifecycle>,
    entries: HashMap<u64, Entry>,
}

impl Store {
    fn insert<T: Send + Sync + 'static>(
        &mut self,
        key: &DataKey<T>,
        value: T,
        dispose: Option<Disposer>,
    ) {
        self.entries.insert(
            key.id,
            Entry {
                lifecycle: key.lifecycle.clone(),
                value: Box::new(value),
                dispose: dispose.map(Mutex::new),
            },
        );
    }

    /// Deactivate `lifecycle`, collect its entries, then recurse into active
    /// children. Already-inactive lifecycles are skipped so each entry is
    /// collected at most once.
    fn stop_into(
        &mut self,
        lifecycle: &Lifecycle,
        stopped: &mut Vec<Lifecycle>,
        disposals: &mut Vec<(AnyValue, Disposer)>,
    ) {
        if self.active.remove(&lifecycle.id()).is_none() {
            return;
        }

        let bound: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.lifecycle == *lifecycle)
            .map(|(id, _)| *id)
            .collect();
        for id in bound {
            if let Some(entry) = self.entries.remove(&id)
                && let Some(dispose) = entry.dispose
            {
                disposals.push((entry.value, dispose.into_inner()));
            }
        }
        stopped.push(lifecycle.clone());

        let children: Vec<Lifecycle> = self
            .active
            .values()
            .filter(|candidate| candidate.parent() == Some(lifecycle))
            .cloned()
            .collect();
        for child in children {
            self.stop_into(&child, stopped, disposals);
        }
    }
}

// ── Exclusive lock ──────────────────────────────────────────────────────

#[derive(Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

/// Reentrant lock that knows its owning thread, so the owner can release
/// every level it holds at once and take them back later.
#[derive(Default)]
struct ExclusiveLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

impl ExclusiveLock {
    fn acquire_levels(&self, levels: usize) {
        if levels == 0 {
            return;
        }
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        loop {
            let holder = owner.thread;
            match holder {
                None => {
                    owner.thread = Some(me);
                    owner.depth = levels;
                    return;
                }
                Some(thread) if thread == me => {
                    owner.depth += levels;
                    return;
                }
                Some(_) => self.released.wait(&mut owner),
            }
        }
    }

    /// Release one level. A no-op on a thread that does not hold the lock.
    fn release(&self) {
        let mut owner = self.owner.lock();
        if owner.thread != Some(thread::current().id()) {
            return;
        }
        owner.depth -= 1;
        if owner.depth == 0 {
            owner.thread = None;
            self.released.notify_one();
        }
    }

    /// Release every level held by the calling thread; returns how many.
    fn release_all(&self) -> usize {
        let mut owner = self.owner.lock();
        if owner.thread != Some(thread::current().id()) {
            return 0;
        }
        let levels = std::mem::take(&mut owner.depth);
        owner.thread = None;
        self.released.notify_one();
        levels
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.owner.lock().thread == Some(thread::current().id())
    }
}

/// One level of the store's exclusive lock, released on drop.
///
/// Returned by [`ConcurrentScopedData::hold`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    lock: &'a ExclusiveLock,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl fmt::Debug for ExclusiveGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExclusiveGuard")
    }
}

/// Lock levels given up by [`ConcurrentScopedData::release_held`].
#[derive(Debug)]
#[must_use = "dropping this leaves the lock released"]
pub struct HeldLevels(usize);

impl HeldLevels {
    /// Number of levels released.
    #[must_use]
    pub fn levels(&self) -> usize {
        self.0
    }
}

fn boxed_disposer<T: Send + Sync + 'static>(dispose: impl FnOnce(T) + Send + 'static) -> Disposer {
    Box::new(move |value: AnyValue| {
        if let Ok(value) = value.downcast::<T>() {
            dispose(*value);
        }
    })
}

/// Thread-safe map of lifecycle-bound keys to values.
///
/// # Invariants
///
/// 1. A value for key `K` exists only while `K`'s lifecycle is active.
/// 2. `stop(L)` removes every value bound to `L` or to an active descendant
///    of `L`; each removed value's disposer runs exactly once.
/// 3. `start` and `stop` are idempotent.
pub struct ConcurrentScopedData {
    exclusive: ExclusiveLock,
    store: RwLock<Store>,
    listeners: RwLock<Vec<DeactivationListener>>,
}

impl Default for ConcurrentScopedData {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConcurrentScopedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read_recursive();
        f.debug_struct("ConcurrentScopedData")
            .field("active_lifecycles", &store.active.len())
            .field("entries", &store.entries.len())
            .finish()
    }
}

impl ConcurrentScopedData {
    /// Create an empty store with no active lifecycles.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exclusive: ExclusiveLock::default(),
            store: RwLock::new(Store::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Run `f` while holding the exclusive lock.
    ///
    /// No other thread can mutate the store (or render) until `f` returns.
    /// Reentrant: nested calls from the same thread do not block.
    pub fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _exclusive = self.hold();
        f()
    }

    /// Take one level of the exclusive lock until the guard drops.
    pub fn hold(&self) -> ExclusiveGuard<'_> {
        self.exclusive.acquire_levels(1);
        ExclusiveGuard {
            lock: &self.exclusive,
        }
    }

    /// Run `f` with the exclusive lock fully released by the calling
    /// thread, then take back every level it held.
    ///
    /// On a thread that does not hold the lock this just calls `f`.
    pub fn unlocked<R>(&self, f: impl FnOnce() -> R) -> R {
        let held = self.release_held();
        let result = f();
        self.reacquire(held);
        result
    }

    /// Release every level of the exclusive lock held by the calling
    /// thread. Pass the result to [`reacquire`](Self::reacquire) to take
    /// them back; guards dropped while released do nothing.
    pub fn release_held(&self) -> HeldLevels {
        let levels = self.exclusive.release_all();
        if levels > 0 {
            trace!(levels, "exclusive lock released");
        }
        HeldLevels(levels)
    }

    /// Take back levels returned by [`release_held`](Self::release_held),
    /// blocking until the lock is free.
    pub fn reacquire(&self, held: HeldLevels) {
        self.exclusive.acquire_levels(held.0);
    }

    /// Whether the calling thread holds the exclusive lock.
    #[must_use]
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.exclusive.is_held_by_current_thread()
    }

    /// Mark `lifecycle` active. Idempotent.
    pub fn start(&self, lifecycle: &Lifecycle) {
        let _exclusive = self.hold();
        self.store
            .write()
            .active
            .entry(lifecycle.id())
            .or_insert_with(|| lifecycle.clone());
        trace!(lifecycle = lifecycle.name(), "lifecycle started");
    }

    /// Stop `lifecycle` and every active descendant, disposing their values.
    ///
    /// Deactivation listeners are notified once per stopped lifecycle, parents
    /// before children. Stopping an inactive lifecycle is a no-op.
    pub fn stop(&self, lifecycle: &Lifecycle) {
        let _exclusive = self.hold();

        let mut stopped = Vec::new();
        let mut disposals = Vec::new();
        self.store
            .write()
            .stop_into(lifecycle, &mut stopped, &mut disposals);

        if stopped.is_empty() {
            return;
        }
        debug!(
            lifecycle = lifecycle.name(),
            stopped = stopped.len(),
            disposed = disposals.len(),
            "lifecycle stopped"
        );

        for (value, dispose) in disposals {
            dispose(value);
        }

        let listeners: Vec<DeactivationListener> = self.listeners.read().clone();
        for stopped_lifecycle in &stopped {
            for listener in &listeners {
                listener(stopped_lifecycle);
            }
        }
    }

    /// Whether `lifecycle` is currently active.
    #[must_use]
    pub fn is_active(&self, lifecycle: &Lifecycle) -> bool {
        self.store.read_recursive().active.contains_key(&lifecycle.id())
    }

    /// Register a callback invoked for every lifecycle that stops.
    pub fn add_deactivation_listener(&self, listener: impl Fn(&Lifecycle) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Whether a value is stored for `key`.
    #[must_use]
    pub fn contains<T>(&self, key: &DataKey<T>) -> bool {
        self.store.read_recursive().entries.contains_key(&key.id)
    }

    /// Borrow the value for `key`, if present, under the shared data lock.
    pub fn with<T: Send + Sync + 'static, R>(
        &self,
        key: &DataKey<T>,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let store = self.store.read_recursive();
        let value = store.entries.get(&key.id)?.value.downcast_ref::<T>()?;
        Some(f(value))
    }

    /// Clone the value for `key`, if present.
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &DataKey<T>) -> Option<T> {
        self.with(key, T::clone)
    }

    /// Clone the value for `key`, failing if absent.
    pub fn get_value<T: Clone + Send + Sync + 'static>(
        &self,
        key: &DataKey<T>,
    ) -> Result<T, ScopedDataError> {
        let store = self.store.read_recursive();
        let entry = store
            .entries
            .get(&key.id)
            .ok_or(ScopedDataError::MissingValue { key: key.name })?;
        entry
            .value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(ScopedDataError::TypeMismatch { key: key.name })
    }

    /// Mutate the value for `key` in place under the exclusive lock.
    ///
    /// Returns `None` if no value is stored.
    pub fn update<T: Send + Sync + 'static, R>(
        &self,
        key: &DataKey<T>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let _exclusive = self.hold();
        let mut store = self.store.write();
        let value = store.entries.get_mut(&key.id)?.value.downcast_mut::<T>()?;
        Some(f(value))
    }

    /// Insert a value only if `key`'s lifecycle is active and no value exists.
    ///
    /// Returns `true` if the value was inserted. `provide` is only called on
    /// success.
    pub fn try_put<T: Send + Sync + 'static>(
        &self,
        key: &DataKey<T>,
        provide: impl FnOnce() -> T,
        dispose: Option<Box<dyn FnOnce(T) + Send>>,
    ) -> bool {
        let _exclusive = self.hold();
        let mut store = self.store.write();
        if !store.active.contains_key(&key.lifecycle.id()) || store.entries.contains_key(&key.id) {
            return false;
        }
        store.insert(key, provide(), dispose.map(boxed_disposer));
        true
    }

    /// Get-or-create the value for `key`, then call `f` with it.
    ///
    /// `f` is always called when the key's lifecycle is active, whether the
    /// value was just created or already existed. Returns `None` (without
    /// calling anything) if the lifecycle is inactive.
    pub fn put_if_absent<T: Send + Sync + 'static, R>(
        &self,
        key: &DataKey<T>,
        provide: impl FnOnce() -> T,
        dispose: Option<Box<dyn FnOnce(T) + Send>>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let _exclusive = self.hold();
        let mut store = self.store.write();
        if !store.active.contains_key(&key.lifecycle.id()) {
            return None;
        }
        if !store.entries.contains_key(&key.id) {
            store.insert(key, provide(), dispose.map(boxed_disposer));
        }
        let value = store.entries.get_mut(&key.id)?.value.downcast_mut::<T>()?;
        Some(f(value))
    }

    /// Replace the value for `key`, disposing any previous value first.
    pub fn set<T: Send + Sync + 'static>(
        &self,
        key: &DataKey<T>,
        value: T,
        dispose: Option<Box<dyn FnOnce(T) + Send>>,
    ) -> Result<(), ScopedDataError> {
        let _exclusive = self.hold();
        if !self.is_active(&key.lifecycle) {
            return Err(ScopedDataError::InactiveLifecycle {
                key: key.name,
                lifecycle: key.lifecycle.name(),
            });
        }
        self.remove(key);
        self.store
            .write()
            .insert(key, value, dispose.map(boxed_disposer));
        Ok(())
    }

    /// Remove (and dispose) the value for `key`. Returns `true` if a value was
    /// present.
    pub fn remove<T>(&self, key: &DataKey<T>) -> bool {
        let _exclusive = self.hold();
        let removed = self.store.write().entries.remove(&key.id);
        match removed {
            Some(entry) => {
                if let Some(dispose) = entry.dispose {
                    (dispose.into_inner())(entry.value);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_disposer(counter: &Arc<AtomicUsize>) -> Option<Box<dyn FnOnce(u32) + Send>> {
        let counter = Arc::clone(counter);
        Some(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn store_is_shareable_across_threads() {
        assert_send_sync::<ConcurrentScopedData>();
        assert_send_sync::<Arc<ConcurrentScopedData>>();
        assert_send_sync::<DataKey<String>>();
    }

    #[test]
    fn disposer_runs_when_stopped_from_another_thread() {
        let data = Arc::new(ConcurrentScopedData::new());
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("count", &lifecycle);
        let disposed = Arc::new(AtomicUsize::new(0));
        data.start(&lifecycle);
        assert!(data.try_put(&key, || 4, counting_disposer(&disposed)));

        let store = Arc::clone(&data);
        let stopping = lifecycle.clone();
        std::thread::spawn(move || store.stop(&stopping))
            .join()
            .unwrap();

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!data.contains(&key));
    }

    #[test]
    fn try_put_requires_active_lifecycle() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("count", &lifecycle);

        assert!(!data.try_put(&key, || 1, None));
        data.start(&lifecycle);
        assert!(data.try_put(&key, || 1, None));
        assert!(!data.try_put(&key, || 2, None), "second put must fail");
        assert_eq!(data.get(&key), Some(1));
    }

    #[test]
    fn start_is_idempotent() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("count", &lifecycle);
        data.start(&lifecycle);
        assert!(data.try_put(&key, || 5, None));
        data.start(&lifecycle);
        assert_eq!(data.get(&key), Some(5));
    }

    #[test]
    fn stop_disposes_once_and_removes() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("count", &lifecycle);
        let disposed = Arc::new(AtomicUsize::new(0));

        data.start(&lifecycle);
        data.try_put(&key, || 7, counting_disposer(&disposed));
        data.stop(&lifecycle);
        data.stop(&lifecycle);

        assert!(!data.contains(&key));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!data.is_active(&lifecycle));
    }

    #[test]
    fn stop_recurses_into_active_children() {
        let data = ConcurrentScopedData::new();
        let section = Lifecycle::new("section");
        let run = Lifecycle::child_of("run", &section);
        let pass = Lifecycle::child_of("pass", &run);
        let disposed = Arc::new(AtomicUsize::new(0));

        for lifecycle in [&section, &run, &pass] {
            data.start(lifecycle);
        }
        let run_key = DataKey::<u32>::new("run", &run);
        let pass_key = DataKey::<u32>::new("pass", &pass);
        data.try_put(&run_key, || 1, counting_disposer(&disposed));
        data.try_put(&pass_key, || 2, counting_disposer(&disposed));

        data.stop(&section);

        assert!(!data.contains(&run_key));
        assert!(!data.contains(&pass_key));
        assert!(!data.is_active(&pass));
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_leaves_siblings_alone() {
        let data = ConcurrentScopedData::new();
        let session = Lifecycle::new("session");
        let a = Lifecycle::child_of("a", &session);
        let b = Lifecycle::child_of("b", &session);
        data.start(&session);
        data.start(&a);
        data.start(&b);
        let key_b = DataKey::<u32>::new("b", &b);
        data.try_put(&key_b, || 3, None);

        data.stop(&a);
        assert!(data.is_active(&b));
        assert_eq!(data.get(&key_b), Some(3));
    }

    #[test]
    fn put_if_absent_always_calls_back() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<Vec<u32>>::new("list", &lifecycle);
        data.start(&lifecycle);

        let len = data.put_if_absent(&key, Vec::new, None, |list| {
            list.push(1);
            list.len()
        });
        assert_eq!(len, Some(1));
        let len = data.put_if_absent(&key, || vec![9, 9, 9], None, |list| {
            list.push(2);
            list.len()
        });
        assert_eq!(len, Some(2));
        assert_eq!(data.get(&key), Some(vec![1, 2]));
    }

    #[test]
    fn put_if_absent_on_inactive_lifecycle_is_none() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        let mut called = false;
        let result = data.put_if_absent(&key, || 1, None, |_| called = true);
        assert!(result.is_none());
        assert!(!called);
    }

    #[test]
    fn set_replaces_and_disposes_previous() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        let disposed = Arc::new(AtomicUsize::new(0));
        data.start(&lifecycle);

        data.set(&key, 1, counting_disposer(&disposed)).unwrap();
        data.set(&key, 2, counting_disposer(&disposed)).unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(data.get_value(&key), Ok(2));
    }

    #[test]
    fn set_on_inactive_lifecycle_errors() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        let err = data.set(&key, 1, None).unwrap_err();
        assert!(matches!(err, ScopedDataError::InactiveLifecycle { .. }));
    }

    #[test]
    fn get_value_missing_is_error() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        assert_eq!(
            data.get_value(&key),
            Err(ScopedDataError::MissingValue { key: "x" })
        );
    }

    #[test]
    fn update_mutates_in_place() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        data.start(&lifecycle);
        data.try_put(&key, || 1, None);
        assert_eq!(data.update(&key, |v| {
            *v += 41;
            *v
        }), Some(42));
    }

    #[test]
    fn disposer_may_write_back_into_store() {
        let data = Arc::new(ConcurrentScopedData::new());
        let session = Lifecycle::new("session");
        let section = Lifecycle::child_of("section", &session);
        data.start(&session);
        data.start(&section);

        let summary = DataKey::<u32>::new("summary", &session);
        let count = DataKey::<u32>::new("count", &section);

        let store = Arc::clone(&data);
        let summary_key = summary.clone();
        data.try_put(
            &count,
            || 3,
            Some(Box::new(move |last| {
                let _ = store.set(&summary_key, last, None);
            })),
        );
        data.stop(&section);
        assert_eq!(data.get(&summary), Some(3));
    }

    #[test]
    fn listeners_see_each_stopped_lifecycle() {
        let data = ConcurrentScopedData::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        data.add_deactivation_listener(move |lifecycle| sink.lock().push(lifecycle.name()));

        let section = Lifecycle::new("section");
        let run = Lifecycle::child_of("run", &section);
        data.start(&section);
        data.start(&run);
        data.stop(&section);

        assert_eq!(*seen.lock(), vec!["section", "run"]);
    }

    #[test]
    fn unlocked_lets_other_threads_in_and_restores_depth() {
        let data = Arc::new(ConcurrentScopedData::new());
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        data.start(&lifecycle);
        data.try_put(&key, || 0, None);

        let _outer = data.hold();
        data.lock(|| {
            let store = Arc::clone(&data);
            let writer = key.clone();
            data.unlocked(|| {
                assert!(!data.is_locked_by_current_thread());
                std::thread::spawn(move || store.update(&writer, |v| *v = 9))
                    .join()
                    .unwrap();
            });
            assert!(data.is_locked_by_current_thread());
        });
        assert!(data.is_locked_by_current_thread());
        assert_eq!(data.get(&key), Some(9));
    }

    #[test]
    fn released_levels_block_others_until_returned() {
        let data = Arc::new(ConcurrentScopedData::new());
        let guard = data.hold();
        let held = data.release_held();
        assert_eq!(held.levels(), 1);
        drop(guard);

        let store = Arc::clone(&data);
        std::thread::spawn(move || store.lock(|| ()))
            .join()
            .unwrap();

        data.reacquire(held);
        assert!(data.is_locked_by_current_thread());
        let store = Arc::clone(&data);
        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = std::thread::spawn(move || {
            store.lock(|| ());
            let _ = tx.send(());
        });
        assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
        drop(data.release_held());
        assert!(rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok());
        waiter.join().unwrap();
    }

    #[test]
    fn lock_is_reentrant() {
        let data = ConcurrentScopedData::new();
        let lifecycle = Lifecycle::new("section");
        let key = DataKey::<u32>::new("x", &lifecycle);
        data.start(&lifecycle);
        data.lock(|| {
            data.lock(|| {
                data.set(&key, 1, None).unwrap();
            });
            data.update(&key, |v| *v += 1);
        });
        assert_eq!(data.get(&key), Some(2));
    }
}
