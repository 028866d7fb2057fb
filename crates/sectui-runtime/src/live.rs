#![forbid(unsafe_code)]

//! Reactive values.
//!
//! [`LiveVar`] and [`LiveList`] keep their contents in the session's
//! [`ConcurrentScopedData`](sectui_core::ConcurrentScopedData) and request a
//! rerender of the running section whenever they change. A run body's
//! updates between two suspension points land in a single frame; other
//! threads get the same by wrapping several updates in
//! [`ConcurrentScopedData::lock`](sectui_core::ConcurrentScopedData::lock).
//!
//! When the owning lifecycle stops, the last value is kept in the handle,
//! so reading after the session closes still works.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use sectui_core::{DataKey, Lifecycle};

use crate::session::SessionCore;

/// A single reactive value.
///
/// [`set`](Self::set) only triggers a rerender when the new value differs
/// from the current one.
pub struct LiveVar<T> {
    core: Arc<SessionCore>,
    key: DataKey<T>,
    detached: Arc<Mutex<T>>,
}

impl<T> Clone for LiveVar<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            key: self.key.clone(),
            detached: Arc::clone(&self.detached),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + fmt::Debug + 'static> fmt::Debug for LiveVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LiveVar").field(&self.get()).finish()
    }
}

fn keep_on_dispose<T: Send + 'static>(slot: &Arc<Mutex<T>>) -> Option<Box<dyn FnOnce(T) + Send>> {
    let slot = Arc::clone(slot);
    Some(Box::new(move |last: T| *slot.lock() = last))
}

impl<T> LiveVar<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(core: Arc<SessionCore>, lifecycle: &Lifecycle, value: T) -> Self {
        let key = DataKey::new("live_var", lifecycle);
        let detached = Arc::new(Mutex::new(value.clone()));
        core.data.try_put(&key, move || value, keep_on_dispose(&detached));
        Self { core, key, detached }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.core
            .data
            .get(&self.key)
            .unwrap_or_else(|| self.detached.lock().clone())
    }

    pub fn set(&self, value: T) {
        let changed = self.core.data.update(&self.key, |current| {
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        });
        match changed {
            Some(true) => self.core.rerender_active(),
            Some(false) => {}
            None => *self.detached.lock() = value,
        }
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.core.data.lock(|| {
            let next = f(&self.get());
            self.set(next);
        });
    }
}

/// A reactive list. Every mutation requests a rerender.
pub struct LiveList<T> {
    core: Arc<SessionCore>,
    key: DataKey<Vec<T>>,
    detached: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for LiveList<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            key: self.key.clone(),
            detached: Arc::clone(&self.detached),
        }
    }
}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> fmt::Debug for LiveList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LiveList").field(&self.to_vec()).finish()
    }
}

impl<T> LiveList<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(core: Arc<SessionCore>, lifecycle: &Lifecycle, items: Vec<T>) -> Self {
        let key = DataKey::new("live_list", lifecycle);
        let detached = Arc::new(Mutex::new(items.clone()));
        core.data.try_put(&key, move || items, keep_on_dispose(&detached));
        Self { core, key, detached }
    }

    /// Read the items in place.
    pub fn with<R>(&self, mut f: impl FnMut(&[T]) -> R) -> R {
        self.core
            .data
            .with(&self.key, |items| f(items))
            .unwrap_or_else(|| f(self.detached.lock().as_slice()))
    }

    /// Mutate the items and request a rerender.
    ///
    /// `f` runs once.
    pub fn modify<R>(&self, mut f: impl FnMut(&mut Vec<T>) -> R) -> R {
        match self.core.data.update(&self.key, &mut f) {
            Some(result) => {
                self.core.rerender_active();
                result
            }
            None => f(&mut *self.detached.lock()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.with(<[T]>::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with(<[T]>::is_empty)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.with(|items| items.get(index).cloned())
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.with(<[T]>::to_vec)
    }

    pub fn push(&self, item: T) {
        let mut item = Some(item);
        self.modify(|items| items.extend(item.take()));
    }

    /// Replace the item at `index`. Returns the old item, or `None` if
    /// `index` is out of bounds.
    pub fn set(&self, index: usize, item: T) -> Option<T> {
        let mut item = Some(item);
        self.modify(|items| {
            let slot = items.get_mut(index)?;
            item.take().map(|item| std::mem::replace(slot, item))
        })
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        self.modify(|items| (index < items.len()).then(|| items.remove(index)))
    }

    pub fn clear(&self) {
        self.modify(Vec::clear);
    }
}
