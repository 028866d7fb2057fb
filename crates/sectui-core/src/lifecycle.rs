#![forbid(unsafe_code)]

//! Identity-compared lifecycle markers.
//!
//! A [`Lifecycle`] names a span of liveness (a session, a section, a run
//! body, a single render pass). Two lifecycles are equal only if they are
//! the same marker: equality and hashing use a process-unique id assigned at
//! construction, never the name or parent.
//!
//! A lifecycle may declare a parent. Stopping the parent in a
//! [`ConcurrentScopedData`](crate::scoped_data::ConcurrentScopedData) stops
//! every active descendant as well.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LIFECYCLE_ID: AtomicU64 = AtomicU64::new(1);

struct LifecycleInner {
    id: u64,
    name: &'static str,
    parent: Option<Lifecycle>,
}

/// An opaque scope marker. Cheap to clone; clones are the same marker.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

impl Lifecycle {
    /// Create a root lifecycle.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::build(name, None)
    }

    /// Create a lifecycle nested inside `parent`.
    #[must_use]
    pub fn child_of(name: &'static str, parent: &Lifecycle) -> Self {
        Self::build(name, Some(parent.clone()))
    }

    fn build(name: &'static str, parent: Option<Lifecycle>) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                id: NEXT_LIFECYCLE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                parent,
            }),
        }
    }

    /// Process-unique identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Debug name given at construction.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The declared parent, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Lifecycle> {
        self.inner.parent.as_ref()
    }

    /// True if `ancestor` appears anywhere on this lifecycle's parent chain.
    ///
    /// A lifecycle is not its own descendant.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Lifecycle) -> bool {
        let mut current = self.parent();
        while let Some(lifecycle) = current {
            if lifecycle == ancestor {
                return true;
            }
            current = lifecycle.parent();
        }
        false
    }
}

impl PartialEq for Lifecycle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Lifecycle {}

impl Hash for Lifecycle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("parent", &self.inner.parent.as_ref().map(Lifecycle::id))
            .finish()
    }
}
