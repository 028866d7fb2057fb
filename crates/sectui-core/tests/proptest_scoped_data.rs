//! Property-based tests for lifecycle-scoped data.
//!
//! 1. **Stop clears the subtree**: after `stop(L)`, no key bound to `L` or
//!    to an active descendant of `L` holds a value.
//!
//! 2. **Exactly-once disposal**: each disposed value's disposer fires once,
//!    no matter how many times `stop` is called afterwards.
//!
//! 3. **Siblings survive**: keys bound to lifecycles outside the stopped
//!    subtree are untouched.
//!
//! 4. **Gated inserts**: `try_put` succeeds only for active lifecycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use sectui_core::{ConcurrentScopedData, DataKey, Lifecycle};

/// Build a random forest: node `i` has parent `parents[i]` if it is `< i`.
fn build_tree(parents: &[usize]) -> Vec<Lifecycle> {
    let mut nodes: Vec<Lifecycle> = Vec::with_capacity(parents.len());
    for (i, &parent) in parents.iter().enumerate() {
        let lifecycle = if parent < i {
            Lifecycle::child_of("node", &nodes[parent])
        } else {
            Lifecycle::new("root")
        };
        nodes.push(lifecycle);
    }
    nodes
}

proptest! {
    #[test]
    fn stop_disposes_whole_subtree_once(
        parents in proptest::collection::vec(0usize..12, 1..12),
        target_seed in any::<usize>(),
        keys_per_node in 1usize..4,
    ) {
        let nodes = build_tree(&parents);
        let data = ConcurrentScopedData::new();
        for node in &nodes {
            data.start(node);
        }

        let mut keys = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            for _ in 0..keys_per_node {
                let key = DataKey::<usize>::new("value", node);
                let fired = Arc::new(AtomicUsize::new(0));
                let counter = Arc::clone(&fired);
                let put = data.try_put(
                    &key,
                    || i,
                    Some(Box::new(move |_: usize| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
                );
                prop_assert!(put);
                keys.push((i, key, fired));
            }
        }

        let target = target_seed % nodes.len();
        data.stop(&nodes[target]);
        data.stop(&nodes[target]);

        for (i, key, fired) in &keys {
            let in_subtree = *i == target || nodes[*i].is_descendant_of(&nodes[target]);
            if in_subtree {
                prop_assert!(!data.contains(key));
                prop_assert!(!data.is_active(&nodes[*i]));
                prop_assert_eq!(fired.load(Ordering::SeqCst), 1);
            } else {
                prop_assert_eq!(data.get(key), Some(*i));
                prop_assert_eq!(fired.load(Ordering::SeqCst), 0);
            }
        }
    }

    #[test]
    fn try_put_only_for_active(active in any::<bool>(), value in any::<i64>()) {
        let lifecycle = Lifecycle::new("maybe");
        let data = ConcurrentScopedData::new();
        if active {
            data.start(&lifecycle);
        }
        let key = DataKey::new("value", &lifecycle);
        prop_assert_eq!(data.try_put(&key, || value, None), active);
        prop_assert_eq!(data.get(&key), active.then_some(value));
    }
}
