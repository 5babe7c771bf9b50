//! The tagged task variants carried through the read/write ring buffers
//! (spec §9 design notes: "re-architect as a tagged variant... stored
//! directly in the ring buffer's slots").
use crate::node::PolicyNode;
use std::sync::Arc;

/// A task recorded by `after_read` and consumed by `on_access` during a
/// maintenance drain (spec §4.6).
pub(crate) struct ReadTask<K, V> {
    pub(crate) node: Arc<PolicyNode<K, V>>,
}

/// A task recorded by `after_write` and consumed by the write-task runner
/// during a maintenance drain (spec §4.7).
pub(crate) enum WriteTask<K, V> {
    Add(Arc<PolicyNode<K, V>>),
    Update {
        node: Arc<PolicyNode<K, V>>,
        weight_diff: i64,
    },
    Delete(Arc<PolicyNode<K, V>>),
}
