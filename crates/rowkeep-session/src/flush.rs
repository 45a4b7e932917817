//! Action Queue: deferred writes replayed in call order on flush.
//!
//! The queue is strictly FIFO. Kinds are never regrouped (no "all deletes
//! first"), so an Insert followed by a Delete of the same entity in one flush
//! creates the row and then removes it.
//!
//! Actions hold the live entity, not a copy: the values written are the ones
//! the entity has when the action executes.

use crate::identity_map::{EntityIdentity, TrackedEntity};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// What a pending action does to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::Insert => "insert",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        })
    }
}

/// A deferred write: its kind, target entity, and the identity it was
/// recorded under.
pub struct PendingAction {
    kind: ActionKind,
    identity: EntityIdentity,
    target: Box<dyn TrackedEntity>,
}

impl PendingAction {
    pub(crate) fn new(
        kind: ActionKind,
        identity: EntityIdentity,
        target: Box<dyn TrackedEntity>,
    ) -> Self {
        Self {
            kind,
            identity,
            target,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    pub(crate) fn target(&self) -> &dyn TrackedEntity {
        self.target.as_ref()
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.identity)
    }
}

/// Ordered list of pending actions for one session.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: VecDeque<PendingAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action at the back.
    pub(crate) fn push(&mut self, action: PendingAction) {
        tracing::trace!(action = %action, position = self.actions.len(), "Queued action");
        self.actions.push_back(action);
    }

    /// Take the oldest action.
    pub(crate) fn pop_front(&mut self) -> Option<PendingAction> {
        self.actions.pop_front()
    }

    /// Put an action that failed to execute back at the head of the queue.
    pub(crate) fn restore_front(&mut self, action: PendingAction) {
        self.actions.push_front(action);
    }

    /// Is any action pending for `identity`?
    pub fn has_pending(&self, identity: &EntityIdentity) -> bool {
        self.actions.iter().any(|a| &a.identity == identity)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &PendingAction> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Result of a flush operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushResult {
    /// Number of rows inserted.
    pub inserted: usize,
    /// Number of rows updated.
    pub updated: usize,
    /// Number of rows deleted.
    pub deleted: usize,
}

impl FlushResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Insert => self.inserted += 1,
            ActionKind::Update => self.updated += 1,
            ActionKind::Delete => self.deleted += 1,
        }
    }

    /// Total number of actions executed.
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}
