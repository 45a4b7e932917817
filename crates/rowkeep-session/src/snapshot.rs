//! Snapshot Store: field values captured when an entity enters the session.
//!
//! A snapshot keeps one value per declared field, sorted by field name, so
//! two snapshots of the same type line up position by position. Dirty
//! checking compares a fresh snapshot of the live instance against the stored
//! one.

use crate::identity_map::EntityIdentity;
use rowkeep_core::{FieldValues, Value};
use std::collections::HashMap;

/// Field values of one entity, ordered by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: Vec<(&'static str, Value)>,
}

impl Snapshot {
    /// Capture `values` in field-name order.
    pub fn capture(values: FieldValues) -> Self {
        let mut values: Vec<_> = values.into_iter().collect();
        values.sort_by(|a, b| a.0.cmp(b.0));
        Self { values }
    }

    pub fn values(&self) -> &[(&'static str, Value)] {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .binary_search_by(|(name, _)| (*name).cmp(field))
            .ok()
            .map(|i| &self.values[i].1)
    }

    /// Fields whose value differs between `self` and `current`.
    ///
    /// Both snapshots must come from the same entity type; when the field
    /// lists do not line up every field of `current` is reported.
    pub fn changed_fields(&self, current: &Snapshot) -> Vec<&'static str> {
        let aligned = self.values.len() == current.values.len()
            && self
                .values
                .iter()
                .zip(&current.values)
                .all(|((a, _), (b, _))| a == b);
        if !aligned {
            return current.values.iter().map(|(name, _)| *name).collect();
        }

        self.values
            .iter()
            .zip(&current.values)
            .filter(|((_, old), (_, new))| old != new)
            .map(|((name, _), _)| *name)
            .collect()
    }

    pub fn differs_from(&self, current: &Snapshot) -> bool {
        self != current
    }
}

/// Snapshots of every tracked entity, keyed by identity.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<EntityIdentity, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the snapshot for `identity`.
    #[tracing::instrument(level = "trace", skip(self, values), fields(identity = %identity))]
    pub fn capture(&mut self, identity: EntityIdentity, values: FieldValues) {
        let snapshot = Snapshot::capture(values);
        tracing::trace!(fields = snapshot.values.len(), "Taking entity snapshot");
        self.snapshots.insert(identity, snapshot);
    }

    pub fn get(&self, identity: &EntityIdentity) -> Option<&Snapshot> {
        self.snapshots.get(identity)
    }

    pub fn remove(&mut self, identity: &EntityIdentity) -> Option<Snapshot> {
        self.snapshots.remove(identity)
    }

    pub fn contains(&self, identity: &EntityIdentity) -> bool {
        self.snapshots.contains_key(identity)
    }

    /// Has the entity changed since its snapshot?
    ///
    /// An identity without a snapshot counts as dirty.
    pub fn is_dirty(&self, identity: &EntityIdentity, current: &Snapshot) -> bool {
        let Some(snapshot) = self.snapshots.get(identity) else {
            tracing::trace!(identity = %identity, "No snapshot - treating as dirty");
            return true;
        };
        let dirty = snapshot.differs_from(current);
        tracing::trace!(identity = %identity, dirty, "Dirty check result");
        dirty
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
