//! Session and Unit of Work for Rowkeep.
//!
//! `rowkeep-session` is the **unit-of-work layer**. A [`Session`] keeps one
//! live instance per (entity type, identifier), snapshots every instance it
//! starts tracking, and queues writes until [`Session::flush`] or
//! [`Session::close`] replays them through a [`StorageGateway`].
//!
//! # Role In The Architecture
//!
//! - **Identity map**: a second `find` for the same key returns the cached
//!   handle without touching storage.
//! - **Snapshot store**: field values captured on load/persist, refreshed
//!   after each successful update.
//! - **Action queue**: Insert/Update/Delete actions executed once, in call
//!   order, never regrouped by kind.
//! - **Dirty checking**: `close` diffs every tracked instance against its
//!   snapshot and queues writes for in-place mutations nobody reported.
//!
//! # Ownership
//!
//! All mutating operations take `&mut self`, so a session has exactly one
//! owner at a time. Share it across threads by wrapping it in a `Mutex`.
//!
//! # Example
//!
//! ```ignore
//! let mut session = factory.open_session();
//!
//! // Load (second call hits the identity map)
//! let person = session.find::<Person>(1_i64)?.unwrap();
//!
//! // Mutate in place; close() notices
//! person.write().last_name = "Lovelace".to_string();
//!
//! // New entity, INSERTed on flush
//! let new = EntityRef::new(Person { id: 2, first_name: "Ada".into(), last_name: "Byron".into() });
//! session.persist(&new)?;
//!
//! session.close()?;
//! ```

pub mod flush;
pub mod gateway;
pub mod identity_map;
pub mod snapshot;

pub use flush::{ActionKind, ActionQueue, FlushResult, PendingAction};
pub use gateway::{SqlGateway, StorageGateway};
pub use identity_map::{EntityIdentity, EntityRef, IdentityMap, SessionId};
pub use snapshot::{Snapshot, SnapshotStore};

use identity_map::TrackedEntity;
use rowkeep_core::error::NotPersistedError;
use rowkeep_core::{CodecRegistry, Entity, EntityMapping, Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Run the dirty-check sweep before the final flush in `close`.
    pub dirty_check_on_close: bool,
    /// Resolve each entity mapping once per session instead of per call.
    pub memoize_mappings: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dirty_check_on_close: true,
            memoize_mappings: true,
        }
    }
}

impl SessionConfig {
    pub fn dirty_check_on_close(mut self, enabled: bool) -> Self {
        self.dirty_check_on_close = enabled;
        self
    }

    pub fn memoize_mappings(mut self, enabled: bool) -> Self {
        self.memoize_mappings = enabled;
        self
    }
}

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Open,
    Closed,
}

// ============================================================================
// Session
// ============================================================================

/// A unit of work over one storage gateway.
pub struct Session<G: StorageGateway> {
    id: SessionId,
    gateway: G,
    config: SessionConfig,
    state: SessionState,
    identity_map: IdentityMap,
    snapshots: SnapshotStore,
    actions: ActionQueue,
    /// Resolved mappings by entity type.
    mappings: HashMap<TypeId, Arc<EntityMapping>>,
    /// Normalizes caller-supplied identifiers to the identifier's SQL type.
    codecs: CodecRegistry,
}

impl<G: StorageGateway> Session<G> {
    /// Open a session with the default configuration.
    pub fn new(gateway: G) -> Self {
        Self::with_config(gateway, SessionConfig::default())
    }

    pub fn with_config(gateway: G, config: SessionConfig) -> Self {
        let id = SessionId::next();
        tracing::debug!(session = %id, ?config, "Opened session");
        Self {
            id,
            gateway,
            config,
            state: SessionState::Open,
            identity_map: IdentityMap::new(),
            snapshots: SnapshotStore::new(),
            actions: ActionQueue::new(),
            mappings: HashMap::new(),
            codecs: CodecRegistry::default(),
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Is this exact instance tracked by the session?
    pub fn contains<E: Entity>(&self, entity: &EntityRef<E>) -> bool {
        self.tracked_identity(entity).is_some()
    }

    /// Number of instances in the identity map.
    pub fn tracked_count(&self) -> usize {
        self.identity_map.len()
    }

    /// Actions waiting for the next flush, oldest first.
    pub fn pending_actions(&self) -> impl ExactSizeIterator<Item = &PendingAction> {
        self.actions.iter()
    }

    /// Has a tracked instance changed since its snapshot? Untracked
    /// instances are never dirty.
    pub fn is_dirty<E: Entity>(&self, entity: &EntityRef<E>) -> bool {
        !self.dirty_fields(entity).is_empty()
    }

    /// Fields of a tracked instance that differ from its snapshot.
    pub fn dirty_fields<E: Entity>(&self, entity: &EntityRef<E>) -> Vec<&'static str> {
        let Some(identity) = self.tracked_identity(entity) else {
            return Vec::new();
        };
        let current = Snapshot::capture(entity.read().field_values());
        match self.snapshots.get(&identity) {
            Some(snapshot) => snapshot.changed_fields(&current),
            None => current.values().iter().map(|(name, _)| *name).collect(),
        }
    }

    // ========================================================================
    // Unit of work operations
    // ========================================================================

    /// Load an entity by identifier.
    ///
    /// A cached instance is returned without touching storage. Otherwise the
    /// gateway is asked for the row; a hit is tracked and snapshotted, a miss
    /// returns `None` and caches nothing.
    #[tracing::instrument(level = "debug", skip(self, id), fields(session = %self.id, entity = E::TYPE_NAME))]
    pub fn find<E: Entity>(&mut self, id: impl Into<Value>) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        let mapping = self.mapping::<E>()?;
        let id = self.normalize_id(&mapping, id.into())?;
        let identity = EntityIdentity::of::<E>(id);

        if let Some(cached) = self.identity_map.get::<E>(&identity) {
            tracing::trace!(identity = %identity, "Identity map hit");
            return Ok(Some(cached));
        }

        let Some(values) = self.gateway.select_entity(&mapping, identity.id())? else {
            tracing::debug!(identity = %identity, "No row found");
            return Ok(None);
        };
        let entity = E::from_fields(&values)?;

        // Track under the identifier the entity actually carries.
        let loaded_id = entity.identifier_value();
        let loaded_id = if loaded_id.is_null() {
            loaded_id
        } else {
            self.normalize_id(&mapping, loaded_id)?
        };
        let identity = if loaded_id.is_null() || &loaded_id == identity.id() {
            identity
        } else {
            let loaded = identity.with_id(loaded_id);
            if let Some(cached) = self.identity_map.get::<E>(&loaded) {
                return Ok(Some(cached));
            }
            loaded
        };

        let handle = EntityRef::new(entity);
        tracing::debug!(identity = %identity, "Loaded entity");
        self.register(identity, &handle);
        Ok(Some(handle))
    }

    /// Start tracking a new entity and queue its INSERT.
    ///
    /// Persisting an instance the session already tracks is a no-op.
    #[tracing::instrument(level = "debug", skip_all, fields(session = %self.id, entity = E::TYPE_NAME))]
    pub fn persist<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_open()?;
        if let Some(identity) = self.tracked_identity(entity) {
            tracing::trace!(identity = %identity, "Already tracked");
            return Ok(());
        }
        let mapping = self.mapping::<E>()?;

        let id = entity.read().identifier_value();
        let identity = EntityIdentity::of::<E>(self.normalize_id(&mapping, id)?);
        self.check_claimable(&identity)?;

        self.register(identity.clone(), entity);
        self.actions.push(PendingAction::new(
            ActionKind::Insert,
            identity,
            Box::new(entity.clone()),
        ));
        Ok(())
    }

    /// Queue the DELETE of a tracked entity.
    ///
    /// The instance stays visible through `find` until the flush that
    /// executes the delete.
    #[tracing::instrument(level = "debug", skip_all, fields(session = %self.id, entity = E::TYPE_NAME))]
    pub fn remove<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_open()?;
        let Some(identity) = self.tracked_identity(entity) else {
            let id = entity.read().identifier_value();
            return Err(Error::NotPersisted(NotPersistedError {
                entity: E::TYPE_NAME,
                identifier: (!id.is_null()).then_some(id),
            }));
        };

        self.actions.push(PendingAction::new(
            ActionKind::Delete,
            identity,
            Box::new(entity.clone()),
        ));
        Ok(())
    }

    /// Queue the UPDATE of a tracked entity, or persist an untracked one.
    #[tracing::instrument(level = "debug", skip_all, fields(session = %self.id, entity = E::TYPE_NAME))]
    pub fn update<E: Entity>(&mut self, entity: &EntityRef<E>) -> Result<()> {
        self.ensure_open()?;
        match self.tracked_identity(entity) {
            Some(identity) => {
                self.actions.push(PendingAction::new(
                    ActionKind::Update,
                    identity,
                    Box::new(entity.clone()),
                ));
                Ok(())
            }
            None => self.persist(entity),
        }
    }

    /// Execute every pending action in order.
    ///
    /// Stops at the first failing action: actions before it have reached
    /// storage, it and everything after it stay queued, and the session
    /// stays open.
    #[tracing::instrument(level = "debug", skip(self), fields(session = %self.id))]
    pub fn flush(&mut self) -> Result<FlushResult> {
        self.ensure_open()?;
        self.drain_actions()
    }

    /// Dirty-check every tracked instance, flush, and close the session.
    ///
    /// If the flush fails the session stays open with the failed actions
    /// queued. Closing a closed session does nothing.
    #[tracing::instrument(level = "debug", skip(self), fields(session = %self.id))]
    pub fn close(&mut self) -> Result<FlushResult> {
        if self.state == SessionState::Closed {
            return Ok(FlushResult::default());
        }
        if self.config.dirty_check_on_close {
            let queued = self.dirty_sweep()?;
            tracing::debug!(queued, "Dirty check complete");
        }
        let result = self.drain_actions()?;

        self.state = SessionState::Closed;
        for (_, target) in self.identity_map.drain() {
            target.set_registration(self.id, None);
        }
        self.snapshots.clear();
        self.mappings.clear();
        tracing::debug!("Session closed");
        Ok(result)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(Error::SessionClosed),
        }
    }

    fn mapping<E: Entity>(&mut self) -> Result<Arc<EntityMapping>> {
        self.mapping_for(TypeId::of::<E>(), EntityMapping::resolve::<E>)
    }

    fn mapping_for(
        &mut self,
        type_id: TypeId,
        resolve: impl FnOnce() -> Result<EntityMapping>,
    ) -> Result<Arc<EntityMapping>> {
        if let Some(mapping) = self.mappings.get(&type_id) {
            return Ok(Arc::clone(mapping));
        }
        let mapping = Arc::new(resolve()?);
        if self.config.memoize_mappings {
            self.mappings.insert(type_id, Arc::clone(&mapping));
        }
        Ok(mapping)
    }

    /// Identifier in the representation used for identity-map keys: the
    /// codec output for the identifier column's `SqlType`.
    fn normalize_id(&self, mapping: &EntityMapping, id: Value) -> Result<Value> {
        if id.is_null() {
            return Err(Error::invalid_argument(format!(
                "{} identifier must not be NULL",
                mapping.entity()
            )));
        }
        let column = mapping.identifier();
        self.codecs.decode(column.sql_type, &column.column, id)
    }

    fn tracked_identity<E: Entity>(&self, entity: &EntityRef<E>) -> Option<EntityIdentity> {
        let identity = entity.registration(self.id)?;
        self.identity_map
            .holds(&identity, entity)
            .then_some(identity)
    }

    /// Can a new instance be registered under `identity`?
    fn check_claimable(&self, identity: &EntityIdentity) -> Result<()> {
        if identity.id().is_null() {
            return Err(Error::invalid_argument(format!(
                "{} identifier must not be NULL",
                identity.entity()
            )));
        }
        if self.identity_map.contains(identity) {
            return Err(Error::invalid_argument(format!(
                "another instance of {identity} is already tracked by this session"
            )));
        }
        Ok(())
    }

    fn register(&mut self, identity: EntityIdentity, target: &dyn TrackedEntity) {
        target.set_registration(self.id, Some(identity.clone()));
        self.snapshots.capture(identity.clone(), target.field_values());
        self.identity_map.insert(identity, target.boxed_clone());
    }

    fn unregister(&mut self, identity: &EntityIdentity) {
        if let Some(target) = self.identity_map.remove(identity) {
            target.set_registration(self.id, None);
        }
        self.snapshots.remove(identity);
    }

    /// Queue writes for tracked instances that changed since their snapshot.
    ///
    /// Instances with an action already pending are skipped: that action
    /// writes their current values anyway.
    fn dirty_sweep(&mut self) -> Result<usize> {
        let candidates: Vec<(EntityIdentity, Box<dyn TrackedEntity>)> = self
            .identity_map
            .entries()
            .filter(|(identity, _)| !self.actions.has_pending(identity))
            .map(|(identity, target)| (identity.clone(), target.boxed_clone()))
            .collect();

        let mut queued = 0;
        for (identity, target) in candidates {
            let current = Snapshot::capture(target.field_values());
            if !self.snapshots.is_dirty(&identity, &current) {
                continue;
            }

            let mapping = self.mapping_for(target.entity_type(), || target.resolve_mapping())?;
            let current_id = self.normalize_id(&mapping, target.identifier_value())?;
            if &current_id == identity.id() {
                tracing::trace!(identity = %identity, "Dirty entity, queueing update");
                self.actions
                    .push(PendingAction::new(ActionKind::Update, identity, target));
            } else {
                // A new identifier means a new row; the old one is left alone.
                let fresh = identity.with_id(current_id);
                self.check_claimable(&fresh)?;
                tracing::debug!(from = %identity, to = %fresh, "Identifier changed, persisting afresh");
                self.unregister(&identity);
                self.register(fresh.clone(), &*target);
                self.actions
                    .push(PendingAction::new(ActionKind::Insert, fresh, target));
            }
            queued += 1;
        }
        Ok(queued)
    }

    fn drain_actions(&mut self) -> Result<FlushResult> {
        let mut result = FlushResult::new();
        if self.actions.is_empty() {
            return Ok(result);
        }

        while let Some(action) = self.actions.pop_front() {
            if let Err(err) = self.execute(&action) {
                tracing::warn!(
                    action = %action,
                    error = %err,
                    executed = result.total(),
                    remaining = self.actions.len() + 1,
                    "Flush aborted"
                );
                self.actions.restore_front(action);
                return Err(err);
            }
            result.record(action.kind());
        }

        tracing::info!(
            session = %self.id,
            inserted = result.inserted,
            updated = result.updated,
            deleted = result.deleted,
            "Flushed session"
        );
        Ok(result)
    }

    fn execute(&mut self, action: &PendingAction) -> Result<()> {
        let target = action.target();
        let identity = action.identity();
        let mapping = self.mapping_for(target.entity_type(), || target.resolve_mapping())?;
        let values = target.field_values();

        match action.kind() {
            ActionKind::Insert => self.gateway.save_entity(&mapping, &values)?,
            ActionKind::Update => {
                self.gateway
                    .update_entity(&mapping, &values, identity.id())?;
                if self.identity_map.holds(identity, target) {
                    self.snapshots.capture(identity.clone(), values);
                }
            }
            ActionKind::Delete => {
                self.gateway.delete_entity(&mapping, &values)?;
                if self.identity_map.holds(identity, target) {
                    self.unregister(identity);
                }
            }
        }
        Ok(())
    }
}

impl<G: StorageGateway> Drop for Session<G> {
    fn drop(&mut self) {
        if self.is_open() && !self.actions.is_empty() {
            tracing::warn!(
                session = %self.id,
                pending = self.actions.len(),
                "Session dropped with unflushed actions"
            );
        }
        for (_, target) in self.identity_map.drain() {
            target.set_registration(self.id, None);
        }
    }
}

impl<G: StorageGateway> std::fmt::Debug for Session<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("tracked", &self.identity_map.len())
            .field("pending", &self.actions.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rowkeep_core::{FieldInfo, FieldValues, SqlType, StorageErrorKind};
    use std::sync::Mutex;

    // ========================================================================
    // Fixtures
    // ========================================================================

    #[derive(Debug, Clone, PartialEq)]
    struct Person {
        id: i64,
        first_name: String,
        last_name: String,
    }

    impl Entity for Person {
        const TYPE_NAME: &'static str = "Person";

        fn fields() -> &'static [FieldInfo] {
            const FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", SqlType::BigInt).identifier(true),
                FieldInfo::new("first_name", SqlType::Text),
                FieldInfo::new("last_name", SqlType::Text),
            ];
            FIELDS
        }

        fn field_values(&self) -> FieldValues {
            FieldValues::new()
                .with("id", self.id)
                .with("first_name", self.first_name.clone())
                .with("last_name", self.last_name.clone())
        }

        fn from_fields(values: &FieldValues) -> Result<Self> {
            Ok(Self {
                id: values.get_as("Person", "id")?,
                first_name: values.get_as("Person", "first_name")?,
                last_name: values.get_as("Person", "last_name")?,
            })
        }
    }

    #[derive(Debug)]
    struct Note {
        id: Option<i64>,
    }

    impl Entity for Note {
        const TYPE_NAME: &'static str = "Note";

        fn fields() -> &'static [FieldInfo] {
            const FIELDS: &[FieldInfo] =
                &[FieldInfo::new("id", SqlType::BigInt).identifier(true).nullable(true)];
            FIELDS
        }

        fn field_values(&self) -> FieldValues {
            FieldValues::new().with("id", self.id)
        }

        fn from_fields(values: &FieldValues) -> Result<Self> {
            Ok(Self {
                id: values.get_as("Note", "id")?,
            })
        }
    }

    #[derive(Debug)]
    struct Keyless;

    impl Entity for Keyless {
        const TYPE_NAME: &'static str = "Keyless";

        fn fields() -> &'static [FieldInfo] {
            const FIELDS: &[FieldInfo] = &[FieldInfo::new("name", SqlType::Text)];
            FIELDS
        }

        fn field_values(&self) -> FieldValues {
            FieldValues::new().with("name", "x")
        }

        fn from_fields(_values: &FieldValues) -> Result<Self> {
            Ok(Self)
        }
    }

    /// Rust field wider than the declared identifier type.
    #[derive(Debug)]
    struct Wide {
        id: i64,
        label: String,
    }

    impl Entity for Wide {
        const TYPE_NAME: &'static str = "Wide";

        fn fields() -> &'static [FieldInfo] {
            const FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", SqlType::Integer).identifier(true),
                FieldInfo::new("label", SqlType::Text),
            ];
            FIELDS
        }

        fn field_values(&self) -> FieldValues {
            FieldValues::new()
                .with("id", self.id)
                .with("label", self.label.clone())
        }

        fn from_fields(values: &FieldValues) -> Result<Self> {
            Ok(Self {
                id: values.get_as("Wide", "id")?,
                label: values.get_as("Wide", "label")?,
            })
        }
    }

    fn person(id: i64, first: &str, last: &str) -> Person {
        Person {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    #[derive(Default)]
    struct MockState {
        rows: HashMap<(String, Value), FieldValues>,
        log: Vec<String>,
        selects: usize,
        fail_on: Option<ActionKind>,
    }

    /// In-memory gateway keyed by (table, identifier).
    #[derive(Clone, Default)]
    struct MockGateway {
        state: Arc<Mutex<MockState>>,
    }

    impl MockGateway {
        fn seeded(rows: &[Person]) -> Self {
            let gateway = Self::default();
            {
                let mut state = gateway.state.lock().unwrap();
                for p in rows {
                    state
                        .rows
                        .insert(("person".to_string(), Value::BigInt(p.id)), p.field_values());
                }
            }
            gateway
        }

        fn row(&self, id: i64) -> Option<Person> {
            let state = self.state.lock().unwrap();
            state
                .rows
                .get(&("person".to_string(), Value::BigInt(id)))
                .map(|values| Person::from_fields(values).unwrap())
        }

        fn log(&self) -> Vec<String> {
            self.state.lock().unwrap().log.clone()
        }

        fn selects(&self) -> usize {
            self.state.lock().unwrap().selects
        }

        fn fail_on(&self, kind: Option<ActionKind>) {
            self.state.lock().unwrap().fail_on = kind;
        }

        fn write(&self, kind: ActionKind, mapping: &EntityMapping, id: &Value) -> Result<MutexGuardState<'_>> {
            let mut state = self.state.lock().unwrap();
            if state.fail_on == Some(kind) {
                return Err(Error::storage(StorageErrorKind::Database, "injected failure"));
            }
            state.log.push(format!("{kind} {}({id})", mapping.table()));
            Ok(state)
        }
    }

    type MutexGuardState<'a> = std::sync::MutexGuard<'a, MockState>;

    fn id_of(mapping: &EntityMapping, values: &FieldValues) -> Value {
        values.get(mapping.identifier().field).cloned().unwrap()
    }

    impl StorageGateway for MockGateway {
        fn select_entity(&self, mapping: &EntityMapping, id: &Value) -> Result<Option<FieldValues>> {
            let mut state = self.state.lock().unwrap();
            state.selects += 1;
            Ok(state
                .rows
                .get(&(mapping.table().to_string(), id.clone()))
                .cloned())
        }

        fn save_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
            let id = id_of(mapping, values);
            let mut state = self.write(ActionKind::Insert, mapping, &id)?;
            state
                .rows
                .insert((mapping.table().to_string(), id), values.clone());
            Ok(())
        }

        fn update_entity(&self, mapping: &EntityMapping, values: &FieldValues, id: &Value) -> Result<()> {
            let mut state = self.write(ActionKind::Update, mapping, id)?;
            let key = (mapping.table().to_string(), id.clone());
            if state.rows.contains_key(&key) {
                state.rows.insert(key, values.clone());
            }
            Ok(())
        }

        fn delete_entity(&self, mapping: &EntityMapping, values: &FieldValues) -> Result<()> {
            let id = id_of(mapping, values);
            let mut state = self.write(ActionKind::Delete, mapping, &id)?;
            state.rows.remove(&(mapping.table().to_string(), id));
            Ok(())
        }
    }

    fn session_with(rows: &[Person]) -> (Session<MockGateway>, MockGateway) {
        let gateway = MockGateway::seeded(rows);
        (Session::new(gateway.clone()), gateway)
    }

    fn kinds<G: StorageGateway>(session: &Session<G>) -> Vec<ActionKind> {
        session.pending_actions().map(PendingAction::kind).collect()
    }

    // ========================================================================
    // find
    // ========================================================================

    #[test]
    fn find_twice_returns_same_instance_with_one_read() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);

        let first = session.find::<Person>(1_i64).unwrap().unwrap();
        let second = session.find::<Person>(1_i64).unwrap().unwrap();

        assert!(EntityRef::ptr_eq(&first, &second));
        assert_eq!(gateway.selects(), 1);
        assert_eq!(first.read().first_name, "Ada");
        assert!(session.contains(&first));
        assert_eq!(session.tracked_count(), 1);
    }

    #[test]
    fn find_normalizes_identifier_type() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);

        let by_i32 = session.find::<Person>(1).unwrap().unwrap();
        let by_i64 = session.find::<Person>(1_i64).unwrap().unwrap();
        let by_text = session.find::<Person>("1").unwrap().unwrap();

        assert!(EntityRef::ptr_eq(&by_i32, &by_i64));
        assert!(EntityRef::ptr_eq(&by_i32, &by_text));
        assert_eq!(gateway.selects(), 1);
    }

    #[test]
    fn find_miss_caches_nothing() {
        let (mut session, gateway) = session_with(&[]);

        assert!(session.find::<Person>(9_i64).unwrap().is_none());
        assert!(session.find::<Person>(9_i64).unwrap().is_none());
        assert_eq!(gateway.selects(), 2);
        assert_eq!(session.tracked_count(), 0);
    }

    #[test]
    fn find_null_identifier_is_invalid() {
        let (mut session, _gateway) = session_with(&[]);
        let err = session.find::<Person>(Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn find_unmappable_type_is_mapping_error() {
        let (mut session, _gateway) = session_with(&[]);
        let err = session.find::<Keyless>(1_i64).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    // ========================================================================
    // persist
    // ========================================================================

    #[test]
    fn persist_then_flush_inserts() {
        let (mut session, gateway) = session_with(&[]);
        let ada = EntityRef::new(person(2, "Ada", "Lovelace"));

        session.persist(&ada).unwrap();
        assert_eq!(kinds(&session), vec![ActionKind::Insert]);
        assert!(gateway.row(2).is_none());

        let result = session.flush().unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(gateway.row(2), Some(person(2, "Ada", "Lovelace")));

        let found = session.find::<Person>(2_i64).unwrap().unwrap();
        assert!(EntityRef::ptr_eq(&found, &ada));
        assert_eq!(gateway.selects(), 0);
    }

    #[test]
    fn persist_tracked_instance_is_noop() {
        let (mut session, _gateway) = session_with(&[]);
        let ada = EntityRef::new(person(2, "Ada", "Lovelace"));

        session.persist(&ada).unwrap();
        session.persist(&ada.clone()).unwrap();
        assert_eq!(session.pending_actions().len(), 1);
    }

    #[test]
    fn persist_second_instance_with_same_identity_is_rejected() {
        let (mut session, _gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let _loaded = session.find::<Person>(1_i64).unwrap().unwrap();

        let impostor = EntityRef::new(person(1, "Eve", "Impostor"));
        let err = session.persist(&impostor).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!session.contains(&impostor));
    }

    #[test]
    fn persist_null_identifier_is_rejected() {
        let (mut session, _gateway) = session_with(&[]);
        let note = EntityRef::new(Note { id: None });
        let err = session.persist(&note).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(session.pending_actions().len(), 0);
    }

    #[test]
    fn persisted_entity_found_when_field_type_differs_from_sql_type() {
        let (mut session, gateway) = session_with(&[]);
        let wide = EntityRef::new(Wide {
            id: 5,
            label: "five".to_string(),
        });

        session.persist(&wide).unwrap();
        let before_flush = session.find::<Wide>(5_i64).unwrap().unwrap();
        assert!(EntityRef::ptr_eq(&before_flush, &wide));

        session.flush().unwrap();
        let after_flush = session.find::<Wide>(5).unwrap().unwrap();
        assert!(EntityRef::ptr_eq(&after_flush, &wide));
        assert_eq!(gateway.selects(), 0);
    }

    #[test]
    fn dirty_sweep_keys_wide_identifier_like_find() {
        let (mut session, gateway) = session_with(&[]);
        let wide = EntityRef::new(Wide {
            id: 5,
            label: "five".to_string(),
        });
        session.persist(&wide).unwrap();
        session.flush().unwrap();

        wide.write().label = "cinq".to_string();
        let result = session.close().unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.inserted, 0);
        assert_eq!(gateway.log(), vec!["insert wide(5)", "update wide(5)"]);
    }

    // ========================================================================
    // remove / update
    // ========================================================================

    #[test]
    fn remove_untracked_is_not_persisted() {
        let (mut session, _gateway) = session_with(&[]);
        let stranger = EntityRef::new(person(5, "No", "Body"));

        let err = session.remove(&stranger).unwrap_err();
        match err {
            Error::NotPersisted(e) => {
                assert_eq!(e.entity, "Person");
                assert_eq!(e.identifier, Some(Value::BigInt(5)));
            }
            other => panic!("expected NotPersisted, got {other:?}"),
        }
    }

    #[test]
    fn removed_entity_stays_visible_until_flush() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();

        session.remove(&ada).unwrap();
        let still = session.find::<Person>(1_i64).unwrap().unwrap();
        assert!(EntityRef::ptr_eq(&still, &ada));

        let result = session.flush().unwrap();
        assert_eq!(result.deleted, 1);
        assert!(!session.contains(&ada));
        assert_eq!(session.tracked_count(), 0);
        assert!(session.find::<Person>(1_i64).unwrap().is_none());
        assert!(gateway.row(1).is_none());
    }

    #[test]
    fn update_untracked_persists() {
        let (mut session, _gateway) = session_with(&[]);
        let denys = EntityRef::new(person(2, "Denys", "Shelupets"));

        session.update(&denys).unwrap();
        assert_eq!(kinds(&session), vec![ActionKind::Insert]);
        assert!(session.contains(&denys));
    }

    #[test]
    fn update_then_remove_nets_to_absence() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let denys = EntityRef::new(person(2, "Denys", "Shelupets"));

        session.update(&denys).unwrap();
        session.remove(&denys).unwrap();
        session.flush().unwrap();

        assert_eq!(gateway.log(), vec!["insert person(2)", "delete person(2)"]);
        assert!(session.find::<Person>(2_i64).unwrap().is_none());
        assert!(gateway.row(2).is_none());
        assert!(gateway.row(1).is_some());
    }

    #[test]
    fn update_refreshes_snapshot_after_flush() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();

        ada.write().last_name = "Byron".to_string();
        assert!(session.is_dirty(&ada));
        assert_eq!(session.dirty_fields(&ada), vec!["last_name"]);

        session.update(&ada).unwrap();
        assert_eq!(kinds(&session), vec![ActionKind::Update]);
        session.flush().unwrap();

        assert!(!session.is_dirty(&ada));
        assert_eq!(gateway.row(1).unwrap().last_name, "Byron");
    }

    #[test]
    fn actions_replay_in_call_order() {
        let (mut session, gateway) =
            session_with(&[person(1, "Ada", "Lovelace"), person(3, "Alan", "Turing")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        let alan = session.find::<Person>(3_i64).unwrap().unwrap();
        let grace = EntityRef::new(person(4, "Grace", "Hopper"));

        session.remove(&ada).unwrap();
        session.persist(&grace).unwrap();
        session.update(&alan).unwrap();
        let result = session.flush().unwrap();

        assert_eq!(
            gateway.log(),
            vec!["delete person(1)", "insert person(4)", "update person(3)"]
        );
        assert_eq!(result.total(), 3);
        assert_eq!(session.pending_actions().len(), 0);
    }

    // ========================================================================
    // flush failures
    // ========================================================================

    #[test]
    fn failed_flush_keeps_remaining_actions() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        let grace = EntityRef::new(person(4, "Grace", "Hopper"));
        let alan = EntityRef::new(person(3, "Alan", "Turing"));

        session.persist(&grace).unwrap();
        session.update(&ada).unwrap();
        session.persist(&alan).unwrap();

        gateway.fail_on(Some(ActionKind::Update));
        let err = session.flush().unwrap_err();
        assert!(err.is_storage_fault());
        assert!(session.is_open());

        // The insert before the failure went through; the failed update and
        // everything after it stay queued.
        assert!(gateway.row(4).is_some());
        assert_eq!(kinds(&session), vec![ActionKind::Update, ActionKind::Insert]);

        gateway.fail_on(None);
        let result = session.flush().unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.inserted, 1);
        assert!(gateway.row(3).is_some());
    }

    #[test]
    fn failed_close_leaves_session_open() {
        let (mut session, gateway) = session_with(&[]);
        let grace = EntityRef::new(person(4, "Grace", "Hopper"));
        session.persist(&grace).unwrap();

        gateway.fail_on(Some(ActionKind::Insert));
        assert!(session.close().is_err());
        assert!(session.is_open());
        assert_eq!(session.pending_actions().len(), 1);

        gateway.fail_on(None);
        let result = session.close().unwrap();
        assert_eq!(result.inserted, 1);
        assert!(!session.is_open());
    }

    // ========================================================================
    // close and dirty checking
    // ========================================================================

    #[test]
    fn close_writes_back_in_place_mutations() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        ada.write().first_name = "Augusta".to_string();

        let result = session.close().unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(gateway.row(1).unwrap().first_name, "Augusta");
    }

    #[test]
    fn close_skips_clean_entities() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let _ada = session.find::<Person>(1_i64).unwrap().unwrap();

        let result = session.close().unwrap();
        assert_eq!(result.total(), 0);
        assert!(gateway.log().is_empty());
    }

    #[test]
    fn close_without_dirty_check_ignores_mutations() {
        let gateway = MockGateway::seeded(&[person(1, "Ada", "Lovelace")]);
        let mut session = Session::with_config(
            gateway.clone(),
            SessionConfig::default().dirty_check_on_close(false),
        );
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        ada.write().first_name = "Augusta".to_string();

        session.close().unwrap();
        assert_eq!(gateway.row(1).unwrap().first_name, "Ada");
    }

    #[test]
    fn dirty_entity_with_pending_action_is_not_queued_twice() {
        let (mut session, gateway) = session_with(&[]);
        let grace = EntityRef::new(person(4, "Grace", "Hopper"));
        session.persist(&grace).unwrap();
        grace.write().last_name = "Murray".to_string();

        let result = session.close().unwrap();
        assert_eq!(result.total(), 1);
        assert_eq!(gateway.row(4).unwrap().last_name, "Murray");
    }

    #[test]
    fn changed_identifier_is_persisted_afresh() {
        let (mut session, gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        ada.write().id = 7;

        let result = session.close().unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(gateway.log(), vec!["insert person(7)"]);
        assert_eq!(gateway.row(7).unwrap().first_name, "Ada");
        assert!(gateway.row(1).is_some());
    }

    #[test]
    fn operations_after_close_fail() {
        let (mut session, _gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        session.close().unwrap();

        assert!(!session.contains(&ada));
        assert!(matches!(
            session.find::<Person>(1_i64),
            Err(Error::SessionClosed)
        ));
        assert!(matches!(session.persist(&ada), Err(Error::SessionClosed)));
        assert!(matches!(session.update(&ada), Err(Error::SessionClosed)));
        assert!(matches!(session.remove(&ada), Err(Error::SessionClosed)));
        assert!(matches!(session.flush(), Err(Error::SessionClosed)));

        // Closing again is harmless.
        assert_eq!(session.close().unwrap(), FlushResult::default());
        assert_eq!(session.state(), SessionState::Closed);
    }

    // ========================================================================
    // Handles shared between sessions
    // ========================================================================

    #[test]
    fn tracking_is_per_session() {
        let gateway = MockGateway::seeded(&[person(1, "Ada", "Lovelace")]);
        let mut first = Session::new(gateway.clone());
        let mut second = Session::new(gateway.clone());

        let ada = first.find::<Person>(1_i64).unwrap().unwrap();
        assert!(first.contains(&ada));
        assert!(!second.contains(&ada));
        assert!(second.remove(&ada).is_err());

        let other = second.find::<Person>(1_i64).unwrap().unwrap();
        assert!(!EntityRef::ptr_eq(&ada, &other));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn dropping_a_session_releases_its_handles() {
        let (mut session, _gateway) = session_with(&[person(1, "Ada", "Lovelace")]);
        let ada = session.find::<Person>(1_i64).unwrap().unwrap();
        let id = session.id();
        assert!(ada.registration(id).is_some());

        drop(session);
        assert!(ada.registration(id).is_none());
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[test]
    fn mappings_can_be_resolved_per_call() {
        let gateway = MockGateway::seeded(&[person(1, "Ada", "Lovelace")]);
        let mut session = Session::with_config(
            gateway,
            SessionConfig::default().memoize_mappings(false),
        );
        assert!(session.find::<Person>(1_i64).unwrap().is_some());
        assert!(session.mappings.is_empty());
    }

    #[test]
    fn session_config_serde_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert!(config.dirty_check_on_close);
        assert!(config.memoize_mappings);

        let config: SessionConfig =
            serde_json::from_str(r#"{"dirty_check_on_close": false}"#).unwrap();
        assert!(!config.dirty_check_on_close);
        assert!(config.memoize_mappings);
    }
}
