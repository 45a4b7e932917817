//! Identity Map: one live instance per (entity type, identifier) per session.
//!
//! Tracked entities are handed out as [`EntityRef`] handles. A handle is an
//! `Arc` around the entity (behind a `RwLock`) plus the identity each session
//! registered it under, so "is this handle tracked?" is a single hash lookup
//! instead of a scan over cached values.
//!
//! # Example
//!
//! ```ignore
//! let first = session.find::<Person>(1_i64)?.unwrap();
//! let second = session.find::<Person>(1_i64)?.unwrap();
//!
//! // Both handles point to the same instance
//! assert!(EntityRef::ptr_eq(&first, &second));
//!
//! // Modifications are visible through both handles
//! first.write().first_name = "Changed".to_string();
//! assert_eq!(second.read().first_name, "Changed");
//! ```

use rowkeep_core::{Entity, EntityMapping, FieldValues, Result, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// Identity
// ============================================================================

/// The key of the identity map and the snapshot store: entity type plus
/// identifier value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityIdentity {
    type_id: TypeId,
    entity: &'static str,
    id: Value,
}

impl EntityIdentity {
    /// Identity of an `E` with identifier `id`.
    pub fn of<E: Entity>(id: impl Into<Value>) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            entity: E::TYPE_NAME,
            id: id.into(),
        }
    }

    /// Same entity type, different identifier.
    pub fn with_id(&self, id: Value) -> Self {
        Self {
            type_id: self.type_id,
            entity: self.entity,
            id,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the entity.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn id(&self) -> &Value {
        &self.id
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity, self.id)
    }
}

/// Process-unique session number, used to tell registrations apart when a
/// handle is shared between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Handles
// ============================================================================

struct Tracked<E> {
    value: RwLock<E>,
    registrations: Mutex<HashMap<SessionId, EntityIdentity>>,
}

/// Shared handle to an entity instance.
///
/// Clones of a handle point to the same instance. Build a handle for a new
/// entity with [`EntityRef::new`] and hand it to `Session::persist`; handles
/// returned by `Session::find` are already tracked.
///
/// Read and write guards must not be held across session calls: the session
/// reads the entity's fields itself.
pub struct EntityRef<E> {
    inner: Arc<Tracked<E>>,
}

impl<E: Entity> EntityRef<E> {
    /// Wrap an entity in a fresh, untracked handle.
    pub fn new(entity: E) -> Self {
        Self {
            inner: Arc::new(Tracked {
                value: RwLock::new(entity),
                registrations: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Borrow the entity for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, E> {
        self.inner.value.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Borrow the entity for in-place mutation.
    pub fn write(&self) -> RwLockWriteGuard<'_, E> {
        self.inner.value.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Do both handles point to the same instance?
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The identity `session` has registered this handle under, if any.
    pub(crate) fn registration(&self, session: SessionId) -> Option<EntityIdentity> {
        self.inner
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session)
            .cloned()
    }
}

impl<E> Clone for EntityRef<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for EntityRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&*self.read()).finish()
    }
}

/// Type-erased view of an [`EntityRef`], so one map can hold every entity type.
pub(crate) trait TrackedEntity: Send + Sync {
    fn entity_type(&self) -> TypeId;
    fn entity_name(&self) -> &'static str;
    fn resolve_mapping(&self) -> Result<EntityMapping>;
    fn field_values(&self) -> FieldValues;
    fn identifier_value(&self) -> Value;
    /// Address of the shared instance; equal for clones of one handle.
    fn addr(&self) -> *const ();
    fn set_registration(&self, session: SessionId, identity: Option<EntityIdentity>);
    fn as_any(&self) -> &dyn Any;
    fn boxed_clone(&self) -> Box<dyn TrackedEntity>;
}

impl<E: Entity> TrackedEntity for EntityRef<E> {
    fn entity_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn entity_name(&self) -> &'static str {
        E::TYPE_NAME
    }

    fn resolve_mapping(&self) -> Result<EntityMapping> {
        EntityMapping::resolve::<E>()
    }

    fn field_values(&self) -> FieldValues {
        self.read().field_values()
    }

    fn identifier_value(&self) -> Value {
        self.read().identifier_value()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.inner).cast()
    }

    fn set_registration(&self, session: SessionId, identity: Option<EntityIdentity>) {
        let mut registrations = self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match identity {
            Some(identity) => {
                registrations.insert(session, identity);
            }
            None => {
                registrations.remove(&session);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn boxed_clone(&self) -> Box<dyn TrackedEntity> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Identity Map
// ============================================================================

/// Map from [`EntityIdentity`] to the live instance registered under it.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<EntityIdentity, Box<dyn TrackedEntity>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle registered under `identity`, if it is an `E`.
    pub fn get<E: Entity>(&self, identity: &EntityIdentity) -> Option<EntityRef<E>> {
        self.entries
            .get(identity)?
            .as_any()
            .downcast_ref::<EntityRef<E>>()
            .cloned()
    }

    pub fn contains(&self, identity: &EntityIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Is `target` the instance registered under `identity`?
    pub(crate) fn holds(&self, identity: &EntityIdentity, target: &dyn TrackedEntity) -> bool {
        self.entries
            .get(identity)
            .is_some_and(|entry| entry.addr() == target.addr())
    }

    pub(crate) fn insert(&mut self, identity: EntityIdentity, target: Box<dyn TrackedEntity>) {
        self.entries.insert(identity, target);
    }

    pub(crate) fn remove(&mut self, identity: &EntityIdentity) -> Option<Box<dyn TrackedEntity>> {
        self.entries.remove(identity)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&EntityIdentity, &dyn TrackedEntity)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (EntityIdentity, Box<dyn TrackedEntity>)> + '_ {
        self.entries.drain()
    }

    pub fn identities(&self) -> impl Iterator<Item = &EntityIdentity> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
