//! # Object Registry
//!
//! Per-process bidirectional map between local object handles and the ids a
//! peer knows those objects by.
//!
//! The simulator's registry is the canonical id authority and hands out even
//! ids. Every other registry hands out odd temporary ids for objects created
//! before the simulator has heard of them, and later rewrites them once the
//! canonical id comes back in a registration message.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use log::{debug, warn};

use crate::constants::ids;
use crate::error::SyncError;
use crate::types::*;

/// Whether a registry allocates canonical or temporary ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRole {
    /// Allocates canonical (even) ids
    Authority,

    /// Allocates temporary (odd) ids
    Peer,
}

/// Bidirectional id <-> handle map.
///
/// The two directions are always mutual inverses and an id is bound at
/// most once.
#[derive(Debug, Clone)]
pub struct ObjectRegistry<H> {
    role: IdRole,
    by_id: HashMap<ObjectId, H>,
    by_object: HashMap<H, ObjectId>,
    next_temporary: ObjectId,
    next_canonical: ObjectId,

    /// Canonical ids handed out and not bound to an object yet
    unclaimed: HashSet<ObjectId>,
}

impl<H: Copy + Eq + Hash + Debug> ObjectRegistry<H> {
    pub fn new(role: IdRole) -> Self {
        Self {
            role,
            by_id: HashMap::new(),
            by_object: HashMap::new(),
            next_temporary: ids::FIRST_TEMPORARY_ID,
            next_canonical: ids::FIRST_CANONICAL_ID,
            unclaimed: HashSet::new(),
        }
    }

    /// Registry owned by the canonical id authority
    pub fn new_authority() -> Self {
        Self::new(IdRole::Authority)
    }

    /// Registry of a process that allocates temporary ids
    pub fn new_peer() -> Self {
        Self::new(IdRole::Peer)
    }

    pub fn role(&self) -> IdRole {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == IdRole::Authority
    }

    /// Bind `id` to `object`.
    ///
    /// Registering the same pair twice is a no-op. Fails if the id is bound
    /// to a different object or the object to a different id.
    pub fn register(&mut self, object: H, id: ObjectId) -> Result<(), SyncError> {
        if id == NULL_OBJECT_ID {
            return Err(SyncError::InvalidOperation("can't register the null id".to_string()));
        }

        match (self.by_id.get(&id), self.by_object.get(&object)) {
            (Some(existing), _) if *existing == object => return Ok(()),
            (Some(existing), _) => {
                warn!("Id {} already registered to {:?}, refusing {:?}", id, existing, object);
                return Err(SyncError::DuplicateRegistration { id });
            }
            (None, Some(existing_id)) => {
                warn!("Object {:?} already registered as {}, refusing id {}", object, existing_id, id);
                return Err(SyncError::DuplicateRegistration { id });
            }
            (None, None) => {}
        }

        self.by_id.insert(id, object);
        self.by_object.insert(object, id);
        Ok(())
    }

    /// Resolve an id to a local object
    pub fn lookup(&self, id: ObjectId) -> Option<H> {
        self.by_id.get(&id).copied()
    }

    /// Resolve an id, failing with `UnresolvedId`
    pub fn resolve(&self, id: ObjectId) -> Result<H, SyncError> {
        self.lookup(id).ok_or(SyncError::UnresolvedId(id))
    }

    /// The id a local object is known by
    pub fn id_of(&self, object: &H) -> Option<ObjectId> {
        self.by_object.get(object).copied()
    }

    pub fn contains_id(&self, id: ObjectId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Remove both directions of the binding for `id`
    pub fn unregister(&mut self, id: ObjectId) -> Option<H> {
        let object = self.by_id.remove(&id)?;
        self.by_object.remove(&object);
        Some(object)
    }

    /// Remove both directions of the binding for `object`
    pub fn unregister_object(&mut self, object: &H) -> Option<ObjectId> {
        let id = self.by_object.remove(object)?;
        self.by_id.remove(&id);
        Some(id)
    }

    /// Reserve a temporary id for an object that doesn't exist yet
    pub fn reserve_temporary_id(&mut self) -> Result<ObjectId, SyncError> {
        if self.is_authority() {
            return Err(SyncError::InvalidOperation(
                "the id authority allocates canonical ids, not temporary ones".to_string(),
            ));
        }

        let id = self.next_temporary;
        self.next_temporary += ids::ID_STRIDE;
        Ok(id)
    }

    /// Allocate a temporary id and bind it to `object`
    pub fn allocate_temporary_id(&mut self, object: H) -> Result<ObjectId, SyncError> {
        let id = self.reserve_temporary_id()?;
        self.register(object, id)?;
        Ok(id)
    }

    /// Allocate a fresh canonical id. Canonical ids are never reused.
    pub fn allocate_canonical_id(&mut self) -> Result<ObjectId, SyncError> {
        if !self.is_authority() {
            return Err(SyncError::NotAuthority);
        }

        let id = self.next_canonical;
        self.next_canonical += ids::ID_STRIDE;
        self.unclaimed.insert(id);
        Ok(id)
    }

    /// Take a canonical id from [`Self::allocate_canonical_id`] for an
    /// object about to be bound to it. Each id can be claimed once; ids this
    /// registry never handed out can't be claimed at all.
    pub fn claim_canonical_id(&mut self, id: ObjectId) -> bool {
        self.unclaimed.remove(&id)
    }

    /// Replace a temporary id with its canonical id in one step.
    ///
    /// Both directions are updated before returning, so the temporary and
    /// canonical ids are never bound at the same time.
    pub fn rewrite_temporary(&mut self, temporary: ObjectId, canonical: ObjectId) -> Result<H, SyncError> {
        if !is_canonical_id(canonical) {
            return Err(SyncError::InvalidOperation(format!(
                "{} is not a canonical id",
                canonical
            )));
        }

        let object = self.resolve(temporary)?;
        if let Some(existing) = self.by_id.get(&canonical) {
            if *existing != object {
                warn!("Can't rewrite {} -> {}: canonical id already bound to {:?}", temporary, canonical, existing);
                return Err(SyncError::DuplicateRegistration { id: canonical });
            }
        }

        self.by_id.remove(&temporary);
        self.by_id.insert(canonical, object);
        self.by_object.insert(object, canonical);

        debug!("Rewrote temporary id {} to canonical id {}", temporary, canonical);
        Ok(object)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every (id, object) binding
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, H)> + '_ {
        self.by_id.iter().map(|(id, object)| (*id, *object))
    }

    /// Drop every binding. Id counters keep running so ids are never reused.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_object.clear();
    }
}
