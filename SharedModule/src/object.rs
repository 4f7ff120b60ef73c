//! # Shared Object System
//!
//! Local object handles plus the id-referencing descriptions of objects that
//! travel inside operations.

use serde::{Serialize, Deserialize};
use crate::property::PropertyValue;
use crate::types::*;

/// Process-local handle to a scene object.
///
/// Handles are generational: once a slot is released and reused, handles to
/// the old occupant no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack the handle into the non-zero u64 used for local object references
    /// held in property values. Zero stays free for "no object".
    pub fn to_raw(&self) -> u64 {
        (((self.generation as u64) << 32) | self.index as u64) + 1
    }

    /// Unpack a handle packed by [`ObjectHandle::to_raw`]
    pub fn from_raw(raw: u64) -> Option<Self> {
        let raw = raw.checked_sub(1)?;
        Some(Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        })
    }
}

/// Kind of a synchronized object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Entity,
    Component,
    Controller,
    View,
    Buffer,
}

/// Lifecycle state of a scene object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectLifecycleState {
    /// Linked into the graph
    Active,

    /// Unlinked and released, but the slot is kept until garbage collection
    Reaped,
}

/// How a controller drives one property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyMethod {
    /// Hold a constant value
    Const,

    /// Interpolate along a keyframe path
    Path,

    /// Driven by an external binding; the controller leaves it alone
    Binding,
}

/// One keyframe of a controller path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    /// Time offset of this keyframe in seconds
    pub t: f32,

    /// Value at this keyframe
    pub value: PropertyValue,
}

/// Description of a new entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDesc {
    /// Id of the entity in the sender's id space
    pub id: ObjectId,

    pub label: String,

    /// Initial property values
    pub properties: Vec<(PropertyId, PropertyValue)>,
}

/// Description of a new component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDesc {
    /// Id of the component in the sender's id space
    pub id: ObjectId,

    /// Component type, e.g. "camera", "mesh", "material"
    pub type_name: String,

    /// Initial property values
    pub properties: Vec<(PropertyId, PropertyValue)>,
}

/// Description of a new controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDesc {
    pub id: ObjectId,
    pub label: String,
}

/// Description of a new view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDesc {
    pub id: ObjectId,

    /// Camera entity the view renders through, or the null id
    pub camera_id: ObjectId,
}

/// Description of a new data buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferDesc {
    pub id: ObjectId,

    /// Initial contents
    pub data: Vec<u8>,
}

/// One vertex attribute of a mesh, sourced from a buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDesc {
    /// Buffer holding the attribute data
    pub buffer_id: ObjectId,

    pub name: String,
    pub stride: u32,
    pub offset: u32,
    pub n_components: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_handles_never_collide_with_null() {
        let first = ObjectHandle::new(0, 0);
        assert_ne!(first.to_raw(), NULL_OBJECT_ID);
        assert_eq!(ObjectHandle::from_raw(first.to_raw()), Some(first));

        let later = ObjectHandle::new(17, 3);
        assert_eq!(ObjectHandle::from_raw(later.to_raw()), Some(later));
        assert_eq!(ObjectHandle::from_raw(NULL_OBJECT_ID), None);
    }
}
