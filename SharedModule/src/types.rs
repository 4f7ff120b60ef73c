//! # Common Types
//!
//! Identifier aliases and small value types used by every role.

use serde::{Serialize, Deserialize};

/// Identifier for an object as known to a peer.
///
/// Ids are not portable between processes. Even values are canonical ids
/// handed out by the simulator, odd values are temporary ids allocated by a
/// process that created an object before the simulator knew about it, and
/// `0` means "no object".
pub type ObjectId = u64;

/// Identifier of a property within an introspectable object
pub type PropertyId = u32;

/// The null object id
pub const NULL_OBJECT_ID: ObjectId = 0;

/// Check whether an id is a temporary (odd) id
pub fn is_temporary_id(id: ObjectId) -> bool {
    id & 1 == 1
}

/// Check whether an id is a canonical (even, non-null) id
pub fn is_canonical_id(id: ObjectId) -> bool {
    id != NULL_OBJECT_ID && id & 1 == 0
}

/// 3 component vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }
}

/// 4 component vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec4 {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

/// Rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 }
    }
}

/// Floating point RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn white() -> Self {
        Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0 }
    }

    pub fn black() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0 }
    }
}
