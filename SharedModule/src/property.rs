//! # Shared Property System
//!
//! Boxed property values, the wire form of a property change and the
//! frame-scoped property change log kept by the simulator.

use serde::{Serialize, Deserialize};
use crate::object::ObjectHandle;
use crate::types::*;

/// The type of a boxed property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Null,
    Bool,
    Integer,
    UInt32,
    Float,
    Double,
    Vec3,
    Vec4,
    Color,
    Quaternion,
    Text,
    Enum,
    Object,
    Asset,
}

/// A boxed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i32),
    UInt32(u32),
    Float(f32),
    Double(f64),
    Vec3(Vec3),
    Vec4(Vec4),
    Color(Color),
    Quaternion(Quaternion),
    Text(String),
    Enum(i32),

    /// Reference to another synchronized object
    Object(ObjectId),

    /// Reference to an asset object
    Asset(ObjectId),
}

impl PropertyValue {
    /// Get the type of this property value
    pub fn get_type(&self) -> PropertyType {
        match self {
            Self::Null => PropertyType::Null,
            Self::Bool(_) => PropertyType::Bool,
            Self::Integer(_) => PropertyType::Integer,
            Self::UInt32(_) => PropertyType::UInt32,
            Self::Float(_) => PropertyType::Float,
            Self::Double(_) => PropertyType::Double,
            Self::Vec3(_) => PropertyType::Vec3,
            Self::Vec4(_) => PropertyType::Vec4,
            Self::Color(_) => PropertyType::Color,
            Self::Quaternion(_) => PropertyType::Quaternion,
            Self::Text(_) => PropertyType::Text,
            Self::Enum(_) => PropertyType::Enum,
            Self::Object(_) => PropertyType::Object,
            Self::Asset(_) => PropertyType::Asset,
        }
    }

    /// The object id nested in this value, if it references one
    pub fn object_ref(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) | Self::Asset(id) if *id != NULL_OBJECT_ID => Some(*id),
            _ => None,
        }
    }

    /// Return a copy of this value with its nested object reference replaced
    pub fn with_object_ref(&self, id: ObjectId) -> PropertyValue {
        match self {
            Self::Object(_) => Self::Object(id),
            Self::Asset(_) => Self::Asset(id),
            other => other.clone(),
        }
    }

    /// Interpolate between two values of the same type.
    ///
    /// Numeric, vector, color and quaternion values interpolate linearly;
    /// everything else steps at `t >= 1.0`.
    pub fn lerp(&self, to: &PropertyValue, t: f32) -> PropertyValue {
        fn mix(a: f32, b: f32, t: f32) -> f32 {
            a + (b - a) * t
        }

        match (self, to) {
            (Self::Float(a), Self::Float(b)) => Self::Float(mix(*a, *b, t)),
            (Self::Double(a), Self::Double(b)) => Self::Double(a + (b - a) * t as f64),
            (Self::Integer(a), Self::Integer(b)) => {
                Self::Integer(mix(*a as f32, *b as f32, t).round() as i32)
            }
            (Self::Vec3(a), Self::Vec3(b)) => {
                Self::Vec3(Vec3::new(mix(a.x, b.x, t), mix(a.y, b.y, t), mix(a.z, b.z, t)))
            }
            (Self::Vec4(a), Self::Vec4(b)) => Self::Vec4(Vec4::new(
                mix(a.x, b.x, t),
                mix(a.y, b.y, t),
                mix(a.z, b.z, t),
                mix(a.w, b.w, t),
            )),
            (Self::Color(a), Self::Color(b)) => Self::Color(Color::new(
                mix(a.r, b.r, t),
                mix(a.g, b.g, t),
                mix(a.b, b.b, t),
                mix(a.a, b.a, t),
            )),
            (Self::Quaternion(a), Self::Quaternion(b)) => {
                // nlerp, good enough for keyframe spacing used by controllers
                let q = Quaternion::new(
                    mix(a.x, b.x, t),
                    mix(a.y, b.y, t),
                    mix(a.z, b.z, t),
                    mix(a.w, b.w, t),
                );
                let len = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
                if len > f32::EPSILON {
                    Self::Quaternion(Quaternion::new(q.x / len, q.y / len, q.z / len, q.w / len))
                } else {
                    Self::Quaternion(*b)
                }
            }
            _ => {
                if t >= 1.0 {
                    to.clone()
                } else {
                    self.clone()
                }
            }
        }
    }
}

/// A property change as it crosses a process boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Id of the changed object in the receiver's id space
    pub object_id: ObjectId,

    /// Property that changed
    pub property_id: PropertyId,

    /// The new value
    pub value: PropertyValue,
}

/// A property change recorded against a local object handle
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedChange {
    pub object: ObjectHandle,
    pub property_id: PropertyId,
    pub value: PropertyValue,
}

/// Append-only, frame-scoped log of property changes.
///
/// Changes are recorded against local handles and only turned into ids
/// when the log is drained at the end of a frame, since an object may be
/// registered after its first property change.
#[derive(Debug, Default)]
pub struct PropertyChangeLog {
    enabled: bool,
    changes: Vec<LoggedChange>,
}

impl PropertyChangeLog {
    /// Create a new, disabled log
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable recording, returning the previous state
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.enabled, enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a change if logging is enabled. Returns whether it was recorded.
    pub fn record(&mut self, object: ObjectHandle, property_id: PropertyId, value: PropertyValue) -> bool {
        if !self.enabled {
            return false;
        }

        self.changes.push(LoggedChange {
            object,
            property_id,
            value,
        });
        true
    }

    /// Number of changes recorded so far this frame
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drain every recorded change
    pub fn take(&mut self) -> Vec<LoggedChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
