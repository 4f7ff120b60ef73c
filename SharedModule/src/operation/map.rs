//! # Id Mapping
//!
//! Translation of every object id embedded in an operation into the id space
//! of whoever applies it. Mapping always produces a new operation; the
//! original stays untouched so it can still be forwarded or retried.

use std::collections::HashMap;

use crate::error::SyncError;
use crate::object::ObjectHandle;
use crate::property::PropertyValue;
use crate::registry::ObjectRegistry;
use crate::types::*;
use super::Operation;

/// Translates ids from a sender's id space into a receiver's
pub trait IdMap {
    /// Translate a reference to an existing object
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError>;

    /// Translate the id of an object the operation creates
    fn map_new_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        Ok(id)
    }

    /// Called after an applied operation bound `temporary` to `canonical`
    fn registered(&mut self, _temporary: ObjectId, _canonical: ObjectId) {}
}

/// Leaves every id as it is
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMap;

impl IdMap for IdentityMap {
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        Ok(id)
    }
}

/// Per-batch map used by the id authority.
///
/// Objects created earlier in the batch under a temporary id are referred to
/// by later operations with that same temporary id; this map swaps in the
/// canonical id the authority assigned.
#[derive(Debug, Default, Clone)]
pub struct TemporaryIdMap {
    assigned: HashMap<ObjectId, ObjectId>,
}

impl TemporaryIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every temporary -> canonical pair seen so far
    pub fn assigned(&self) -> &HashMap<ObjectId, ObjectId> {
        &self.assigned
    }
}

impl IdMap for TemporaryIdMap {
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        Ok(self.assigned.get(&id).copied().unwrap_or(id))
    }

    fn map_new_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        self.map_id(id)
    }

    fn registered(&mut self, temporary: ObjectId, canonical: ObjectId) {
        self.assigned.insert(temporary, canonical);
    }
}

/// Maps ids between two registries that share the same local objects.
///
/// References must already be known on both sides. Created objects that the
/// target registry doesn't know yet get a temporary id there.
pub struct CrossRegistryMap<'a> {
    pub from: &'a ObjectRegistry<ObjectHandle>,
    pub to: &'a mut ObjectRegistry<ObjectHandle>,
}

impl<'a> IdMap for CrossRegistryMap<'a> {
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        let handle = self.from.resolve(id)?;
        self.to.id_of(&handle).ok_or(SyncError::UnresolvedId(id))
    }

    fn map_new_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        let handle = self.from.resolve(id)?;
        match self.to.id_of(&handle) {
            Some(mapped) => Ok(mapped),
            None => self.to.allocate_temporary_id(handle),
        }
    }
}

fn map_optional(mapper: &mut dyn IdMap, id: ObjectId) -> Result<ObjectId, SyncError> {
    if id == NULL_OBJECT_ID {
        Ok(NULL_OBJECT_ID)
    } else {
        mapper.map_id(id)
    }
}

/// Map the object or asset reference nested in a value
pub fn map_value(mapper: &mut dyn IdMap, value: &PropertyValue) -> Result<PropertyValue, SyncError> {
    match value.object_ref() {
        Some(id) => Ok(value.with_object_ref(mapper.map_id(id)?)),
        None => Ok(value.clone()),
    }
}

fn map_properties(
    mapper: &mut dyn IdMap,
    properties: &[(PropertyId, PropertyValue)],
) -> Result<Vec<(PropertyId, PropertyValue)>, SyncError> {
    properties
        .iter()
        .map(|(id, value)| Ok((*id, map_value(mapper, value)?)))
        .collect()
}

impl Operation {
    /// Return a copy of this operation with every embedded id translated.
    ///
    /// Registration messages carry ids from both sides of a mapping and are
    /// returned unchanged.
    pub fn mapped(&self, mapper: &mut dyn IdMap) -> Result<Operation, SyncError> {
        let op = match self {
            Self::SetProperty { object_id, property_id, value } => Self::SetProperty {
                object_id: mapper.map_id(*object_id)?,
                property_id: *property_id,
                value: map_value(mapper, value)?,
            },
            Self::AddEntity { parent_id, entity } => {
                let parent_id = map_optional(mapper, *parent_id)?;
                let mut entity = entity.clone();
                entity.properties = map_properties(mapper, &entity.properties)?;
                entity.id = mapper.map_new_id(entity.id)?;
                Self::AddEntity { parent_id, entity }
            }
            Self::DeleteEntity { entity_id } => Self::DeleteEntity {
                entity_id: mapper.map_id(*entity_id)?,
            },
            Self::RegisterObject { .. } => self.clone(),
            Self::AddComponent { entity_id, component } => {
                let entity_id = mapper.map_id(*entity_id)?;
                let mut component = component.clone();
                component.properties = map_properties(mapper, &component.properties)?;
                component.id = mapper.map_new_id(component.id)?;
                Self::AddComponent { entity_id, component }
            }
            Self::DeleteComponent { component_id } => Self::DeleteComponent {
                component_id: mapper.map_id(*component_id)?,
            },
            Self::AddController { controller } => {
                let mut controller = controller.clone();
                controller.id = mapper.map_new_id(controller.id)?;
                Self::AddController { controller }
            }
            Self::DeleteController { controller_id } => Self::DeleteController {
                controller_id: mapper.map_id(*controller_id)?,
            },
            Self::ControllerSetConst { controller_id, object_id, property_id, value } => {
                Self::ControllerSetConst {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                    value: map_value(mapper, value)?,
                }
            }
            Self::ControllerPathAddNode { controller_id, object_id, property_id, t, value } => {
                Self::ControllerPathAddNode {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                    t: *t,
                    value: map_value(mapper, value)?,
                }
            }
            Self::ControllerPathDeleteNode { controller_id, object_id, property_id, t } => {
                Self::ControllerPathDeleteNode {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                    t: *t,
                }
            }
            Self::ControllerPathSetNode { controller_id, object_id, property_id, t, value } => {
                Self::ControllerPathSetNode {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                    t: *t,
                    value: map_value(mapper, value)?,
                }
            }
            Self::ControllerAddProperty { controller_id, object_id, property_id } => {
                Self::ControllerAddProperty {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                }
            }
            Self::ControllerRemoveProperty { controller_id, object_id, property_id } => {
                Self::ControllerRemoveProperty {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                }
            }
            Self::ControllerPropertySetMethod { controller_id, object_id, property_id, method } => {
                Self::ControllerPropertySetMethod {
                    controller_id: mapper.map_id(*controller_id)?,
                    object_id: mapper.map_id(*object_id)?,
                    property_id: *property_id,
                    method: *method,
                }
            }
            Self::AddView { view } => {
                let mut view = view.clone();
                view.camera_id = map_optional(mapper, view.camera_id)?;
                view.id = mapper.map_new_id(view.id)?;
                Self::AddView { view }
            }
            Self::DeleteView { view_id } => Self::DeleteView {
                view_id: mapper.map_id(*view_id)?,
            },
            Self::AddBuffer { buffer } => {
                let mut buffer = buffer.clone();
                buffer.id = mapper.map_new_id(buffer.id)?;
                Self::AddBuffer { buffer }
            }
            Self::DeleteBuffer { buffer_id } => Self::DeleteBuffer {
                buffer_id: mapper.map_id(*buffer_id)?,
            },
            Self::BufferSetData { buffer_id, offset, data } => Self::BufferSetData {
                buffer_id: mapper.map_id(*buffer_id)?,
                offset: *offset,
                data: data.clone(),
            },
            Self::MeshSetAttributes { component_id, attributes } => {
                let component_id = mapper.map_id(*component_id)?;
                let mut mapped = attributes.clone();
                for attribute in mapped.iter_mut() {
                    attribute.buffer_id = mapper.map_id(attribute.buffer_id)?;
                }
                Self::MeshSetAttributes { component_id, attributes: mapped }
            }
        };

        Ok(op)
    }
}
