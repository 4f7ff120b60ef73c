//! # Operations
//!
//! The closed set of structural mutations that cross process boundaries.
//! Payloads reference objects by id, never by handle, so an operation can be
//! copied, id-mapped for a peer and applied to that peer's scene.
//!
//! - [`map`]: id translation into a receiver's id space
//! - [`apply`]: mutation of the local scene graph
//! - [`batch`]: best-effort map+apply over a batch

pub mod apply;
pub mod batch;
pub mod map;

use serde::{Serialize, Deserialize};

use crate::object::*;
use crate::property::PropertyValue;
use crate::types::*;

pub use apply::ApplyContext;
pub use batch::{map_and_apply_batch, map_and_apply_one};
pub use map::{CrossRegistryMap, IdMap, IdentityMap, TemporaryIdMap};

/// A structural mutation of the scene graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    SetProperty {
        object_id: ObjectId,
        property_id: PropertyId,
        value: PropertyValue,
    },
    AddEntity {
        /// Parent entity, or the null id for a root entity
        parent_id: ObjectId,
        entity: EntityDesc,
    },
    DeleteEntity {
        entity_id: ObjectId,
    },
    /// Tells a peer the canonical id of an object it knows by a temporary id
    RegisterObject {
        temporary_id: ObjectId,
        canonical_id: ObjectId,
    },
    AddComponent {
        entity_id: ObjectId,
        component: ComponentDesc,
    },
    DeleteComponent {
        component_id: ObjectId,
    },
    AddController {
        controller: ControllerDesc,
    },
    DeleteController {
        controller_id: ObjectId,
    },
    ControllerSetConst {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
        value: PropertyValue,
    },
    ControllerPathAddNode {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
        t: f32,
        value: PropertyValue,
    },
    ControllerPathDeleteNode {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
        t: f32,
    },
    ControllerPathSetNode {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
        t: f32,
        value: PropertyValue,
    },
    ControllerAddProperty {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
    },
    ControllerRemoveProperty {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
    },
    ControllerPropertySetMethod {
        controller_id: ObjectId,
        object_id: ObjectId,
        property_id: PropertyId,
        method: PropertyMethod,
    },
    AddView {
        view: ViewDesc,
    },
    DeleteView {
        view_id: ObjectId,
    },
    AddBuffer {
        buffer: BufferDesc,
    },
    DeleteBuffer {
        buffer_id: ObjectId,
    },
    BufferSetData {
        buffer_id: ObjectId,
        offset: u32,
        data: Vec<u8>,
    },
    MeshSetAttributes {
        component_id: ObjectId,
        attributes: Vec<AttributeDesc>,
    },
}

/// Tag of an [`Operation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    SetProperty,
    AddEntity,
    DeleteEntity,
    RegisterObject,
    AddComponent,
    DeleteComponent,
    AddController,
    DeleteController,
    ControllerSetConst,
    ControllerPathAddNode,
    ControllerPathDeleteNode,
    ControllerPathSetNode,
    ControllerAddProperty,
    ControllerRemoveProperty,
    ControllerPropertySetMethod,
    AddView,
    DeleteView,
    AddBuffer,
    DeleteBuffer,
    BufferSetData,
    MeshSetAttributes,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetProperty => "SetProperty",
            Self::AddEntity => "AddEntity",
            Self::DeleteEntity => "DeleteEntity",
            Self::RegisterObject => "RegisterObject",
            Self::AddComponent => "AddComponent",
            Self::DeleteComponent => "DeleteComponent",
            Self::AddController => "AddController",
            Self::DeleteController => "DeleteController",
            Self::ControllerSetConst => "ControllerSetConst",
            Self::ControllerPathAddNode => "ControllerPathAddNode",
            Self::ControllerPathDeleteNode => "ControllerPathDeleteNode",
            Self::ControllerPathSetNode => "ControllerPathSetNode",
            Self::ControllerAddProperty => "ControllerAddProperty",
            Self::ControllerRemoveProperty => "ControllerRemoveProperty",
            Self::ControllerPropertySetMethod => "ControllerPropertySetMethod",
            Self::AddView => "AddView",
            Self::DeleteView => "DeleteView",
            Self::AddBuffer => "AddBuffer",
            Self::DeleteBuffer => "DeleteBuffer",
            Self::BufferSetData => "BufferSetData",
            Self::MeshSetAttributes => "MeshSetAttributes",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::SetProperty { .. } => OperationKind::SetProperty,
            Self::AddEntity { .. } => OperationKind::AddEntity,
            Self::DeleteEntity { .. } => OperationKind::DeleteEntity,
            Self::RegisterObject { .. } => OperationKind::RegisterObject,
            Self::AddComponent { .. } => OperationKind::AddComponent,
            Self::DeleteComponent { .. } => OperationKind::DeleteComponent,
            Self::AddController { .. } => OperationKind::AddController,
            Self::DeleteController { .. } => OperationKind::DeleteController,
            Self::ControllerSetConst { .. } => OperationKind::ControllerSetConst,
            Self::ControllerPathAddNode { .. } => OperationKind::ControllerPathAddNode,
            Self::ControllerPathDeleteNode { .. } => OperationKind::ControllerPathDeleteNode,
            Self::ControllerPathSetNode { .. } => OperationKind::ControllerPathSetNode,
            Self::ControllerAddProperty { .. } => OperationKind::ControllerAddProperty,
            Self::ControllerRemoveProperty { .. } => OperationKind::ControllerRemoveProperty,
            Self::ControllerPropertySetMethod { .. } => OperationKind::ControllerPropertySetMethod,
            Self::AddView { .. } => OperationKind::AddView,
            Self::DeleteView { .. } => OperationKind::DeleteView,
            Self::AddBuffer { .. } => OperationKind::AddBuffer,
            Self::DeleteBuffer { .. } => OperationKind::DeleteBuffer,
            Self::BufferSetData { .. } => OperationKind::BufferSetData,
            Self::MeshSetAttributes { .. } => OperationKind::MeshSetAttributes,
        }
    }

    /// Id of the object this operation creates, if it creates one
    pub fn created_id(&self) -> Option<ObjectId> {
        match self {
            Self::AddEntity { entity, .. } => Some(entity.id),
            Self::AddComponent { component, .. } => Some(component.id),
            Self::AddController { controller } => Some(controller.id),
            Self::AddView { view } => Some(view.id),
            Self::AddBuffer { buffer } => Some(buffer.id),
            _ => None,
        }
    }

    /// Id of the object this operation deletes, if it deletes one
    pub fn deleted_id(&self) -> Option<ObjectId> {
        match self {
            Self::DeleteEntity { entity_id } => Some(*entity_id),
            Self::DeleteComponent { component_id } => Some(*component_id),
            Self::DeleteController { controller_id } => Some(*controller_id),
            Self::DeleteView { view_id } => Some(*view_id),
            Self::DeleteBuffer { buffer_id } => Some(*buffer_id),
            _ => None,
        }
    }
}

/// Duplicate a batch for retransmission or independent mapping
pub fn copy_batch(ops: &[Operation]) -> Vec<Operation> {
    ops.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_and_deleted_ids() {
        let add = Operation::AddComponent {
            entity_id: 100,
            component: ComponentDesc {
                id: 1,
                type_name: "light".to_string(),
                properties: Vec::new(),
            },
        };
        assert_eq!(add.kind(), OperationKind::AddComponent);
        assert_eq!(add.created_id(), Some(1));
        assert_eq!(add.deleted_id(), None);

        let delete = Operation::DeleteBuffer { buffer_id: 8 };
        assert_eq!(delete.deleted_id(), Some(8));
        assert_eq!(delete.kind().to_string(), "DeleteBuffer");
    }

    #[test]
    fn copies_are_independent() {
        let batch = vec![Operation::SetProperty {
            object_id: 4,
            property_id: 1,
            value: PropertyValue::Object(6),
        }];

        let mut copy = copy_batch(&batch);
        if let Operation::SetProperty { object_id, .. } = &mut copy[0] {
            *object_id = 10;
        }
        assert_ne!(batch, copy);
    }
}
