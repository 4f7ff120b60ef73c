//! # Operation Apply
//!
//! Mutation of the local scene graph by an already-mapped operation. Every
//! id an operation references is resolved before anything is touched, so a
//! failed apply leaves the scene as it was.

use log::{trace, warn};

use crate::constants::frame::DEFAULT_MAX_FRAME_SIZE;
use crate::error::SyncError;
use crate::gc::GarbageCollector;
use crate::object::*;
use crate::property::PropertyValue;
use crate::registry::ObjectRegistry;
use crate::scene::*;
use crate::types::*;
use super::Operation;

/// Everything an operation may touch while it is applied
pub struct ApplyContext<'a> {
    pub scene: &'a mut Scene,
    pub registry: &'a mut ObjectRegistry<ObjectHandle>,
    pub gc: &'a mut GarbageCollector<ObjectHandle>,

    /// Where the id authority records the canonical ids it assigns to
    /// objects created under a temporary id
    pub registrations: Option<&'a mut Vec<(ObjectId, ObjectId)>>,

    /// Largest size a buffer may grow to through `BufferSetData`
    pub max_buffer_size: usize,
}

impl<'a> ApplyContext<'a> {
    pub fn new(
        scene: &'a mut Scene,
        registry: &'a mut ObjectRegistry<ObjectHandle>,
        gc: &'a mut GarbageCollector<ObjectHandle>,
    ) -> Self {
        Self {
            scene,
            registry,
            gc,
            registrations: None,
            max_buffer_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Record temporary -> canonical assignments into `registrations`
    pub fn with_registrations(mut self, registrations: &'a mut Vec<(ObjectId, ObjectId)>) -> Self {
        self.registrations = Some(registrations);
        self
    }

    /// Number of registrations recorded so far
    pub fn registration_count(&self) -> usize {
        self.registrations.as_ref().map_or(0, |registrations| registrations.len())
    }

    /// Registrations recorded from position `from` on
    pub fn registrations_since(&self, from: usize) -> Vec<(ObjectId, ObjectId)> {
        match &self.registrations {
            Some(registrations) => registrations.get(from..).map(|s| s.to_vec()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Resolve an id to an object that is still linked into the scene
    pub fn resolve_live(&self, id: ObjectId) -> Result<ObjectHandle, SyncError> {
        let handle = self.registry.resolve(id)?;
        if !self.scene.is_live(handle) {
            return Err(SyncError::StaleHandle);
        }
        Ok(handle)
    }

    /// Resolve an id to a live object of the given kind
    pub fn resolve_kind(&self, id: ObjectId, kind: ObjectKind) -> Result<ObjectHandle, SyncError> {
        let handle = self.resolve_live(id)?;
        match self.scene.get(handle).map(|object| object.kind()) {
            Some(actual) if actual == kind => Ok(handle),
            Some(actual) => Err(SyncError::InvalidOperation(format!(
                "object {} is a {:?}, expected a {:?}",
                id, actual, kind
            ))),
            None => Err(SyncError::StaleHandle),
        }
    }

    /// Swap the id nested in a value for a local handle reference
    pub fn localize_value(&self, value: &PropertyValue) -> Result<PropertyValue, SyncError> {
        match value.object_ref() {
            Some(id) => {
                let handle = self.registry.resolve(id)?;
                Ok(value.with_object_ref(handle.to_raw()))
            }
            None => Ok(value.clone()),
        }
    }

    fn localize_properties(
        &self,
        properties: &[(PropertyId, PropertyValue)],
    ) -> Result<Vec<(PropertyId, PropertyValue)>, SyncError> {
        properties
            .iter()
            .map(|(id, value)| Ok((*id, self.localize_value(value)?)))
            .collect()
    }

    fn check_new_id(&self, id: ObjectId) -> Result<(), SyncError> {
        if id != NULL_OBJECT_ID && self.registry.contains_id(id) {
            warn!("Refusing to create object {}: id already registered", id);
            return Err(SyncError::DuplicateRegistration { id });
        }
        Ok(())
    }

    /// Register a freshly inserted object.
    ///
    /// The authority swaps temporary (or missing) ids for canonical ones and
    /// records the pair, and only accepts a canonical id it allocated itself
    /// and hasn't bound yet. Everyone else keeps the id it was given, or
    /// hands out a temporary id when there is none.
    fn register_created(&mut self, handle: ObjectHandle, id: ObjectId) -> Result<ObjectId, SyncError> {
        let result = if self.registry.is_authority() {
            if id == NULL_OBJECT_ID || is_temporary_id(id) {
                self.registry.allocate_canonical_id().and_then(|canonical| {
                    self.registry.claim_canonical_id(canonical);
                    self.registry.register(handle, canonical)?;
                    Ok(canonical)
                })
            } else if self.registry.claim_canonical_id(id) {
                self.registry.register(handle, id).map(|_| id)
            } else {
                warn!("Refusing to create object {}: canonical id not issued here", id);
                Err(SyncError::Protocol(format!(
                    "canonical id {} was not allocated by the id authority",
                    id
                )))
            }
        } else if id == NULL_OBJECT_ID {
            self.registry.allocate_temporary_id(handle)
        } else {
            self.registry.register(handle, id).map(|_| id)
        };

        match result {
            Ok(assigned) => {
                if assigned != id && id != NULL_OBJECT_ID {
                    if let Some(registrations) = self.registrations.as_mut() {
                        registrations.push((id, assigned));
                    }
                }
                trace!("Registered {:?} as {}", handle, assigned);
                Ok(assigned)
            }
            Err(err) => {
                // Undo the insert
                let _ = self.scene.reap(handle);
                self.scene.release(handle);
                Err(err)
            }
        }
    }

    fn controller_mut(&mut self, handle: ObjectHandle) -> Result<&mut ControllerState, SyncError> {
        match self.scene.get_mut(handle).map(|object| &mut object.data) {
            Some(ObjectData::Controller(state)) => Ok(state),
            _ => Err(SyncError::InvalidOperation("object is not a controller".to_string())),
        }
    }

    fn reap(&mut self, id: ObjectId, kind: ObjectKind) -> Result<(), SyncError> {
        let handle = self.resolve_kind(id, kind)?;
        let reaped = self.scene.reap(handle)?;
        self.gc.queue_all(reaped);
        Ok(())
    }

    fn create(
        &mut self,
        id: ObjectId,
        label: &str,
        data: ObjectData,
        properties: Vec<(PropertyId, PropertyValue)>,
    ) -> Result<ObjectHandle, SyncError> {
        let mut object = SceneObject::new(label, data);
        for (property_id, value) in properties {
            object.set_property(property_id, value);
        }

        let handle = self.scene.insert(object);
        self.register_created(handle, id)?;
        Ok(handle)
    }
}

impl Operation {
    /// Apply this operation to the local scene.
    ///
    /// All ids must already be in the local registry's id space.
    pub fn apply(&self, ctx: &mut ApplyContext<'_>) -> Result<(), SyncError> {
        match self {
            Self::SetProperty { object_id, property_id, value } => {
                let object = ctx.resolve_live(*object_id)?;
                let value = ctx.localize_value(value)?;
                ctx.scene.set_property(object, *property_id, value)
            }
            Self::AddEntity { parent_id, entity } => {
                let parent = match *parent_id {
                    NULL_OBJECT_ID => None,
                    id => Some(ctx.resolve_kind(id, ObjectKind::Entity)?),
                };
                ctx.check_new_id(entity.id)?;
                let properties = ctx.localize_properties(&entity.properties)?;

                let handle = ctx.create(entity.id, &entity.label, ObjectData::new_entity(), properties)?;
                if let Some(parent) = parent {
                    ctx.scene.add_child(parent, handle)?;
                }
                Ok(())
            }
            Self::DeleteEntity { entity_id } => ctx.reap(*entity_id, ObjectKind::Entity),
            Self::RegisterObject { temporary_id, canonical_id } => {
                if ctx.registry.is_authority() {
                    return Err(SyncError::Protocol(
                        "the id authority can't receive registrations".to_string(),
                    ));
                }
                ctx.registry.rewrite_temporary(*temporary_id, *canonical_id)?;
                Ok(())
            }
            Self::AddComponent { entity_id, component } => {
                let entity = ctx.resolve_kind(*entity_id, ObjectKind::Entity)?;
                ctx.check_new_id(component.id)?;
                let properties = ctx.localize_properties(&component.properties)?;

                let handle = ctx.create(
                    component.id,
                    &component.type_name,
                    ObjectData::new_component(&component.type_name),
                    properties,
                )?;
                ctx.scene.attach_component(entity, handle)
            }
            Self::DeleteComponent { component_id } => ctx.reap(*component_id, ObjectKind::Component),
            Self::AddController { controller } => {
                ctx.check_new_id(controller.id)?;
                ctx.create(
                    controller.id,
                    &controller.label,
                    ObjectData::Controller(ControllerState::default()),
                    Vec::new(),
                )?;
                Ok(())
            }
            Self::DeleteController { controller_id } => ctx.reap(*controller_id, ObjectKind::Controller),
            Self::ControllerSetConst { controller_id, object_id, property_id, value } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;
                let value = ctx.localize_value(value)?;

                ctx.controller_mut(controller)?.ensure(object, *property_id).constant = Some(value);
                Ok(())
            }
            Self::ControllerPathAddNode { controller_id, object_id, property_id, t, value } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;
                let value = ctx.localize_value(value)?;

                ctx.controller_mut(controller)?.ensure(object, *property_id).add_node(*t, value);
                Ok(())
            }
            Self::ControllerPathDeleteNode { controller_id, object_id, property_id, t } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;

                let prop = ctx
                    .controller_mut(controller)?
                    .find_mut(object, *property_id)
                    .ok_or_else(|| SyncError::InvalidOperation("property is not controlled".to_string()))?;
                if !prop.delete_node(*t) {
                    return Err(SyncError::InvalidOperation(format!("no keyframe at t={}", t)));
                }
                Ok(())
            }
            Self::ControllerPathSetNode { controller_id, object_id, property_id, t, value } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;
                let value = ctx.localize_value(value)?;

                let prop = ctx
                    .controller_mut(controller)?
                    .find_mut(object, *property_id)
                    .ok_or_else(|| SyncError::InvalidOperation("property is not controlled".to_string()))?;
                if !prop.set_node(*t, value) {
                    return Err(SyncError::InvalidOperation(format!("no keyframe at t={}", t)));
                }
                Ok(())
            }
            Self::ControllerAddProperty { controller_id, object_id, property_id } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;

                ctx.controller_mut(controller)?.ensure(object, *property_id);
                Ok(())
            }
            Self::ControllerRemoveProperty { controller_id, object_id, property_id } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;

                if !ctx.controller_mut(controller)?.remove(object, *property_id) {
                    return Err(SyncError::InvalidOperation("property is not controlled".to_string()));
                }
                Ok(())
            }
            Self::ControllerPropertySetMethod { controller_id, object_id, property_id, method } => {
                let controller = ctx.resolve_kind(*controller_id, ObjectKind::Controller)?;
                let object = ctx.resolve_live(*object_id)?;

                let prop = ctx
                    .controller_mut(controller)?
                    .find_mut(object, *property_id)
                    .ok_or_else(|| SyncError::InvalidOperation("property is not controlled".to_string()))?;
                prop.method = *method;
                Ok(())
            }
            Self::AddView { view } => {
                let camera = match view.camera_id {
                    NULL_OBJECT_ID => None,
                    id => Some(ctx.resolve_kind(id, ObjectKind::Entity)?),
                };
                ctx.check_new_id(view.id)?;
                ctx.create(view.id, "view", ObjectData::View { camera }, Vec::new())?;
                Ok(())
            }
            Self::DeleteView { view_id } => ctx.reap(*view_id, ObjectKind::View),
            Self::AddBuffer { buffer } => {
                ctx.check_new_id(buffer.id)?;
                ctx.create(
                    buffer.id,
                    "buffer",
                    ObjectData::Buffer { data: buffer.data.clone() },
                    Vec::new(),
                )?;
                Ok(())
            }
            Self::DeleteBuffer { buffer_id } => ctx.reap(*buffer_id, ObjectKind::Buffer),
            Self::BufferSetData { buffer_id, offset, data } => {
                let buffer = ctx.resolve_kind(*buffer_id, ObjectKind::Buffer)?;
                let start = usize::try_from(*offset)
                    .map_err(|_| SyncError::InvalidOperation(format!("buffer offset {} out of range", offset)))?;
                let end = start
                    .checked_add(data.len())
                    .filter(|end| *end <= ctx.max_buffer_size)
                    .ok_or_else(|| {
                        SyncError::InvalidOperation(format!(
                            "write of {} byte(s) at offset {} exceeds the {} byte buffer limit",
                            data.len(),
                            offset,
                            ctx.max_buffer_size
                        ))
                    })?;

                if let Some(ObjectData::Buffer { data: contents }) =
                    ctx.scene.get_mut(buffer).map(|object| &mut object.data)
                {
                    if contents.len() < end {
                        contents.resize(end, 0);
                    }
                    contents[start..end].copy_from_slice(data);
                }
                Ok(())
            }
            Self::MeshSetAttributes { component_id, attributes } => {
                let component = ctx.resolve_kind(*component_id, ObjectKind::Component)?;
                let resolved = attributes
                    .iter()
                    .map(|attribute| {
                        Ok(MeshAttribute {
                            buffer: ctx.resolve_kind(attribute.buffer_id, ObjectKind::Buffer)?,
                            name: attribute.name.clone(),
                            stride: attribute.stride,
                            offset: attribute.offset,
                            n_components: attribute.n_components,
                        })
                    })
                    .collect::<Result<Vec<_>, SyncError>>()?;

                if let Some(ObjectData::Component { attributes, .. }) =
                    ctx.scene.get_mut(component).map(|object| &mut object.data)
                {
                    *attributes = resolved;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        scene: Scene,
        registry: ObjectRegistry<ObjectHandle>,
        gc: GarbageCollector<ObjectHandle>,
        registrations: Vec<(ObjectId, ObjectId)>,
    }

    impl Fixture {
        fn new(registry: ObjectRegistry<ObjectHandle>) -> Self {
            Self {
                scene: Scene::new(),
                registry,
                gc: GarbageCollector::new(),
                registrations: Vec::new(),
            }
        }

        fn apply(&mut self, op: Operation) -> Result<(), SyncError> {
            let mut ctx = ApplyContext::new(&mut self.scene, &mut self.registry, &mut self.gc)
                .with_registrations(&mut self.registrations);
            op.apply(&mut ctx)
        }
    }

    fn add_entity(id: ObjectId, parent_id: ObjectId) -> Operation {
        Operation::AddEntity {
            parent_id,
            entity: EntityDesc {
                id,
                label: format!("entity {}", id),
                properties: Vec::new(),
            },
        }
    }

    fn add_component(entity_id: ObjectId, id: ObjectId) -> Operation {
        Operation::AddComponent {
            entity_id,
            component: ComponentDesc {
                id,
                type_name: "light".to_string(),
                properties: vec![(1, PropertyValue::Float(0.5))],
            },
        }
    }

    #[test]
    fn creation_links_into_the_graph() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(add_entity(100, NULL_OBJECT_ID)).unwrap();
        f.apply(add_entity(102, 100)).unwrap();
        f.apply(add_component(102, 104)).unwrap();

        let root = f.registry.lookup(100).unwrap();
        let child = f.registry.lookup(102).unwrap();
        let light = f.registry.lookup(104).unwrap();
        assert_eq!(f.scene.children_of(root), vec![child]);
        assert_eq!(f.scene.component_owner(light), Some(child));
        assert_eq!(f.scene.get_property(light, 1), Some(&PropertyValue::Float(0.5)));
        assert!(f.registrations.is_empty());
    }

    #[test]
    fn unresolved_reference_leaves_scene_untouched() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        let err = f.apply(add_component(100, 104)).unwrap_err();
        assert_eq!(err, SyncError::UnresolvedId(100));
        assert!(f.scene.is_empty());
        assert!(f.registry.is_empty());

        f.apply(add_entity(100, NULL_OBJECT_ID)).unwrap();
        assert_eq!(
            f.apply(add_entity(100, NULL_OBJECT_ID)),
            Err(SyncError::DuplicateRegistration { id: 100 })
        );
        assert_eq!(f.scene.len(), 1);
    }

    #[test]
    fn authority_assigns_canonical_ids() {
        let mut f = Fixture::new(ObjectRegistry::new_authority());
        f.apply(add_entity(1, NULL_OBJECT_ID)).unwrap();

        let (temporary, canonical) = f.registrations[0];
        assert_eq!(temporary, 1);
        assert!(is_canonical_id(canonical));
        assert!(f.registry.lookup(1).is_none());
        assert!(f.registry.lookup(canonical).is_some());

        // Registrations only ever flow away from the authority
        let err = f
            .apply(Operation::RegisterObject { temporary_id: 3, canonical_id: 4 })
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn authority_refuses_canonical_ids_it_never_issued() {
        let mut f = Fixture::new(ObjectRegistry::new_authority());

        let err = f.apply(add_entity(2, NULL_OBJECT_ID)).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(f.scene.is_empty());
        assert!(f.registry.is_empty());

        // The counter was never disturbed, so the next creation still works
        f.apply(add_entity(1, NULL_OBJECT_ID)).unwrap();
        let (_, canonical) = f.registrations[0];
        assert!(f.registry.lookup(canonical).is_some());

        // An id the authority allocated itself binds exactly once
        let issued = f.registry.allocate_canonical_id().unwrap();
        f.apply(add_entity(issued, NULL_OBJECT_ID)).unwrap();
        f.apply(Operation::DeleteEntity { entity_id: issued }).unwrap();
        let Fixture { scene, registry, gc, .. } = &mut f;
        gc.collect(|handle| {
            registry.unregister_object(&handle);
            scene.release(handle);
        });
        assert!(matches!(
            f.apply(add_entity(issued, NULL_OBJECT_ID)),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn peer_rewrites_on_registration() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(add_entity(1, NULL_OBJECT_ID)).unwrap();
        let handle = f.registry.lookup(1).unwrap();

        f.apply(Operation::RegisterObject { temporary_id: 1, canonical_id: 6 }).unwrap();
        assert_eq!(f.registry.lookup(6), Some(handle));
        assert_eq!(f.registry.lookup(1), None);
    }

    #[test]
    fn delete_reaps_and_defers_unregistration() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(add_entity(100, NULL_OBJECT_ID)).unwrap();
        f.apply(add_component(100, 104)).unwrap();
        f.apply(Operation::DeleteEntity { entity_id: 100 }).unwrap();

        // Ids still resolve until collection
        let entity = f.registry.lookup(100).unwrap();
        assert!(f.registry.lookup(104).is_some());
        assert!(!f.scene.is_live(entity));
        assert_eq!(f.gc.len(), 2);

        // Later operations on the reaped object fail
        assert_eq!(
            f.apply(Operation::SetProperty { object_id: 104, property_id: 1, value: PropertyValue::Null }),
            Err(SyncError::StaleHandle)
        );

        let Fixture { scene, registry, gc, .. } = &mut f;
        gc.collect(|handle| {
            registry.unregister_object(&handle);
            scene.release(handle);
        });
        assert!(f.registry.is_empty());
        assert!(f.scene.is_empty());
    }

    #[test]
    fn controller_operations() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(add_entity(100, NULL_OBJECT_ID)).unwrap();
        f.apply(Operation::AddController {
            controller: ControllerDesc { id: 200, label: "timeline".to_string() },
        })
        .unwrap();

        f.apply(Operation::ControllerPathAddNode {
            controller_id: 200,
            object_id: 100,
            property_id: 2,
            t: 0.0,
            value: PropertyValue::Float(0.0),
        })
        .unwrap();
        f.apply(Operation::ControllerPathAddNode {
            controller_id: 200,
            object_id: 100,
            property_id: 2,
            t: 1.0,
            value: PropertyValue::Float(4.0),
        })
        .unwrap();
        f.apply(Operation::ControllerPropertySetMethod {
            controller_id: 200,
            object_id: 100,
            property_id: 2,
            method: PropertyMethod::Path,
        })
        .unwrap();

        let missing = f.apply(Operation::ControllerPathDeleteNode {
            controller_id: 200,
            object_id: 100,
            property_id: 2,
            t: 0.5,
        });
        assert!(matches!(missing, Err(SyncError::InvalidOperation(_))));

        let controller = f.registry.lookup(200).unwrap();
        let entity = f.registry.lookup(100).unwrap();
        match &f.scene.get(controller).unwrap().data {
            ObjectData::Controller(state) => {
                let prop = state.find(entity, 2).unwrap();
                assert_eq!(prop.path.len(), 2);
                assert_eq!(prop.evaluate(0.5), Some(PropertyValue::Float(2.0)));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Controllers don't own entities, so a kind mismatch fails
        assert!(matches!(
            f.apply(Operation::DeleteEntity { entity_id: 200 }),
            Err(SyncError::InvalidOperation(_))
        ));
    }

    #[test]
    fn buffers_and_mesh_attributes() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(add_entity(100, NULL_OBJECT_ID)).unwrap();
        f.apply(add_component(100, 104)).unwrap();
        f.apply(Operation::AddBuffer { buffer: BufferDesc { id: 300, data: vec![1, 2] } }).unwrap();
        f.apply(Operation::BufferSetData { buffer_id: 300, offset: 1, data: vec![7, 8, 9] }).unwrap();
        f.apply(Operation::MeshSetAttributes {
            component_id: 104,
            attributes: vec![AttributeDesc {
                buffer_id: 300,
                name: "position".to_string(),
                stride: 12,
                offset: 0,
                n_components: 3,
            }],
        })
        .unwrap();

        let buffer = f.registry.lookup(300).unwrap();
        assert!(matches!(
            &f.scene.get(buffer).unwrap().data,
            ObjectData::Buffer { data } if data == &vec![1, 7, 8, 9]
        ));

        let mesh = f.registry.lookup(104).unwrap();
        match &f.scene.get(mesh).unwrap().data {
            ObjectData::Component { attributes, .. } => assert_eq!(attributes[0].buffer, buffer),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn buffer_writes_past_the_limit_are_refused() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(Operation::AddBuffer { buffer: BufferDesc { id: 300, data: vec![1, 2] } }).unwrap();

        let far = f.apply(Operation::BufferSetData { buffer_id: 300, offset: u32::MAX, data: vec![1] });
        assert!(matches!(far, Err(SyncError::InvalidOperation(_))));

        let mut ctx = ApplyContext::new(&mut f.scene, &mut f.registry, &mut f.gc).with_max_buffer_size(4);
        let op = Operation::BufferSetData { buffer_id: 300, offset: 2, data: vec![3, 4, 5] };
        assert!(matches!(op.apply(&mut ctx), Err(SyncError::InvalidOperation(_))));
        let op = Operation::BufferSetData { buffer_id: 300, offset: 2, data: vec![3, 4] };
        op.apply(&mut ctx).unwrap();

        let buffer = f.registry.lookup(300).unwrap();
        assert!(matches!(
            &f.scene.get(buffer).unwrap().data,
            ObjectData::Buffer { data } if data == &vec![1, 2, 3, 4]
        ));
    }

    #[test]
    fn object_values_are_stored_as_handles() {
        let mut f = Fixture::new(ObjectRegistry::new_peer());
        f.apply(add_entity(100, NULL_OBJECT_ID)).unwrap();
        f.apply(add_entity(102, NULL_OBJECT_ID)).unwrap();
        f.apply(Operation::SetProperty {
            object_id: 100,
            property_id: 9,
            value: PropertyValue::Object(102),
        })
        .unwrap();

        let entity = f.registry.lookup(100).unwrap();
        let target = f.registry.lookup(102).unwrap();
        assert_eq!(
            f.scene.get_property(entity, 9),
            Some(&PropertyValue::Object(target.to_raw()))
        );
    }
}
