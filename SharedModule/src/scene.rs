//! # Scene Graph Container
//!
//! The in-memory scene graph each role owns: entities with children and
//! components, controllers, views and data buffers, stored in a generational
//! slot arena and addressed by [`ObjectHandle`].
//!
//! Deletion is two-phase. [`Scene::reap`] unlinks an object (and the subtree
//! it owns) from the graph, releases its resources and runs the reap hooks,
//! but keeps the slot so the handle still resolves. [`Scene::release`] frees
//! the slot and is only called by the garbage collector once every peer has
//! seen the frame that deleted the object.

use std::collections::BTreeMap;
use log::{debug, trace};

use crate::error::SyncError;
use crate::object::*;
use crate::property::PropertyValue;
use crate::types::PropertyId;

/// Get/set access to boxed property values by property id
pub trait Introspectable {
    /// Get the current value of a property
    fn get_property(&self, property_id: PropertyId) -> Option<&PropertyValue>;

    /// Set a property value
    fn set_property(&mut self, property_id: PropertyId, value: PropertyValue);

    /// Ids of every property currently held
    fn property_ids(&self) -> Vec<PropertyId>;
}

/// A mesh vertex attribute bound to a local buffer
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAttribute {
    pub buffer: ObjectHandle,
    pub name: String,
    pub stride: u32,
    pub offset: u32,
    pub n_components: u32,
}

/// One property driven by a controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerProperty {
    pub object: ObjectHandle,
    pub property_id: PropertyId,
    pub method: PropertyMethod,
    pub constant: Option<PropertyValue>,

    /// Keyframes, kept sorted by time
    pub path: Vec<PathNode>,
}

impl ControllerProperty {
    pub fn new(object: ObjectHandle, property_id: PropertyId) -> Self {
        Self {
            object,
            property_id,
            method: PropertyMethod::Const,
            constant: None,
            path: Vec::new(),
        }
    }

    /// Insert a keyframe, replacing any keyframe at the same time
    pub fn add_node(&mut self, t: f32, value: PropertyValue) {
        match self.path.iter().position(|node| node.t >= t) {
            Some(pos) if self.path[pos].t == t => self.path[pos].value = value,
            Some(pos) => self.path.insert(pos, PathNode { t, value }),
            None => self.path.push(PathNode { t, value }),
        }
    }

    /// Remove the keyframe at time `t`
    pub fn delete_node(&mut self, t: f32) -> bool {
        let before = self.path.len();
        self.path.retain(|node| node.t != t);
        self.path.len() != before
    }

    /// Replace the value of the keyframe at time `t`
    pub fn set_node(&mut self, t: f32, value: PropertyValue) -> bool {
        match self.path.iter_mut().find(|node| node.t == t) {
            Some(node) => {
                node.value = value;
                true
            }
            None => false,
        }
    }

    /// Evaluate the property at `elapsed` seconds
    pub fn evaluate(&self, elapsed: f32) -> Option<PropertyValue> {
        match self.method {
            PropertyMethod::Const => self.constant.clone(),
            PropertyMethod::Binding => None,
            PropertyMethod::Path => {
                let first = self.path.first()?;
                if elapsed <= first.t {
                    return Some(first.value.clone());
                }

                for pair in self.path.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    if elapsed <= b.t {
                        let span = b.t - a.t;
                        let t = if span > 0.0 { (elapsed - a.t) / span } else { 1.0 };
                        return Some(a.value.lerp(&b.value, t));
                    }
                }

                self.path.last().map(|node| node.value.clone())
            }
        }
    }
}

/// Per-controller state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub properties: Vec<ControllerProperty>,
}

impl ControllerState {
    pub fn find(&self, object: ObjectHandle, property_id: PropertyId) -> Option<&ControllerProperty> {
        self.properties
            .iter()
            .find(|prop| prop.object == object && prop.property_id == property_id)
    }

    pub fn find_mut(&mut self, object: ObjectHandle, property_id: PropertyId) -> Option<&mut ControllerProperty> {
        self.properties
            .iter_mut()
            .find(|prop| prop.object == object && prop.property_id == property_id)
    }

    /// Find or add the controller property for `object`/`property_id`
    pub fn ensure(&mut self, object: ObjectHandle, property_id: PropertyId) -> &mut ControllerProperty {
        if let Some(pos) = self
            .properties
            .iter()
            .position(|prop| prop.object == object && prop.property_id == property_id)
        {
            return &mut self.properties[pos];
        }

        self.properties.push(ControllerProperty::new(object, property_id));
        let last = self.properties.len() - 1;
        &mut self.properties[last]
    }

    pub fn remove(&mut self, object: ObjectHandle, property_id: PropertyId) -> bool {
        let before = self.properties.len();
        self.properties
            .retain(|prop| !(prop.object == object && prop.property_id == property_id));
        self.properties.len() != before
    }
}

/// Kind specific object data
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectData {
    Entity {
        parent: Option<ObjectHandle>,
        children: Vec<ObjectHandle>,
        components: Vec<ObjectHandle>,
    },
    Component {
        type_name: String,
        entity: Option<ObjectHandle>,
        attributes: Vec<MeshAttribute>,
    },
    Controller(ControllerState),
    View {
        camera: Option<ObjectHandle>,
    },
    Buffer {
        data: Vec<u8>,
    },
}

impl ObjectData {
    pub fn new_entity() -> Self {
        Self::Entity {
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn new_component(type_name: &str) -> Self {
        Self::Component {
            type_name: type_name.to_string(),
            entity: None,
            attributes: Vec::new(),
        }
    }
}

/// An object stored in the scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub label: String,
    pub state: ObjectLifecycleState,
    pub properties: BTreeMap<PropertyId, PropertyValue>,
    pub data: ObjectData,
}

impl SceneObject {
    pub fn new(label: &str, data: ObjectData) -> Self {
        Self {
            label: label.to_string(),
            state: ObjectLifecycleState::Active,
            properties: BTreeMap::new(),
            data,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self.data {
            ObjectData::Entity { .. } => ObjectKind::Entity,
            ObjectData::Component { .. } => ObjectKind::Component,
            ObjectData::Controller(_) => ObjectKind::Controller,
            ObjectData::View { .. } => ObjectKind::View,
            ObjectData::Buffer { .. } => ObjectKind::Buffer,
        }
    }

    pub fn is_reaped(&self) -> bool {
        self.state == ObjectLifecycleState::Reaped
    }
}

impl Introspectable for SceneObject {
    fn get_property(&self, property_id: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property_id)
    }

    fn set_property(&mut self, property_id: PropertyId, value: PropertyValue) {
        self.properties.insert(property_id, value);
    }

    fn property_ids(&self) -> Vec<PropertyId> {
        self.properties.keys().copied().collect()
    }
}

/// Hook run on every object just before it is unlinked by [`Scene::reap`]
pub type ReapHook = Box<dyn FnMut(ObjectHandle, &SceneObject) + Send>;

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<SceneObject>,
}

/// Generational arena of scene objects
#[derive(Default)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    reap_hooks: Vec<ReapHook>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("slots", &self.slots)
            .field("free", &self.free)
            .field("reap_hooks", &self.reap_hooks.len())
            .finish()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new object and return its handle
    pub fn insert(&mut self, object: SceneObject) -> ObjectHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectHandle::new(index, slot.generation);
        }

        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectHandle::new((self.slots.len() - 1) as u32, 0)
    }

    /// Look up an object, including reaped ones that are not yet collected
    pub fn get(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.object.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut SceneObject> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.object.as_mut())
    }

    /// Check whether a handle refers to an object still linked into the graph
    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.get(handle).map_or(false, |object| !object.is_reaped())
    }

    /// Handles of every live object
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.object {
                Some(object) if !object.is_reaped() => {
                    Some(ObjectHandle::new(index as u32, slot.generation))
                }
                _ => None,
            })
            .collect()
    }

    /// Handles of every live object of a kind
    pub fn handles_of_kind(&self, kind: ObjectKind) -> Vec<ObjectHandle> {
        self.handles()
            .into_iter()
            .filter(|handle| self.get(*handle).map_or(false, |object| object.kind() == kind))
            .collect()
    }

    /// Number of occupied slots (live and reaped)
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.object.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every object. Reap hooks are kept.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
    }

    pub fn add_reap_hook(&mut self, hook: ReapHook) {
        self.reap_hooks.push(hook);
    }

    fn live_mut(&mut self, handle: ObjectHandle) -> Result<&mut SceneObject, SyncError> {
        match self.get_mut(handle) {
            Some(object) if !object.is_reaped() => Ok(object),
            _ => Err(SyncError::StaleHandle),
        }
    }

    /// Get a property value of a live object
    pub fn get_property(&self, handle: ObjectHandle, property_id: PropertyId) -> Option<&PropertyValue> {
        self.get(handle).and_then(|object| object.get_property(property_id))
    }

    /// Set a property value. This never logs; the caller owns the change log.
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        property_id: PropertyId,
        value: PropertyValue,
    ) -> Result<(), SyncError> {
        self.live_mut(handle)?.set_property(property_id, value);
        Ok(())
    }

    /// Make `child` a child of `parent`, unlinking it from any previous parent
    pub fn add_child(&mut self, parent: ObjectHandle, child: ObjectHandle) -> Result<(), SyncError> {
        if parent == child {
            return Err(SyncError::InvalidOperation("entity can't parent itself".to_string()));
        }

        match &self.live_mut(parent)?.data {
            ObjectData::Entity { .. } => {}
            _ => return Err(SyncError::InvalidOperation("parent is not an entity".to_string())),
        }
        match &self.live_mut(child)?.data {
            ObjectData::Entity { .. } => {}
            _ => return Err(SyncError::InvalidOperation("child is not an entity".to_string())),
        }

        self.unlink_entity(child);

        if let ObjectData::Entity { children, .. } = &mut self.live_mut(parent)?.data {
            children.push(child);
        }
        if let ObjectData::Entity { parent: slot, .. } = &mut self.live_mut(child)?.data {
            *slot = Some(parent);
        }
        Ok(())
    }

    /// Attach a component to an entity
    pub fn attach_component(&mut self, entity: ObjectHandle, component: ObjectHandle) -> Result<(), SyncError> {
        match &self.live_mut(component)?.data {
            ObjectData::Component { entity: None, .. } => {}
            ObjectData::Component { .. } => {
                return Err(SyncError::InvalidOperation("component is already attached".to_string()))
            }
            _ => return Err(SyncError::InvalidOperation("object is not a component".to_string())),
        }

        match &mut self.live_mut(entity)?.data {
            ObjectData::Entity { components, .. } => components.push(component),
            _ => return Err(SyncError::InvalidOperation("owner is not an entity".to_string())),
        }

        if let ObjectData::Component { entity: owner, .. } = &mut self.live_mut(component)?.data {
            *owner = Some(entity);
        }
        Ok(())
    }

    /// The entity a component is attached to
    pub fn component_owner(&self, component: ObjectHandle) -> Option<ObjectHandle> {
        match self.get(component).map(|object| &object.data) {
            Some(ObjectData::Component { entity, .. }) => *entity,
            _ => None,
        }
    }

    /// Components attached to an entity
    pub fn components_of(&self, entity: ObjectHandle) -> Vec<ObjectHandle> {
        match self.get(entity).map(|object| &object.data) {
            Some(ObjectData::Entity { components, .. }) => components.clone(),
            _ => Vec::new(),
        }
    }

    /// Children of an entity
    pub fn children_of(&self, entity: ObjectHandle) -> Vec<ObjectHandle> {
        match self.get(entity).map(|object| &object.data) {
            Some(ObjectData::Entity { children, .. }) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Parent of an entity
    pub fn parent_of(&self, entity: ObjectHandle) -> Option<ObjectHandle> {
        match self.get(entity).map(|object| &object.data) {
            Some(ObjectData::Entity { parent, .. }) => *parent,
            _ => None,
        }
    }

    fn unlink_entity(&mut self, child: ObjectHandle) {
        let parent = self.parent_of(child);
        if let Some(parent) = parent {
            if let Some(ObjectData::Entity { children, .. }) = self.get_mut(parent).map(|object| &mut object.data) {
                children.retain(|handle| *handle != child);
            }
        }
        if let Some(ObjectData::Entity { parent, .. }) = self.get_mut(child).map(|object| &mut object.data) {
            *parent = None;
        }
    }

    fn unlink_component(&mut self, component: ObjectHandle) {
        if let Some(entity) = self.component_owner(component) {
            if let Some(ObjectData::Entity { components, .. }) = self.get_mut(entity).map(|object| &mut object.data) {
                components.retain(|handle| *handle != component);
            }
        }
        if let Some(ObjectData::Component { entity, .. }) = self.get_mut(component).map(|object| &mut object.data) {
            *entity = None;
        }
    }

    /// Reap an object and everything it owns.
    ///
    /// Entities take their children and components with them. Controller
    /// properties that target a reaped object are dropped. Returns every
    /// reaped handle, the root first.
    pub fn reap(&mut self, handle: ObjectHandle) -> Result<Vec<ObjectHandle>, SyncError> {
        self.live_mut(handle)?;

        let mut reaped = Vec::new();
        let mut pending = vec![handle];

        while let Some(next) = pending.pop() {
            let Some(object) = self.get(next) else { continue };
            if object.is_reaped() {
                continue;
            }

            if let ObjectData::Entity { children, components, .. } = &object.data {
                pending.extend(children.iter().copied());
                pending.extend(components.iter().copied());
            }

            // Hooks observe the object while it is still linked
            let mut hooks = std::mem::take(&mut self.reap_hooks);
            if let Some(object) = self.get(next) {
                for hook in hooks.iter_mut() {
                    hook(next, object);
                }
            }
            self.reap_hooks = hooks;

            match self.get(next).map(|object| object.kind()) {
                Some(ObjectKind::Entity) => self.unlink_entity(next),
                Some(ObjectKind::Component) => self.unlink_component(next),
                _ => {}
            }

            if let Some(object) = self.get_mut(next) {
                object.state = ObjectLifecycleState::Reaped;
                match &mut object.data {
                    ObjectData::Buffer { data } => *data = Vec::new(),
                    ObjectData::Controller(state) => state.properties.clear(),
                    ObjectData::Component { attributes, .. } => attributes.clear(),
                    ObjectData::View { camera } => *camera = None,
                    ObjectData::Entity { .. } => {}
                }
            }

            trace!("Reaped object {:?}", next);
            reaped.push(next);
        }

        // Controllers must not keep driving reaped objects
        for controller in self.handles_of_kind(ObjectKind::Controller) {
            if let Some(ObjectData::Controller(state)) = self.get_mut(controller).map(|object| &mut object.data) {
                state.properties.retain(|prop| !reaped.contains(&prop.object));
            }
        }

        debug!("Reaped {} object(s) rooted at {:?}", reaped.len(), handle);
        Ok(reaped)
    }

    /// Free the slot of a reaped object. Returns false for live or unknown handles.
    pub fn release(&mut self, handle: ObjectHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index() as usize) else {
            return false;
        };
        if slot.generation != handle.generation() {
            return false;
        }

        match &slot.object {
            Some(object) if object.is_reaped() => {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index());
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn entity(scene: &mut Scene, label: &str) -> ObjectHandle {
        scene.insert(SceneObject::new(label, ObjectData::new_entity()))
    }

    #[test]
    fn reap_takes_subtree_and_keeps_slot() {
        let mut scene = Scene::new();
        let root = entity(&mut scene, "root");
        let child = entity(&mut scene, "child");
        let grandchild = entity(&mut scene, "grandchild");
        let mesh = scene.insert(SceneObject::new("mesh", ObjectData::new_component("mesh")));

        scene.add_child(root, child).unwrap();
        scene.add_child(child, grandchild).unwrap();
        scene.attach_component(child, mesh).unwrap();

        let reaped = scene.reap(child).unwrap();
        assert_eq!(reaped[0], child);
        assert_eq!(reaped.len(), 3);
        assert!(scene.children_of(root).is_empty());

        // Reaped handles still resolve until released
        assert!(scene.get(grandchild).is_some());
        assert!(!scene.is_live(grandchild));
        assert!(scene.is_live(root));

        assert!(scene.release(child));
        assert!(scene.get(child).is_none());

        // Reused slot gets a new generation
        let reused = entity(&mut scene, "reused");
        assert_eq!(reused.index(), child.index());
        assert_ne!(reused, child);
        assert!(scene.get(child).is_none());
    }

    #[test]
    fn release_refuses_live_objects() {
        let mut scene = Scene::new();
        let root = entity(&mut scene, "root");
        assert!(!scene.release(root));
        assert!(scene.is_live(root));
    }

    #[test]
    fn reap_hooks_run_before_unlink() {
        let mut scene = Scene::new();
        let root = entity(&mut scene, "root");
        let child = entity(&mut scene, "child");
        scene.add_child(root, child).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        scene.add_reap_hook(Box::new(move |handle, object| {
            let linked = matches!(object.data, ObjectData::Entity { parent: Some(_), .. });
            sink.lock().unwrap().push((handle, linked));
        }));

        scene.reap(child).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(child, true)]);
    }

    #[test]
    fn controller_path_evaluation() {
        let mut scene = Scene::new();
        let target = entity(&mut scene, "target");
        let mut prop = ControllerProperty::new(target, 3);
        prop.method = PropertyMethod::Path;
        prop.add_node(1.0, PropertyValue::Float(10.0));
        prop.add_node(0.0, PropertyValue::Float(0.0));
        prop.add_node(2.0, PropertyValue::Float(0.0));

        assert_eq!(prop.path[0].t, 0.0);
        assert_eq!(prop.evaluate(0.5), Some(PropertyValue::Float(5.0)));
        assert_eq!(prop.evaluate(1.5), Some(PropertyValue::Float(5.0)));
        assert_eq!(prop.evaluate(9.0), Some(PropertyValue::Float(0.0)));

        assert!(prop.set_node(1.0, PropertyValue::Float(20.0)));
        assert_eq!(prop.evaluate(1.0), Some(PropertyValue::Float(20.0)));
        assert!(prop.delete_node(1.0));
        assert!(!prop.delete_node(1.0));
    }
}
