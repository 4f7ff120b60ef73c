//! # Simulation Logic
//!
//! The hook through which application behaviour runs inside the simulator,
//! and the context it gets to work with. Property sets made through the
//! context are logged; structural changes are applied locally and queued
//! as operations for the frontend, in the order they happen.

use log::{debug, warn};

use rigsync_shared::gc::GarbageCollector;
use rigsync_shared::messages::{SelectAction, SimulatorAction};
use rigsync_shared::object::*;
use rigsync_shared::operation::ApplyContext;
use rigsync_shared::{
    Operation, OperationQueue, PropertyChangeLog, PropertyId, PropertyValue, Scene, SceneRegistry, SyncError,
    ObjectId, NULL_OBJECT_ID,
};

use crate::input::SimulatorEvent;

/// Application behaviour driven by the simulator
pub trait SimulationLogic: Send {
    /// Called once after a UI has been loaded
    fn loaded(&mut self, _ctx: &mut SimulatorContext<'_>) -> Result<(), SyncError> {
        Ok(())
    }

    /// Called once per frame with the frame's translated input
    fn frame(&mut self, ctx: &mut SimulatorContext<'_>, events: &[SimulatorEvent]) -> Result<(), SyncError>;
}

/// Logic that does nothing
#[derive(Debug, Default)]
pub struct NoLogic;

impl SimulationLogic for NoLogic {
    fn frame(&mut self, _ctx: &mut SimulatorContext<'_>, _events: &[SimulatorEvent]) -> Result<(), SyncError> {
        Ok(())
    }
}

/// What simulation logic can see and touch during a frame
pub struct SimulatorContext<'a> {
    pub(crate) scene: &'a mut Scene,
    pub(crate) registry: &'a mut SceneRegistry,
    pub(crate) gc: &'a mut GarbageCollector<ObjectHandle>,
    pub(crate) log: &'a mut PropertyChangeLog,
    pub(crate) queue: &'a mut OperationQueue,
    pub(crate) actions: &'a mut Vec<SimulatorAction>,
    pub(crate) queue_frame: &'a mut bool,
    pub(crate) play_mode: bool,
    pub(crate) elapsed: f64,
}

impl<'a> SimulatorContext<'a> {
    pub fn scene(&self) -> &Scene {
        self.scene
    }

    pub fn play_mode(&self) -> bool {
        self.play_mode
    }

    /// Seconds of timeline progress since the last load
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The canonical id of a local object
    pub fn id_of(&self, handle: ObjectHandle) -> Option<ObjectId> {
        self.registry.id_of(&handle)
    }

    /// The local object behind a canonical id
    pub fn lookup(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.registry.lookup(id)
    }

    /// Set a live property and log the change.
    ///
    /// Object references in `value` are local handle references
    /// (`ObjectHandle::to_raw`).
    pub fn set_property(
        &mut self,
        object: ObjectHandle,
        property_id: PropertyId,
        value: PropertyValue,
    ) -> Result<(), SyncError> {
        self.scene.set_property(object, property_id, value.clone())?;
        self.log.record(object, property_id, value);
        Ok(())
    }

    /// Set a property only if its value changes. Returns whether it did.
    pub fn update_property(
        &mut self,
        object: ObjectHandle,
        property_id: PropertyId,
        value: PropertyValue,
    ) -> Result<bool, SyncError> {
        if self.scene.get_property(object, property_id) == Some(&value) {
            return Ok(false);
        }
        self.set_property(object, property_id, value)?;
        Ok(true)
    }

    /// Apply an operation locally and queue it for the frontend.
    ///
    /// Ids in `op` are canonical ids.
    pub fn submit(&mut self, op: Operation) -> Result<(), SyncError> {
        let previous = self.log.set_enabled(false);
        let result = {
            let mut ctx = ApplyContext::new(self.scene, self.registry, self.gc);
            op.apply(&mut ctx)
        };
        self.log.set_enabled(previous);

        match result {
            Ok(()) => {
                self.queue.push(op, self.log.len() as u32);
                Ok(())
            }
            Err(err) => {
                warn!("Simulation logic submitted a failing {}: {}", op.kind(), err);
                Err(err)
            }
        }
    }

    fn require_id(&self, handle: ObjectHandle) -> Result<ObjectId, SyncError> {
        self.registry
            .id_of(&handle)
            .ok_or_else(|| SyncError::InvalidOperation(format!("{:?} is not registered", handle)))
    }

    fn submit_created(&mut self, op: Operation) -> Result<ObjectHandle, SyncError> {
        let id = op.created_id().unwrap_or(NULL_OBJECT_ID);
        self.submit(op)?;
        self.registry.resolve(id)
    }

    pub fn add_entity(&mut self, parent: Option<ObjectHandle>, label: &str) -> Result<ObjectHandle, SyncError> {
        let parent_id = match parent {
            Some(parent) => self.require_id(parent)?,
            None => NULL_OBJECT_ID,
        };
        let id = self.registry.allocate_canonical_id()?;
        self.submit_created(Operation::AddEntity {
            parent_id,
            entity: EntityDesc { id, label: label.to_string(), properties: Vec::new() },
        })
    }

    pub fn add_component(&mut self, entity: ObjectHandle, type_name: &str) -> Result<ObjectHandle, SyncError> {
        let entity_id = self.require_id(entity)?;
        let id = self.registry.allocate_canonical_id()?;
        self.submit_created(Operation::AddComponent {
            entity_id,
            component: ComponentDesc { id, type_name: type_name.to_string(), properties: Vec::new() },
        })
    }

    pub fn add_controller(&mut self, label: &str) -> Result<ObjectHandle, SyncError> {
        let id = self.registry.allocate_canonical_id()?;
        self.submit_created(Operation::AddController {
            controller: ControllerDesc { id, label: label.to_string() },
        })
    }

    pub fn add_buffer(&mut self, data: Vec<u8>) -> Result<ObjectHandle, SyncError> {
        let id = self.registry.allocate_canonical_id()?;
        self.submit_created(Operation::AddBuffer { buffer: BufferDesc { id, data } })
    }

    /// Delete any object, taking whatever it owns with it
    pub fn delete(&mut self, handle: ObjectHandle) -> Result<(), SyncError> {
        let id = self.require_id(handle)?;
        let kind = self.scene.get(handle).map(|object| object.kind()).ok_or(SyncError::StaleHandle)?;
        let op = match kind {
            ObjectKind::Entity => Operation::DeleteEntity { entity_id: id },
            ObjectKind::Component => Operation::DeleteComponent { component_id: id },
            ObjectKind::Controller => Operation::DeleteController { controller_id: id },
            ObjectKind::View => Operation::DeleteView { view_id: id },
            ObjectKind::Buffer => Operation::DeleteBuffer { buffer_id: id },
        };
        self.submit(op)
    }

    /// Ask the frontend to select an object
    pub fn select(&mut self, object: Option<ObjectHandle>, action: SelectAction) {
        let object_id = object.and_then(|handle| self.registry.id_of(&handle)).unwrap_or(NULL_OBJECT_ID);
        self.actions.push(SimulatorAction::SelectObject { object_id, action });
    }

    /// Ask the frontend to switch play mode
    pub fn request_play_mode(&mut self, enabled: bool) {
        debug!("Requesting play mode {}", enabled);
        self.actions.push(SimulatorAction::SetPlayMode { enabled });
    }

    /// Ask for another frame as soon as this one has been replayed
    pub fn queue_frame(&mut self) {
        *self.queue_frame = true;
    }
}
