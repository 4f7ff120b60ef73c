//! # SimulatorModule
//!
//! The simulator role. It owns the canonical copy of the scene and is the id
//! authority. For every FrameSetup it:
//!
//! 1. applies view and play mode changes,
//! 2. applies the frontend's edits with the change log suspended, handing
//!    out canonical ids for objects created under temporary ids,
//! 3. translates input, advances the timeline and runs the simulation logic
//!    with logging enabled,
//! 4. answers with a UIDiff holding the frame's property changes, queued
//!    operations and actions,
//! 5. collects the objects reaped during the frame.

pub mod input;
pub mod logic;
pub mod timeline;
pub mod frame;

use std::net::{TcpListener, TcpStream};
use log::{debug, info, warn, Level};

use rigsync_shared::constants::logging::SIMULATOR_SCOPE;
use rigsync_shared::context;
use rigsync_shared::gc::GarbageCollector;
use rigsync_shared::messages::*;
use rigsync_shared::operation::{map_and_apply_batch, ApplyContext, TemporaryIdMap};
use rigsync_shared::stream::FramedStream;
use rigsync_shared::{
    scoped_log, ObjectHandle, ObjectId, Operation, OperationQueue, PropertyChangeLog, Scene, SceneRegistry,
    Stream, SyncConfig, SyncError,
};

use crate::input::{InputState, SimulatorEvent};
use crate::logic::NoLogic;
use crate::timeline::Timeline;

pub use crate::logic::{SimulationLogic, SimulatorContext};

/// The simulator role
pub struct Simulator {
    config: SyncConfig,
    scene: Scene,
    registry: SceneRegistry,
    gc: GarbageCollector<ObjectHandle>,
    log: PropertyChangeLog,
    queue: OperationQueue,
    actions: Vec<SimulatorAction>,
    input: InputState,
    timeline: Timeline,
    logic: Box<dyn SimulationLogic>,
    play_mode: bool,
    view_size: Option<ViewSize>,
    queue_frame: bool,
    frames: u64,
}

impl Simulator {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_logic(config, Box::new(NoLogic))
    }

    pub fn with_logic(config: SyncConfig, logic: Box<dyn SimulationLogic>) -> Self {
        let capture = config.backtraces_enabled();
        Self {
            config,
            scene: Scene::new(),
            registry: SceneRegistry::new_authority(),
            gc: GarbageCollector::new(),
            log: PropertyChangeLog::new(),
            queue: OperationQueue::new(capture),
            actions: Vec::new(),
            input: InputState::new(),
            timeline: Timeline::new(),
            logic,
            play_mode: false,
            view_size: None,
            queue_frame: false,
            frames: 0,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    pub fn play_mode(&self) -> bool {
        self.play_mode
    }

    pub fn view_size(&self) -> Option<ViewSize> {
        self.view_size
    }

    pub fn elapsed(&self) -> f64 {
        self.timeline.elapsed()
    }

    /// Number of frames handled so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Resolve a canonical id
    pub fn lookup(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.registry.lookup(id)
    }

    fn context(&mut self) -> SimulatorContext<'_> {
        SimulatorContext {
            scene: &mut self.scene,
            registry: &mut self.registry,
            gc: &mut self.gc,
            log: &mut self.log,
            queue: &mut self.queue,
            actions: &mut self.actions,
            queue_frame: &mut self.queue_frame,
            play_mode: self.play_mode,
            elapsed: self.timeline.elapsed(),
        }
    }

    /// Apply a batch from the frontend with logging suspended.
    ///
    /// Returns the (temporary, canonical) pairs handed out and the number of
    /// failed operations.
    fn apply_inbound(&mut self, ops: &[Operation], batch: &str) -> (Vec<(ObjectId, ObjectId)>, usize) {
        let mut registrations = Vec::new();
        let previous = self.log.set_enabled(false);

        let mut errors = {
            let mut mapper = TemporaryIdMap::new();
            let mut ctx = ApplyContext::new(&mut self.scene, &mut self.registry, &mut self.gc)
                .with_registrations(&mut registrations)
                .with_max_buffer_size(self.config.max_frame_size);
            map_and_apply_batch(ops, &mut mapper, &mut ctx)
        };

        self.log.set_enabled(previous);

        let failed = errors.len();
        errors.log_and_clear(batch);
        (registrations, failed)
    }

    /// Run one frame and build its UIDiff
    pub fn handle_frame(&mut self, setup: FrameSetup) -> UiDiff {
        let _scope = context::enter(SIMULATOR_SCOPE);
        scoped_log!(Level::Debug, "Frame {}: {} event(s), progress {:.4}", setup.frame, setup.events.len(), setup.progress);

        if let Some(size) = setup.view_resize {
            debug!("View resized to {}x{}", size.width, size.height);
            self.view_size = Some(size);
        }
        if let Some(offset) = setup.view_offset {
            self.input.set_view_offset(offset);
        }
        if let Some(play_mode) = setup.play_mode {
            if play_mode != self.play_mode {
                info!("Play mode {}", if play_mode { "on" } else { "off" });
            }
            self.play_mode = play_mode;
        }

        if let Some(edit) = setup.edit.as_ref() {
            let (registrations, failed) = self.apply_inbound(edit, "frame edit");
            for (temporary_id, canonical_id) in registrations {
                self.queue.push(
                    Operation::RegisterObject { temporary_id, canonical_id },
                    self.log.len() as u32,
                );
            }
            if failed > 0 {
                self.actions.push(SimulatorAction::EditFailed);
            }
        }

        self.log.set_enabled(true);

        let events: Vec<SimulatorEvent> = setup
            .events
            .iter()
            .map(|event| self.input.translate(event, &self.registry, &self.scene))
            .collect();

        self.timeline.advance(setup.progress);

        let mut logic = std::mem::replace(&mut self.logic, Box::new(NoLogic));
        {
            let mut ctx = self.context();
            if let Err(err) = timeline::progress_controllers(&mut ctx) {
                warn!("Controller progression failed: {}", err);
            }
            if let Err(err) = logic.frame(&mut ctx, &events) {
                warn!("Simulation logic failed: {}", err);
            }
        }
        self.logic = logic;

        self.log.set_enabled(false);

        let diff = UiDiff {
            frame: setup.frame,
            changes: frame::export_changes(self.log.take(), &self.registry),
            operations: self.queue.take(),
            actions: std::mem::take(&mut self.actions),
            queue_frame: std::mem::take(&mut self.queue_frame),
        };

        // Every id the diff needs has been exported, so reaped objects can go
        let Self { gc, registry, scene, .. } = &mut *self;
        gc.collect(|handle| {
            registry.unregister_object(&handle);
            scene.release(handle);
        });

        self.frames += 1;
        diff
    }

    /// Replace the scene with a UI description
    pub fn handle_load(&mut self, ui: UiDescription) -> LoadResult {
        let _scope = context::enter(SIMULATOR_SCOPE);
        scoped_log!(Level::Info, "Loading UI of {} operation(s)", ui.ops.len());

        self.scene.clear();
        self.registry.clear();
        self.gc.clear();
        self.log.clear();
        self.queue.clear();
        self.actions.clear();
        self.input.reset();
        self.timeline.reset();

        let (registrations, failed) = self.apply_inbound(&ui.ops, "load");

        self.log.set_enabled(true);
        let mut logic = std::mem::replace(&mut self.logic, Box::new(NoLogic));
        if let Err(err) = logic.loaded(&mut self.context()) {
            warn!("Simulation logic failed after load: {}", err);
        }
        self.logic = logic;
        self.log.set_enabled(false);

        LoadResult {
            registrations,
            failed: failed as u32,
        }
    }

    pub fn handle_request(&mut self, request: SimulatorRequest) -> SimulatorReply {
        match request {
            SimulatorRequest::Frame(setup) => SimulatorReply::Diff(self.handle_frame(setup)),
            SimulatorRequest::Load(ui) => SimulatorReply::Load(self.handle_load(ui)),
        }
    }

    /// Answer every request already waiting on `stream`.
    ///
    /// Used when the simulator runs inside the frontend's loop. Returns the
    /// number of requests handled.
    pub fn poll<S>(&mut self, stream: &mut S) -> Result<usize, SyncError>
    where
        S: Stream<SimulatorReply, SimulatorRequest> + ?Sized,
    {
        let mut handled = 0;
        while let Some(request) = stream.try_recv()? {
            let reply = self.handle_request(request);
            stream.send(reply)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Serve requests until the peer goes away
    pub fn run<S>(&mut self, stream: &mut S) -> Result<(), SyncError>
    where
        S: Stream<SimulatorReply, SimulatorRequest> + ?Sized,
    {
        info!("Simulator running");
        loop {
            let request = match stream.recv_blocking() {
                Ok(request) => request,
                Err(SyncError::Disconnected) => {
                    info!("Frontend disconnected, simulator stopping");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            let reply = self.handle_request(request);
            match stream.send(reply) {
                Ok(()) => {}
                Err(SyncError::Disconnected) => {
                    info!("Frontend disconnected, simulator stopping");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Accept one frontend on `listener` and serve it until it goes away
    pub fn serve(&mut self, listener: &TcpListener) -> Result<(), SyncError> {
        let (socket, peer) = listener.accept()?;
        socket.set_nodelay(true)?;
        info!("Frontend connected from {}", peer);

        let mut stream: FramedStream<TcpStream, SimulatorReply, SimulatorRequest> =
            FramedStream::with_max_frame_size(socket, self.config.max_frame_size);
        self.run(&mut stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigsync_shared::object::*;
    use rigsync_shared::{ObjectData, PropertyValue, PropertyMethod, is_canonical_id};
    use std::sync::Once;

    static SET_LOGGER_ONCE: Once = Once::new();

    fn init_logger() {
        SET_LOGGER_ONCE.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    fn entity(id: ObjectId) -> Operation {
        Operation::AddEntity {
            parent_id: 0,
            entity: EntityDesc { id, label: "e".to_string(), properties: Vec::new() },
        }
    }

    fn frame(frame: u64, edit: Option<Vec<Operation>>) -> FrameSetup {
        FrameSetup { frame, edit, ..Default::default() }
    }

    #[test]
    fn edits_with_temporary_ids_get_registered() {
        init_logger();
        let mut simulator = Simulator::new(SyncConfig::default());

        let diff = simulator.handle_frame(frame(
            1,
            Some(vec![
                entity(1),
                Operation::SetProperty { object_id: 1, property_id: 4, value: PropertyValue::Float(2.0) },
                Operation::SetProperty { object_id: 77, property_id: 4, value: PropertyValue::Float(2.0) },
            ]),
        ));

        assert_eq!(diff.frame, 1);
        assert!(diff.changes.is_empty(), "edits are not logged back");
        assert_eq!(diff.operations.len(), 1);
        assert_eq!(diff.operations[0].sequence, 0);
        let canonical = match diff.operations[0].op {
            Operation::RegisterObject { temporary_id: 1, canonical_id } => canonical_id,
            ref other => panic!("unexpected {:?}", other),
        };
        assert!(is_canonical_id(canonical));
        assert_eq!(diff.actions, vec![SimulatorAction::EditFailed]);

        let handle = simulator.lookup(canonical).unwrap();
        assert_eq!(simulator.scene().get_property(handle, 4), Some(&PropertyValue::Float(2.0)));
    }

    struct Spawner {
        spawned: Option<ObjectHandle>,
    }

    impl SimulationLogic for Spawner {
        fn frame(&mut self, ctx: &mut SimulatorContext<'_>, events: &[SimulatorEvent]) -> Result<(), SyncError> {
            match self.spawned {
                None => {
                    let entity = ctx.add_entity(None, "spawned")?;
                    ctx.set_property(entity, 1, PropertyValue::Float(1.0))?;
                    let light = ctx.add_component(entity, "light")?;
                    ctx.set_property(light, 2, PropertyValue::Object(entity.to_raw()))?;
                    ctx.select(Some(entity), SelectAction::Replace);
                    ctx.queue_frame();
                    self.spawned = Some(entity);
                }
                Some(entity) => {
                    if !events.is_empty() {
                        ctx.delete(entity)?;
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn logic_changes_are_interleaved_and_collected() {
        init_logger();
        let mut simulator = Simulator::with_logic(SyncConfig::default(), Box::new(Spawner { spawned: None }));

        let diff = simulator.handle_frame(frame(1, None));
        let kinds: Vec<_> = diff.operations.iter().map(|r| (r.op.kind(), r.sequence)).collect();
        assert_eq!(
            kinds,
            vec![
                (rigsync_shared::OperationKind::AddEntity, 0),
                (rigsync_shared::OperationKind::AddComponent, 1),
            ]
        );
        assert_eq!(diff.changes.len(), 2);
        let entity_id = diff.operations[0].op.created_id().unwrap();
        assert_eq!(diff.changes[1].value, PropertyValue::Object(entity_id));
        assert!(diff.queue_frame);
        assert_eq!(
            diff.actions,
            vec![SimulatorAction::SelectObject { object_id: entity_id, action: SelectAction::Replace }]
        );

        let mut setup = frame(2, None);
        setup.events.push(InputEvent::KeyDown { view_id: 0, keysym: 32, modifiers: 0 });
        let diff = simulator.handle_frame(setup);
        assert_eq!(diff.operations.len(), 1);
        assert_eq!(diff.operations[0].op, Operation::DeleteEntity { entity_id });
        assert!(!diff.queue_frame);

        // Collected once the diff was built
        assert!(simulator.lookup(entity_id).is_none());
        assert!(simulator.scene().is_empty());
    }

    #[test]
    fn controllers_drive_properties_without_relogging() {
        init_logger();
        let mut simulator = Simulator::new(SyncConfig::default());
        let load = simulator.handle_load(UiDescription {
            ops: vec![
                entity(1),
                Operation::AddController { controller: ControllerDesc { id: 3, label: "t".to_string() } },
                Operation::ControllerPathAddNode {
                    controller_id: 3,
                    object_id: 1,
                    property_id: 5,
                    t: 0.0,
                    value: PropertyValue::Float(0.0),
                },
                Operation::ControllerPathAddNode {
                    controller_id: 3,
                    object_id: 1,
                    property_id: 5,
                    t: 1.0,
                    value: PropertyValue::Float(10.0),
                },
                Operation::ControllerPropertySetMethod {
                    controller_id: 3,
                    object_id: 1,
                    property_id: 5,
                    method: PropertyMethod::Path,
                },
            ],
        });
        assert_eq!(load.failed, 0);
        assert_eq!(load.registrations.len(), 2);
        let entity_id = load.registrations[0].1;

        let mut setup = frame(1, None);
        setup.progress = 0.5;
        let diff = simulator.handle_frame(setup);
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].object_id, entity_id);
        assert_eq!(diff.changes[0].value, PropertyValue::Float(5.0));

        // No progress, no change
        let diff = simulator.handle_frame(frame(2, None));
        assert!(diff.changes.is_empty());

        let handle = simulator.lookup(entity_id).unwrap();
        assert!(matches!(simulator.scene().get(handle).unwrap().data, ObjectData::Entity { .. }));
    }

    #[test]
    fn view_and_play_mode_apply_before_events() {
        let mut simulator = Simulator::new(SyncConfig::default());
        let setup = FrameSetup {
            frame: 1,
            view_resize: Some(ViewSize { width: 640, height: 480 }),
            play_mode: Some(true),
            ..Default::default()
        };
        simulator.handle_frame(setup);
        assert!(simulator.play_mode());
        assert_eq!(simulator.view_size(), Some(ViewSize { width: 640, height: 480 }));
        assert_eq!(simulator.frames(), 1);
    }
}
