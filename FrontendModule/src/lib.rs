//! # FrontendModule
//!
//! The frontend role. It holds a replica of the scene for display and talks
//! to the simulator one request at a time:
//!
//! - input, timeline progress, view changes and local edits are gathered
//!   between frames and sent together in the next FrameSetup,
//! - the UIDiff that answers it is replayed onto the replica, its actions
//!   are handled, diff observers run, and only then are reaped objects
//!   collected,
//! - loading a UI description replaces the replica and is answered with the
//!   canonical ids of everything the load created.

pub mod sync;
pub mod diff;
pub mod load;
pub mod topology;

use std::collections::HashMap;
use log::{debug, info, warn, Level};

use rigsync_shared::constants::logging::FRONTEND_SCOPE;
use rigsync_shared::context;
use rigsync_shared::error::OperationFailure;
use rigsync_shared::messages::*;
use rigsync_shared::operation::{ApplyContext, IdMap};
use rigsync_shared::{
    scoped_log, BatchErrors, GarbageCollector, ObjectHandle, ObjectId, Operation, Scene, SceneRegistry,
    is_canonical_id, Stream, SyncConfig, SyncError, NULL_OBJECT_ID,
};
use rigsync_simulator::SimulationLogic;

use crate::diff::replay_diff;
use crate::load::load_description;
use crate::sync::{FrameSynchronizer, Outstanding, SyncState};
use crate::topology::{SimulatorLink, SimulatorStream};

/// Called with every accepted UIDiff after it was replayed.
///
/// Objects the diff reaped are still registered at this point.
pub type DiffObserver = Box<dyn FnMut(&UiDiff, &Scene, &SceneRegistry)>;

/// What one call to [`Frontend::tick`] or [`Frontend::wait`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Requests sent, in order
    pub sent: Vec<Outstanding>,

    /// Edits carried by the frame requests sent
    pub forwarded_edits: usize,

    /// UIDiffs replayed
    pub diffs: usize,

    /// LoadResults accepted
    pub loads: usize,

    /// Replies that didn't answer the outstanding request
    pub dropped: usize,

    /// Objects collected after replay
    pub collected: usize,
}

/// Maps ids of locally made edits.
///
/// Created objects without an id get a temporary one, and temporary ids the
/// simulator has since replaced are swapped for their canonical ids. New
/// objects can't be named with a canonical id; only the simulator hands
/// those out.
struct LocalEditMap<'a> {
    registry: &'a mut SceneRegistry,
    rewritten: &'a HashMap<ObjectId, ObjectId>,
}

impl<'a> IdMap for LocalEditMap<'a> {
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        Ok(self.rewritten.get(&id).copied().unwrap_or(id))
    }

    fn map_new_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        if id == NULL_OBJECT_ID {
            self.registry.reserve_temporary_id()
        } else if is_canonical_id(id) {
            Err(SyncError::InvalidOperation(format!(
                "new objects need a temporary id, {} is canonical",
                id
            )))
        } else {
            self.map_id(id)
        }
    }
}

/// Brings queued edits up to date with temporary ids rewritten since they
/// were queued
struct RewriteMap<'a> {
    rewritten: &'a HashMap<ObjectId, ObjectId>,
}

impl<'a> IdMap for RewriteMap<'a> {
    fn map_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        Ok(self.rewritten.get(&id).copied().unwrap_or(id))
    }

    fn map_new_id(&mut self, id: ObjectId) -> Result<ObjectId, SyncError> {
        self.map_id(id)
    }
}

/// The frontend role
pub struct Frontend {
    config: SyncConfig,
    scene: Scene,
    registry: SceneRegistry,
    gc: GarbageCollector<ObjectHandle>,
    sync: FrameSynchronizer,
    stream: SimulatorStream,
    link: SimulatorLink,

    // Gathered for the next FrameSetup
    events: Vec<InputEvent>,
    progress: f64,
    edits: Vec<Operation>,
    view_resize: Option<ViewSize>,
    view_offset: Option<ViewOffset>,
    play_mode_request: Option<bool>,

    pending_load: Option<UiDescription>,
    loaded: Option<HashMap<ObjectId, ObjectHandle>>,

    /// Temporary ids replaced by the simulator since the last load
    rewritten: HashMap<ObjectId, ObjectId>,

    play_mode: bool,
    selection: Vec<ObjectHandle>,
    edit_failures: u32,
    observers: Vec<DiffObserver>,
}

impl Frontend {
    /// Start or connect to the simulator named by `config.topology`
    pub fn new(config: SyncConfig, logic: Box<dyn SimulationLogic>) -> Result<Self, SyncError> {
        let (stream, link) = topology::connect(&config, logic)?;
        Ok(Self::with_link(config, stream, link))
    }

    /// Use a simulator stream set up by the caller
    pub fn with_stream(config: SyncConfig, stream: SimulatorStream) -> Self {
        Self::with_link(config, stream, SimulatorLink::Remote)
    }

    fn with_link(config: SyncConfig, stream: SimulatorStream, link: SimulatorLink) -> Self {
        debug!("Frontend created with {:?} simulator", link);
        Self {
            config,
            scene: Scene::new(),
            registry: SceneRegistry::new_peer(),
            gc: GarbageCollector::new(),
            sync: FrameSynchronizer::new(),
            stream,
            link,
            events: Vec::new(),
            progress: 0.0,
            edits: Vec::new(),
            view_resize: None,
            view_offset: None,
            play_mode_request: None,
            pending_load: None,
            loaded: None,
            rewritten: HashMap::new(),
            play_mode: false,
            selection: Vec::new(),
            edit_failures: 0,
            observers: Vec::new(),
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

    pub fn state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn is_idle(&self) -> bool {
        self.sync.is_idle()
    }

    pub fn play_mode(&self) -> bool {
        self.play_mode
    }

    /// Objects the simulator asked to have selected
    pub fn selection(&self) -> &[ObjectHandle] {
        &self.selection
    }

    /// Number of frames in which the simulator rejected part of an edit batch
    pub fn edit_failures(&self) -> u32 {
        self.edit_failures
    }

    /// Edits waiting for the next frame request
    pub fn pending_edits(&self) -> usize {
        self.edits.len()
    }

    pub fn lookup(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.registry.lookup(id)
    }

    pub fn id_of(&self, handle: ObjectHandle) -> Option<ObjectId> {
        self.registry.id_of(&handle)
    }

    /// Reserve a temporary id for an object about to be created by an edit
    pub fn reserve_temporary_id(&mut self) -> Result<ObjectId, SyncError> {
        self.registry.reserve_temporary_id()
    }

    /// Run `observer` on every accepted UIDiff
    pub fn observe_diffs(&mut self, observer: DiffObserver) {
        self.observers.push(observer);
    }

    /// Ask for a frame even if nothing else changed
    pub fn queue_frame(&mut self) {
        self.sync.queue_frame();
    }

    pub fn queue_event(&mut self, event: InputEvent) {
        self.events.push(event);
        self.sync.queue_frame();
    }

    /// Advance the simulator's timeline by `seconds` in the next frame
    pub fn add_progress(&mut self, seconds: f64) {
        self.progress += seconds;
        self.sync.queue_frame();
    }

    pub fn resize_view(&mut self, width: u32, height: u32) {
        self.view_resize = Some(ViewSize { width, height });
        self.sync.queue_frame();
    }

    pub fn set_view_offset(&mut self, x: f32, y: f32) {
        self.view_offset = Some(ViewOffset { x, y });
        self.sync.queue_frame();
    }

    pub fn request_play_mode(&mut self, enabled: bool) {
        self.play_mode = enabled;
        self.play_mode_request = Some(enabled);
        self.sync.queue_frame();
    }

    /// Apply edits to the replica and queue them for the simulator.
    ///
    /// Each operation is applied on its own; failed ones are returned and
    /// not forwarded. A created object with a null id gets a temporary id.
    pub fn edit(&mut self, ops: &[Operation]) -> BatchErrors {
        let mut errors = BatchErrors::new();

        for (index, op) in ops.iter().enumerate() {
            let mapped = {
                let mut mapper = LocalEditMap { registry: &mut self.registry, rewritten: &self.rewritten };
                op.mapped(&mut mapper)
            };
            let max_buffer_size = self.config.max_frame_size;
            let result = mapped.and_then(|mapped| {
                let mut ctx = ApplyContext::new(&mut self.scene, &mut self.registry, &mut self.gc)
                    .with_max_buffer_size(max_buffer_size);
                mapped.apply(&mut ctx)?;
                Ok(mapped)
            });

            match result {
                Ok(mapped) => self.edits.push(mapped),
                Err(error) => {
                    debug!("Local edit #{} ({}) failed: {}", index, op.kind(), error);
                    errors.push(OperationFailure {
                        index,
                        kind: op.kind().as_str(),
                        error,
                        backtrace: None,
                    });
                }
            }
        }

        if !self.edits.is_empty() {
            self.sync.queue_frame();
        }
        errors
    }

    /// Queue an edit already applied to the replica, in this frontend's ids
    pub fn forward_applied(&mut self, op: Operation) {
        self.edits.push(op);
        self.sync.queue_frame();
    }

    /// Mutable access for a slave applying editor edits itself
    pub fn parts_mut(&mut self) -> (&mut Scene, &mut SceneRegistry, &mut GarbageCollector<ObjectHandle>) {
        (&mut self.scene, &mut self.registry, &mut self.gc)
    }

    /// Replace the scene with `ui` once no request is outstanding.
    ///
    /// A load that hasn't been sent yet is superseded. Edits queued before
    /// the load is sent are discarded.
    pub fn load(&mut self, ui: UiDescription) {
        if self.pending_load.is_some() {
            debug!("Superseding a load that was never sent");
        }
        self.pending_load = Some(ui);
    }

    /// Whether a load is waiting to be sent
    pub fn load_pending(&self) -> bool {
        self.pending_load.is_some()
    }

    /// Objects created by the last sent load, keyed by the description's ids
    pub fn take_loaded(&mut self) -> Option<HashMap<ObjectId, ObjectHandle>> {
        self.loaded.take()
    }

    /// Send whatever is due and handle replies that have already arrived.
    ///
    /// Never blocks. An in-loop simulator is driven here.
    pub fn tick(&mut self) -> Result<TickReport, SyncError> {
        let _scope = context::enter(FRONTEND_SCOPE);
        let mut report = TickReport::default();

        let result = self.tick_inner(&mut report);
        self.settle(result)?;
        Ok(report)
    }

    /// Like [`tick`](Self::tick), but blocks until the outstanding request
    /// is answered
    pub fn wait(&mut self) -> Result<TickReport, SyncError> {
        let _scope = context::enter(FRONTEND_SCOPE);
        let mut report = TickReport::default();

        let result = self.wait_inner(&mut report);
        self.settle(result)?;
        Ok(report)
    }

    /// Drop the simulator stream and wait for a threaded simulator to stop
    pub fn shutdown(self) -> Result<(), SyncError> {
        let Self { stream, link, .. } = self;
        drop(stream);
        link.join()
    }

    fn settle(&mut self, result: Result<(), SyncError>) -> Result<(), SyncError> {
        if let Err(err) = &result {
            if err.is_terminal() {
                self.sync.disconnect();
            }
        }
        result
    }

    fn tick_inner(&mut self, report: &mut TickReport) -> Result<(), SyncError> {
        if self.sync.is_disconnected() {
            return Err(SyncError::Disconnected);
        }

        self.flush(report)?;
        self.link.drive()?;
        while let Some(reply) = self.stream.try_recv()? {
            self.handle_reply(reply, report);
        }
        self.flush(report)
    }

    fn wait_inner(&mut self, report: &mut TickReport) -> Result<(), SyncError> {
        if self.sync.is_disconnected() {
            return Err(SyncError::Disconnected);
        }

        self.flush(report)?;
        if self.sync.is_idle() {
            return Ok(());
        }

        self.link.drive()?;
        let reply = self.stream.recv_blocking()?;
        self.handle_reply(reply, report);
        self.flush(report)
    }

    /// Send the next request if nothing is outstanding
    fn flush(&mut self, report: &mut TickReport) -> Result<(), SyncError> {
        if !self.sync.is_idle() {
            return Ok(());
        }

        if let Some(ui) = self.pending_load.take() {
            let mut loaded = load_description(&ui, &mut self.scene, &mut self.registry, &mut self.gc);
            loaded.errors.log_and_clear("load");

            if !self.edits.is_empty() {
                warn!("Discarding {} edit(s) queued before the load", self.edits.len());
            }
            self.edits.clear();
            self.rewritten.clear();
            self.selection.clear();

            self.sync.begin_load()?;
            self.stream.send(SimulatorRequest::Load(loaded.outbound))?;
            self.loaded = Some(loaded.objects);
            report.sent.push(Outstanding::Load);
            return Ok(());
        }

        if !self.sync.should_send_frame() {
            return Ok(());
        }

        let edit = if self.edits.is_empty() {
            None
        } else {
            let mut mapper = RewriteMap { rewritten: &self.rewritten };
            let mut ops = Vec::with_capacity(self.edits.len());
            for op in self.edits.drain(..) {
                match op.mapped(&mut mapper) {
                    Ok(mapped) => ops.push(mapped),
                    Err(err) => warn!("Dropping queued {}: {}", op.kind(), err),
                }
            }
            Some(ops)
        };

        let frame = self.sync.begin_frame()?;
        let forwarded = edit.as_ref().map_or(0, |ops| ops.len());
        let setup = FrameSetup {
            frame,
            events: std::mem::take(&mut self.events),
            progress: std::mem::take(&mut self.progress),
            edit,
            view_resize: self.view_resize.take(),
            view_offset: self.view_offset.take(),
            play_mode: self.play_mode_request.take(),
        };
        scoped_log!(Level::Debug, "Sending frame {} with {} edit(s)", frame, forwarded);

        self.stream.send(SimulatorRequest::Frame(setup))?;
        report.sent.push(Outstanding::Frame(frame));
        report.forwarded_edits += forwarded;
        Ok(())
    }

    fn handle_reply(&mut self, reply: SimulatorReply, report: &mut TickReport) {
        match reply {
            SimulatorReply::Diff(diff) => self.handle_diff(diff, report),
            SimulatorReply::Load(result) => self.handle_load_result(result, report),
        }
    }

    fn handle_diff(&mut self, diff: UiDiff, report: &mut TickReport) {
        if !self.sync.complete_frame(diff.frame) {
            report.dropped += 1;
            return;
        }

        let mut errors = {
            let mut ctx = ApplyContext::new(&mut self.scene, &mut self.registry, &mut self.gc);
            replay_diff(&diff, &mut ctx)
        };
        errors.log_and_clear(&format!("UIDiff for frame {}", diff.frame));

        for record in &diff.operations {
            if let Operation::RegisterObject { temporary_id, canonical_id } = record.op {
                self.rewritten.insert(temporary_id, canonical_id);
            }
        }

        for action in &diff.actions {
            self.handle_action(action);
        }

        for observer in self.observers.iter_mut() {
            observer(&diff, &self.scene, &self.registry);
        }

        // Observers have seen every id the diff mentions
        let Self { gc, registry, scene, .. } = &mut *self;
        report.collected += gc.collect(|handle| {
            registry.unregister_object(&handle);
            scene.release(handle);
        });
        let scene = &self.scene;
        self.selection.retain(|handle| scene.is_live(*handle));

        if diff.queue_frame {
            self.sync.queue_frame();
        }
        report.diffs += 1;
    }

    fn handle_action(&mut self, action: &SimulatorAction) {
        match action {
            SimulatorAction::SetPlayMode { enabled } => {
                info!("Simulator switched play mode {}", if *enabled { "on" } else { "off" });
                self.request_play_mode(*enabled);
            }
            SimulatorAction::SelectObject { object_id, action } => {
                let handle = if *object_id == NULL_OBJECT_ID {
                    None
                } else {
                    match self.registry.lookup(*object_id) {
                        Some(handle) => Some(handle),
                        None => {
                            warn!("Ignoring selection of unknown object {}", object_id);
                            return;
                        }
                    }
                };

                match (action, handle) {
                    (SelectAction::Replace, handle) => self.selection = handle.into_iter().collect(),
                    (SelectAction::Toggle, Some(handle)) => {
                        match self.selection.iter().position(|selected| *selected == handle) {
                            Some(position) => {
                                self.selection.remove(position);
                            }
                            None => self.selection.push(handle),
                        }
                    }
                    (SelectAction::Toggle, None) => {}
                }
            }
            SimulatorAction::EditFailed => {
                self.edit_failures += 1;
                warn!("Simulator rejected part of an edit batch");
            }
        }
    }

    fn handle_load_result(&mut self, result: LoadResult, report: &mut TickReport) {
        if !self.sync.complete_load() {
            report.dropped += 1;
            return;
        }

        for (temporary, canonical) in result.registrations {
            match self.registry.rewrite_temporary(temporary, canonical) {
                Ok(_) => {
                    self.rewritten.insert(temporary, canonical);
                }
                Err(err) => warn!("Load registration {} -> {} failed: {}", temporary, canonical, err),
            }
        }
        if result.failed > 0 {
            warn!("Simulator couldn't apply {} load operation(s)", result.failed);
        }

        // Pick up whatever the simulation logic did on load
        self.sync.queue_frame();
        report.loads += 1;
    }
}
