//! # SlaveModule
//!
//! A slave is a frontend driven by a remote editor instead of a window. The
//! editor loads UI descriptions into it and edits the running scene, using
//! its own ids; the slave keeps a second registry for those ids alongside
//! the frontend's own.
//!
//! Edits are applied and forwarded only while the frontend has no request
//! outstanding, so the simulator always sees them in the next FrameSetup.
//! An edit is answered once it has been forwarded.

pub mod master;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use log::{debug, info, warn, Level};

use rigsync_frontend::Frontend;
use rigsync_shared::constants::logging::SLAVE_SCOPE;
use rigsync_shared::context;
use rigsync_shared::messages::*;
use rigsync_shared::operation::{ApplyContext, CrossRegistryMap};
use rigsync_shared::{scoped_log, ObjectHandle, Operation, SceneRegistry, Stream, SyncConfig, SyncError};
use rigsync_simulator::SimulationLogic;

pub use crate::master::SlaveMaster;

/// The slave peer
pub struct Slave {
    frontend: Frontend,

    /// Editor ids of the objects in the frontend's scene
    edit_registry: SceneRegistry,

    queued_load: Option<(RequestId, UiDescription)>,
    queued_edits: VecDeque<(RequestId, Vec<Operation>)>,

    /// Load handed to the frontend and not yet answered by the simulator
    loading: Option<RequestId>,

    /// Edits applied locally, answered once the frontend has sent them
    forwarding: Vec<(RequestId, RequestStatus)>,

    replies: Vec<EditorReply>,

    /// Objects reaped from the frontend's scene, filled by a reap hook
    reaped: Arc<Mutex<Vec<ObjectHandle>>>,
}

impl Slave {
    pub fn new(mut frontend: Frontend) -> Self {
        let reaped = Arc::new(Mutex::new(Vec::new()));
        let sink = reaped.clone();
        frontend.parts_mut().0.add_reap_hook(Box::new(move |handle, _object| {
            if let Ok(mut reaped) = sink.lock() {
                reaped.push(handle);
            }
        }));

        Self {
            frontend,
            edit_registry: SceneRegistry::new_peer(),
            queued_load: None,
            queued_edits: VecDeque::new(),
            loading: None,
            forwarding: Vec::new(),
            replies: Vec::new(),
            reaped,
        }
    }

    /// Start a frontend for `config` and wrap it
    pub fn with_config(config: SyncConfig, logic: Box<dyn SimulationLogic>) -> Result<Self, SyncError> {
        Ok(Self::new(Frontend::new(config, logic)?))
    }

    pub fn frontend(&self) -> &Frontend {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut Frontend {
        &mut self.frontend
    }

    /// Registry of editor ids
    pub fn edit_registry(&self) -> &SceneRegistry {
        &self.edit_registry
    }

    /// Number of requests not answered yet
    pub fn pending_requests(&self) -> usize {
        usize::from(self.queued_load.is_some())
            + self.queued_edits.len()
            + usize::from(self.loading.is_some())
            + self.forwarding.len()
    }

    /// Queue an editor request.
    ///
    /// A Load supersedes the Load and Edits still queued; they are answered
    /// with a failed status.
    pub fn handle_request(&mut self, request: EditorRequest) {
        match request {
            EditorRequest::Load { id, ui } => {
                debug!("Load request {} with {} operation(s)", id, ui.ops.len());
                if let Some((superseded, _)) = self.queued_load.take() {
                    self.replies.push(EditorReply::LoadResult {
                        id: superseded,
                        status: RequestStatus::failed(format!("superseded by load {}", id)),
                    });
                }
                for (superseded, _) in self.queued_edits.drain(..) {
                    self.replies.push(EditorReply::EditResult {
                        id: superseded,
                        status: RequestStatus::failed(format!("superseded by load {}", id)),
                    });
                }
                self.queued_load = Some((id, ui));
            }
            EditorRequest::Edit { id, ops } => {
                debug!("Edit request {} with {} operation(s)", id, ops.len());
                self.queued_edits.push_back((id, ops));
            }
        }
    }

    /// Advance the slave: hand queued work to the frontend when it is idle,
    /// tick it, and return the replies that are due.
    pub fn tick(&mut self) -> Result<Vec<EditorReply>, SyncError> {
        let _scope = context::enter(SLAVE_SCOPE);

        self.dispatch();
        let report = self.frontend.tick()?;

        if let Some(objects) = self.frontend.take_loaded() {
            self.edit_registry.clear();
            for (id, handle) in objects {
                self.edit_registry.register(handle, id)?;
            }
            scoped_log!(Level::Debug, "Edit registry holds {} object(s)", self.edit_registry.len());
        }

        if report.loads > 0 {
            if let Some(id) = self.loading.take() {
                info!("Load {} complete", id);
                self.replies.push(EditorReply::LoadResult { id, status: RequestStatus::Ok });
            }
        }

        if self.frontend.pending_edits() == 0 {
            for (id, status) in self.forwarding.drain(..) {
                self.replies.push(EditorReply::EditResult { id, status });
            }
        }

        if report.collected > 0 || report.loads > 0 {
            self.prune_edit_registry();
        }

        Ok(std::mem::take(&mut self.replies))
    }

    /// Take every request waiting on `editor`, tick, and send the replies
    pub fn serve<S>(&mut self, editor: &mut S) -> Result<usize, SyncError>
    where
        S: Stream<EditorReply, EditorRequest> + ?Sized,
    {
        while let Some(request) = editor.try_recv()? {
            self.handle_request(request);
        }

        let replies = self.tick()?;
        let count = replies.len();
        for reply in replies {
            editor.send(reply)?;
        }
        Ok(count)
    }

    fn dispatch(&mut self) {
        if !self.frontend.is_idle() || self.frontend.load_pending() {
            return;
        }

        if let Some((id, ui)) = self.queued_load.take() {
            info!("Loading UI for request {}", id);
            self.frontend.load(ui);
            self.loading = Some(id);
            return;
        }

        while let Some((id, ops)) = self.queued_edits.pop_front() {
            let failed = self.apply_edits(id, &ops);
            let status = if failed == 0 {
                RequestStatus::Ok
            } else {
                RequestStatus::failed(format!("{} of {} operation(s) failed", failed, ops.len()))
            };
            self.forwarding.push((id, status));
        }
    }

    /// Apply an editor batch locally and forward what applied. Returns the
    /// number of failed operations.
    fn apply_edits(&mut self, request: RequestId, ops: &[Operation]) -> usize {
        let mut failed = 0;
        for (index, op) in ops.iter().enumerate() {
            match self.apply_edit(op) {
                Ok(mapped) => self.frontend.forward_applied(mapped),
                Err(err) => {
                    warn!("Edit {} operation #{} ({}) failed: {}", request, index, op.kind(), err);
                    failed += 1;
                }
            }
        }
        failed
    }

    fn apply_edit(&mut self, op: &Operation) -> Result<Operation, SyncError> {
        let (scene, registry, gc) = self.frontend.parts_mut();
        {
            let mut ctx = ApplyContext::new(&mut *scene, &mut self.edit_registry, &mut *gc);
            op.apply(&mut ctx)?;
        }

        let mut mapper = CrossRegistryMap { from: &self.edit_registry, to: registry };
        op.mapped(&mut mapper)
            .map_err(|err| SyncError::StaleEdit(format!("{} applied but can't be forwarded: {}", op.kind(), err)))
    }

    /// Forget editor ids of reaped objects the frontend has collected
    fn prune_edit_registry(&mut self) {
        let Ok(mut reaped) = self.reaped.lock() else {
            warn!("Reap list poisoned, editor ids of deleted objects are kept");
            return;
        };

        let scene = self.frontend.scene();
        let mut pruned = 0;
        reaped.retain(|handle| {
            if scene.get(*handle).is_some() {
                return true;
            }
            if self.edit_registry.unregister_object(handle).is_some() {
                pruned += 1;
            }
            false
        });

        if pruned > 0 {
            debug!("Dropped {} editor id(s) of collected objects", pruned);
        }
    }
}
