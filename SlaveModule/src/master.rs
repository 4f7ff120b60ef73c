//! # Slave Master
//!
//! Editor-side client of a slave. Requests go out one at a time; while one
//! is in flight, newer requests wait, and a newer request of the same kind
//! replaces an older one that was never sent.

use log::{debug, warn};

use rigsync_shared::constants::logging::EDITOR_SCOPE;
use rigsync_shared::context;
use rigsync_shared::messages::*;
use rigsync_shared::{Operation, Stream, SyncError};

/// Editor-side handle on a slave
pub struct SlaveMaster<S> {
    stream: S,
    next_id: RequestId,
    queued_load: Option<(RequestId, UiDescription)>,
    queued_edit: Option<(RequestId, Vec<Operation>)>,
    in_flight: Option<RequestId>,
    superseded: Vec<EditorReply>,
}

impl<S: Stream<EditorRequest, EditorReply>> SlaveMaster<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            next_id: 1,
            queued_load: None,
            queued_edit: None,
            in_flight: None,
            superseded: Vec::new(),
        }
    }

    /// Request currently waiting for its reply
    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// Number of requests queued and not yet sent
    pub fn queued(&self) -> usize {
        usize::from(self.queued_load.is_some()) + usize::from(self.queued_edit.is_some())
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Queue a load, replacing an unsent one
    pub fn load(&mut self, ui: UiDescription) -> RequestId {
        let id = self.allocate_id();
        if let Some((superseded, _)) = self.queued_load.replace((id, ui)) {
            debug!("Load {} superseded by {} before it was sent", superseded, id);
            self.superseded.push(EditorReply::LoadResult {
                id: superseded,
                status: RequestStatus::failed(format!("superseded by load {}", id)),
            });
        }
        id
    }

    /// Queue an edit batch, replacing an unsent one
    pub fn edit(&mut self, ops: Vec<Operation>) -> RequestId {
        let id = self.allocate_id();
        if let Some((superseded, _)) = self.queued_edit.replace((id, ops)) {
            debug!("Edit {} superseded by {} before it was sent", superseded, id);
            self.superseded.push(EditorReply::EditResult {
                id: superseded,
                status: RequestStatus::failed(format!("superseded by edit {}", id)),
            });
        }
        id
    }

    /// Receive replies and send the next queued request once nothing is in
    /// flight.
    ///
    /// Returns the replies received plus one failed reply for every request
    /// that was superseded before it was sent.
    pub fn poll(&mut self) -> Result<Vec<EditorReply>, SyncError> {
        let _scope = context::enter(EDITOR_SCOPE);
        let mut replies = std::mem::take(&mut self.superseded);

        while let Some(reply) = self.stream.try_recv()? {
            if self.in_flight == Some(reply.id()) {
                self.in_flight = None;
            } else {
                warn!("Reply to request {} which is not in flight", reply.id());
            }
            if let RequestStatus::Failed { reason } = reply.status() {
                warn!("Request {} failed: {}", reply.id(), reason);
            }
            replies.push(reply);
        }

        if self.in_flight.is_none() {
            self.send_next()?;
        }
        Ok(replies)
    }

    /// Send the oldest queued request
    fn send_next(&mut self) -> Result<(), SyncError> {
        let load_first = match (&self.queued_load, &self.queued_edit) {
            (Some((load, _)), Some((edit, _))) => load < edit,
            (Some(_), None) => true,
            _ => false,
        };

        let request = if load_first {
            self.queued_load.take().map(|(id, ui)| EditorRequest::Load { id, ui })
        } else {
            self.queued_edit.take().map(|(id, ops)| EditorRequest::Edit { id, ops })
        };

        if let Some(request) = request {
            let id = request.id();
            self.stream.send(request)?;
            self.in_flight = Some(id);
            debug!("Sent request {}", id);
        }
        Ok(())
    }
}
