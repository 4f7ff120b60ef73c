//! # Frame Synchronizer
//!
//! The request/response state machine between a frontend and its simulator.
//! At most one request is outstanding at a time. Frame requests made while
//! one is in flight are coalesced into a single follow-up request that goes
//! out as soon as the reply arrives.

use serde::{Serialize, Deserialize};
use log::{debug, warn};

use rigsync_shared::messages::FrameNumber;
use rigsync_shared::SyncError;

/// The request currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outstanding {
    Frame(FrameNumber),
    Load,
}

/// State of a frontend/simulator pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Nothing in flight; the next request may be sent
    Idle,

    /// Waiting for the reply to a request
    RequestSent(Outstanding),

    /// The stream failed; terminal for this pair
    Disconnected,
}

/// Tracks the single outstanding request and coalesced follow-ups
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    state: SyncState,
    next_frame: FrameNumber,
    frame_queued: bool,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            next_frame: 1,
            frame_queued: false,
        }
    }
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SyncState::Idle
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == SyncState::Disconnected
    }

    /// Whether a frame has been asked for and not yet sent
    pub fn frame_queued(&self) -> bool {
        self.frame_queued
    }

    /// Ask for a frame. Multiple requests before the next send collapse into one.
    pub fn queue_frame(&mut self) {
        self.frame_queued = true;
    }

    /// Whether a frame request should be sent now
    pub fn should_send_frame(&self) -> bool {
        self.is_idle() && self.frame_queued
    }

    fn ensure_idle(&self) -> Result<(), SyncError> {
        match self.state {
            SyncState::Idle => Ok(()),
            SyncState::Disconnected => Err(SyncError::Disconnected),
            SyncState::RequestSent(outstanding) => Err(SyncError::Protocol(format!(
                "{:?} still outstanding",
                outstanding
            ))),
        }
    }

    /// Move to RequestSent for a new frame, returning its number
    pub fn begin_frame(&mut self) -> Result<FrameNumber, SyncError> {
        self.ensure_idle()?;

        let frame = self.next_frame;
        self.next_frame += 1;
        self.frame_queued = false;
        self.state = SyncState::RequestSent(Outstanding::Frame(frame));
        debug!("Frame {} requested", frame);
        Ok(frame)
    }

    /// Move to RequestSent for a load
    pub fn begin_load(&mut self) -> Result<(), SyncError> {
        self.ensure_idle()?;
        self.state = SyncState::RequestSent(Outstanding::Load);
        Ok(())
    }

    /// Accept the UIDiff for `frame`.
    ///
    /// Returns false, leaving the state alone, when the diff doesn't answer
    /// the outstanding request (a duplicate or stale delivery).
    pub fn complete_frame(&mut self, frame: FrameNumber) -> bool {
        match self.state {
            SyncState::RequestSent(Outstanding::Frame(expected)) if expected == frame => {
                self.state = SyncState::Idle;
                true
            }
            state => {
                warn!("Dropping UIDiff for frame {} while {:?}", frame, state);
                false
            }
        }
    }

    /// Accept a LoadResult. Returns false if no load is outstanding.
    pub fn complete_load(&mut self) -> bool {
        match self.state {
            SyncState::RequestSent(Outstanding::Load) => {
                self.state = SyncState::Idle;
                true
            }
            state => {
                warn!("Dropping LoadResult while {:?}", state);
                false
            }
        }
    }

    /// The stream failed; any outstanding request is discarded
    pub fn disconnect(&mut self) {
        if self.state != SyncState::Disconnected {
            warn!("Simulator stream disconnected while {:?}", self.state);
        }
        self.state = SyncState::Disconnected;
        self.frame_queued = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_while_busy_are_coalesced() {
        let mut sync = FrameSynchronizer::new();
        sync.queue_frame();
        assert!(sync.should_send_frame());
        let first = sync.begin_frame().unwrap();

        // Three redraws while the first frame is in flight
        sync.queue_frame();
        sync.queue_frame();
        sync.queue_frame();
        assert!(!sync.should_send_frame());
        assert!(sync.begin_frame().is_err());

        assert!(sync.complete_frame(first));
        assert!(sync.should_send_frame());
        let second = sync.begin_frame().unwrap();
        assert_eq!(second, first + 1);
        assert!(!sync.frame_queued());
    }

    #[test]
    fn duplicate_diffs_are_dropped() {
        let mut sync = FrameSynchronizer::new();
        sync.queue_frame();
        let frame = sync.begin_frame().unwrap();
        assert!(!sync.complete_frame(frame + 7));
        assert!(sync.complete_frame(frame));
        assert!(!sync.complete_frame(frame));
        assert!(!sync.complete_load());
        assert!(sync.is_idle());
    }

    #[test]
    fn disconnect_is_terminal() {
        let mut sync = FrameSynchronizer::new();
        sync.begin_load().unwrap();
        sync.disconnect();
        sync.queue_frame();
        assert!(!sync.should_send_frame());
        assert_eq!(sync.begin_frame(), Err(SyncError::Disconnected));
        assert!(!sync.complete_load());
    }
}
