//! # Protocol Messages
//!
//! Everything that crosses a stream: the per-frame FrameSetup/UIDiff round
//! trip and Load between frontend and simulator, and the Load/Edit requests
//! an editor sends to a slave.

use serde::{Serialize, Deserialize};

use crate::operation::Operation;
use crate::property::PropertyChange;
use crate::queue::OperationRecord;
use crate::types::*;

/// Number of a frontend/simulator round trip
pub type FrameNumber = u64;

/// Id of an editor request
pub type RequestId = u64;

/// Pointer button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

impl Default for PointerButton {
    fn default() -> Self {
        PointerButton::Left
    }
}

/// Input event forwarded from the frontend's window.
///
/// `view_id` routes the event; coordinates are window relative and get
/// translated by the view offset on the simulator side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerMove {
        #[serde(default)]
        view_id: ObjectId,
        x: f32,
        y: f32,
    },
    PointerDown {
        #[serde(default)]
        view_id: ObjectId,
        x: f32,
        y: f32,
        #[serde(default)]
        button: PointerButton,
    },
    PointerUp {
        #[serde(default)]
        view_id: ObjectId,
        x: f32,
        y: f32,
        #[serde(default)]
        button: PointerButton,
    },
    KeyDown {
        #[serde(default)]
        view_id: ObjectId,
        keysym: u32,
        #[serde(default)]
        modifiers: u32,
    },
    KeyUp {
        #[serde(default)]
        view_id: ObjectId,
        keysym: u32,
        #[serde(default)]
        modifiers: u32,
    },
}

impl InputEvent {
    pub fn view_id(&self) -> ObjectId {
        match self {
            Self::PointerMove { view_id, .. }
            | Self::PointerDown { view_id, .. }
            | Self::PointerUp { view_id, .. }
            | Self::KeyDown { view_id, .. }
            | Self::KeyUp { view_id, .. } => *view_id,
        }
    }
}

/// Size of the frontend's view in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: u32,
    pub height: u32,
}

/// Position of the view within the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewOffset {
    pub x: f32,
    pub y: f32,
}

/// Request for one simulator frame (frontend -> simulator)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSetup {
    pub frame: FrameNumber,

    pub events: Vec<InputEvent>,

    /// Seconds of timeline progress since the previous frame
    pub progress: f64,

    /// Edits to apply before the frame runs, in the simulator's id space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<Vec<Operation>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_resize: Option<ViewSize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_offset: Option<ViewOffset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_mode: Option<bool>,
}

/// How a selection request combines with the current selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectAction {
    Replace,
    Toggle,
}

/// Asynchronous request from the simulator to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulatorAction {
    SetPlayMode { enabled: bool },
    SelectObject { object_id: ObjectId, action: SelectAction },

    /// Some edit of the frame's edit batch failed
    EditFailed,
}

/// Result of one simulator frame (simulator -> frontend)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiDiff {
    /// Number of the FrameSetup this answers
    pub frame: FrameNumber,

    pub changes: Vec<PropertyChange>,

    /// Operations, each with the number of changes that precede it
    pub operations: Vec<OperationRecord>,

    pub actions: Vec<SimulatorAction>,

    /// The simulator wants another frame straight away
    pub queue_frame: bool,
}

/// A complete UI as a batch of creation operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiDescription {
    pub ops: Vec<Operation>,
}

/// Reply to a Load (simulator -> frontend)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    /// (temporary id, canonical id) for every object the load created
    pub registrations: Vec<(ObjectId, ObjectId)>,

    /// Number of description operations the simulator couldn't apply
    pub failed: u32,
}

/// Frontend -> simulator message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulatorRequest {
    Frame(FrameSetup),
    Load(UiDescription),
}

/// Simulator -> frontend message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulatorReply {
    Diff(UiDiff),
    Load(LoadResult),
}

/// Outcome of an editor request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Ok,
    Failed { reason: String },
}

impl RequestStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Editor -> slave message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditorRequest {
    /// Replace the slave's scene. Ids are in the editor's id space.
    Load { id: RequestId, ui: UiDescription },

    /// Apply edits to the running scene. Ids are in the editor's id space.
    Edit { id: RequestId, ops: Vec<Operation> },
}

impl EditorRequest {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Load { id, .. } | Self::Edit { id, .. } => *id,
        }
    }
}

/// Slave -> editor message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorReply {
    LoadResult { id: RequestId, status: RequestStatus },
    EditResult { id: RequestId, status: RequestStatus },
}

impl EditorReply {
    pub fn id(&self) -> RequestId {
        match self {
            Self::LoadResult { id, .. } | Self::EditResult { id, .. } => *id,
        }
    }

    pub fn status(&self) -> &RequestStatus {
        match self {
            Self::LoadResult { status, .. } | Self::EditResult { status, .. } => status,
        }
    }
}
