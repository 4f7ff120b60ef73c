//! # Input Translation
//!
//! Turns the raw window events of a FrameSetup into simulator events:
//! coordinates move into view space, the routing view id becomes a local
//! handle and pointer events carry the current button state.

use serde::{Serialize, Deserialize};
use log::warn;

use rigsync_shared::messages::{InputEvent, PointerButton, ViewOffset};
use rigsync_shared::{ObjectHandle, ObjectKind, Scene, SceneRegistry, NULL_OBJECT_ID};

/// Bit set of held pointer buttons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMask(pub u32);

impl ButtonMask {
    pub fn bit(button: PointerButton) -> u32 {
        match button {
            PointerButton::Left => 1 << 0,
            PointerButton::Middle => 1 << 1,
            PointerButton::Right => 1 << 2,
        }
    }

    pub fn contains(&self, button: PointerButton) -> bool {
        self.0 & Self::bit(button) != 0
    }
}

/// An input event in the simulator's terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulatorEvent {
    PointerMove {
        view: Option<ObjectHandle>,
        x: f32,
        y: f32,
        buttons: ButtonMask,
    },
    PointerDown {
        view: Option<ObjectHandle>,
        x: f32,
        y: f32,
        button: PointerButton,
        buttons: ButtonMask,
    },
    PointerUp {
        view: Option<ObjectHandle>,
        x: f32,
        y: f32,
        button: PointerButton,
        buttons: ButtonMask,
    },
    KeyDown {
        view: Option<ObjectHandle>,
        keysym: u32,
        modifiers: u32,
    },
    KeyUp {
        view: Option<ObjectHandle>,
        keysym: u32,
        modifiers: u32,
    },
}

/// Input state carried across frames
#[derive(Debug, Clone)]
pub struct InputState {
    view_offset: ViewOffset,
    buttons: ButtonMask,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            view_offset: ViewOffset { x: 0.0, y: 0.0 },
            buttons: ButtonMask::default(),
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_view_offset(&mut self, offset: ViewOffset) {
        self.view_offset = offset;
    }

    pub fn view_offset(&self) -> ViewOffset {
        self.view_offset
    }

    pub fn buttons(&self) -> ButtonMask {
        self.buttons
    }

    /// Forget held buttons, e.g. after a load
    pub fn reset(&mut self) {
        self.buttons = ButtonMask::default();
    }

    fn resolve_view(&self, view_id: u64, registry: &SceneRegistry, scene: &Scene) -> Option<ObjectHandle> {
        if view_id == NULL_OBJECT_ID {
            return None;
        }

        match registry.lookup(view_id) {
            Some(handle) if scene.get(handle).map(|o| o.kind()) == Some(ObjectKind::View) => Some(handle),
            _ => {
                warn!("Input event routed to unknown view {}, delivering without a view", view_id);
                None
            }
        }
    }

    /// Translate one event, updating the held button state
    pub fn translate(&mut self, event: &InputEvent, registry: &SceneRegistry, scene: &Scene) -> SimulatorEvent {
        let view = self.resolve_view(event.view_id(), registry, scene);
        let ViewOffset { x: dx, y: dy } = self.view_offset;

        match *event {
            InputEvent::PointerMove { x, y, .. } => SimulatorEvent::PointerMove {
                view,
                x: x - dx,
                y: y - dy,
                buttons: self.buttons,
            },
            InputEvent::PointerDown { x, y, button, .. } => {
                self.buttons.0 |= ButtonMask::bit(button);
                SimulatorEvent::PointerDown {
                    view,
                    x: x - dx,
                    y: y - dy,
                    button,
                    buttons: self.buttons,
                }
            }
            InputEvent::PointerUp { x, y, button, .. } => {
                self.buttons.0 &= !ButtonMask::bit(button);
                SimulatorEvent::PointerUp {
                    view,
                    x: x - dx,
                    y: y - dy,
                    button,
                    buttons: self.buttons,
                }
            }
            InputEvent::KeyDown { keysym, modifiers, .. } => SimulatorEvent::KeyDown { view, keysym, modifiers },
            InputEvent::KeyUp { keysym, modifiers, .. } => SimulatorEvent::KeyUp { view, keysym, modifiers },
        }
    }
}
