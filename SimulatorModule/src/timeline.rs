//! # Timeline Progression
//!
//! Elapsed time and controller evaluation. Each frame the elapsed time moves
//! on by the FrameSetup's progress and every controlled property is set to
//! its value at that time. Only values that actually change get logged.

use log::trace;

use rigsync_shared::{ObjectData, ObjectKind, SyncError};

use crate::logic::SimulatorContext;

/// Elapsed timeline time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timeline {
    elapsed: f64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Move time on. Negative progress is ignored.
    pub fn advance(&mut self, progress: f64) {
        if progress > 0.0 {
            self.elapsed += progress;
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

/// Evaluate every controller at the context's elapsed time.
///
/// Returns the number of properties whose value changed.
pub fn progress_controllers(ctx: &mut SimulatorContext<'_>) -> Result<usize, SyncError> {
    let elapsed = ctx.elapsed() as f32;

    let mut updates = Vec::new();
    for controller in ctx.scene().handles_of_kind(ObjectKind::Controller) {
        if let Some(ObjectData::Controller(state)) = ctx.scene().get(controller).map(|object| &object.data) {
            for prop in state.properties.iter() {
                if let Some(value) = prop.evaluate(elapsed) {
                    updates.push((prop.object, prop.property_id, value));
                }
            }
        }
    }

    let mut changed = 0;
    for (object, property_id, value) in updates {
        if !ctx.scene().is_live(object) {
            continue;
        }
        if ctx.update_property(object, property_id, value)? {
            changed += 1;
        }
    }

    trace!("Timeline at {:.3}s changed {} propert(ies)", elapsed, changed);
    Ok(changed)
}
