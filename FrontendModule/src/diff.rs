//! # UIDiff Replay
//!
//! Applies a simulator UIDiff to the frontend's scene in the order the
//! simulator produced it: property changes and operations interleaved by
//! their sequence cursors.

use log::trace;

use rigsync_shared::interleave::{interleave, ReplayStep};
use rigsync_shared::messages::UiDiff;
use rigsync_shared::operation::{map_and_apply_one, ApplyContext, IdentityMap};
use rigsync_shared::{BatchErrors, Operation};

/// Replay every change and operation of `diff`, best effort.
///
/// The diff's ids are canonical ids, so no mapping is needed. A failed step
/// is recorded and replay carries on.
pub fn replay_diff(diff: &UiDiff, ctx: &mut ApplyContext<'_>) -> BatchErrors {
    let mut errors = BatchErrors::new();
    let mut mapper = IdentityMap;

    for (index, step) in interleave(&diff.changes, &diff.operations).enumerate() {
        match step {
            ReplayStep::Change(change) => {
                let op = Operation::SetProperty {
                    object_id: change.object_id,
                    property_id: change.property_id,
                    value: change.value.clone(),
                };
                map_and_apply_one(index, &op, None, &mut mapper, ctx, &mut errors);
            }
            ReplayStep::Operation(record) => {
                trace!("Replaying {} at sequence {}", record.op.kind(), record.sequence);
                map_and_apply_one(index, &record.op, record.backtrace.as_ref(), &mut mapper, ctx, &mut errors);
            }
        }
    }

    errors
}
