//! # Batch Apply
//!
//! Best-effort map+apply over a batch of operations. Each operation is
//! mapped right before it is applied, so objects created by one operation
//! are registered by the time the next one is mapped. A failure is recorded
//! and the batch moves on.

use log::debug;

use crate::error::{BatchErrors, OperationFailure, SyncError};
use super::{ApplyContext, IdMap, Operation};

/// Map and apply one operation of a batch, recording a failure in `errors`.
///
/// Returns whether the operation was applied.
pub fn map_and_apply_one(
    index: usize,
    op: &Operation,
    backtrace: Option<&Vec<String>>,
    mapper: &mut dyn IdMap,
    ctx: &mut ApplyContext<'_>,
    errors: &mut BatchErrors,
) -> bool {
    match try_map_and_apply(op, mapper, ctx) {
        Ok(()) => true,
        Err(error) => {
            debug!("Operation #{} ({}) failed: {}", index, op.kind(), error);
            errors.push(OperationFailure {
                index,
                kind: op.kind().as_str(),
                error,
                backtrace: backtrace.cloned(),
            });
            false
        }
    }
}

fn try_map_and_apply(
    op: &Operation,
    mapper: &mut dyn IdMap,
    ctx: &mut ApplyContext<'_>,
) -> Result<(), SyncError> {
    let mapped = op.mapped(mapper)?;

    let before = ctx.registration_count();
    mapped.apply(ctx)?;

    for (temporary, canonical) in ctx.registrations_since(before) {
        mapper.registered(temporary, canonical);
    }
    Ok(())
}

/// Map and apply every operation of a batch in order.
///
/// Never stops early; the returned list holds one entry per failed
/// operation.
pub fn map_and_apply_batch(
    ops: &[Operation],
    mapper: &mut dyn IdMap,
    ctx: &mut ApplyContext<'_>,
) -> BatchErrors {
    let mut errors = BatchErrors::new();
    for (index, op) in ops.iter().enumerate() {
        map_and_apply_one(index, op, None, mapper, ctx, &mut errors);
    }
    errors
}
