//! # Change/Operation Interleave
//!
//! Rebuilds the chronological order of a frame from its two logs: before an
//! operation with sequence `n`, every property change with index below `n`
//! is replayed. Operations with equal cursors replay in queue order and any
//! changes past the last cursor come last.

use crate::queue::OperationRecord;

/// One step of a frame replay
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayStep<'a, C> {
    Change(&'a C),
    Operation(&'a OperationRecord),
}

/// Iterator over a frame's property changes and operations in replay order
#[derive(Debug, Clone)]
pub struct Interleave<'a, C> {
    changes: &'a [C],
    records: &'a [OperationRecord],
    next_change: usize,
    next_record: usize,
}

/// Interleave `changes` with `records` by sequence cursor.
///
/// Cursors past the end of `changes` are clamped, so a truncated change log
/// still replays every operation.
pub fn interleave<'a, C>(changes: &'a [C], records: &'a [OperationRecord]) -> Interleave<'a, C> {
    Interleave {
        changes,
        records,
        next_change: 0,
        next_record: 0,
    }
}

impl<'a, C> Iterator for Interleave<'a, C> {
    type Item = ReplayStep<'a, C>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.records.get(self.next_record) {
            let cursor = (record.sequence as usize).min(self.changes.len());
            if self.next_change < cursor {
                self.next_change += 1;
                return Some(ReplayStep::Change(&self.changes[self.next_change - 1]));
            }

            self.next_record += 1;
            return Some(ReplayStep::Operation(record));
        }

        let change = self.changes.get(self.next_change)?;
        self.next_change += 1;
        Some(ReplayStep::Change(change))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.changes.len() - self.next_change) + (self.records.len() - self.next_record);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn record(sequence: u32, clock: u64) -> OperationRecord {
        OperationRecord {
            sequence,
            op: Operation::DeleteEntity { entity_id: clock },
            backtrace: None,
        }
    }

    fn replay_clocks(changes: &[u64], records: &[OperationRecord]) -> Vec<u64> {
        interleave(changes, records)
            .map(|step| match step {
                ReplayStep::Change(clock) => *clock,
                ReplayStep::Operation(record) => match record.op {
                    Operation::DeleteEntity { entity_id } => entity_id,
                    _ => unreachable!(),
                },
            })
            .collect()
    }

    #[test]
    fn replay_matches_logical_clock() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let mut changes = Vec::new();
            let mut records = Vec::new();
            let events = rng.gen_range(0..40);

            // Record both logs the way the simulator does while a frame runs
            for clock in 0..events {
                if rng.gen_bool(0.6) {
                    changes.push(clock);
                } else {
                    records.push(record(changes.len() as u32, clock));
                }
            }

            let replayed = replay_clocks(&changes, &records);
            let expected: Vec<u64> = (0..events).collect();
            assert_eq!(replayed, expected);
        }
    }

    #[test]
    fn equal_cursors_keep_queue_order() {
        let changes = vec![10, 11];
        let records = vec![record(1, 20), record(1, 21), record(1, 22)];
        assert_eq!(replay_clocks(&changes, &records), vec![10, 20, 21, 22, 11]);
    }

    #[test]
    fn cursors_past_the_end_are_clamped() {
        let changes = vec![10];
        let records = vec![record(5, 20), record(0, 21)];
        let steps = interleave(&changes, &records);
        assert_eq!(steps.size_hint(), (3, Some(3)));
        assert_eq!(replay_clocks(&changes, &records), vec![10, 20, 21]);
    }
}
