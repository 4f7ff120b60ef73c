//! # Operation Queue
//!
//! Per-frame queue of structural operations. Each record remembers how many
//! property changes had been logged when it was queued, which is all a
//! receiver needs to replay both logs in their original order.

use std::backtrace::Backtrace;
use serde::{Serialize, Deserialize};
use log::warn;

use crate::constants::logging::MAX_BACKTRACE_FRAMES;
use crate::operation::Operation;

/// A queued operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Number of property changes logged before this operation
    pub sequence: u32,

    pub op: Operation,

    /// Call stack of the code that queued the operation (debug builds only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<Vec<String>>,
}

/// Capture the current call stack as one string per line
pub fn capture_backtrace() -> Vec<String> {
    Backtrace::force_capture()
        .to_string()
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .take(MAX_BACKTRACE_FRAMES)
        .collect()
}

/// Ordered queue of operations for the current frame
#[derive(Debug, Default)]
pub struct OperationQueue {
    records: Vec<OperationRecord>,
    capture_backtraces: bool,
}

impl OperationQueue {
    pub fn new(capture_backtraces: bool) -> Self {
        Self {
            records: Vec::new(),
            capture_backtraces,
        }
    }

    /// Queue an operation after `sequence` logged property changes
    pub fn push(&mut self, op: Operation, sequence: u32) {
        let floor = self.records.last().map_or(0, |record| record.sequence);
        let sequence = if sequence < floor {
            warn!("Operation {} queued with sequence {} behind {}", op.kind(), sequence, floor);
            floor
        } else {
            sequence
        };

        let backtrace = if self.capture_backtraces {
            Some(capture_backtrace())
        } else {
            None
        };

        self.records.push(OperationRecord {
            sequence,
            op,
            backtrace,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    /// Drain the queue at the end of a frame
    pub fn take(&mut self) -> Vec<OperationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn set_capture_backtraces(&mut self, capture: bool) {
        self.capture_backtraces = capture;
    }
}
