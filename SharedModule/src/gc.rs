//! # Garbage Collector
//!
//! Deferred reclamation of reaped objects. Reaping unlinks an object from
//! the scene but leaves its id registered so the frame that deleted it can
//! still be mapped and forwarded. The collector runs once that frame has
//! gone out and only then unregisters the ids and frees the slots.

use std::collections::HashSet;
use std::hash::Hash;
use log::debug;

/// Set of reaped objects waiting to be unregistered
#[derive(Debug, Clone)]
pub struct GarbageCollector<H> {
    pending: Vec<H>,
    queued: HashSet<H>,
}

impl<H> Default for GarbageCollector<H> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            queued: HashSet::new(),
        }
    }
}

impl<H: Copy + Eq + Hash> GarbageCollector<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reaped object. Queuing the same object twice is a no-op.
    pub fn queue(&mut self, object: H) {
        if self.queued.insert(object) {
            self.pending.push(object);
        }
    }

    pub fn queue_all<I: IntoIterator<Item = H>>(&mut self, objects: I) {
        for object in objects {
            self.queue(object);
        }
    }

    /// Objects waiting for collection, in reap order
    pub fn pending(&self) -> &[H] {
        &self.pending
    }

    pub fn is_pending(&self, object: &H) -> bool {
        self.queued.contains(object)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Call `unregister` for every pending object, then clear the set.
    ///
    /// Only call this after the frame that reaped the objects has been
    /// applied and forwarded. Returns the number of collected objects.
    pub fn collect<F: FnMut(H)>(&mut self, mut unregister: F) -> usize {
        let pending = std::mem::take(&mut self.pending);
        self.queued.clear();

        for object in pending.iter() {
            unregister(*object);
        }

        if !pending.is_empty() {
            debug!("Collected {} reaped object(s)", pending.len());
        }
        pending.len()
    }

    /// Forget every pending object without collecting it
    pub fn clear(&mut self) {
        self.pending.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_visits_each_object_once() {
        let mut gc: GarbageCollector<u32> = GarbageCollector::new();
        gc.queue(4);
        gc.queue_all([5, 4, 6]);
        assert_eq!(gc.pending(), &[4, 5, 6]);
        assert!(gc.is_pending(&5));

        let mut seen = Vec::new();
        assert_eq!(gc.collect(|object| seen.push(object)), 3);
        assert_eq!(seen, vec![4, 5, 6]);
        assert!(gc.is_empty());
        assert_eq!(gc.collect(|_| panic!("nothing left")), 0);
    }
}
