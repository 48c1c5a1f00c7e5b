//! Reorder buffer for concurrently fetched segments
//!
//! Segments complete in arbitrary order; the sink must observe them in
//! strictly ascending index order. Completed segments park here until the
//! next expected index arrives.

use std::collections::BTreeMap;

use bytes::Bytes;

#[derive(Debug)]
pub(crate) struct Sequencer {
    segments: BTreeMap<u64, Bytes>,
    next_index: u64,
}

impl Sequencer {
    pub(crate) fn new(next_index: u64) -> Self {
        Self {
            segments: BTreeMap::new(),
            next_index,
        }
    }

    pub(crate) fn push(&mut self, index: u64, data: Bytes) {
        self.segments.insert(index, data);
    }

    /// Remove and return the next in-order segment, if it has arrived
    pub(crate) fn pop_ready(&mut self) -> Option<(u64, Bytes)> {
        let data = self.segments.remove(&self.next_index)?;
        let index = self.next_index;
        self.next_index += 1;
        Some((index, data))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
