//! Commit watermarks for partitioned sources.
//!
//! Several messages from one partition may be in flight at once and settle
//! in any order. A partition's committed position only advances to the
//! lowest offset that is still in flight or waiting for redelivery, so a
//! restart never skips an unsettled message.

use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
struct PartitionState {
    /// Deliveries in flight per offset. Redelivery can put the same offset
    /// in flight more than once.
    in_flight: BTreeMap<i64, usize>,
    /// Nacked offsets not yet acknowledged by a redelivery.
    retrying: BTreeSet<i64>,
    /// One past the highest acknowledged offset.
    acked_through: Option<i64>,
    committed: Option<i64>,
}

impl PartitionState {
    fn release(&mut self, offset: i64) {
        if let Some(count) = self.in_flight.get_mut(&offset) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&offset);
            }
        }
    }

    fn watermark(&self) -> Option<i64> {
        let acked_through = self.acked_through?;
        let blocked = [
            self.in_flight.keys().next().copied(),
            self.retrying.first().copied(),
        ]
        .into_iter()
        .flatten()
        .min();
        Some(blocked.map_or(acked_through, |low| low.min(acked_through)))
    }
}

/// Per-partition offset bookkeeping.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionState>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&mut self, topic: &str, partition: i32) -> &mut PartitionState {
        self.partitions
            .entry((topic.to_string(), partition))
            .or_default()
    }

    /// Record that `offset` was handed out.
    pub fn track(&mut self, topic: &str, partition: i32, offset: i64) {
        *self
            .partition(topic, partition)
            .in_flight
            .entry(offset)
            .or_insert(0) += 1;
    }

    /// Record a successful settlement.
    ///
    /// Returns the position to commit when it advanced.
    pub fn ack(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self.partition(topic, partition);
        state.release(offset);
        state.retrying.remove(&offset);
        state.acked_through = Some(state.acked_through.map_or(offset + 1, |n| n.max(offset + 1)));

        let watermark = state.watermark()?;
        if state.committed.is_some_and(|committed| committed >= watermark) {
            return None;
        }
        state.committed = Some(watermark);
        Some(watermark)
    }

    /// Record a negative settlement. Commits stay below `offset` until it is
    /// acknowledged.
    pub fn nack(&mut self, topic: &str, partition: i32, offset: i64) {
        let state = self.partition(topic, partition);
        state.release(offset);
        state.retrying.insert(offset);
    }

    /// Position last returned by [`ack`](Self::ack) for the partition.
    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.partitions
            .get(&(topic.to_string(), partition))
            .and_then(|state| state.committed)
    }

    /// Forget a partition, e.g. after it was revoked.
    pub fn reset(&mut self, topic: &str, partition: i32) {
        self.partitions.remove(&(topic.to_string(), partition));
    }
}
