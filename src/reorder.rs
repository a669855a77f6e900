// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Gap-free reorder buffer for `BufferBlock` responses (§4.4, §5): blocks
arrive out of order over TCP resends but must be delivered to the
application in sender sequence-number order, with a bounded wait for gaps.
*/

use std::collections::BTreeMap;

/// Reassembles buffer blocks into contiguous sequence-number order.
///
/// Blocks are held until every lower sequence number has drained. A gap
/// older than `max_gap_age` pending arrivals is skipped with a warning
/// rather than stalling delivery forever (§5).
pub struct ReorderBuffer {
    next_expected: Option<u32>,
    pending: BTreeMap<u32, Vec<u8>>,
    max_gap_age: usize,
}

impl ReorderBuffer {
    /// Creates a buffer with no sequence expectation yet — the first block
    /// accepted fixes the starting sequence number, since a publisher's
    /// numbering need not start at 0. Tolerates up to `max_gap_age`
    /// out-of-order arrivals ahead of a missing block before skipping the
    /// gap.
    pub fn new(max_gap_age: usize) -> Self {
        Self {
            next_expected: None,
            pending: BTreeMap::new(),
            max_gap_age,
        }
    }

    /// Accepts a block with `sequence_number`, returning every block now
    /// ready for in-order delivery (possibly more than one, if this block
    /// fills a gap; possibly empty, if this block itself is ahead of a
    /// still-missing one).
    pub fn accept(&mut self, sequence_number: u32, payload: Vec<u8>) -> Vec<(u32, Vec<u8>)> {
        self.next_expected.get_or_insert(sequence_number);
        self.pending.insert(sequence_number, payload);
        self.drain()
    }

    fn drain(&mut self) -> Vec<(u32, Vec<u8>)> {
        let mut ready = Vec::new();
        loop {
            let next = *self.next_expected.as_ref().expect("set by accept before drain runs");
            match self.pending.remove(&next) {
                Some(payload) => {
                    ready.push((next, payload));
                    self.next_expected = Some(next.wrapping_add(1));
                }
                None => {
                    if self.pending.is_empty() {
                        break;
                    }
                    if self.pending.len() >= self.max_gap_age {
                        let skipped_to = *self.pending.keys().next().unwrap();
                        log::warn!(
                            "buffer block gap at sequence {next} aged past {} pending blocks; skipping to {skipped_to}",
                            self.max_gap_age
                        );
                        self.next_expected = Some(skipped_to);
                        continue;
                    }
                    break;
                }
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_arrivals_deliver_immediately() {
        let mut buffer = ReorderBuffer::new(16);
        assert_eq!(buffer.accept(0, vec![0]), vec![(0, vec![0])]);
        assert_eq!(buffer.accept(1, vec![1]), vec![(1, vec![1])]);
    }

    #[test]
    fn out_of_order_arrivals_drain_once_gap_fills() {
        // Scenario 6 from spec.md §8: {1,3,2,4} -> delivered {1,2,3,4}.
        let mut buffer = ReorderBuffer::new(16);
        assert_eq!(buffer.accept(1, vec![1]), vec![(1, vec![1])]);
        assert!(buffer.accept(3, vec![3]).is_empty());
        assert_eq!(buffer.accept(2, vec![2]), vec![(2, vec![2]), (3, vec![3])]);
        assert_eq!(buffer.accept(4, vec![4]), vec![(4, vec![4])]);
    }

    #[test]
    fn aged_out_gap_is_skipped_with_a_warning() {
        let mut buffer = ReorderBuffer::new(2);
        assert!(buffer.accept(1, vec![1]).is_empty());
        // Second pending entry reaches max_gap_age=2, so the gap at 0 skips.
        let delivered = buffer.accept(2, vec![2]);
        assert_eq!(delivered, vec![(1, vec![1]), (2, vec![2])]);
    }
}
