//! Segmentation Engine
//!
//! Cuts SDUs into PDUs that fit the lower layer's transmission opportunity.
//! The header length depends on where the piece sits in its SDU, so the cut
//! is computed against a header-length function rather than a constant.

use super::pdu::SegmentPosition;
use bytes::Bytes;
use interfaces::pool::PoolLease;
use std::ops::Range;

/// One piece of an SDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub position: SegmentPosition,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Next piece of `[so, end)` of an SDU of `sdu_len` bytes that fits `budget`
/// bytes including its header.
///
/// If the remainder fits it is emitted whole; otherwise the piece fills the
/// budget exactly. Returns `None` when not even one payload byte fits.
pub fn next_segment(
    sdu_len: usize,
    so: usize,
    end: usize,
    budget: usize,
    header_len: impl Fn(SegmentPosition) -> usize,
) -> Option<Segment> {
    if so >= end || end > sdu_len {
        return None;
    }

    let whole = SegmentPosition::for_range(so, end, sdu_len);
    if header_len(whole) + (end - so) <= budget {
        return Some(Segment { start: so, end, position: whole });
    }

    // a partial piece never ends the SDU
    let partial = SegmentPosition::for_range(so, so, sdu_len.max(so + 1));
    let header = header_len(partial);
    if budget <= header {
        return None;
    }
    let cut = (so + budget - header).min(end - 1);
    Some(Segment {
        start: so,
        end: cut,
        position: SegmentPosition::for_range(so, cut, sdu_len),
    })
}

/// An SDU handed to the segmenter, with the pool lease backing it
#[derive(Debug)]
pub struct PendingSdu {
    pub sn: u32,
    pub sdu: Bytes,
    pub lease: Option<PoolLease>,
}

/// A piece produced by [`SduSegmenter::next`]
#[derive(Debug, Clone)]
pub struct SegmentOut {
    pub sn: u32,
    pub segment: Segment,
    pub payload: Bytes,
}

/// Keeps the SDU currently being segmented and its next offset
#[derive(Debug, Default)]
pub struct SduSegmenter {
    current: Option<PendingSdu>,
    so: usize,
}

impl SduSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start segmenting `sdu`; the previous SDU must be finished
    pub fn load(&mut self, sdu: PendingSdu) {
        debug_assert!(self.current.is_none());
        self.current = Some(sdu);
        self.so = 0;
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// SN of the SDU being segmented
    pub fn current_sn(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.sn)
    }

    /// Offset of the first unsent byte
    pub fn offset(&self) -> usize {
        self.so
    }

    /// Bytes of the current SDU not yet emitted
    pub fn remaining(&self) -> usize {
        self.current.as_ref().map(|p| p.sdu.len() - self.so).unwrap_or(0)
    }

    /// Emit the next piece within `budget`. The second value is true when
    /// the piece completes the SDU; the SDU and its lease are dropped then.
    pub fn next(
        &mut self,
        budget: usize,
        header_len: impl Fn(SegmentPosition) -> usize,
    ) -> Option<(SegmentOut, bool)> {
        let pending = self.current.as_ref()?;
        let sdu_len = pending.sdu.len();
        let segment = next_segment(sdu_len, self.so, sdu_len, budget, header_len)?;
        let out = SegmentOut {
            sn: pending.sn,
            segment,
            payload: pending.sdu.slice(segment.start..segment.end),
        };

        self.so = segment.end;
        let finished = segment.position.is_last();
        if finished {
            self.current = None;
            self.so = 0;
        }
        Some((out, finished))
    }

    /// Drop the SDU in progress
    pub fn clear(&mut self) {
        self.current = None;
        self.so = 0;
    }
}

/// Sorted set of disjoint, non-adjacent byte ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentSet {
    ranges: Vec<Range<usize>>,
}

impl SegmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Stored ranges in ascending order
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Total number of covered bytes
    pub fn covered(&self) -> usize {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// Highest covered offset plus one
    pub fn end(&self) -> usize {
        self.ranges.last().map(|r| r.end).unwrap_or(0)
    }

    /// Whether `[0, len)` is fully covered
    pub fn covers_all(&self, len: usize) -> bool {
        len == 0 || (self.ranges.len() == 1 && self.ranges[0].start == 0 && self.ranges[0].end >= len)
    }

    /// Parts of `[start, end)` not covered yet
    pub fn uncovered(&self, start: usize, end: usize) -> Vec<Range<usize>> {
        let mut parts = Vec::new();
        let mut cursor = start;
        for r in &self.ranges {
            if r.end <= cursor {
                continue;
            }
            if r.start >= end {
                break;
            }
            if r.start > cursor {
                parts.push(cursor..r.start);
            }
            cursor = cursor.max(r.end);
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            parts.push(cursor..end);
        }
        parts
    }

    /// Add `[start, end)`, merging with overlapping or adjacent ranges
    pub fn insert(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let first = self.ranges.partition_point(|r| r.end < start);
        let mut last = first;
        let mut merged = start..end;
        while last < self.ranges.len() && self.ranges[last].start <= end {
            merged.start = merged.start.min(self.ranges[last].start);
            merged.end = merged.end.max(self.ranges[last].end);
            last += 1;
        }
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Remove and return the first range
    pub fn pop_front(&mut self) -> Option<Range<usize>> {
        if self.ranges.is_empty() {
            None
        } else {
            Some(self.ranges.remove(0))
        }
    }

    /// First range, mutable so its start can be advanced
    pub fn front_mut(&mut self) -> Option<&mut Range<usize>> {
        self.ranges.first_mut()
    }

    /// Cut every range at `limit`
    pub fn truncate(&mut self, limit: usize) {
        self.ranges.retain_mut(|r| {
            r.end = r.end.min(limit);
            r.start < r.end
        });
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::config::{AmSnSize, UmSnSize};
    use crate::rlc::pdu::{AmdHeader, UmdHeader};

    fn am12(position: SegmentPosition) -> usize {
        AmdHeader::header_len(AmSnSize::Size12, position)
    }

    fn um12(position: SegmentPosition) -> usize {
        UmdHeader::header_len(UmSnSize::Size12, position)
    }

    #[test]
    fn test_whole_sdu_fits() {
        let seg = next_segment(100, 0, 100, 102, am12).unwrap();
        assert_eq!(seg, Segment { start: 0, end: 100, position: SegmentPosition::Full });
    }

    #[test]
    fn test_budget_too_small() {
        assert!(next_segment(100, 0, 100, 0, am12).is_none());
        assert!(next_segment(100, 0, 100, 2, am12).is_none());
        // a middle piece needs SN plus SO
        assert!(next_segment(100, 10, 100, 4, am12).is_none());
        assert!(next_segment(100, 10, 100, 5, am12).is_some());
    }

    #[test]
    fn test_um_full_header_smaller_than_first() {
        // full SDU takes 1 header byte, a first segment 2
        let seg = next_segment(10, 0, 10, 11, um12).unwrap();
        assert_eq!(seg.position, SegmentPosition::Full);
        let seg = next_segment(10, 0, 10, 10, um12).unwrap();
        assert_eq!(seg, Segment { start: 0, end: 8, position: SegmentPosition::First });
    }

    #[test]
    fn test_partial_retransmission_range() {
        // retransmitting [20, 60) of a 100 byte SDU never marks it last
        let seg = next_segment(100, 20, 60, 100, am12).unwrap();
        assert_eq!(seg, Segment { start: 20, end: 60, position: SegmentPosition::Middle { so: 20 } });
        let seg = next_segment(100, 60, 100, 100, am12).unwrap();
        assert_eq!(seg.position, SegmentPosition::Last { so: 60 });
    }

    #[test]
    fn test_segments_cover_sdu_exactly() {
        for sdu_len in [1usize, 2, 7, 50, 333, 1500] {
            for budget in [5usize, 6, 9, 64, 1000, 2000] {
                let sdu = Bytes::from((0..sdu_len).map(|i| i as u8).collect::<Vec<_>>());
                let mut segmenter = SduSegmenter::new();
                segmenter.load(PendingSdu { sn: 7, sdu: sdu.clone(), lease: None });

                let mut expected_start = 0;
                let mut rebuilt = Vec::new();
                loop {
                    let (out, done) = segmenter.next(budget, am12).unwrap();
                    assert_eq!(out.sn, 7);
                    assert_eq!(out.segment.start, expected_start);
                    assert!(out.payload.len() + am12(out.segment.position) <= budget);
                    expected_start = out.segment.end;
                    rebuilt.extend_from_slice(&out.payload);
                    if done {
                        break;
                    }
                }
                assert_eq!(rebuilt, sdu.to_vec());
                assert!(!segmenter.is_active());
            }
        }
    }

    #[test]
    fn test_segment_set_insert_merges() {
        let mut set = SegmentSet::new();
        set.insert(10, 20);
        set.insert(30, 40);
        set.insert(20, 25);
        assert_eq!(set.ranges(), &[10..25, 30..40]);
        set.insert(0, 35);
        assert_eq!(set.ranges(), &[0..40]);
        assert!(set.covers_all(40));
        assert!(!set.covers_all(41));
    }

    #[test]
    fn test_segment_set_uncovered() {
        let mut set = SegmentSet::new();
        set.insert(10, 20);
        set.insert(30, 40);
        assert_eq!(set.uncovered(0, 50), vec![0..10, 20..30, 40..50]);
        assert_eq!(set.uncovered(12, 18), Vec::<Range<usize>>::new());
        assert_eq!(set.uncovered(15, 35), vec![20..30]);
        assert_eq!(set.covered(), 20);
    }

    #[test]
    fn test_segment_set_truncate_and_pop() {
        let mut set = SegmentSet::new();
        set.insert(0, 10);
        set.insert(20, 30);
        set.truncate(25);
        assert_eq!(set.ranges(), &[0..10, 20..25]);
        set.truncate(5);
        assert_eq!(set.pop_front(), Some(0..5));
        assert!(set.is_empty());
    }
}
