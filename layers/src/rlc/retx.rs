//! Retransmission Store
//!
//! Keeps every AM SDU with SN in `[tx_next_ack, tx_next)` until a status
//! report acknowledges it. Retransmissions are byte ranges of stored SDUs,
//! queued in ascending SN order and cut to the grant on demand.

use super::arena::SnArena;
use super::pdu::SegmentPosition;
use super::segmentation::{next_segment, SegmentOut, SegmentSet};
use super::sn::SnSpace;
use super::status::StatusPdu;
use super::FailureCause;
use bytes::Bytes;
use interfaces::pool::PoolLease;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Reasons a status report is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusRejection {
    #[error("ACK_SN {ack_sn} outside [{tx_next_ack}, {tx_next}]")]
    AckOutOfWindow { ack_sn: u32, tx_next_ack: u32, tx_next: u32 },

    #[error("NACK_SN {sn} outside [{tx_next_ack}, {tx_next})")]
    NackOutOfWindow { sn: u32, tx_next_ack: u32, tx_next: u32 },

    #[error("NACK_SN {0} refers to an acknowledged SDU")]
    NackForAcked(u32),

    #[error("NACK_SN {0} out of order")]
    NacksUnordered(u32),

    #[error("NACK SO range for SN {sn} inconsistent with SDU of {sdu_len} bytes")]
    InvalidSoRange { sn: u32, sdu_len: usize },
}

#[derive(Debug)]
struct TxEntry {
    sdu: Bytes,
    _lease: Option<PoolLease>,
    /// Bytes transmitted at least once
    sent: usize,
    retx_count: u32,
    /// Byte ranges waiting for retransmission
    pending: SegmentSet,
}

/// What an acknowledgement released
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AckOutcome {
    pub sdus: usize,
    pub bytes: usize,
}

/// Store of unacknowledged AM SDUs
#[derive(Debug)]
pub struct RetransmissionStore {
    space: SnSpace,
    max_retx_thresh: u32,
    entries: SnArena<TxEntry>,
    /// SNs with pending ranges, ascending from `tx_next_ack`
    queue: VecDeque<u32>,
    tx_next_ack: u32,
}

impl RetransmissionStore {
    pub fn new(space: SnSpace, max_retx_thresh: u32) -> Self {
        Self {
            space,
            max_retx_thresh,
            entries: SnArena::new(space),
            queue: VecDeque::new(),
            tx_next_ack: 0,
        }
    }

    /// Lowest unacknowledged SN
    pub fn tx_next_ack(&self) -> u32 {
        self.tx_next_ack
    }

    /// Number of SDUs held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sn: u32) -> bool {
        self.entries.contains(sn)
    }

    pub fn retx_count(&self, sn: u32) -> Option<u32> {
        self.entries.get(sn).map(|e| e.retx_count)
    }

    /// Whether `sn` has bytes queued for retransmission
    pub fn is_pending(&self, sn: u32) -> bool {
        self.entries.get(sn).map(|e| !e.pending.is_empty()).unwrap_or(false)
    }

    /// Whether any retransmission is queued
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Payload bytes queued for retransmission and the number of ranges
    pub fn pending_bytes(&self) -> (usize, usize) {
        self.queue
            .iter()
            .filter_map(|sn| self.entries.get(*sn))
            .fold((0, 0), |(bytes, ranges), e| (bytes + e.pending.covered(), ranges + e.pending.ranges().len()))
    }

    /// Store a newly assigned SDU; false if `sn` lies outside the window
    pub fn insert(&mut self, sn: u32, sdu: Bytes, lease: Option<PoolLease>) -> bool {
        if !self.space.in_window(sn, self.tx_next_ack, self.space.window_size()) || self.entries.contains(sn) {
            return false;
        }
        let entry = TxEntry { sdu, _lease: lease, sent: 0, retx_count: 0, pending: SegmentSet::new() };
        self.entries.insert(sn, entry);
        true
    }

    /// Record that bytes up to `end` of `sn` went out at least once
    pub fn record_sent(&mut self, sn: u32, end: usize) {
        if let Some(entry) = self.entries.get_mut(sn) {
            entry.sent = entry.sent.max(end);
        }
    }

    /// Check a status report against the window before anything is applied
    pub fn validate_status(&self, status: &StatusPdu, tx_next: u32) -> Result<(), StatusRejection> {
        let span = self.space.distance(self.tx_next_ack, tx_next);
        if self.space.distance(self.tx_next_ack, status.ack_sn) > span {
            return Err(StatusRejection::AckOutOfWindow {
                ack_sn: status.ack_sn,
                tx_next_ack: self.tx_next_ack,
                tx_next,
            });
        }

        let mut previous: Option<u32> = None;
        for nack in &status.nacks {
            for (sn, so) in nack.expand(self.space) {
                let offset = self.space.distance(self.tx_next_ack, sn);
                if offset >= span {
                    return Err(StatusRejection::NackOutOfWindow { sn, tx_next_ack: self.tx_next_ack, tx_next });
                }
                if previous.is_some_and(|p| offset < p) {
                    return Err(StatusRejection::NacksUnordered(sn));
                }
                previous = Some(offset);

                let entry = self.entries.get(sn).ok_or(StatusRejection::NackForAcked(sn))?;
                if let Some(so) = so {
                    if so.resolve(entry.sdu.len()).is_none() {
                        return Err(StatusRejection::InvalidSoRange { sn, sdu_len: entry.sdu.len() });
                    }
                }
            }
        }
        Ok(())
    }

    /// Queue the NACKed ranges of a validated report. The retx count of an
    /// SDU is incremented once per report, and not at all while it still
    /// has bytes waiting from an earlier report. Bytes never sent are not
    /// queued.
    pub fn mark_nacked(&mut self, status: &StatusPdu) -> Result<usize, FailureCause> {
        let mut counted: Vec<u32> = Vec::new();
        let mut queued = 0;
        for nack in &status.nacks {
            for (sn, so) in nack.expand(self.space) {
                let Some(entry) = self.entries.get_mut(sn) else {
                    continue;
                };
                let len = entry.sdu.len();
                let (start, end) = so.and_then(|so| so.resolve(len)).unwrap_or((0, len));
                let end = end.min(entry.sent);
                if start >= end {
                    continue;
                }

                if !counted.contains(&sn) {
                    if entry.pending.is_empty() {
                        entry.retx_count += 1;
                        if entry.retx_count > self.max_retx_thresh {
                            return Err(FailureCause::MaxRetxReached { sn, retx_count: entry.retx_count });
                        }
                        queued += 1;
                    }
                    counted.push(sn);
                }
                entry.pending.insert(start, end);
                self.enqueue(sn);
            }
        }
        Ok(queued)
    }

    /// Release every SDU below `ack_sn` not NACKed in the same report and
    /// move `tx_next_ack` to the lowest SN still held below `ack_sn`, or to
    /// `ack_sn` itself.
    pub fn mark_acked(&mut self, status: &StatusPdu) -> AckOutcome {
        let nacked: HashSet<u32> = status
            .nacks
            .iter()
            .flat_map(|n| n.expand(self.space).map(|(sn, _)| sn).collect::<Vec<_>>())
            .collect();

        let mut outcome = AckOutcome::default();
        let mut lowest_held = None;
        for sn in self.space.range(self.tx_next_ack, status.ack_sn) {
            if nacked.contains(&sn) {
                if lowest_held.is_none() && self.entries.contains(sn) {
                    lowest_held = Some(sn);
                }
                continue;
            }
            if let Some(entry) = self.entries.remove(sn) {
                outcome.sdus += 1;
                outcome.bytes += entry.sdu.len();
            }
        }
        if outcome.sdus > 0 {
            let entries = &self.entries;
            self.queue.retain(|sn| entries.contains(*sn));
        }
        self.tx_next_ack = lowest_held.unwrap_or(status.ack_sn);
        outcome
    }

    /// Queue the whole sent part of the oldest unacknowledged SDU, as done on
    /// t-PollRetransmit expiry. Returns its SN, or `None` if nothing is held.
    pub fn queue_oldest(&mut self) -> Result<Option<u32>, FailureCause> {
        let sn = self.tx_next_ack;
        let Some(entry) = self.entries.get_mut(sn) else {
            return Ok(None);
        };
        if !entry.pending.is_empty() || entry.sent == 0 {
            return Ok(Some(sn));
        }
        entry.retx_count += 1;
        if entry.retx_count > self.max_retx_thresh {
            return Err(FailureCause::MaxRetxReached { sn, retx_count: entry.retx_count });
        }
        entry.pending.insert(0, entry.sent);
        self.enqueue(sn);
        Ok(Some(sn))
    }

    fn enqueue(&mut self, sn: u32) {
        if self.queue.contains(&sn) {
            return;
        }
        let offset = self.space.distance(self.tx_next_ack, sn);
        let at = self
            .queue
            .iter()
            .position(|q| self.space.distance(self.tx_next_ack, *q) > offset)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, sn);
    }

    /// Next retransmission that fits `budget`, re-segmenting if needed. The
    /// SN is kept; only the queued range shrinks.
    pub fn next_retransmission(
        &mut self,
        budget: usize,
        header_len: impl Fn(SegmentPosition) -> usize,
    ) -> Option<SegmentOut> {
        while let Some(&sn) = self.queue.front() {
            let Some(entry) = self.entries.get_mut(sn) else {
                self.queue.pop_front();
                continue;
            };
            let Some(range) = entry.pending.front_mut() else {
                self.queue.pop_front();
                continue;
            };

            let segment = next_segment(entry.sdu.len(), range.start, range.end, budget, &header_len)?;
            range.start = segment.end;
            if range.is_empty() {
                entry.pending.pop_front();
            }
            let payload = entry.sdu.slice(segment.start..segment.end);
            if entry.pending.is_empty() {
                self.queue.pop_front();
            }
            return Some(SegmentOut { sn, segment, payload });
        }
        None
    }

    /// Drop every SDU and queued retransmission
    pub fn clear(&mut self) {
        self.entries.clear();
        self.queue.clear();
    }
}
