//! Reassembly Window
//!
//! Receive window shared by the UM and AM RX entities. Segments are merged
//! per SN, complete SDUs are handed up strictly in SN order and
//! t-Reassembly follows TS 38.322 Sections 5.2.2.2 and 5.2.3.2:
//!
//! - UM expiry gives up on everything before the first incomplete SN at or
//!   after the trigger, delivering complete SDUs passed on the way.
//! - AM expiry only moves the status horizon (`rx_highest_status`) so the
//!   gaps below it get NACKed; delivery waits for the retransmissions.

use super::arena::SnArena;
use super::pdu::SegmentPosition;
use super::segmentation::SegmentSet;
use super::sn::SnSpace;
use super::status::SoRange;
use super::timer::{RlcInstant, RlcTimer, TimerExpiry, TimerKind};
use bytes::{BufMut, Bytes, BytesMut};
use interfaces::pool::{PoolLease, SharedPool};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Which RX procedure the window follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Unacknowledged,
    Acknowledged,
}

/// Result of offering one segment to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentVerdict {
    /// New bytes stored; `completed` when they finished the SDU
    Accepted { completed: bool },
    /// Nothing new: SN already delivered or bytes already held
    Duplicate,
    /// SN beyond the receive window
    OutOfWindow,
    /// Segment contradicts what was received for the SN
    Inconsistent,
    /// Pool could not hold the bytes; segment dropped
    PoolExhausted,
}

/// Reception state of one SN as reported in a status PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SduReception {
    Complete,
    /// Nothing received
    Missing,
    /// Missing byte ranges
    Partial(Vec<SoRange>),
}

#[derive(Debug, Default)]
struct RxSdu {
    received: SegmentSet,
    parts: BTreeMap<usize, Bytes>,
    sdu_len: Option<usize>,
    complete: Option<Bytes>,
    leases: Vec<PoolLease>,
}

impl RxSdu {
    /// Bytes missing before the last received byte
    fn has_gap(&self) -> bool {
        if self.complete.is_some() {
            return false;
        }
        match self.received.ranges() {
            [] => false,
            [only] => only.start > 0,
            _ => true,
        }
    }

    fn insert(&mut self, position: SegmentPosition, payload: Bytes, pool: &SharedPool) -> SegmentVerdict {
        if self.complete.is_some() {
            return SegmentVerdict::Duplicate;
        }
        let start = position.so() as usize;
        let end = start + payload.len();
        match self.sdu_len {
            Some(len) if end > len || (position.is_last() && end != len) => return SegmentVerdict::Inconsistent,
            None if position.is_last() && end < self.received.end() => return SegmentVerdict::Inconsistent,
            _ => {}
        }

        let learned_len = position.is_last() && self.sdu_len.is_none();
        let uncovered = self.received.uncovered(start, end);
        if uncovered.is_empty() && !learned_len {
            return SegmentVerdict::Duplicate;
        }

        let needed: usize = uncovered.iter().map(|r| r.len()).sum();
        if needed > 0 {
            match PoolLease::acquire(pool, needed) {
                Ok(lease) => self.leases.push(lease),
                Err(_) => return SegmentVerdict::PoolExhausted,
            }
        }
        for r in uncovered {
            self.parts.insert(r.start, payload.slice(r.start - start..r.end - start));
            self.received.insert(r.start, r.end);
        }
        if learned_len {
            self.sdu_len = Some(end);
        }

        let completed = self.sdu_len.is_some_and(|len| self.received.covers_all(len));
        if completed {
            let mut sdu = BytesMut::with_capacity(self.received.end());
            for part in self.parts.values() {
                sdu.put_slice(part);
            }
            self.parts.clear();
            self.complete = Some(sdu.freeze());
        }
        SegmentVerdict::Accepted { completed }
    }

    fn missing(&self) -> Vec<SoRange> {
        let known_end = self.sdu_len.unwrap_or_else(|| self.received.end());
        let mut gaps: Vec<SoRange> = self
            .received
            .uncovered(0, known_end)
            .into_iter()
            .map(|r| SoRange { start: r.start as u16, end: (r.end - 1) as u16 })
            .collect();
        if self.sdu_len.is_none() {
            gaps.push(SoRange::to_end(known_end as u16));
        }
        gaps
    }
}

/// Receive window over one SN space
#[derive(Debug)]
pub struct ReassemblyWindow {
    mode: WindowMode,
    space: SnSpace,
    pool: SharedPool,
    buffer: SnArena<RxSdu>,
    rx_next: u32,
    rx_next_highest: u32,
    rx_next_status_trigger: u32,
    rx_highest_status: u32,
    t_reassembly: RlcTimer,
    lost_sdus: u64,
}

impl ReassemblyWindow {
    pub fn new(mode: WindowMode, space: SnSpace, t_reassembly_ms: Option<u64>, pool: SharedPool) -> Self {
        Self {
            mode,
            space,
            pool,
            buffer: SnArena::new(space),
            rx_next: 0,
            rx_next_highest: 0,
            rx_next_status_trigger: 0,
            rx_highest_status: 0,
            t_reassembly: RlcTimer::new(TimerKind::Reassembly, t_reassembly_ms),
            lost_sdus: 0,
        }
    }

    /// Lowest SN not yet delivered
    pub fn rx_next(&self) -> u32 {
        self.rx_next
    }

    /// Highest received SN plus one
    pub fn rx_next_highest(&self) -> u32 {
        self.rx_next_highest
    }

    /// SN the running t-Reassembly was armed at
    pub fn rx_next_status_trigger(&self) -> u32 {
        self.rx_next_status_trigger
    }

    /// AM status horizon: ACK_SN of the next status report
    pub fn rx_highest_status(&self) -> u32 {
        self.rx_highest_status
    }

    pub fn timer(&self) -> &RlcTimer {
        &self.t_reassembly
    }

    /// SDUs given up on by UM reassembly expiry
    pub fn lost_sdus(&self) -> u64 {
        self.lost_sdus
    }

    /// Number of SNs with buffered data
    pub fn buffered_sdus(&self) -> usize {
        self.buffer.len()
    }

    /// Whether `sn` falls in `[rx_next_highest - window_size, rx_next)`,
    /// i.e. may have been received and delivered already
    pub fn is_behind(&self, sn: u32) -> bool {
        let lower = self.space.sub(self.rx_next_highest, self.space.window_size());
        self.space.in_window(sn, lower, self.space.distance(lower, self.rx_next))
    }

    /// Whether `sn` lies inside `[rx_next, rx_next + window_size)`
    pub fn in_window(&self, sn: u32) -> bool {
        self.space.in_window(sn, self.rx_next, self.space.window_size())
    }

    /// Whether `a` comes before `b`, both measured from `rx_next`
    pub fn precedes(&self, a: u32, b: u32) -> bool {
        self.space.distance(self.rx_next, a) < self.space.distance(self.rx_next, b)
    }

    fn is_complete(&self, sn: u32) -> bool {
        self.buffer.get(sn).is_some_and(|e| e.complete.is_some())
    }

    fn has_gap(&self, sn: u32) -> bool {
        self.buffer.get(sn).is_some_and(RxSdu::has_gap)
    }

    /// Reception state of `sn`
    pub fn reception(&self, sn: u32) -> SduReception {
        if self.is_behind(sn) {
            return SduReception::Complete;
        }
        match self.buffer.get(sn) {
            Some(e) if e.complete.is_some() => SduReception::Complete,
            Some(e) if !e.received.is_empty() => SduReception::Partial(e.missing()),
            _ => SduReception::Missing,
        }
    }

    /// Offer one segment. SDUs that become deliverable in order are
    /// appended to `delivered`.
    pub fn handle_segment(
        &mut self,
        now: RlcInstant,
        sn: u32,
        position: SegmentPosition,
        payload: Bytes,
        delivered: &mut Vec<Bytes>,
    ) -> SegmentVerdict {
        if !self.in_window(sn) {
            if self.is_behind(sn) {
                trace!("SN={} behind rx_next={}, duplicate", sn, self.rx_next);
                return SegmentVerdict::Duplicate;
            }
            if self.mode == WindowMode::Acknowledged {
                debug!("SN={} outside receive window [{}, +{})", sn, self.rx_next, self.space.window_size());
                return SegmentVerdict::OutOfWindow;
            }
            self.slide_to(sn, delivered);
        }

        let created = !self.buffer.contains(sn);
        if created {
            self.buffer.insert(sn, RxSdu::default());
        }
        let verdict = match self.buffer.get_mut(sn) {
            Some(entry) => entry.insert(position, payload, &self.pool),
            None => SegmentVerdict::Inconsistent,
        };

        let completed = match verdict {
            SegmentVerdict::Accepted { completed } => completed,
            _ => {
                if created {
                    self.buffer.remove(sn);
                }
                return verdict;
            }
        };

        if !self.precedes(sn, self.rx_next_highest) {
            self.rx_next_highest = self.space.add(sn, 1);
        }

        if completed {
            trace!("SN={} reassembled", sn);
            if self.mode == WindowMode::Acknowledged && sn == self.rx_highest_status {
                self.rx_highest_status = self.first_incomplete_from(self.space.add(sn, 1));
            }
            if sn == self.rx_next {
                self.advance_rx_next(delivered);
            }
        }

        self.update_timer(now);
        verdict
    }

    /// First SN at or after `from` that is not complete, bounded by `rx_next_highest`
    fn first_incomplete_from(&self, from: u32) -> u32 {
        let mut sn = from;
        while sn != self.rx_next_highest && self.is_complete(sn) {
            sn = self.space.add(sn, 1);
        }
        sn
    }

    fn advance_rx_next(&mut self, delivered: &mut Vec<Bytes>) {
        while self.rx_next != self.rx_next_highest {
            match self.buffer.get(self.rx_next) {
                Some(e) if e.complete.is_some() => {}
                _ => break,
            }
            if let Some(sdu) = self.buffer.remove(self.rx_next).and_then(|e| e.complete) {
                delivered.push(sdu);
            }
            self.rx_next = self.space.add(self.rx_next, 1);
        }
        let highest = self.space.distance(self.rx_next, self.rx_next_highest);
        if self.space.distance(self.rx_next, self.rx_highest_status) > highest {
            self.rx_highest_status = self.rx_next;
        }
    }

    /// UM only: move the window up so that `sn` is its highest SN. SDUs
    /// falling below it are delivered when complete and counted lost
    /// otherwise.
    fn slide_to(&mut self, sn: u32, delivered: &mut Vec<Bytes>) {
        let lower = self.space.sub(self.space.add(sn, 1), self.space.window_size());
        debug!("SN={} beyond receive window, rx_next {} -> {}", sn, self.rx_next, lower);
        let passed_highest =
            self.space.distance(self.rx_next, lower) >= self.space.distance(self.rx_next, self.rx_next_highest);
        while self.rx_next != lower {
            match self.buffer.remove(self.rx_next).and_then(|e| e.complete) {
                Some(sdu) => delivered.push(sdu),
                None => self.lost_sdus += 1,
            }
            self.rx_next = self.space.add(self.rx_next, 1);
        }
        if passed_highest {
            self.rx_next_highest = lower;
        }
        self.advance_rx_next(delivered);
    }

    /// Stop t-Reassembly when its trigger was passed, start it when data
    /// is missing below `rx_next_highest`
    fn update_timer(&mut self, now: RlcInstant) {
        if self.t_reassembly.is_running() {
            let trigger = self.rx_next_status_trigger;
            let ws = self.space.window_size();
            let ahead = self.space.distance(self.rx_next, trigger);
            let stop = trigger == self.rx_next
                || ahead > ws
                || (ahead == 1 && !self.has_gap(self.rx_next));
            if stop {
                trace!("t-Reassembly stopped, trigger={} rx_next={}", trigger, self.rx_next);
                self.t_reassembly.stop();
            }
        }

        if !self.t_reassembly.is_running() {
            self.arm_from(now, self.rx_next);
        }
    }

    /// Start t-Reassembly if data after `base` is missing
    fn arm_from(&mut self, now: RlcInstant, base: u32) {
        let span = self.space.distance(base, self.rx_next_highest);
        if span > 1 || (span == 1 && self.has_gap(base)) {
            if self.t_reassembly.start(now) {
                self.rx_next_status_trigger = self.rx_next_highest;
                trace!("t-Reassembly started, trigger={}", self.rx_next_status_trigger);
            }
        }
    }

    /// Handle a t-Reassembly expiry. Returns false for stale expiries.
    pub fn handle_reassembly_expiry(
        &mut self,
        now: RlcInstant,
        expiry: TimerExpiry,
        delivered: &mut Vec<Bytes>,
    ) -> bool {
        if !self.t_reassembly.try_expire(expiry) {
            return false;
        }
        let trigger = self.rx_next_status_trigger;

        match self.mode {
            WindowMode::Acknowledged => {
                let horizon = self.first_incomplete_from(trigger);
                if self.precedes(self.rx_highest_status, horizon) {
                    self.rx_highest_status = horizon;
                }
                debug!("t-Reassembly expired, rx_highest_status={}", self.rx_highest_status);
                self.arm_from(now, self.rx_highest_status);
            }
            WindowMode::Unacknowledged => {
                let target = self.first_incomplete_from(trigger);
                while self.rx_next != target {
                    match self.buffer.remove(self.rx_next).and_then(|e| e.complete) {
                        Some(sdu) => delivered.push(sdu),
                        None => self.lost_sdus += 1,
                    }
                    self.rx_next = self.space.add(self.rx_next, 1);
                }
                debug!("t-Reassembly expired, rx_next={} ({} SDUs lost so far)", self.rx_next, self.lost_sdus);
                self.arm_from(now, self.rx_next);
            }
        }
        true
    }

    /// Drop every buffered segment and stop the timer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.t_reassembly.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interfaces::pool::{BufferPool, SegmentPool, UnboundedPool};
    use std::sync::Arc;

    fn window(mode: WindowMode, bits: u8) -> ReassemblyWindow {
        ReassemblyWindow::new(mode, SnSpace::new(bits), Some(35), Arc::new(UnboundedPool::new()))
    }

    fn sdu(tag: u8, len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| tag.wrapping_add(i as u8)).collect::<Vec<_>>())
    }

    fn offer(w: &mut ReassemblyWindow, sn: u32, data: &Bytes, start: usize, end: usize, out: &mut Vec<Bytes>) -> SegmentVerdict {
        let position = SegmentPosition::for_range(start, end, data.len());
        w.handle_segment(RlcInstant(0), sn, position, data.slice(start..end), out)
    }

    #[test]
    fn test_in_order_delivery_waits_for_gap() {
        let mut w = window(WindowMode::Acknowledged, 12);
        let mut out = Vec::new();
        let sdus: Vec<Bytes> = (0..3).map(|i| sdu(i as u8 * 10, 20)).collect();

        offer(&mut w, 1, &sdus[1], 0, 20, &mut out);
        offer(&mut w, 2, &sdus[2], 0, 20, &mut out);
        assert!(out.is_empty());
        assert!(w.timer().is_running());
        assert_eq!(w.rx_next_status_trigger(), 2);

        offer(&mut w, 0, &sdus[0], 0, 20, &mut out);
        assert_eq!(out, sdus);
        assert_eq!(w.rx_next(), 3);
        assert!(!w.timer().is_running());
    }

    #[test]
    fn test_reassembly_idempotent_under_duplicates_and_order() {
        let data = sdu(1, 100);
        let pieces = [(60, 100), (0, 30), (20, 70), (0, 30), (30, 60), (60, 100)];
        let mut w = window(WindowMode::Acknowledged, 12);
        let mut out = Vec::new();
        let mut verdicts = Vec::new();
        for (start, end) in pieces {
            verdicts.push(offer(&mut w, 0, &data, start, end, &mut out));
        }
        assert_eq!(out, vec![data.clone()]);
        assert_eq!(verdicts[3], SegmentVerdict::Duplicate);
        assert_eq!(verdicts[4], SegmentVerdict::Duplicate);
        assert_eq!(verdicts[5], SegmentVerdict::Duplicate);
        assert_eq!(w.buffered_sdus(), 0);
    }

    #[test]
    fn test_duplicate_behind_and_out_of_window() {
        let mut w = window(WindowMode::Acknowledged, 6);
        let mut out = Vec::new();
        let data = sdu(0, 10);
        offer(&mut w, 0, &data, 0, 10, &mut out);
        assert_eq!(offer(&mut w, 0, &data, 0, 10, &mut out), SegmentVerdict::Duplicate);
        // window is [1, 33)
        assert!(matches!(offer(&mut w, 32, &data, 0, 10, &mut out), SegmentVerdict::Accepted { .. }));
        assert_eq!(offer(&mut w, 33, &data, 0, 10, &mut out), SegmentVerdict::OutOfWindow);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_um_sn_beyond_window_slides_it() {
        let mut w = window(WindowMode::Unacknowledged, 6);
        let mut out = Vec::new();
        let partial = sdu(0, 10);
        let whole = sdu(1, 10);
        offer(&mut w, 0, &partial, 0, 5, &mut out);
        offer(&mut w, 1, &whole, 0, 10, &mut out);
        assert!(out.is_empty());
        assert!(w.timer().is_running());

        // SN 40 still lies in [rx_next_highest - 32, rx_next): stale
        assert_eq!(offer(&mut w, 40, &whole, 0, 10, &mut out), SegmentVerdict::Duplicate);

        let ahead = sdu(33, 10);
        assert_eq!(offer(&mut w, 33, &ahead, 0, 10, &mut out), SegmentVerdict::Accepted { completed: true });
        assert_eq!(out, vec![whole]);
        assert_eq!(w.lost_sdus(), 1);
        assert_eq!(w.rx_next(), 2);
        assert_eq!(w.rx_next_highest(), 34);
        assert_eq!(w.rx_next_status_trigger(), 34);
        assert_eq!(w.buffered_sdus(), 1);
    }

    #[test]
    fn test_inconsistent_last_segment() {
        let mut w = window(WindowMode::Acknowledged, 12);
        let mut out = Vec::new();
        let data = sdu(0, 50);
        offer(&mut w, 0, &data, 30, 50, &mut out);
        let shorter = w.handle_segment(RlcInstant(0), 0, SegmentPosition::Last { so: 10 }, data.slice(10..20), &mut out);
        assert_eq!(shorter, SegmentVerdict::Inconsistent);
        let beyond = w.handle_segment(RlcInstant(0), 0, SegmentPosition::Middle { so: 45 }, data.slice(0..10), &mut out);
        assert_eq!(beyond, SegmentVerdict::Inconsistent);
    }

    #[test]
    fn test_wraparound_6bit() {
        let mut w = window(WindowMode::Unacknowledged, 6);
        let mut out = Vec::new();
        // move the window to 60 first
        for sn in 0..60u32 {
            let data = sdu(sn as u8, 4);
            offer(&mut w, sn, &data, 0, 4, &mut out);
        }
        out.clear();
        let sns = [60u32, 61, 62, 63, 0, 1, 2, 3];
        let sdus: Vec<Bytes> = sns.iter().map(|&sn| sdu(sn as u8, 8)).collect();
        // deliver in reverse order, each as two segments
        for (i, &sn) in sns.iter().enumerate().rev() {
            offer(&mut w, sn, &sdus[i], 4, 8, &mut out);
            offer(&mut w, sn, &sdus[i], 0, 4, &mut out);
        }
        assert_eq!(out, sdus);
        assert_eq!(w.rx_next(), 4);
    }

    #[test]
    fn test_um_expiry_gives_up_on_gap() {
        let mut w = window(WindowMode::Unacknowledged, 12);
        let mut out = Vec::new();
        let a = sdu(1, 10);
        let b = sdu(2, 10);
        offer(&mut w, 1, &a, 0, 10, &mut out);
        offer(&mut w, 2, &b, 0, 5, &mut out);
        offer(&mut w, 3, &b, 0, 10, &mut out);
        let (_, expiry) = w.timer().armed().unwrap();
        assert_eq!(w.rx_next_status_trigger(), 2);

        assert!(w.handle_reassembly_expiry(RlcInstant(35), expiry, &mut out));
        // SN 0 lost, SN 1 delivered, SN 2 partial at the new rx_next
        assert_eq!(out, vec![a]);
        assert_eq!(w.rx_next(), 2);
        assert_eq!(w.lost_sdus(), 1);
        assert!(w.timer().is_running());
        assert_eq!(w.rx_next_status_trigger(), 4);

        let (_, expiry) = w.timer().armed().unwrap();
        out.clear();
        w.handle_reassembly_expiry(RlcInstant(70), expiry, &mut out);
        assert_eq!(out, vec![b]);
        assert_eq!(w.rx_next(), 4);
        assert_eq!(w.lost_sdus(), 2);
        assert!(!w.timer().is_running());
    }

    #[test]
    fn test_am_expiry_moves_status_horizon_only() {
        let mut w = window(WindowMode::Acknowledged, 12);
        let mut out = Vec::new();
        let data = sdu(0, 10);
        offer(&mut w, 0, &data, 0, 10, &mut out);
        offer(&mut w, 2, &data, 0, 10, &mut out);
        offer(&mut w, 3, &data, 0, 10, &mut out);
        assert_eq!(w.rx_next(), 1);
        assert_eq!(w.rx_highest_status(), 1);

        let (_, expiry) = w.timer().armed().unwrap();
        assert!(w.handle_reassembly_expiry(RlcInstant(35), expiry, &mut out));
        assert_eq!(w.rx_highest_status(), 4);
        assert_eq!(w.rx_next(), 1);
        assert_eq!(out.len(), 1);
        assert_eq!(w.reception(1), SduReception::Missing);
        assert_eq!(w.reception(2), SduReception::Complete);

        offer(&mut w, 1, &data, 0, 10, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(w.rx_next(), 4);
    }

    #[test]
    fn test_partial_reception_ranges() {
        let mut w = window(WindowMode::Acknowledged, 12);
        let mut out = Vec::new();
        let data = sdu(0, 100);
        offer(&mut w, 0, &data, 10, 20, &mut out);
        offer(&mut w, 0, &data, 40, 50, &mut out);
        assert_eq!(
            w.reception(0),
            SduReception::Partial(vec![
                SoRange { start: 0, end: 9 },
                SoRange { start: 20, end: 39 },
                SoRange::to_end(50),
            ])
        );
        offer(&mut w, 0, &data, 90, 100, &mut out);
        assert_eq!(
            w.reception(0),
            SduReception::Partial(vec![
                SoRange { start: 0, end: 9 },
                SoRange { start: 20, end: 39 },
                SoRange { start: 50, end: 89 },
            ])
        );
    }

    #[test]
    fn test_gap_in_rx_next_arms_timer() {
        let mut w = window(WindowMode::Acknowledged, 12);
        let mut out = Vec::new();
        let data = sdu(0, 100);
        offer(&mut w, 0, &data, 0, 30, &mut out);
        assert!(!w.timer().is_running());
        offer(&mut w, 0, &data, 60, 100, &mut out);
        assert!(w.timer().is_running());
        offer(&mut w, 0, &data, 30, 60, &mut out);
        assert!(!w.timer().is_running());
        assert_eq!(out, vec![data]);
    }

    #[test]
    fn test_pool_exhaustion_drops_segment() {
        let pool: SharedPool = Arc::new(SegmentPool::new(1, 64).unwrap());
        let mut w = ReassemblyWindow::new(WindowMode::Acknowledged, SnSpace::new(12), Some(35), Arc::clone(&pool));
        let mut out = Vec::new();
        let big = sdu(0, 100);
        let verdict = w.handle_segment(RlcInstant(0), 0, SegmentPosition::First, big.slice(0..80), &mut out);
        assert_eq!(verdict, SegmentVerdict::PoolExhausted);
        assert_eq!(w.buffered_sdus(), 0);

        let small = sdu(0, 10);
        offer(&mut w, 0, &small, 0, 10, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(pool.bytes_in_use(), 0);
    }

    #[test]
    fn test_stale_expiry_ignored() {
        let mut w = window(WindowMode::Unacknowledged, 12);
        let mut out = Vec::new();
        let data = sdu(0, 10);
        offer(&mut w, 1, &data, 0, 10, &mut out);
        offer(&mut w, 2, &data, 0, 10, &mut out);
        let (_, expiry) = w.timer().armed().unwrap();
        offer(&mut w, 0, &data, 0, 10, &mut out);
        assert!(!w.handle_reassembly_expiry(RlcInstant(35), expiry, &mut out));
        assert_eq!(w.lost_sdus(), 0);
    }
}
