//! AM Transmitting Side
//!
//! New SDUs get an SN when their first piece goes out and stay in the
//! [`RetransmissionStore`] until acknowledged. Each grant serves queued
//! retransmissions before new data. New data stops while the window
//! `[tx_next_ack, tx_next_ack + window_size)` is full.

use super::config::{AmSnSize, RlcAmConfig};
use super::metrics::RlcTxMetrics;
use super::pdu::{self, AmdHeader};
use super::poll::PollController;
use super::retx::RetransmissionStore;
use super::sdu_queue::{QueuedSdu, SduQueue};
use super::segmentation::{PendingSdu, SduSegmenter, SegmentOut};
use super::sn::SnSpace;
use super::status::StatusPdu;
use super::timer::{RlcInstant, TimerExpiry, TimerKind};
use super::FailureCause;
use crate::LayerError;
use bytes::Bytes;
use interfaces::pool::SharedPool;
use tracing::{debug, warn};

/// Transmitting side of an AM bearer
#[derive(Debug)]
pub struct TxAmEntity {
    prefix: String,
    sn_size: AmSnSize,
    space: SnSpace,
    queue: SduQueue,
    segmenter: SduSegmenter,
    /// SDU loaded into the segmenter whose first piece has not gone out
    staged: Option<QueuedSdu>,
    store: RetransmissionStore,
    poll: PollController,
    tx_next: u32,
    metrics: RlcTxMetrics,
}

impl TxAmEntity {
    pub fn new(prefix: String, config: &RlcAmConfig, queue_size: usize, pool: SharedPool) -> Self {
        let sn_size = config.tx_sn_field_length;
        let space = sn_size.space();
        Self {
            prefix,
            sn_size,
            space,
            queue: SduQueue::new(queue_size, pool),
            segmenter: SduSegmenter::new(),
            staged: None,
            store: RetransmissionStore::new(space, config.max_retx_thresh),
            poll: PollController::new(config),
            tx_next: 0,
            metrics: RlcTxMetrics::default(),
        }
    }

    pub fn tx_next(&self) -> u32 {
        self.tx_next
    }

    pub fn tx_next_ack(&self) -> u32 {
        self.store.tx_next_ack()
    }

    pub fn store(&self) -> &RetransmissionStore {
        &self.store
    }

    pub fn poll(&self) -> &PollController {
        &self.poll
    }

    pub fn metrics(&self) -> &RlcTxMetrics {
        &self.metrics
    }

    /// Whether no new SN can be assigned until an acknowledgement arrives
    pub fn window_stalled(&self) -> bool {
        self.stalled_at(self.tx_next)
    }

    fn stalled_at(&self, tx_next: u32) -> bool {
        self.space.distance(self.store.tx_next_ack(), tx_next) >= self.space.window_size()
    }

    pub fn submit_sdu(&mut self, sdu: Bytes) -> Result<(), LayerError> {
        let len = sdu.len();
        if let Err(e) = self.queue.push(sdu) {
            self.metrics.num_rejected_sdus += 1;
            return Err(e);
        }
        self.metrics.num_sdus += 1;
        self.metrics.num_sdu_bytes += len as u64;
        debug!("{} Queued SDU len={} ({} queued)", self.prefix, len, self.queue.len());
        Ok(())
    }

    /// Bytes waiting for new transmission or retransmission, with headers
    pub fn buffer_state(&self) -> usize {
        let full_header = AmdHeader::header_len(self.sn_size, pdu::SegmentPosition::Full);
        let so_header = AmdHeader::header_len(self.sn_size, pdu::SegmentPosition::Middle { so: 0 });
        let in_progress = if self.segmenter.is_active() { self.segmenter.remaining() + so_header } else { 0 };
        let (retx_bytes, retx_ranges) = self.store.pending_bytes();
        self.queue.bytes() + self.queue.len() * full_header + in_progress + retx_bytes + retx_ranges * so_header
    }

    fn buffers_empty(&self) -> bool {
        self.queue.is_empty() && !self.segmenter.is_active() && !self.store.has_pending()
    }

    /// Build the next AMD PDU that fits `budget` bytes
    pub fn pull_pdu(&mut self, now: RlcInstant, budget: usize) -> Option<Bytes> {
        let sn_size = self.sn_size;
        let header_len = |p: pdu::SegmentPosition| AmdHeader::header_len(sn_size, p);

        if self.store.has_pending() {
            if let Some(out) = self.store.next_retransmission(budget, header_len) {
                let pdu = self.build_pdu(now, &out, None, self.tx_next)?;
                self.metrics.num_retx_pdus += 1;
                self.metrics.num_retx_bytes += pdu.len() as u64;
                return Some(pdu);
            }
            if self.store.has_pending() {
                return None;
            }
        }

        if !self.segmenter.is_active() {
            if self.window_stalled() {
                debug!("{} Window stalled at tx_next_ack={} tx_next={}",
                       self.prefix, self.store.tx_next_ack(), self.tx_next);
                return None;
            }
            let queued = self.queue.pop()?;
            self.segmenter.load(PendingSdu { sn: self.tx_next, sdu: queued.sdu.clone(), lease: None });
            self.staged = Some(queued);
        }

        let (out, _) = self.segmenter.next(budget, header_len)?;
        let first_piece = out.segment.start == 0;
        let tx_next = if first_piece { self.space.add(self.tx_next, 1) } else { self.tx_next };
        let Some(pdu) = self.build_pdu(now, &out, Some(out.payload.len()), tx_next) else {
            warn!("{} Dropping SDU sn={}", self.prefix, out.sn);
            self.segmenter.clear();
            self.staged = None;
            return None;
        };

        if first_piece {
            if let Some(staged) = self.staged.take() {
                self.store.insert(out.sn, staged.sdu, Some(staged.lease));
            }
            self.tx_next = tx_next;
        }
        self.store.record_sent(out.sn, out.segment.end);
        Some(pdu)
    }

    /// Encode one AMD PDU, then commit poll state and counters. `tx_next`
    /// is the value it will have once this PDU is sent.
    fn build_pdu(&mut self, now: RlcInstant, out: &SegmentOut, new_data: Option<usize>, tx_next: u32) -> Option<Bytes> {
        let poll = self.poll.poll_due(new_data, self.buffers_empty(), self.stalled_at(tx_next));
        let header = AmdHeader { poll, position: out.segment.position, sn: out.sn };
        let header_len = AmdHeader::header_len(self.sn_size, header.position);
        let sn_size = self.sn_size;
        let pdu = match pdu::assemble(header_len, &out.payload, |buf| header.write(sn_size, buf)) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("{} Cannot encode AMD header for sn={}: {}", self.prefix, out.sn, e);
                return None;
            }
        };

        self.poll.on_pdu_sent(new_data);
        if poll {
            self.poll.on_poll_sent(now, self.space.sub(tx_next, 1));
            self.metrics.num_polls += 1;
        }
        debug!("{} TX AMD PDU sn={} {:?} poll={} len={}",
               self.prefix, out.sn, out.segment.position, poll, pdu.len());
        self.metrics.num_pdus += 1;
        self.metrics.num_pdu_bytes += pdu.len() as u64;
        Some(pdu)
    }

    /// Apply a received STATUS PDU. Malformed or inconsistent reports are
    /// dropped whole; exceeding the retransmission limit fails the bearer.
    pub fn handle_status(&mut self, now: RlcInstant, pdu: &[u8]) -> Result<(), FailureCause> {
        self.metrics.num_status_received += 1;
        let status = match StatusPdu::decode(self.sn_size, pdu) {
            Ok(status) => status,
            Err(e) => {
                warn!("{} Dropping malformed status PDU: {}", self.prefix, e);
                self.metrics.num_malformed_status += 1;
                return Ok(());
            }
        };
        if let Err(e) = self.store.validate_status(&status, self.tx_next) {
            warn!("{} Rejecting status PDU: {}", self.prefix, e);
            self.metrics.num_malformed_status += 1;
            return Ok(());
        }
        debug!("{} RX status ack_sn={} nacks={}", self.prefix, status.ack_sn, status.nacks.len());

        let queued = self.store.mark_nacked(&status)?;
        let acked = self.store.mark_acked(&status);
        self.metrics.num_acked_sdus += acked.sdus as u64;
        if queued > 0 || acked.sdus > 0 {
            debug!("{} {} SDUs acknowledged, {} queued for retx, tx_next_ack={}",
                   self.prefix, acked.sdus, queued, self.store.tx_next_ack());
        }
        self.poll.on_status(now, status.ack_sn, self.tx_next);
        Ok(())
    }

    /// Handle a t-PollRetransmit expiry. When nothing else is waiting, or
    /// the window is stalled, the oldest unacknowledged SDU is resent so the
    /// poll has a PDU to ride on.
    pub fn handle_timer(&mut self, expiry: TimerExpiry) -> Result<bool, FailureCause> {
        if expiry.kind != TimerKind::PollRetransmit || !self.poll.on_expiry(expiry) {
            return Ok(false);
        }
        debug!("{} {} expired, poll pending", self.prefix, expiry.kind);
        if !self.store.is_empty() && (self.buffers_empty() || self.window_stalled()) {
            if let Some(sn) = self.store.queue_oldest()? {
                debug!("{} Retransmitting sn={} to carry the poll", self.prefix, sn);
            }
        }
        Ok(true)
    }

    /// Armed TX timers
    pub fn timers(&self) -> impl Iterator<Item = (RlcInstant, TimerExpiry)> {
        self.poll.timer().armed().into_iter()
    }

    /// Drop every SDU and stop the timers
    pub fn clear(&mut self) {
        self.queue.clear();
        self.segmenter.clear();
        self.staged = None;
        self.store.clear();
        self.poll.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::pdu::SegmentPosition;
    use crate::rlc::status::StatusNack;
    use interfaces::pool::UnboundedPool;
    use std::sync::Arc;

    fn entity(config: RlcAmConfig) -> TxAmEntity {
        TxAmEntity::new("test".to_string(), &config, 4096, Arc::new(UnboundedPool::new()))
    }

    fn status(ack_sn: u32, nacks: &[u32]) -> Bytes {
        let mut status = StatusPdu::new(ack_sn);
        status.nacks = nacks.iter().map(|sn| StatusNack::whole(*sn)).collect();
        status.encode(AmSnSize::Size12).unwrap()
    }

    fn send_all(tx: &mut TxAmEntity, sdus: &[&'static [u8]]) -> Vec<Bytes> {
        for sdu in sdus {
            tx.submit_sdu(Bytes::from_static(sdu)).unwrap();
        }
        std::iter::from_fn(|| tx.pull_pdu(RlcInstant(0), 100)).collect()
    }

    #[test]
    fn test_poll_on_last_pdu_and_ack() {
        let mut tx = entity(RlcAmConfig::default());
        let pdus = send_all(&mut tx, &[b"a", b"b", b"c"]);
        assert_eq!(pdus.len(), 3);
        assert_eq!(&pdus[0][..], &[0x80, 0x00, b'a']);
        assert_eq!(&pdus[2][..], &[0xC0, 0x02, b'c']);
        assert_eq!(tx.tx_next(), 3);
        assert_eq!(tx.poll().poll_sn(), 2);
        assert!(tx.poll().timer().is_running());

        tx.handle_status(RlcInstant(5), &status(3, &[])).unwrap();
        assert!(tx.store().is_empty());
        assert_eq!(tx.tx_next_ack(), 3);
        assert!(!tx.poll().timer().is_running());
        assert_eq!(tx.metrics().num_acked_sdus, 3);
    }

    #[test]
    fn test_nack_triggers_retransmission() {
        let mut tx = entity(RlcAmConfig::default());
        send_all(&mut tx, &[b"a", b"b", b"c"]);
        tx.handle_status(RlcInstant(5), &status(3, &[1])).unwrap();
        assert_eq!(tx.tx_next_ack(), 1);
        assert_eq!(tx.buffer_state(), 1 + 4);

        let retx = tx.pull_pdu(RlcInstant(6), 100).unwrap();
        assert_eq!(&retx[..], &[0xC0, 0x01, b'b']);
        assert_eq!(tx.metrics().num_retx_pdus, 1);
        assert_eq!(tx.store().retx_count(1), Some(1));
    }

    #[test]
    fn test_retx_limit_fails() {
        let mut tx = entity(RlcAmConfig { max_retx_thresh: 2, ..Default::default() });
        send_all(&mut tx, &[b"a", b"b"]);
        for _ in 0..2 {
            tx.handle_status(RlcInstant(5), &status(2, &[1])).unwrap();
            assert!(tx.pull_pdu(RlcInstant(5), 100).is_some());
        }
        let failure = tx.handle_status(RlcInstant(5), &status(2, &[1])).unwrap_err();
        assert_eq!(failure, FailureCause::MaxRetxReached { sn: 1, retx_count: 3 });
    }

    #[test]
    fn test_poll_retransmit_expiry_resends_oldest() {
        let mut tx = entity(RlcAmConfig::default());
        send_all(&mut tx, &[b"hello"]);
        let (deadline, expiry) = tx.timers().next().unwrap();
        assert_eq!(deadline, RlcInstant(45));

        assert!(tx.handle_timer(expiry).unwrap());
        assert!(!tx.handle_timer(expiry).unwrap());
        let pdu = tx.pull_pdu(deadline, 100).unwrap();
        assert_eq!(&pdu[..2], &[0xC0, 0x00]);
        assert_eq!(&pdu[2..], b"hello");
        assert_eq!(tx.store().retx_count(0), Some(1));
    }

    #[test]
    fn test_nack_only_resends_sent_bytes() {
        let mut tx = entity(RlcAmConfig::default());
        tx.submit_sdu(Bytes::from_static(b"abcdefghij")).unwrap();
        let first = tx.pull_pdu(RlcInstant(0), 6).unwrap();
        assert_eq!(&first[2..], b"abcd");
        assert_eq!(tx.tx_next(), 1);

        tx.handle_status(RlcInstant(1), &status(1, &[0])).unwrap();
        let retx = tx.pull_pdu(RlcInstant(1), 100).unwrap();
        let (header, len) = AmdHeader::parse(AmSnSize::Size12, &retx).unwrap();
        assert_eq!(header.position, SegmentPosition::First);
        assert_eq!(&retx[len..], b"abcd");

        let rest = tx.pull_pdu(RlcInstant(1), 100).unwrap();
        let (header, len) = AmdHeader::parse(AmSnSize::Size12, &rest).unwrap();
        assert_eq!(header.position, SegmentPosition::Last { so: 4 });
        assert_eq!(&rest[len..], b"efghij");
    }

    #[test]
    fn test_window_stall() {
        let mut tx = entity(RlcAmConfig::default());
        for _ in 0..2049 {
            tx.submit_sdu(Bytes::from_static(b"x")).unwrap();
        }
        for _ in 0..2048 {
            assert!(tx.pull_pdu(RlcInstant(0), 100).is_some());
        }
        assert!(tx.window_stalled());
        assert!(tx.pull_pdu(RlcInstant(0), 100).is_none());
        assert!(tx.buffer_state() > 0);

        tx.handle_status(RlcInstant(1), &status(1, &[])).unwrap();
        let pdu = tx.pull_pdu(RlcInstant(1), 100).unwrap();
        let (header, _) = AmdHeader::parse(AmSnSize::Size12, &pdu).unwrap();
        assert_eq!(header.sn, 2048);
    }

    #[test]
    fn test_zero_poll_retransmit_never_arms_timer() {
        let mut tx = entity(RlcAmConfig { t_poll_retx: 0, max_retx_thresh: 2, ..Default::default() });
        let pdus = send_all(&mut tx, &[b"hello"]);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0][0] & 0x40, 0x40);
        assert_eq!(tx.timers().count(), 0);
        assert!(!tx.poll().timer().is_running());
        for _ in 0..5 {
            assert!(tx.pull_pdu(RlcInstant(0), 100).is_none());
        }
        assert_eq!(tx.metrics().num_pdus, 1);
        assert_eq!(tx.metrics().num_retx_pdus, 0);
    }

    #[test]
    fn test_poll_counters_follow_sent_pdus() {
        let mut tx = entity(RlcAmConfig { poll_pdu: 4, ..Default::default() });
        tx.submit_sdu(Bytes::from_static(b"abcdefghij")).unwrap();
        tx.submit_sdu(Bytes::from_static(b"k")).unwrap();
        let first = tx.pull_pdu(RlcInstant(0), 6).unwrap();
        assert_eq!(first[0] & 0x40, 0);
        assert_eq!(tx.poll().pdu_without_poll(), 1);
        assert_eq!(tx.poll().byte_without_poll(), 4);
        assert_eq!(tx.store().len(), 1);
        assert_eq!(tx.tx_next(), 1);

        assert!(tx.pull_pdu(RlcInstant(0), 2).is_none());
        assert_eq!(tx.poll().pdu_without_poll(), 1);
        assert_eq!(tx.tx_next(), 1);
    }

    #[test]
    fn test_invalid_status_is_ignored() {
        let mut tx = entity(RlcAmConfig::default());
        send_all(&mut tx, &[b"a", b"b"]);
        tx.handle_status(RlcInstant(1), &[0x00]).unwrap();
        tx.handle_status(RlcInstant(1), &status(7, &[])).unwrap();
        assert_eq!(tx.metrics().num_malformed_status, 2);
        assert_eq!(tx.store().len(), 2);
        assert_eq!(tx.tx_next_ack(), 0);
    }
}
