//! AM Receiving Side
//!
//! Reassembly through [`ReassemblyWindow`] plus the status reporting of
//! TS 38.322 Section 5.3.4: polls and t-Reassembly expiry trigger a report,
//! t-StatusProhibit limits how often one is sent, and the content is taken
//! from the window at the moment the report is built.

use super::config::{AmSnSize, RlcAmConfig};
use super::metrics::RlcRxMetrics;
use super::pdu::AmdHeader;
use super::rx_window::{ReassemblyWindow, SduReception, SegmentVerdict, WindowMode};
use super::status::StatusPdu;
use super::timer::{RlcInstant, RlcTimer, TimerExpiry, TimerKind};
use super::RlcUpperNotifier;
use bytes::Bytes;
use common::utils::hex_preview;
use interfaces::pool::SharedPool;
use tracing::{debug, trace, warn};

/// Receiving side of an AM bearer
#[derive(Debug)]
pub struct RxAmEntity {
    prefix: String,
    sn_size: AmSnSize,
    window: ReassemblyWindow,
    t_status_prohibit: RlcTimer,
    status_required: bool,
    /// Polled SN the status horizon has not reached yet
    deferred_poll: Option<u32>,
    metrics: RlcRxMetrics,
}

impl RxAmEntity {
    pub fn new(prefix: String, config: &RlcAmConfig, pool: SharedPool) -> Self {
        let sn_size = config.rx_sn_field_length;
        Self {
            prefix,
            sn_size,
            window: ReassemblyWindow::new(
                WindowMode::Acknowledged,
                sn_size.space(),
                super::config::enabled(config.t_reassembly),
                pool,
            ),
            t_status_prohibit: RlcTimer::new(TimerKind::StatusProhibit, config.status_prohibit_ms()),
            status_required: false,
            deferred_poll: None,
            metrics: RlcRxMetrics::default(),
        }
    }

    pub fn window(&self) -> &ReassemblyWindow {
        &self.window
    }

    pub fn metrics(&self) -> &RlcRxMetrics {
        &self.metrics
    }

    /// Whether a report has been triggered and not sent yet
    pub fn status_required(&self) -> bool {
        self.status_required
    }

    /// Whether a report may go out now
    pub fn status_ready(&self) -> bool {
        self.status_required && !self.t_status_prohibit.is_running()
    }

    /// Handle one AMD PDU
    pub fn handle_data_pdu(&mut self, now: RlcInstant, pdu: Bytes, notifier: &mut dyn RlcUpperNotifier) {
        self.metrics.num_pdus += 1;
        self.metrics.num_pdu_bytes += pdu.len() as u64;

        let (header, header_len) = match AmdHeader::parse(self.sn_size, &pdu) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{} Dropping malformed AMD PDU: {}", self.prefix, e);
                self.metrics.num_malformed_pdus += 1;
                return;
            }
        };
        let payload = pdu.slice(header_len..);
        if payload.is_empty() {
            warn!("{} Dropping AMD PDU without payload, sn={}", self.prefix, header.sn);
            self.metrics.num_malformed_pdus += 1;
            return;
        }
        debug!("{} RX AMD PDU sn={} {:?} poll={} len={}",
               self.prefix, header.sn, header.position, header.poll, payload.len());
        trace!("{} payload: {}", self.prefix, hex_preview(&payload, 16));

        let mut delivered = Vec::new();
        let verdict = self.window.handle_segment(now, header.sn, header.position, payload, &mut delivered);
        let discarded = match verdict {
            SegmentVerdict::Accepted { .. } => false,
            SegmentVerdict::Duplicate => {
                self.metrics.num_duplicate_pdus += 1;
                true
            }
            SegmentVerdict::OutOfWindow => {
                self.metrics.num_out_of_window += 1;
                true
            }
            SegmentVerdict::PoolExhausted => {
                warn!("{} Pool exhausted, dropping segment of sn={}", self.prefix, header.sn);
                self.metrics.num_pool_drops += 1;
                true
            }
            SegmentVerdict::Inconsistent => {
                warn!("{} Segment inconsistent with buffered data, sn={}", self.prefix, header.sn);
                self.metrics.num_malformed_pdus += 1;
                true
            }
        };

        if header.poll {
            self.handle_poll(header.sn, discarded);
        }
        self.check_deferred_poll();
        self.deliver(delivered, notifier);
    }

    fn handle_poll(&mut self, sn: u32, discarded: bool) {
        let w = &self.window;
        if discarded || w.precedes(sn, w.rx_highest_status()) || !w.in_window(sn) {
            debug!("{} Poll on sn={}, status report triggered", self.prefix, sn);
            self.status_required = true;
        } else {
            trace!("{} Poll on sn={} deferred until rx_highest_status passes it", self.prefix, sn);
            self.deferred_poll = Some(sn);
        }
    }

    fn check_deferred_poll(&mut self) {
        let Some(sn) = self.deferred_poll else {
            return;
        };
        let w = &self.window;
        if w.precedes(sn, w.rx_highest_status()) || !w.in_window(sn) {
            self.deferred_poll = None;
            self.status_required = true;
        }
    }

    fn deliver(&mut self, delivered: Vec<Bytes>, notifier: &mut dyn RlcUpperNotifier) {
        for sdu in delivered {
            self.metrics.num_sdus += 1;
            self.metrics.num_sdu_bytes += sdu.len() as u64;
            notifier.on_new_sdu(sdu);
        }
    }

    /// Status report reflecting the current window: ACK_SN is
    /// `rx_highest_status`, every incomplete SN below it is NACKed
    pub fn build_status(&self) -> StatusPdu {
        let space = self.sn_size.space();
        let ack_sn = self.window.rx_highest_status();
        let mut status = StatusPdu::new(ack_sn);
        for sn in space.range(self.window.rx_next(), ack_sn) {
            match self.window.reception(sn) {
                SduReception::Complete => {}
                SduReception::Missing => status.push_nack(space, sn, None),
                SduReception::Partial(gaps) => {
                    for so in gaps {
                        status.push_nack(space, sn, Some(so));
                    }
                }
            }
        }
        status
    }

    /// Encoded size of the report that would be sent now
    pub fn status_size(&self) -> usize {
        if self.status_required {
            self.build_status().packed_size(self.sn_size)
        } else {
            0
        }
    }

    /// Build and encode a triggered report within `budget` bytes
    pub fn pull_status(&mut self, now: RlcInstant, budget: usize) -> Option<Bytes> {
        if !self.status_ready() {
            return None;
        }
        let mut status = self.build_status();
        let full_ack = status.ack_sn;
        if !status.trim(self.sn_size, budget) {
            return None;
        }
        if status.ack_sn != full_ack {
            debug!("{} Status trimmed to grant of {} bytes, ack_sn {} -> {}",
                   self.prefix, budget, full_ack, status.ack_sn);
        }

        let pdu = match status.encode(self.sn_size) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("{} Failed to encode status PDU: {}", self.prefix, e);
                return None;
            }
        };
        debug!("{} TX status ack_sn={} nacks={}", self.prefix, status.ack_sn, status.nacks.len());

        self.status_required = false;
        self.t_status_prohibit.start(now);
        self.metrics.num_status_sent += 1;
        Some(pdu)
    }

    /// Handle an expiry of one of the RX timers
    pub fn handle_timer(
        &mut self,
        now: RlcInstant,
        expiry: TimerExpiry,
        notifier: &mut dyn RlcUpperNotifier,
    ) -> bool {
        match expiry.kind {
            TimerKind::Reassembly => {
                let mut delivered = Vec::new();
                if !self.window.handle_reassembly_expiry(now, expiry, &mut delivered) {
                    return false;
                }
                self.status_required = true;
                self.check_deferred_poll();
                self.deliver(delivered, notifier);
                true
            }
            TimerKind::StatusProhibit => self.t_status_prohibit.try_expire(expiry),
            TimerKind::PollRetransmit => false,
        }
    }

    /// Armed RX timers
    pub fn timers(&self) -> impl Iterator<Item = (RlcInstant, TimerExpiry)> {
        [self.window.timer().armed(), self.t_status_prohibit.armed()].into_iter().flatten()
    }

    /// Drop all buffered data and stop the timers
    pub fn clear(&mut self) {
        self.window.clear();
        self.t_status_prohibit.stop();
        self.status_required = false;
        self.deferred_poll = None;
    }
}
