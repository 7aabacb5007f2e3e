//! UM Receiving Side

use super::config::{RlcUmConfig, UmSnSize};
use super::metrics::RlcRxMetrics;
use super::pdu::UmdHeader;
use super::rx_window::{ReassemblyWindow, SegmentVerdict, WindowMode};
use super::timer::{RlcInstant, TimerExpiry, TimerKind};
use super::RlcUpperNotifier;
use bytes::Bytes;
use common::utils::hex_preview;
use interfaces::pool::SharedPool;
use tracing::{debug, trace, warn};

/// Receiving side of a UM bearer
#[derive(Debug)]
pub struct RxUmEntity {
    prefix: String,
    sn_size: UmSnSize,
    window: ReassemblyWindow,
    metrics: RlcRxMetrics,
}

impl RxUmEntity {
    pub fn new(prefix: String, config: &RlcUmConfig, pool: SharedPool) -> Self {
        let sn_size = config.sn_field_length;
        Self {
            prefix,
            sn_size,
            window: ReassemblyWindow::new(
                WindowMode::Unacknowledged,
                sn_size.space(),
                super::config::enabled(config.t_reassembly),
                pool,
            ),
            metrics: RlcRxMetrics::default(),
        }
    }

    pub fn window(&self) -> &ReassemblyWindow {
        &self.window
    }

    pub fn metrics(&self) -> &RlcRxMetrics {
        &self.metrics
    }

    /// Handle one UMD PDU. Whole SDUs and segments alike go through the
    /// window, so duplicates are dropped and delivery follows SN order.
    pub fn handle_pdu(&mut self, now: RlcInstant, pdu: Bytes, notifier: &mut dyn RlcUpperNotifier) {
        self.metrics.num_pdus += 1;
        self.metrics.num_pdu_bytes += pdu.len() as u64;

        let (header, header_len) = match UmdHeader::parse(self.sn_size, &pdu) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{} Dropping malformed UMD PDU: {}", self.prefix, e);
                self.metrics.num_malformed_pdus += 1;
                return;
            }
        };
        let payload = pdu.slice(header_len..);
        if payload.is_empty() {
            warn!("{} Dropping UMD PDU without payload", self.prefix);
            self.metrics.num_malformed_pdus += 1;
            return;
        }
        trace!("{} payload: {}", self.prefix, hex_preview(&payload, 16));

        debug!("{} RX UMD PDU sn={} {:?} len={}", self.prefix, header.sn, header.position, payload.len());

        let mut delivered = Vec::new();
        match self.window.handle_segment(now, header.sn, header.position, payload, &mut delivered) {
            SegmentVerdict::Accepted { .. } => {}
            SegmentVerdict::Duplicate => self.metrics.num_duplicate_pdus += 1,
            SegmentVerdict::OutOfWindow => self.metrics.num_out_of_window += 1,
            SegmentVerdict::PoolExhausted => {
                warn!("{} Pool exhausted, dropping segment of sn={}", self.prefix, header.sn);
                self.metrics.num_pool_drops += 1;
            }
            SegmentVerdict::Inconsistent => {
                warn!("{} Segment inconsistent with buffered data, sn={}", self.prefix, header.sn);
                self.metrics.num_malformed_pdus += 1;
            }
        }
        self.metrics.num_lost_sdus = self.window.lost_sdus();
        self.deliver(delivered, notifier);
    }

    fn deliver(&mut self, delivered: Vec<Bytes>, notifier: &mut dyn RlcUpperNotifier) {
        for sdu in delivered {
            self.metrics.num_sdus += 1;
            self.metrics.num_sdu_bytes += sdu.len() as u64;
            notifier.on_new_sdu(sdu);
        }
    }

    /// Handle a t-Reassembly expiry
    pub fn handle_timer(
        &mut self,
        now: RlcInstant,
        expiry: TimerExpiry,
        notifier: &mut dyn RlcUpperNotifier,
    ) -> bool {
        if expiry.kind != TimerKind::Reassembly {
            return false;
        }
        let mut delivered = Vec::new();
        if !self.window.handle_reassembly_expiry(now, expiry, &mut delivered) {
            return false;
        }
        self.metrics.num_lost_sdus = self.window.lost_sdus();
        self.deliver(delivered, notifier);
        true
    }

    /// Armed RX timers
    pub fn timers(&self) -> impl Iterator<Item = (RlcInstant, TimerExpiry)> {
        self.window.timer().armed().into_iter()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::pdu::SegmentPosition;
    use crate::rlc::CollectingNotifier;
    use bytes::BytesMut;
    use interfaces::pool::UnboundedPool;
    use std::sync::Arc;

    fn entity() -> RxUmEntity {
        let config = RlcUmConfig { sn_field_length: UmSnSize::Size6, t_reassembly: 35 };
        RxUmEntity::new("test".to_string(), &config, Arc::new(UnboundedPool::new()))
    }

    fn umd(sn: u32, position: SegmentPosition, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        UmdHeader { position, sn }.write(UmSnSize::Size6, &mut buf).unwrap();
        buf.extend_from_slice(payload);
        buf.freeze()
    }

    #[test]
    fn test_full_sdus_delivered_in_sn_order_once() {
        let mut rx = entity();
        let mut up = CollectingNotifier::default();
        rx.handle_pdu(RlcInstant(0), umd(0, SegmentPosition::Full, b"hello"), &mut up);
        rx.handle_pdu(RlcInstant(0), umd(0, SegmentPosition::Full, b"hello"), &mut up);
        rx.handle_pdu(RlcInstant(0), umd(1, SegmentPosition::Full, b"world"), &mut up);
        assert_eq!(up.sdus, vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")]);
        assert_eq!(rx.metrics().num_duplicate_pdus, 1);
        assert!(rx.timers().next().is_none());
    }

    #[test]
    fn test_full_sdu_waits_behind_partial_sdu() {
        let mut rx = entity();
        let mut up = CollectingNotifier::default();
        rx.handle_pdu(RlcInstant(0), umd(0, SegmentPosition::First, b"AAAA"), &mut up);
        rx.handle_pdu(RlcInstant(0), umd(1, SegmentPosition::Full, b"B"), &mut up);
        assert!(up.sdus.is_empty());
        rx.handle_pdu(RlcInstant(1), umd(0, SegmentPosition::Last { so: 4 }, b"AAAAAA"), &mut up);
        assert_eq!(up.sdus, vec![Bytes::from_static(b"AAAAAAAAAA"), Bytes::from_static(b"B")]);
        rx.handle_pdu(RlcInstant(2), umd(1, SegmentPosition::Full, b"B"), &mut up);
        assert_eq!(up.sdus.len(), 2);
    }

    #[test]
    fn test_segments_reassembled() {
        let mut rx = entity();
        let mut up = CollectingNotifier::default();
        rx.handle_pdu(RlcInstant(0), umd(0, SegmentPosition::Last { so: 3 }, b"def"), &mut up);
        rx.handle_pdu(RlcInstant(0), umd(0, SegmentPosition::First, b"abc"), &mut up);
        assert_eq!(up.sdus, vec![Bytes::from_static(b"abcdef")]);
    }

    #[test]
    fn test_reassembly_timeout_drops_partial_sdu() {
        let mut rx = entity();
        let mut up = CollectingNotifier::default();
        rx.handle_pdu(RlcInstant(0), umd(0, SegmentPosition::First, b"lost"), &mut up);
        rx.handle_pdu(RlcInstant(1), umd(1, SegmentPosition::First, b"ab"), &mut up);
        rx.handle_pdu(RlcInstant(2), umd(1, SegmentPosition::Last { so: 2 }, b"cd"), &mut up);
        assert!(up.sdus.is_empty());

        let (deadline, expiry) = rx.timers().next().unwrap();
        assert_eq!(deadline, RlcInstant(36));
        assert!(rx.handle_timer(deadline, expiry, &mut up));
        assert_eq!(up.sdus, vec![Bytes::from_static(b"abcd")]);
        assert_eq!(rx.metrics().num_lost_sdus, 1);
        assert_eq!(rx.window().rx_next(), 2);
    }
}
