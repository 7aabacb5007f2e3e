//! UM Transmitting Side

use super::config::{RlcUmConfig, UmSnSize};
use super::metrics::RlcTxMetrics;
use super::pdu::{self, SegmentPosition, UmdHeader};
use super::sdu_queue::SduQueue;
use super::segmentation::{PendingSdu, SduSegmenter};
use crate::LayerError;
use bytes::Bytes;
use interfaces::pool::SharedPool;
use tracing::{debug, warn};

/// Transmitting side of a UM bearer
#[derive(Debug)]
pub struct TxUmEntity {
    prefix: String,
    sn_size: UmSnSize,
    queue: SduQueue,
    segmenter: SduSegmenter,
    /// SN given to the next SDU
    tx_next: u32,
    metrics: RlcTxMetrics,
}

impl TxUmEntity {
    pub fn new(prefix: String, config: &RlcUmConfig, queue_size: usize, pool: SharedPool) -> Self {
        Self {
            prefix,
            sn_size: config.sn_field_length,
            queue: SduQueue::new(queue_size, pool),
            segmenter: SduSegmenter::new(),
            tx_next: 0,
            metrics: RlcTxMetrics::default(),
        }
    }

    pub fn tx_next(&self) -> u32 {
        self.tx_next
    }

    pub fn metrics(&self) -> &RlcTxMetrics {
        &self.metrics
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

    /// Bytes waiting, with an estimate of the headers they will need
    pub fn buffer_state(&self) -> usize {
        let in_progress = if self.segmenter.is_active() {
            let position = SegmentPosition::Last { so: self.segmenter.offset() as u16 };
            self.segmenter.remaining() + UmdHeader::header_len(self.sn_size, position)
        } else {
            0
        };
        in_progress + self.queue.bytes() + self.queue.len() * UmdHeader::header_len(self.sn_size, SegmentPosition::Full)
    }

    /// Build the next UMD PDU that fits `budget` bytes
    pub fn pull_pdu(&mut self, budget: usize) -> Option<Bytes> {
        if !self.segmenter.is_active() {
            let queued = self.queue.pop()?;
            self.segmenter.load(PendingSdu { sn: self.tx_next, sdu: queued.sdu, lease: Some(queued.lease) });
        }

        let sn_size = self.sn_size;
        let (out, finished) = self.segmenter.next(budget, |p| UmdHeader::header_len(sn_size, p))?;
        let header = UmdHeader { position: out.segment.position, sn: out.sn };
        let header_len = UmdHeader::header_len(sn_size, header.position);
        let pdu = match pdu::assemble(header_len, &out.payload, |buf| header.write(sn_size, buf)) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("{} Dropping SDU, cannot encode UMD header: {}", self.prefix, e);
                self.segmenter.clear();
                return None;
            }
        };

        if finished {
            self.tx_next = sn_size.space().add(self.tx_next, 1);
        }
        debug!("{} TX UMD PDU sn={} {:?} len={}", self.prefix, header.sn, header.position, pdu.len());
        self.metrics.num_pdus += 1;
        self.metrics.num_pdu_bytes += pdu.len() as u64;
        Some(pdu)
    }

    /// Drop queued and in-progress SDUs
    pub fn clear(&mut self) {
        self.queue.clear();
        self.segmenter.clear();
    }
}
