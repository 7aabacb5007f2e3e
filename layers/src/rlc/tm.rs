//! Transparent Mode
//!
//! No header and no segmentation: one SDU is one PDU. An SDU larger than
//! the grant waits at the head of the queue for a grant that fits it.

use super::metrics::{RlcRxMetrics, RlcTxMetrics};
use super::sdu_queue::SduQueue;
use super::RlcUpperNotifier;
use crate::LayerError;
use bytes::Bytes;
use common::utils::hex_preview;
use interfaces::pool::SharedPool;
use tracing::{debug, trace};

/// Transmitting side of a TM bearer
#[derive(Debug)]
pub struct TxTmEntity {
    prefix: String,
    queue: SduQueue,
    metrics: RlcTxMetrics,
}

impl TxTmEntity {
    pub fn new(prefix: String, queue_size: usize, pool: SharedPool) -> Self {
        Self {
            prefix,
            queue: SduQueue::new(queue_size, pool),
            metrics: RlcTxMetrics::default(),
        }
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
        Ok(())
    }

    pub fn buffer_state(&self) -> usize {
        self.queue.bytes()
    }

    pub fn pull_pdu(&mut self, budget: usize) -> Option<Bytes> {
        let len = self.queue.front_len()?;
        if len > budget {
            trace!("{} TM SDU of {} bytes waits for a larger grant than {}", self.prefix, len, budget);
            return None;
        }
        let queued = self.queue.pop()?;
        debug!("{} TX TM PDU len={}", self.prefix, len);
        self.metrics.num_pdus += 1;
        self.metrics.num_pdu_bytes += len as u64;
        Some(queued.sdu)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Receiving side of a TM bearer
#[derive(Debug)]
pub struct RxTmEntity {
    prefix: String,
    metrics: RlcRxMetrics,
}

impl RxTmEntity {
    pub fn new(prefix: String) -> Self {
        Self { prefix, metrics: RlcRxMetrics::default() }
    }

    pub fn metrics(&self) -> &RlcRxMetrics {
        &self.metrics
    }

    pub fn handle_pdu(&mut self, pdu: Bytes, notifier: &mut dyn RlcUpperNotifier) {
        self.metrics.num_pdus += 1;
        self.metrics.num_pdu_bytes += pdu.len() as u64;
        if pdu.is_empty() {
            self.metrics.num_malformed_pdus += 1;
            return;
        }
        trace!("{} RX TM PDU {}", self.prefix, hex_preview(&pdu, 16));
        self.metrics.num_sdus += 1;
        self.metrics.num_sdu_bytes += pdu.len() as u64;
        notifier.on_new_sdu(pdu);
    }
}
