//! Per-bearer counters

use serde::Serialize;

/// TX side counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RlcTxMetrics {
    pub num_sdus: u64,
    pub num_sdu_bytes: u64,
    pub num_rejected_sdus: u64,
    pub num_pdus: u64,
    pub num_pdu_bytes: u64,
    pub num_retx_pdus: u64,
    pub num_retx_bytes: u64,
    pub num_polls: u64,
    pub num_status_received: u64,
    pub num_malformed_status: u64,
    pub num_acked_sdus: u64,
}

/// RX side counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RlcRxMetrics {
    pub num_pdus: u64,
    pub num_pdu_bytes: u64,
    pub num_sdus: u64,
    pub num_sdu_bytes: u64,
    pub num_duplicate_pdus: u64,
    pub num_out_of_window: u64,
    pub num_malformed_pdus: u64,
    pub num_pool_drops: u64,
    pub num_lost_sdus: u64,
    pub num_status_sent: u64,
}

/// Snapshot of a bearer's counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RlcMetrics {
    pub tx: RlcTxMetrics,
    pub rx: RlcRxMetrics,
}
