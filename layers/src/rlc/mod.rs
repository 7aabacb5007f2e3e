//! Radio Link Control (RLC) Layer Implementation
//!
//! Implements the 5G NR RLC layer according to 3GPP TS 38.322:
//! - Transparent Mode (TM): pass-through, no header
//! - Unacknowledged Mode (UM): segmentation and in-order reassembly
//! - Acknowledged Mode (AM): UM plus ARQ driven by polls and status reports
//!
//! Every bearer is a single-threaded state machine ([`RlcBearer`]). Timers
//! are plain deadlines owned by the bearer and fired by whoever drives it,
//! either a test or the tokio task in [`task`].

pub mod arena;
pub mod bearer;
pub mod config;
pub mod metrics;
pub mod pdu;
pub mod poll;
pub mod retx;
pub mod rx_am;
pub mod rx_um;
pub mod rx_window;
pub mod sdu_queue;
pub mod segmentation;
pub mod sn;
pub mod status;
pub mod task;
pub mod timer;
pub mod tm;
pub mod tx_am;
pub mod tx_um;

pub use bearer::{BearerEvent, BearerState, RlcBearer};
pub use config::{AmSnSize, RlcAmConfig, RlcConfig, RlcMode, RlcUmConfig, UmSnSize};
pub use metrics::{RlcMetrics, RlcRxMetrics, RlcTxMetrics};
pub use pdu::{PduError, SegmentPosition, MAX_SDU_SIZE};
pub use sn::SnSpace;
pub use status::{SoRange, StatusNack, StatusPdu};
pub use task::{spawn_bearer, RlcBearerHandle, RlcLowerInterface, RlcUpperInterface, UpperEvent};
pub use timer::{RlcInstant, TimerExpiry, TimerKind};

use bytes::Bytes;
use thiserror::Error;

/// Reason a bearer stopped working
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("Maximum retransmissions reached for SN {sn} (retx count {retx_count})")]
    MaxRetxReached { sn: u32, retx_count: u32 },
}

/// Upper layer side of a bearer
///
/// Called synchronously from inside the bearer; implementations must not
/// block.
pub trait RlcUpperNotifier: Send {
    /// A reassembled SDU, delivered in SN order and never twice
    fn on_new_sdu(&mut self, sdu: Bytes);

    /// The bearer failed; called at most once per bearer
    fn on_protocol_failure(&mut self, cause: FailureCause);
}

/// Notifier collecting everything into vectors, for tests and tools
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    pub sdus: Vec<Bytes>,
    pub failures: Vec<FailureCause>,
}

impl RlcUpperNotifier for CollectingNotifier {
    fn on_new_sdu(&mut self, sdu: Bytes) {
        self.sdus.push(sdu);
    }

    fn on_protocol_failure(&mut self, cause: FailureCause) {
        self.failures.push(cause);
    }
}
