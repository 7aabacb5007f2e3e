//! Poll/ARQ Controller
//!
//! Poll bit decisions and t-PollRetransmit of TS 38.322 Section 5.3.3.

use super::config::RlcAmConfig;
use super::timer::{RlcInstant, RlcTimer, TimerExpiry, TimerKind};
use tracing::trace;

/// Decides when an AMD PDU carries the poll bit
#[derive(Debug)]
pub struct PollController {
    pdu_threshold: Option<u64>,
    byte_threshold: Option<u64>,
    pdu_without_poll: u64,
    byte_without_poll: u64,
    poll_sn: u32,
    /// Set by t-PollRetransmit expiry until the next PDU goes out
    poll_pending: bool,
    t_poll_retx: RlcTimer,
}

impl PollController {
    pub fn new(config: &RlcAmConfig) -> Self {
        Self {
            pdu_threshold: config.poll_pdu_threshold(),
            byte_threshold: config.poll_byte_threshold(),
            pdu_without_poll: 0,
            byte_without_poll: 0,
            poll_sn: 0,
            poll_pending: false,
            t_poll_retx: RlcTimer::new(TimerKind::PollRetransmit, config.poll_retx_ms()),
        }
    }

    pub fn poll_sn(&self) -> u32 {
        self.poll_sn
    }

    pub fn pdu_without_poll(&self) -> u64 {
        self.pdu_without_poll
    }

    pub fn byte_without_poll(&self) -> u64 {
        self.byte_without_poll
    }

    pub fn timer(&self) -> &RlcTimer {
        &self.t_poll_retx
    }

    /// Whether the next PDU must poll regardless of counters
    pub fn poll_pending(&self) -> bool {
        self.poll_pending
    }

    /// Poll bit for the PDU about to be sent.
    ///
    /// `new_data` is the payload length for PDUs carrying new data; only
    /// those count towards the thresholds. `buffers_empty` and
    /// `window_stalled` describe the state after this PDU.
    /// Counters are left alone; [`Self::on_pdu_sent`] commits them once the
    /// PDU is built.
    pub fn poll_due(&self, new_data: Option<usize>, buffers_empty: bool, window_stalled: bool) -> bool {
        let mut poll = self.poll_pending || buffers_empty || window_stalled;
        if let Some(len) = new_data {
            let pdus = self.pdu_without_poll + 1;
            let bytes = self.byte_without_poll + len as u64;
            poll |= self.pdu_threshold.is_some_and(|t| pdus >= t);
            poll |= self.byte_threshold.is_some_and(|t| bytes >= t);
        }
        poll
    }

    /// Count a PDU that went out
    pub fn on_pdu_sent(&mut self, new_data: Option<usize>) {
        if let Some(len) = new_data {
            self.pdu_without_poll += 1;
            self.byte_without_poll += len as u64;
        }
    }

    /// A PDU with the poll bit went out; `highest_sn` is `tx_next - 1`
    pub fn on_poll_sent(&mut self, now: RlcInstant, highest_sn: u32) {
        trace!("Poll sent, poll_sn={} after {} PDUs / {} bytes",
               highest_sn, self.pdu_without_poll, self.byte_without_poll);
        self.pdu_without_poll = 0;
        self.byte_without_poll = 0;
        self.poll_pending = false;
        self.poll_sn = highest_sn;
        self.t_poll_retx.start(now);
    }

    /// Stop the timer once everything is acknowledged, restart it otherwise
    pub fn on_status(&mut self, now: RlcInstant, ack_sn: u32, tx_next: u32) {
        if !self.t_poll_retx.is_running() {
            return;
        }
        if ack_sn == tx_next {
            self.t_poll_retx.stop();
        } else {
            self.t_poll_retx.start(now);
        }
    }

    /// Consume a t-PollRetransmit expiry; the next PDU will poll
    pub fn on_expiry(&mut self, expiry: TimerExpiry) -> bool {
        if !self.t_poll_retx.try_expire(expiry) {
            return false;
        }
        self.poll_pending = true;
        true
    }

    pub fn stop(&mut self) {
        self.t_poll_retx.stop();
        self.poll_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(poll: &mut PollController, new_data: Option<usize>, buffers_empty: bool, stalled: bool) -> bool {
        let due = poll.poll_due(new_data, buffers_empty, stalled);
        poll.on_pdu_sent(new_data);
        due
    }

    fn controller(poll_pdu: i32, poll_byte: i32) -> PollController {
        PollController::new(&RlcAmConfig { poll_pdu, poll_byte, t_poll_retx: 45, ..Default::default() })
    }

    #[test]
    fn test_poll_pdu_threshold() {
        let mut poll = controller(4, -1);
        for _ in 0..3 {
            assert!(!send(&mut poll, Some(10), false, false));
        }
        assert!(send(&mut poll, Some(10), false, false));
        poll.on_poll_sent(RlcInstant(0), 3);
        assert_eq!(poll.pdu_without_poll(), 0);
        assert!(!send(&mut poll, Some(10), false, false));
    }

    #[test]
    fn test_poll_byte_threshold() {
        let mut poll = controller(-1, 1);
        assert!(!send(&mut poll, Some(600), false, false));
        assert!(send(&mut poll, Some(400), false, false));
        assert_eq!(poll.byte_without_poll(), 1000);
    }

    #[test]
    fn test_poll_due_leaves_counters() {
        let poll = controller(1, -1);
        assert!(poll.poll_due(Some(10), false, false));
        assert_eq!(poll.pdu_without_poll(), 0);
        assert_eq!(poll.byte_without_poll(), 0);
    }

    #[test]
    fn test_retransmissions_do_not_count() {
        let mut poll = controller(1, -1);
        assert!(!send(&mut poll, None, false, false));
        assert_eq!(poll.pdu_without_poll(), 0);
    }

    #[test]
    fn test_empty_buffers_and_stall_poll() {
        let mut poll = controller(-1, -1);
        assert!(send(&mut poll, Some(1), true, false));
        assert!(send(&mut poll, None, false, true));
        assert!(!send(&mut poll, Some(1), false, false));
    }

    #[test]
    fn test_timer_on_status() {
        let mut poll = controller(-1, -1);
        poll.on_poll_sent(RlcInstant(0), 9);
        assert_eq!(poll.poll_sn(), 9);
        assert_eq!(poll.timer().deadline(), Some(RlcInstant(45)));

        poll.on_status(RlcInstant(20), 5, 10);
        assert_eq!(poll.timer().deadline(), Some(RlcInstant(65)));

        poll.on_status(RlcInstant(30), 10, 10);
        assert!(!poll.timer().is_running());
    }

    #[test]
    fn test_expiry_requests_poll() {
        let mut poll = controller(-1, -1);
        poll.on_poll_sent(RlcInstant(0), 0);
        let (_, expiry) = poll.timer().armed().unwrap();
        assert!(poll.on_expiry(expiry));
        assert!(poll.poll_pending());
        assert!(send(&mut poll, None, false, false));
        assert!(!poll.on_expiry(expiry));
    }
}
