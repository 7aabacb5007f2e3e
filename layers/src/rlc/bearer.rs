//! RLC Bearer Entity
//!
//! One bearer owns the TX and RX sides its mode calls for and serializes
//! every input: SDUs from above, PDUs and transmission opportunities from
//! below, and timer expiries. Nothing here blocks or spawns.

use super::config::{RlcConfig, RlcMode};
use super::metrics::RlcMetrics;
use super::pdu::is_data_pdu;
use super::rx_am::RxAmEntity;
use super::rx_um::RxUmEntity;
use super::timer::{RlcInstant, TimerExpiry, TimerKind};
use super::tm::{RxTmEntity, TxTmEntity};
use super::tx_am::TxAmEntity;
use super::tx_um::TxUmEntity;
use super::{FailureCause, RlcUpperNotifier};
use crate::LayerError;
use bytes::Bytes;
use common::types::BearerId;
use interfaces::pool::SharedPool;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle of a bearer. `Failed` and `Released` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerState {
    Active,
    Failed(FailureCause),
    Released,
}

/// Input to a bearer, as queued by a driver
#[derive(Debug, Clone)]
pub enum BearerEvent {
    /// SDU from the upper layer
    Sdu(Bytes),
    /// PDU from the lower layer
    Pdu(Bytes),
    /// A timer deadline passed
    TimerExpired(TimerExpiry),
    /// Tear the bearer down
    Release,
}

#[derive(Debug)]
enum TxSide {
    Tm(TxTmEntity),
    Um(TxUmEntity),
    Am(TxAmEntity),
}

#[derive(Debug)]
enum RxSide {
    Tm(RxTmEntity),
    Um(RxUmEntity),
    Am(RxAmEntity),
}

/// A TM, UM or AM bearer
#[derive(Debug)]
pub struct RlcBearer<N: RlcUpperNotifier> {
    id: BearerId,
    mode: RlcMode,
    prefix: String,
    state: BearerState,
    tx: Option<TxSide>,
    rx: Option<RxSide>,
    notifier: N,
}

impl<N: RlcUpperNotifier> RlcBearer<N> {
    /// Create a bearer from a validated configuration
    pub fn new(id: BearerId, config: &RlcConfig, pool: SharedPool, notifier: N) -> Result<Self, LayerError> {
        config.validate()?;
        let prefix = format!("{}", id);
        let tx_prefix = format!("{} {}", id, config.tx_direction);
        let rx_prefix = format!("{} {}", id, config.tx_direction.reverse());
        let has_tx = config.mode.has_tx(config.tx_direction);
        let has_rx = config.mode.has_rx(config.tx_direction);

        let (tx, rx) = match config.mode {
            RlcMode::Tm => (
                Some(TxSide::Tm(TxTmEntity::new(tx_prefix, config.sdu_queue_size, Arc::clone(&pool)))),
                Some(RxSide::Tm(RxTmEntity::new(rx_prefix))),
            ),
            RlcMode::UmBidir | RlcMode::UmUnidirUl | RlcMode::UmUnidirDl => {
                let um = config.um.as_ref().ok_or_else(|| {
                    LayerError::InvalidConfiguration(format!("{} bearer without UM parameters", config.mode))
                })?;
                let tx = has_tx.then(|| {
                    TxSide::Um(TxUmEntity::new(tx_prefix, um, config.sdu_queue_size, Arc::clone(&pool)))
                });
                let rx = has_rx.then(|| RxSide::Um(RxUmEntity::new(rx_prefix, um, Arc::clone(&pool))));
                (tx, rx)
            }
            RlcMode::Am => {
                let am = config.am.as_ref().ok_or_else(|| {
                    LayerError::InvalidConfiguration("AM bearer without AM parameters".to_string())
                })?;
                (
                    Some(TxSide::Am(TxAmEntity::new(tx_prefix, am, config.sdu_queue_size, Arc::clone(&pool)))),
                    Some(RxSide::Am(RxAmEntity::new(rx_prefix, am, pool))),
                )
            }
        };

        info!("{} Created {} bearer (tx={}, rx={})", prefix, config.mode, tx.is_some(), rx.is_some());
        Ok(Self {
            id,
            mode: config.mode,
            prefix,
            state: BearerState::Active,
            tx,
            rx,
            notifier,
        })
    }

    pub fn id(&self) -> BearerId {
        self.id
    }

    pub fn mode(&self) -> RlcMode {
        self.mode
    }

    pub fn state(&self) -> &BearerState {
        &self.state
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// AM transmitting side, if this is an AM bearer
    pub fn tx_am(&self) -> Option<&TxAmEntity> {
        match &self.tx {
            Some(TxSide::Am(tx)) => Some(tx),
            _ => None,
        }
    }

    /// AM receiving side, if this is an AM bearer
    pub fn rx_am(&self) -> Option<&RxAmEntity> {
        match &self.rx {
            Some(RxSide::Am(rx)) => Some(rx),
            _ => None,
        }
    }

    fn ensure_active(&self) -> Result<(), LayerError> {
        match &self.state {
            BearerState::Active => Ok(()),
            BearerState::Failed(cause) => Err(LayerError::BearerFailed(cause.clone())),
            BearerState::Released => Err(LayerError::Released),
        }
    }

    /// Queue an SDU for transmission
    pub fn submit_sdu(&mut self, sdu: Bytes) -> Result<(), LayerError> {
        self.ensure_active()?;
        match &mut self.tx {
            Some(TxSide::Tm(tx)) => tx.submit_sdu(sdu),
            Some(TxSide::Um(tx)) => tx.submit_sdu(sdu),
            Some(TxSide::Am(tx)) => tx.submit_sdu(sdu),
            None => Err(LayerError::InvalidState(format!("{} bearer has no transmitting side", self.mode))),
        }
    }

    /// Handle a PDU from the lower layer
    pub fn handle_pdu(&mut self, now: RlcInstant, pdu: Bytes) -> Result<(), LayerError> {
        self.ensure_active()?;
        let status_result = match &mut self.rx {
            Some(RxSide::Tm(rx)) => {
                rx.handle_pdu(pdu, &mut self.notifier);
                Ok(())
            }
            Some(RxSide::Um(rx)) => {
                rx.handle_pdu(now, pdu, &mut self.notifier);
                Ok(())
            }
            Some(RxSide::Am(rx)) => {
                if is_data_pdu(&pdu) {
                    rx.handle_data_pdu(now, pdu, &mut self.notifier);
                    Ok(())
                } else if let Some(TxSide::Am(tx)) = &mut self.tx {
                    tx.handle_status(now, &pdu)
                } else {
                    Ok(())
                }
            }
            None => {
                return Err(LayerError::InvalidState(format!("{} bearer has no receiving side", self.mode)));
            }
        };
        if let Err(cause) = status_result {
            self.fail(cause);
        }
        Ok(())
    }

    /// Produce the next PDU for a transmission opportunity of `budget`
    /// bytes. A pending AM status report goes before data.
    pub fn pull_pdu(&mut self, now: RlcInstant, budget: usize) -> Option<Bytes> {
        if self.state != BearerState::Active {
            return None;
        }
        if let Some(RxSide::Am(rx)) = &mut self.rx {
            if let Some(status) = rx.pull_status(now, budget) {
                return Some(status);
            }
        }
        match &mut self.tx {
            Some(TxSide::Tm(tx)) => tx.pull_pdu(budget),
            Some(TxSide::Um(tx)) => tx.pull_pdu(budget),
            Some(TxSide::Am(tx)) => tx.pull_pdu(now, budget),
            None => None,
        }
    }

    /// Bytes waiting for transmission, headers and any AM status included
    pub fn buffer_state(&self) -> usize {
        if self.state != BearerState::Active {
            return 0;
        }
        let status = match &self.rx {
            Some(RxSide::Am(rx)) => rx.status_size(),
            _ => 0,
        };
        let data = match &self.tx {
            Some(TxSide::Tm(tx)) => tx.buffer_state(),
            Some(TxSide::Um(tx)) => tx.buffer_state(),
            Some(TxSide::Am(tx)) => tx.buffer_state(),
            None => 0,
        };
        status + data
    }

    /// Handle a timer expiry; stale expiries are ignored and return false
    pub fn handle_timer(&mut self, now: RlcInstant, expiry: TimerExpiry) -> bool {
        if self.state != BearerState::Active {
            return false;
        }
        match expiry.kind {
            TimerKind::PollRetransmit => {
                let result = match &mut self.tx {
                    Some(TxSide::Am(tx)) => tx.handle_timer(expiry),
                    _ => Ok(false),
                };
                match result {
                    Ok(handled) => handled,
                    Err(cause) => {
                        self.fail(cause);
                        true
                    }
                }
            }
            TimerKind::Reassembly | TimerKind::StatusProhibit => match &mut self.rx {
                Some(RxSide::Um(rx)) => rx.handle_timer(now, expiry, &mut self.notifier),
                Some(RxSide::Am(rx)) => rx.handle_timer(now, expiry, &mut self.notifier),
                _ => false,
            },
        }
    }

    /// Earliest armed timer
    pub fn next_timer_expiry(&self) -> Option<(RlcInstant, TimerExpiry)> {
        if self.state != BearerState::Active {
            return None;
        }
        let mut timers = Vec::new();
        if let Some(TxSide::Am(tx)) = &self.tx {
            timers.extend(tx.timers());
        }
        match &self.rx {
            Some(RxSide::Um(rx)) => timers.extend(rx.timers()),
            Some(RxSide::Am(rx)) => timers.extend(rx.timers()),
            _ => {}
        }
        timers.into_iter().min_by_key(|(deadline, _)| *deadline)
    }

    /// Fire every timer due at `now`, each at its own deadline. Returns the
    /// number of expiries handled.
    pub fn poll_timers(&mut self, now: RlcInstant) -> usize {
        let mut fired = 0;
        while let Some((deadline, expiry)) = self.next_timer_expiry() {
            if deadline > now {
                break;
            }
            debug!("{} {} expired at {}", self.prefix, expiry.kind, deadline);
            if self.handle_timer(deadline, expiry) {
                fired += 1;
            }
        }
        fired
    }

    /// Apply one queued event
    pub fn handle_event(&mut self, now: RlcInstant, event: BearerEvent) -> Result<(), LayerError> {
        match event {
            BearerEvent::Sdu(sdu) => self.submit_sdu(sdu),
            BearerEvent::Pdu(pdu) => self.handle_pdu(now, pdu),
            BearerEvent::TimerExpired(expiry) => {
                self.handle_timer(now, expiry);
                Ok(())
            }
            BearerEvent::Release => {
                self.release();
                Ok(())
            }
        }
    }

    /// Counters of both sides
    pub fn metrics(&self) -> RlcMetrics {
        let tx = match &self.tx {
            Some(TxSide::Tm(tx)) => tx.metrics().clone(),
            Some(TxSide::Um(tx)) => tx.metrics().clone(),
            Some(TxSide::Am(tx)) => tx.metrics().clone(),
            None => Default::default(),
        };
        let rx = match &self.rx {
            Some(RxSide::Tm(rx)) => rx.metrics().clone(),
            Some(RxSide::Um(rx)) => rx.metrics().clone(),
            Some(RxSide::Am(rx)) => rx.metrics().clone(),
            None => Default::default(),
        };
        RlcMetrics { tx, rx }
    }

    fn clear(&mut self) {
        match &mut self.tx {
            Some(TxSide::Tm(tx)) => tx.clear(),
            Some(TxSide::Um(tx)) => tx.clear(),
            Some(TxSide::Am(tx)) => tx.clear(),
            None => {}
        }
        match &mut self.rx {
            Some(RxSide::Um(rx)) => rx.clear(),
            Some(RxSide::Am(rx)) => rx.clear(),
            _ => {}
        }
    }

    /// Drop every buffer and stop every timer. Terminal.
    pub fn release(&mut self) {
        if self.state == BearerState::Released {
            return;
        }
        self.clear();
        self.state = BearerState::Released;
        info!("{} Bearer released", self.prefix);
    }

    fn fail(&mut self, cause: FailureCause) {
        if self.state != BearerState::Active {
            return;
        }
        error!("{} Protocol failure: {}", self.prefix, cause);
        self.clear();
        self.state = BearerState::Failed(cause.clone());
        self.notifier.on_protocol_failure(cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::config::{RlcAmConfig, RlcUmConfig};
    use crate::rlc::CollectingNotifier;
    use common::types::{Lcid, LinkDirection, Rnti};
    use interfaces::pool::{BufferPool, SegmentPool, UnboundedPool};

    fn bearer_id() -> BearerId {
        BearerId::new(Rnti::new(0x4601), Lcid::new(4).unwrap())
    }

    fn am_bearer(am: RlcAmConfig, direction: LinkDirection) -> RlcBearer<CollectingNotifier> {
        let config = RlcConfig { tx_direction: direction, ..RlcConfig::am(am) };
        RlcBearer::new(bearer_id(), &config, Arc::new(UnboundedPool::new()), CollectingNotifier::default()).unwrap()
    }

    #[test]
    fn test_am_exchange() {
        let mut gnb = am_bearer(RlcAmConfig::default(), LinkDirection::Downlink);
        let mut ue = am_bearer(RlcAmConfig::default(), LinkDirection::Uplink);
        gnb.submit_sdu(Bytes::from_static(b"first")).unwrap();
        gnb.submit_sdu(Bytes::from_static(b"second")).unwrap();
        assert_eq!(gnb.buffer_state(), 5 + 6 + 2 * 2);

        let now = RlcInstant(1);
        while let Some(pdu) = gnb.pull_pdu(now, 100) {
            ue.handle_pdu(now, pdu).unwrap();
        }
        assert_eq!(ue.notifier().sdus, vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")]);

        // the poll on the last PDU triggered a report
        assert_eq!(ue.buffer_state(), 3);
        let status = ue.pull_pdu(now, 100).unwrap();
        gnb.handle_pdu(now, status).unwrap();
        assert!(gnb.tx_am().unwrap().store().is_empty());
        assert!(gnb.next_timer_expiry().is_none());
    }

    #[test]
    fn test_release_is_terminal() {
        let pool: SharedPool = Arc::new(SegmentPool::new(16, 64).unwrap());
        let config = RlcConfig::am(RlcAmConfig::default());
        let mut bearer = RlcBearer::new(bearer_id(), &config, Arc::clone(&pool), CollectingNotifier::default()).unwrap();
        bearer.submit_sdu(Bytes::from(vec![7u8; 100])).unwrap();
        bearer.pull_pdu(RlcInstant(0), 50).unwrap();
        assert!(pool.bytes_in_use() > 0);

        bearer.handle_event(RlcInstant(1), BearerEvent::Release).unwrap();
        assert_eq!(bearer.state(), &BearerState::Released);
        assert_eq!(pool.bytes_in_use(), 0);
        assert!(bearer.pull_pdu(RlcInstant(2), 100).is_none());
        assert!(bearer.next_timer_expiry().is_none());
        assert!(matches!(bearer.submit_sdu(Bytes::from_static(b"x")), Err(LayerError::Released)));
        assert!(matches!(bearer.handle_pdu(RlcInstant(2), Bytes::from_static(&[0x80, 0, 1])), Err(LayerError::Released)));
    }

    #[test]
    fn test_retx_exhaustion_fails_once() {
        let mut bearer = am_bearer(RlcAmConfig { max_retx_thresh: 1, ..Default::default() }, LinkDirection::Downlink);
        bearer.submit_sdu(Bytes::from_static(b"unanswered")).unwrap();
        assert!(bearer.pull_pdu(RlcInstant(0), 100).is_some());

        assert_eq!(bearer.poll_timers(RlcInstant(45)), 1);
        assert!(bearer.pull_pdu(RlcInstant(45), 100).is_some());
        assert_eq!(bearer.poll_timers(RlcInstant(90)), 1);

        assert_eq!(bearer.notifier().failures, vec![FailureCause::MaxRetxReached { sn: 0, retx_count: 2 }]);
        assert!(matches!(bearer.state(), BearerState::Failed(_)));
        assert!(bearer.pull_pdu(RlcInstant(91), 100).is_none());
        assert_eq!(bearer.poll_timers(RlcInstant(1000)), 0);
        assert!(matches!(bearer.submit_sdu(Bytes::from_static(b"x")), Err(LayerError::BearerFailed(_))));
        assert_eq!(bearer.notifier().failures.len(), 1);
    }

    #[test]
    fn test_unidirectional_um_sides() {
        let config = RlcConfig {
            mode: RlcMode::UmUnidirUl,
            tx_direction: LinkDirection::Uplink,
            ..RlcConfig::um(RlcUmConfig::default())
        };
        let mut ue = RlcBearer::new(bearer_id(), &config, Arc::new(UnboundedPool::new()), CollectingNotifier::default()).unwrap();
        ue.submit_sdu(Bytes::from_static(b"up")).unwrap();
        assert!(matches!(ue.handle_pdu(RlcInstant(0), Bytes::from_static(&[0x00, 1])), Err(LayerError::InvalidState(_))));

        let gnb_config = RlcConfig { tx_direction: LinkDirection::Downlink, ..config };
        let mut gnb = RlcBearer::new(bearer_id(), &gnb_config, Arc::new(UnboundedPool::new()), CollectingNotifier::default()).unwrap();
        assert!(matches!(gnb.submit_sdu(Bytes::from_static(b"down")), Err(LayerError::InvalidState(_))));

        let pdu = ue.pull_pdu(RlcInstant(0), 100).unwrap();
        gnb.handle_pdu(RlcInstant(0), pdu).unwrap();
        assert_eq!(gnb.notifier().sdus, vec![Bytes::from_static(b"up")]);
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let config = RlcConfig { am: None, ..RlcConfig::am(RlcAmConfig::default()) };
        let result = RlcBearer::new(bearer_id(), &config, Arc::new(UnboundedPool::new()), CollectingNotifier::default());
        assert!(matches!(result, Err(LayerError::InvalidConfiguration(_))));
    }
}
