//! Two-peer Loopback Simulation
//!
//! A gNB-side and a UE-side bearer exchange PDUs over two lossy channels.
//! Time advances in slots; each slot fires due timers, offers new SDUs to
//! the gNB and grants each direction `grant_bytes`, filled with as many PDUs
//! as fit, the way a MAC multiplexes a transport block.

use crate::config::SimConfig;
use bytes::{BufMut, Bytes, BytesMut};
use common::types::{BearerId, Lcid, LinkDirection, Rnti};
use interfaces::channel::{ChannelStats, LossyChannel};
use interfaces::pool::{SegmentPool, SharedPool};
use layers::rlc::{BearerState, CollectingNotifier, RlcBearer, RlcConfig, RlcInstant, RlcMetrics};
use layers::LayerError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest grant worth asking a bearer to fill
const MIN_GRANT: usize = 4;

/// Outcome of a simulation run
#[derive(Debug, Serialize)]
pub struct SimReport {
    pub sdus_offered: usize,
    pub sdus_delivered: usize,
    pub in_order: bool,
    pub duration_ms: u64,
    pub failure: Option<String>,
    pub gnb: RlcMetrics,
    pub ue: RlcMetrics,
    pub downlink: ChannelStats,
    pub uplink: ChannelStats,
}

type Peer = RlcBearer<CollectingNotifier>;

fn make_sdu(index: usize, size: usize) -> Bytes {
    let mut sdu = BytesMut::with_capacity(size.max(4));
    sdu.put_u32(index as u32);
    for i in 4..size {
        sdu.put_u8((index + i) as u8);
    }
    sdu.truncate(size);
    sdu.freeze()
}

fn make_peer(id: BearerId, config: &RlcConfig, direction: LinkDirection, pool: SharedPool) -> anyhow::Result<Peer> {
    let config = RlcConfig { tx_direction: direction, ..config.clone() };
    Ok(RlcBearer::new(id, &config, pool, CollectingNotifier::default())?)
}

/// Fill one grant from `from`, pushing whatever survives the channel into `to`
fn serve_grant(now: RlcInstant, grant: usize, from: &mut Peer, channel: &mut LossyChannel, to: &mut Peer) {
    let mut remaining = grant;
    while remaining >= MIN_GRANT {
        let Some(pdu) = from.pull_pdu(now, remaining) else {
            break;
        };
        remaining -= pdu.len();
        for arrived in channel.transmit(pdu) {
            if let Err(e) = to.handle_pdu(now, arrived) {
                debug!("PDU not accepted: {}", e);
            }
        }
    }
    // nothing else will overtake a held-back PDU in an idle slot
    if remaining == grant {
        if let Some(late) = channel.flush() {
            if let Err(e) = to.handle_pdu(now, late) {
                debug!("PDU not accepted: {}", e);
            }
        }
    }
}

/// Run the simulation to completion, failure or timeout
pub fn run(config: &SimConfig) -> anyhow::Result<SimReport> {
    let traffic = &config.traffic;
    let id = BearerId::new(Rnti::new(0x4601), Lcid::new(4).ok_or_else(|| anyhow::anyhow!("invalid LCID"))?);
    let gnb_pool: SharedPool = Arc::new(SegmentPool::new(traffic.pool_segments, traffic.pool_segment_size)?);
    let ue_pool: SharedPool = Arc::new(SegmentPool::new(traffic.pool_segments, traffic.pool_segment_size)?);
    let mut gnb = make_peer(id, &config.bearer, LinkDirection::Downlink, gnb_pool)?;
    let mut ue = make_peer(id, &config.bearer, LinkDirection::Uplink, ue_pool)?;

    let mut downlink = LossyChannel::new(config.channel.clone())?;
    let mut uplink_config = config.channel.clone();
    uplink_config.seed = uplink_config.seed.wrapping_add(1);
    let mut uplink = LossyChannel::new(uplink_config)?;

    info!("Running {} bearer: {} SDUs of {} bytes, grant {} bytes every {} ms",
          config.bearer.mode, traffic.num_sdus, traffic.sdu_size, traffic.grant_bytes, traffic.slot_ms);

    let mut offered = 0;
    let mut now = RlcInstant::ZERO;
    while now.as_millis() <= traffic.max_duration_ms {
        gnb.poll_timers(now);
        ue.poll_timers(now);

        while offered < traffic.num_sdus {
            match gnb.submit_sdu(make_sdu(offered, traffic.sdu_size)) {
                Ok(()) => offered += 1,
                Err(LayerError::ResourceUnavailable(reason)) => {
                    debug!("gNB back-pressure: {}", reason);
                    break;
                }
                Err(e) => {
                    warn!("SDU {} not accepted: {}", offered, e);
                    break;
                }
            }
        }

        serve_grant(now, traffic.grant_bytes, &mut gnb, &mut downlink, &mut ue);
        serve_grant(now, traffic.grant_bytes, &mut ue, &mut uplink, &mut gnb);

        if ue.notifier().sdus.len() >= traffic.num_sdus || gnb.state() != &BearerState::Active {
            break;
        }
        now = now.after(traffic.slot_ms);
    }

    let delivered = &ue.notifier().sdus;
    let in_order = delivered
        .iter()
        .enumerate()
        .all(|(i, sdu)| *sdu == make_sdu(i, traffic.sdu_size));
    let failure = match gnb.state() {
        BearerState::Failed(cause) => Some(cause.to_string()),
        _ => None,
    };
    info!("Delivered {}/{} SDUs in {} ms", delivered.len(), traffic.num_sdus, now.as_millis());

    Ok(SimReport {
        sdus_offered: offered,
        sdus_delivered: delivered.len(),
        in_order,
        duration_ms: now.as_millis(),
        failure,
        gnb: gnb.metrics(),
        ue: ue.metrics(),
        downlink: downlink.stats().clone(),
        uplink: uplink.stats().clone(),
    })
}
