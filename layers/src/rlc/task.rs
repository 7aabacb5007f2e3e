//! Async Bearer Task
//!
//! Runs an [`RlcBearer`] inside one tokio task. Every input reaches the
//! bearer through a single command channel, and timer deadlines are slept on
//! in the same `select!`, so the bearer never sees concurrent calls.

use super::bearer::{BearerEvent, RlcBearer};
use super::config::RlcConfig;
use super::metrics::RlcMetrics;
use super::timer::RlcInstant;
use super::{FailureCause, RlcUpperNotifier};
use crate::LayerError;
use async_trait::async_trait;
use bytes::Bytes;
use common::types::BearerId;
use interfaces::pool::SharedPool;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

/// Upper layer view of a bearer
#[async_trait]
pub trait RlcUpperInterface: Send + Sync {
    /// Queue an SDU for transmission
    async fn submit_sdu(&self, sdu: Bytes) -> Result<(), LayerError>;

    /// Release the bearer
    async fn release(&self) -> Result<(), LayerError>;
}

/// Lower layer (MAC) view of a bearer
#[async_trait]
pub trait RlcLowerInterface: Send + Sync {
    /// Next PDU for a transmission opportunity of `budget` bytes
    async fn pull_pdu(&self, budget: usize) -> Result<Option<Bytes>, LayerError>;

    /// Deliver a received PDU
    async fn handle_pdu(&self, pdu: Bytes) -> Result<(), LayerError>;

    /// Bytes the bearer wants to send
    async fn buffer_state(&self) -> Result<usize, LayerError>;
}

/// What the bearer task reports upwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpperEvent {
    Sdu(Bytes),
    ProtocolFailure(FailureCause),
}

/// Notifier forwarding to an unbounded channel
#[derive(Debug)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<UpperEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<UpperEvent>) -> Self {
        Self { tx }
    }
}

impl RlcUpperNotifier for ChannelNotifier {
    fn on_new_sdu(&mut self, sdu: Bytes) {
        if self.tx.send(UpperEvent::Sdu(sdu)).is_err() {
            trace!("Upper layer gone, dropping SDU");
        }
    }

    fn on_protocol_failure(&mut self, cause: FailureCause) {
        if self.tx.send(UpperEvent::ProtocolFailure(cause)).is_err() {
            trace!("Upper layer gone, dropping failure indication");
        }
    }
}

#[derive(Debug)]
enum BearerCommand {
    Event(BearerEvent),
    Pull(usize),
    BufferState,
    Metrics,
}

#[derive(Debug)]
enum BearerResponse {
    Done(Result<(), LayerError>),
    Pdu(Option<Bytes>),
    BufferState(usize),
    Metrics(RlcMetrics),
}

type CommandSender = mpsc::Sender<(BearerCommand, oneshot::Sender<BearerResponse>)>;
type CommandReceiver = mpsc::Receiver<(BearerCommand, oneshot::Sender<BearerResponse>)>;

/// Cloneable handle to a bearer task
#[derive(Debug, Clone)]
pub struct RlcBearerHandle {
    id: BearerId,
    commands: CommandSender,
}

/// Spawn a bearer task. Returns the handle, the receiver of upward events
/// and the task's join handle; the task ends when every handle is dropped.
pub fn spawn_bearer(
    id: BearerId,
    config: &RlcConfig,
    pool: SharedPool,
) -> Result<(RlcBearerHandle, mpsc::UnboundedReceiver<UpperEvent>, JoinHandle<()>), LayerError> {
    let (upper_tx, upper_rx) = mpsc::unbounded_channel();
    let bearer = RlcBearer::new(id, config, pool, ChannelNotifier::new(upper_tx))?;
    let (command_tx, command_rx) = mpsc::channel(256);
    let task = tokio::spawn(run_bearer(bearer, command_rx));
    Ok((RlcBearerHandle { id, commands: command_tx }, upper_rx, task))
}

fn elapsed(epoch: Instant) -> RlcInstant {
    RlcInstant::from_millis(epoch.elapsed().as_millis() as u64)
}

async fn run_bearer(mut bearer: RlcBearer<ChannelNotifier>, mut commands: CommandReceiver) {
    let epoch = Instant::now();
    info!("{} Bearer task started", bearer.id());

    loop {
        let deadline = bearer
            .next_timer_expiry()
            .map(|(at, _)| epoch + Duration::from_millis(at.as_millis()));

        tokio::select! {
            command = commands.recv() => {
                let Some((command, reply)) = command else {
                    break;
                };
                let now = elapsed(epoch);
                bearer.poll_timers(now);
                let response = match command {
                    BearerCommand::Event(event) => BearerResponse::Done(bearer.handle_event(now, event)),
                    BearerCommand::Pull(budget) => BearerResponse::Pdu(bearer.pull_pdu(now, budget)),
                    BearerCommand::BufferState => BearerResponse::BufferState(bearer.buffer_state()),
                    BearerCommand::Metrics => BearerResponse::Metrics(bearer.metrics()),
                };
                let _ = reply.send(response);
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let fired = bearer.poll_timers(elapsed(epoch));
                trace!("{} {} timers fired", bearer.id(), fired);
            }
        }
    }

    bearer.release();
    debug!("{} Bearer task stopped", bearer.id());
}

impl RlcBearerHandle {
    pub fn id(&self) -> BearerId {
        self.id
    }

    async fn request(&self, command: BearerCommand) -> Result<BearerResponse, LayerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send((command, reply_tx))
            .await
            .map_err(|_| LayerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| LayerError::ChannelClosed)
    }

    async fn event(&self, event: BearerEvent) -> Result<(), LayerError> {
        match self.request(BearerCommand::Event(event)).await? {
            BearerResponse::Done(result) => result,
            other => Err(LayerError::InvalidState(format!("unexpected response {:?}", other))),
        }
    }

    /// Snapshot of the bearer counters
    pub async fn metrics(&self) -> Result<RlcMetrics, LayerError> {
        match self.request(BearerCommand::Metrics).await? {
            BearerResponse::Metrics(metrics) => Ok(metrics),
            other => Err(LayerError::InvalidState(format!("unexpected response {:?}", other))),
        }
    }
}

#[async_trait]
impl RlcUpperInterface for RlcBearerHandle {
    async fn submit_sdu(&self, sdu: Bytes) -> Result<(), LayerError> {
        self.event(BearerEvent::Sdu(sdu)).await
    }

    async fn release(&self) -> Result<(), LayerError> {
        self.event(BearerEvent::Release).await
    }
}

#[async_trait]
impl RlcLowerInterface for RlcBearerHandle {
    async fn pull_pdu(&self, budget: usize) -> Result<Option<Bytes>, LayerError> {
        match self.request(BearerCommand::Pull(budget)).await? {
            BearerResponse::Pdu(pdu) => Ok(pdu),
            other => Err(LayerError::InvalidState(format!("unexpected response {:?}", other))),
        }
    }

    async fn handle_pdu(&self, pdu: Bytes) -> Result<(), LayerError> {
        self.event(BearerEvent::Pdu(pdu)).await
    }

    async fn buffer_state(&self) -> Result<usize, LayerError> {
        match self.request(BearerCommand::BufferState).await? {
            BearerResponse::BufferState(bytes) => Ok(bytes),
            other => Err(LayerError::InvalidState(format!("unexpected response {:?}", other))),
        }
    }
}
