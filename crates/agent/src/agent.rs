//! Per-peer lifecycle: connect, handshake, head sync, liveness probes,
//! and receipt-subscription diffing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use electrum_consensus::{hash256_to_hex, ChainParams};
use electrum_log::{log_info, log_warn};
use electrum_primitives::plain::{PlainBlockHeader, PlainTransaction};
use electrum_rpc::{ChannelConfig, Connector, RpcChannel};
use electrum_storage::{BlockStore, TransactionStore};

use crate::api::{Balance, ElectrumApi, Receipt};
use crate::error::AgentError;
use crate::events::{AgentEvent, EventBus, EventHandle, EventKind};
use crate::peer::Peer;
use crate::transport::{endpoint_for, select_transport, ClientConfig, Transport};

const HANDSHAKE_TIMEOUT_SECS: u64 = 4;
const BLOCK_TIMEOUT_SECS: u64 = 4;
const PING_INTERVAL_SECS: u64 = 60;
const PING_TIMEOUT_SECS: u64 = 10;

pub const PROTOCOL_MIN: &str = "1.4";
pub const PROTOCOL_MAX: &str = "1.4.2";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Lifecycle {
    Created,
    Connecting,
    Handshaking,
    Syncing,
    Synced,
    Closed,
}

struct AgentState {
    lifecycle: Lifecycle,
    api: Option<ElectrumApi>,
    known_receipts: HashMap<String, HashMap<String, Receipt>>,
    tasks: Vec<JoinHandle<()>>,
    ping_task: Option<JoinHandle<()>>,
    close_reason: Option<String>,
}

struct AgentInner {
    peer: Peer,
    transport: Transport,
    params: ChainParams,
    config: ClientConfig,
    client_id: String,
    connector: Arc<dyn Connector>,
    blocks: BlockStore,
    transactions: TransactionStore,
    events: Arc<EventBus>,
    state: Mutex<AgentState>,
}

/// One agent per peer. Bound to a single peer at construction,
/// terminated by `close` (or a fatal error), after which every public
/// operation fails with `NotSynced`. Clones share the same agent.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Builds the agent and deterministically selects the transport.
    /// Fails with `NoSuitableTransport` when neither the peer's ports
    /// nor the configured proxies allow a connection.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        peer: Peer,
        params: ChainParams,
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        client_id: impl Into<String>,
        blocks: BlockStore,
        transactions: TransactionStore,
    ) -> Result<Self, AgentError> {
        let transport = select_transport(&peer, &config)?;
        Ok(Self {
            inner: Arc::new(AgentInner {
                peer,
                transport,
                params,
                config,
                client_id: client_id.into(),
                connector,
                blocks,
                transactions,
                events: Arc::new(EventBus::default()),
                state: Mutex::new(AgentState {
                    lifecycle: Lifecycle::Created,
                    api: None,
                    known_receipts: HashMap::new(),
                    tasks: Vec::new(),
                    ping_task: None,
                    close_reason: None,
                }),
            }),
        })
    }

    pub fn peer(&self) -> &Peer {
        &self.inner.peer
    }

    pub fn transport(&self) -> Transport {
        self.inner.transport
    }

    pub fn is_synced(&self) -> bool {
        self.inner.state.lock().expect("agent state").lifecycle == Lifecycle::Synced
    }

    pub fn close_reason(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .expect("agent state")
            .close_reason
            .clone()
    }

    /// Registers a typed event listener. Dropping the handle
    /// deregisters it.
    pub fn on_event(
        &self,
        kind: EventKind,
    ) -> (EventHandle, tokio::sync::mpsc::UnboundedReceiver<AgentEvent>) {
        self.inner.events.register(kind)
    }

    /// Dials the peer, handshakes, and starts the head sync. Fatal
    /// failures close the agent (CLOSE is emitted) and are returned.
    pub async fn connect(&self) -> Result<(), AgentError> {
        {
            let mut state = self.inner.state.lock().expect("agent state");
            if state.lifecycle != Lifecycle::Created {
                return Err(AgentError::Protocol("agent already started".to_string()));
            }
            state.lifecycle = Lifecycle::Connecting;
        }
        log_info!(
            "connecting to {} over {}",
            self.inner.peer.host,
            self.inner.transport.as_str()
        );

        let endpoint = endpoint_for(
            &self.inner.peer,
            self.inner.transport,
            &self.inner.config,
            &self.inner.params,
        )?;
        let rpc = match RpcChannel::connect(
            Arc::clone(&self.inner.connector),
            endpoint,
            ChannelConfig::default(),
        )
        .await
        {
            Ok(rpc) => rpc,
            Err(err) => {
                let err: AgentError = err.into();
                self.inner.shutdown(&err.to_string());
                return Err(err);
            }
        };
        let api = ElectrumApi::new(rpc.clone(), self.inner.params.clone());
        {
            let mut state = self.inner.state.lock().expect("agent state");
            state.api = Some(api.clone());
            state.lifecycle = Lifecycle::Handshaking;
        }
        watch_connection(&self.inner, &rpc);

        if let Err(err) = self.handshake(&api).await {
            self.inner.shutdown(&err.to_string());
            return Err(err);
        }
        {
            let mut state = self.inner.state.lock().expect("agent state");
            state.lifecycle = Lifecycle::Syncing;
        }
        self.inner.events.emit(AgentEvent::Syncing);

        // Head sync: the subscription's initial result is the tip and is
        // treated like any other incoming block.
        let (tip, stream) = match timeout(
            Duration::from_secs(BLOCK_TIMEOUT_SECS),
            api.subscribe_headers(),
        )
        .await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                self.inner.shutdown(&err.to_string());
                return Err(err);
            }
            Err(_) => {
                let err = AgentError::BlockTimeout;
                self.inner.shutdown(&err.to_string());
                return Err(err);
            }
        };
        on_header(&self.inner, tip).await;

        let inner = Arc::clone(&self.inner);
        let header_api = api.clone();
        let task = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(params) = stream.recv().await {
                match header_api.header_from_notification(&params) {
                    Ok(header) => on_header(&inner, header).await,
                    Err(err) => log_warn!("bad header notification: {err}"),
                }
            }
        });
        self.inner
            .state
            .lock()
            .expect("agent state")
            .tasks
            .push(task);

        Ok(())
    }

    async fn handshake(&self, api: &ElectrumApi) -> Result<(), AgentError> {
        let work = async {
            let (software, protocol) = api
                .set_protocol_version(&self.inner.client_id, [PROTOCOL_MIN, PROTOCOL_MAX])
                .await?;
            log_info!(
                "peer {} speaks protocol {protocol} ({software})",
                self.inner.peer.host
            );

            let features = api.get_features().await?;
            let expected = hash256_to_hex(&self.inner.params.genesis_hash);
            let found = features.genesis_hash.unwrap_or_default();
            if found != expected {
                return Err(AgentError::WrongGenesis { expected, found });
            }
            Ok(())
        };

        match timeout(Duration::from_secs(HANDSHAKE_TIMEOUT_SECS), work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::HandshakeTimeout),
        }
    }

    /// Subscribes to receipt changes for each address. The first
    /// snapshot per address is the silent baseline; later snapshots are
    /// diffed against it.
    pub async fn subscribe(&self, addresses: &[String]) -> Result<(), AgentError> {
        let api = self.require_synced()?;
        for address in addresses {
            let already = {
                let state = self.inner.state.lock().expect("agent state");
                state.known_receipts.contains_key(address)
            };
            if already {
                continue;
            }

            let (baseline, stream, script_hash) = api.subscribe_receipts(address).await?;
            {
                let mut state = self.inner.state.lock().expect("agent state");
                let snapshot = baseline
                    .into_iter()
                    .map(|receipt| (receipt.transaction_hash.clone(), receipt))
                    .collect();
                state.known_receipts.insert(address.clone(), snapshot);
            }

            let inner = Arc::clone(&self.inner);
            let task_api = api.clone();
            let task_address = address.clone();
            let task = tokio::spawn(async move {
                let mut stream = stream;
                while let Some(_status) = stream.recv().await {
                    let receipts = match task_api.get_receipts(&script_hash).await {
                        Ok(receipts) => receipts,
                        Err(err) => {
                            log_warn!("history refresh for {task_address} failed: {err}");
                            continue;
                        }
                    };
                    on_receipts(&inner, &task_address, receipts).await;
                }
            });
            self.inner
                .state
                .lock()
                .expect("agent state")
                .tasks
                .push(task);
        }
        Ok(())
    }

    pub async fn get_balance(&self, address: &str) -> Result<Balance, AgentError> {
        self.require_synced()?.get_balance(address).await
    }

    pub async fn get_transaction_receipts(
        &self,
        address: &str,
    ) -> Result<Vec<Receipt>, AgentError> {
        self.require_synced()?
            .get_receipts_for_address(address)
            .await
    }

    pub async fn get_transaction(
        &self,
        transaction_hash: &str,
    ) -> Result<PlainTransaction, AgentError> {
        self.require_synced()?
            .get_transaction(transaction_hash, None)
            .await
    }

    pub async fn get_block_header(&self, height: i32) -> Result<PlainBlockHeader, AgentError> {
        self.require_synced()?.get_block_header(height).await
    }

    pub async fn get_fee_histogram(&self) -> Result<Vec<(f64, u64)>, AgentError> {
        self.require_synced()?.get_fee_histogram().await
    }

    pub async fn get_minimum_relay_fee(&self) -> Result<f64, AgentError> {
        self.require_synced()?.get_relay_fee().await
    }

    pub async fn broadcast_transaction(&self, raw: &str) -> Result<String, AgentError> {
        self.require_synced()?.broadcast_transaction(raw).await
    }

    pub async fn get_peers(&self) -> Result<Vec<Peer>, AgentError> {
        self.require_synced()?.get_peers().await
    }

    /// Fee estimates per confirmation target. Unlike the other public
    /// operations this degrades instead of failing: RPC errors (or a
    /// missing connection) yield -1 in the affected slots.
    pub async fn estimate_fees(&self, targets: &[u32]) -> Vec<f64> {
        let api = {
            let state = self.inner.state.lock().expect("agent state");
            state.api.clone()
        };
        match api {
            Some(api) => api.estimate_fees(targets).await,
            None => targets.iter().map(|_| -1.0).collect(),
        }
    }

    /// Idempotent: the first call tears down the connection and emits
    /// CLOSE; later calls are no-ops.
    pub fn close(&self, reason: &str) {
        self.inner.shutdown(reason);
    }

    fn require_synced(&self) -> Result<ElectrumApi, AgentError> {
        let state = self.inner.state.lock().expect("agent state");
        if state.lifecycle != Lifecycle::Synced {
            return Err(AgentError::NotSynced);
        }
        state.api.clone().ok_or(AgentError::NotSynced)
    }
}

impl AgentInner {
    fn api(&self) -> Result<ElectrumApi, AgentError> {
        let state = self.state.lock().expect("agent state");
        state
            .api
            .clone()
            .ok_or_else(|| AgentError::ConnectionLost("not connected".to_string()))
    }

    fn is_closed(&self) -> bool {
        self.state.lock().expect("agent state").lifecycle == Lifecycle::Closed
    }

    /// Terminal transition. Emits CLOSE exactly once.
    fn shutdown(&self, reason: &str) {
        let api = {
            let mut state = self.state.lock().expect("agent state");
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
            state.close_reason = Some(reason.to_string());
            if let Some(task) = state.ping_task.take() {
                task.abort();
            }
            for task in state.tasks.drain(..) {
                task.abort();
            }
            state.api.take()
        };
        if let Some(api) = api {
            api.channel().close(reason);
        }
        log_info!("agent for {} closed: {reason}", self.peer.host);
        self.events.emit(AgentEvent::Close(reason.to_string()));
    }
}

/// Surfaces transport loss as an agent-fatal close.
fn watch_connection(inner: &Arc<AgentInner>, rpc: &RpcChannel) {
    let mut closed = rpc.closed();
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        if closed.changed().await.is_ok() {
            let reason = closed
                .borrow()
                .clone()
                .unwrap_or_else(|| "connection lost".to_string());
            inner.shutdown(&reason);
        }
    });
}

async fn on_header(inner: &Arc<AgentInner>, header: PlainBlockHeader) {
    if inner.is_closed() {
        return;
    }
    match accept_header(inner, &header).await {
        Ok(true) => {
            log_info!(
                "block {} at height {}",
                header.block_hash,
                header.block_height
            );
            inner.events.emit(AgentEvent::Block(header));
            maybe_mark_synced(inner);
        }
        Ok(false) => log_warn!(
            "dropping non-consecutive header at height {}",
            header.block_height
        ),
        Err(err) => log_warn!(
            "header at height {} not processed: {err}",
            header.block_height
        ),
    }
}

/// Chain-of-one validation: a header is accepted iff it is the genesis
/// header or links to the stored predecessor (fetched on demand).
async fn accept_header(
    inner: &Arc<AgentInner>,
    header: &PlainBlockHeader,
) -> Result<bool, AgentError> {
    if header.block_height < 0 {
        return Ok(false);
    }
    if header.block_height == 0 {
        inner.blocks.put(header)?;
        return Ok(true);
    }

    let prev_height = header.block_height - 1;
    let prev = match inner.blocks.get(prev_height)? {
        Some(prev) => prev,
        None => {
            let api = inner.api()?;
            let fetched = api.get_block_header(prev_height).await?;
            inner.blocks.put(&fetched)?;
            fetched
        }
    };

    if header.prev_hash.as_deref() == Some(prev.block_hash.as_str()) {
        inner.blocks.put(header)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn maybe_mark_synced(inner: &Arc<AgentInner>) {
    let flipped = {
        let mut state = inner.state.lock().expect("agent state");
        if state.lifecycle == Lifecycle::Syncing {
            state.lifecycle = Lifecycle::Synced;
            true
        } else {
            false
        }
    };
    if flipped {
        log_info!("synced with {}", inner.peer.host);
        inner.events.emit(AgentEvent::Synced);
        start_ping(inner);
    }
}

/// Liveness probe: `server.ping` on an interval, one retry on timeout,
/// close on the second consecutive miss.
fn start_ping(inner: &Arc<AgentInner>) {
    let task_inner = Arc::clone(inner);
    let task = tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(PING_INTERVAL_SECS)).await;
            let Ok(api) = task_inner.api() else {
                return;
            };

            let first = timeout(Duration::from_secs(PING_TIMEOUT_SECS), api.ping()).await;
            if matches!(first, Ok(Ok(()))) {
                continue;
            }
            log_warn!("ping to {} failed, retrying", task_inner.peer.host);
            let second = timeout(Duration::from_secs(PING_TIMEOUT_SECS), api.ping()).await;
            if matches!(second, Ok(Ok(()))) {
                continue;
            }

            task_inner.shutdown(&AgentError::PingTimeout.to_string());
            return;
        }
    });
    inner.state.lock().expect("agent state").ping_task = Some(task);
}

/// Diffs a receipts snapshot against the known baseline. Each receipt
/// is handled independently: a failing transaction path is logged and
/// skipped, never aborting its siblings.
async fn on_receipts(inner: &Arc<AgentInner>, address: &str, receipts: Vec<Receipt>) {
    for receipt in receipts {
        if inner.is_closed() {
            return;
        }
        let known_height = {
            let state = inner.state.lock().expect("agent state");
            state
                .known_receipts
                .get(address)
                .and_then(|known| known.get(&receipt.transaction_hash))
                .map(|known| known.block_height)
        };
        if known_height == Some(receipt.block_height) {
            continue;
        }

        match process_receipt(inner, &receipt).await {
            Ok(event) => {
                {
                    let mut state = inner.state.lock().expect("agent state");
                    state
                        .known_receipts
                        .entry(address.to_string())
                        .or_default()
                        .insert(receipt.transaction_hash.clone(), receipt);
                }
                inner.events.emit(event);
            }
            Err(err) => log_warn!(
                "receipt {} for {address} skipped: {err}",
                receipt.transaction_hash
            ),
        }
    }
}

/// Resolves one changed receipt into a TRANSACTION_ADDED or
/// TRANSACTION_MINED event, Merkle-proving confirmed transactions
/// against their header.
async fn process_receipt(
    inner: &Arc<AgentInner>,
    receipt: &Receipt,
) -> Result<AgentEvent, AgentError> {
    let api = inner.api()?;

    let block = if receipt.block_height > 0 {
        let header = match inner.blocks.get(receipt.block_height)? {
            Some(header) => header,
            None => {
                let fetched = api.get_block_header(receipt.block_height).await?;
                inner.blocks.put(&fetched)?;
                fetched
            }
        };
        Some(header)
    } else {
        None
    };

    let tx = match inner.transactions.get(&receipt.transaction_hash)? {
        None => {
            let tx = api
                .get_transaction(&receipt.transaction_hash, block.as_ref())
                .await?;
            inner.transactions.put(&tx)?;
            tx
        }
        Some(mut tx) => {
            if let Some(block) = &block {
                api.proof_transaction(&receipt.transaction_hash, block)
                    .await?;
                tx.block_hash = Some(block.block_hash.clone());
                tx.block_height = Some(block.block_height);
                tx.timestamp = Some(block.timestamp);
                inner.transactions.put(&tx)?;
            }
            tx
        }
    };

    Ok(match block {
        Some(block) => AgentEvent::TransactionMined(tx, block),
        None => AgentEvent::TransactionAdded(tx),
    })
}
