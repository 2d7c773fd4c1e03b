//! # Node Runtime
//!
//! Owns the engine, the accept loop and the downstream drains.

use std::sync::Arc;

use anyhow::{Context, Result};
use ps_03_guardian_mesh::{serve, spawn_connection, TcpGuardianConnector};
use ps_04_session_engine::{Downstream, Engine, EngineBuilder, InMemoryCustodyAnchor};
use shared_bus::{EngineEvent, EventFilter, EventStream};
use shared_types::{Message, PartyRole};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::config::{CounterpartyConfig, NodeConfig};

/// A running node.
pub struct NodeRuntime {
    engine: Engine,
    local_addr: std::net::SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRuntime")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl NodeRuntime {
    /// Start the engine and the accept loop.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let key = config.signing_key().context("Failed to load signing key")?;
        let capacity = config.queue_capacity;

        let (ingress_tx, ingress_rx) = mpsc::channel(capacity);
        let connector = Arc::new(TcpGuardianConnector::new(ingress_tx.clone(), capacity));
        let mesh = config.guardian_mesh(connector);

        let engine = EngineBuilder::new(config.engine_config(), Arc::new(key), mesh)
            .ingress(ingress_tx.clone(), ingress_rx)
            .anchor(Arc::new(InMemoryCustodyAnchor::new()))
            .start()
            .await
            .context("Failed to start session engine")?;

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![tokio::spawn(serve(
            listener,
            ingress_tx.clone(),
            capacity,
            shutdown_rx.clone(),
        ))];
        tasks.push(tokio::spawn(log_events(
            engine.event_stream(EventFilter::all()),
            shutdown_rx.clone(),
        )));
        if let Some(downstream) = engine.take_downstream() {
            tasks.extend(drain_downstream(downstream, shutdown_rx));
        }

        info!("===========================================");
        info!("  pSymm Node v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");
        info!(key = %engine.own_key(), role = %engine.role(), listen = %local_addr, "Node ready");

        let runtime = Self {
            engine,
            local_addr,
            shutdown_tx,
            tasks,
        };

        if let Some(counterparty) = &config.counterparty {
            if config.role == PartyRole::Trader {
                if let Err(e) = runtime.initiate(counterparty, ingress_tx, capacity).await {
                    runtime.shutdown().await;
                    return Err(e.context(format!(
                        "Failed to reach counterparty {}",
                        counterparty.address
                    )));
                }
            } else {
                warn!("Counterparty configured but only traders initiate; ignored");
            }
        }
        Ok(runtime)
    }

    async fn initiate(
        &self,
        counterparty: &CounterpartyConfig,
        ingress: mpsc::Sender<shared_bus::InboundFrame>,
        capacity: usize,
    ) -> Result<()> {
        let stream = TcpStream::connect(&counterparty.address).await?;
        let link = spawn_connection(stream, ingress, capacity);
        self.engine.connect(counterparty.public_key, link).await?;
        info!(counterparty = %counterparty.public_key.short(), address = %counterparty.address, "Session initiated");
        Ok(())
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Address the accept loop is bound to.
    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop accepting, then tear down every session and stage.
    pub async fn shutdown(mut self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Task ended abnormally");
            }
        }
        self.engine.shutdown();
        info!("Shutdown complete");
    }
}

/// Log what the engine routes downstream. Execution venues attach here.
fn drain_downstream(downstream: Downstream, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let Downstream {
        blockchain,
        exchange,
    } = downstream;
    vec![
        tokio::spawn(drain("blockchain", blockchain, shutdown.clone())),
        tokio::spawn(drain("exchange", exchange, shutdown)),
    ]
}

async fn drain(
    queue: &'static str,
    mut rx: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            message = rx.recv() => match message {
                Some(message) => info!(
                    queue,
                    counterparty = %message.header.sender.short(),
                    msg_type = %message.msg_type(),
                    seq = message.header.seq_num,
                    custody_id = ?message.header.custody_id,
                    "Downstream message"
                ),
                None => break,
            },
        }
    }
}

/// Surface engine events in the node log.
async fn log_events(mut events: EventStream, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.next() => match event {
                Some(event @ (EngineEvent::HeartbeatOverdue { .. }
                | EngineEvent::GuardianDropped { .. }
                | EngineEvent::MessageRejected { .. })) => warn!(?event, "Engine event"),
                Some(event) => info!(?event, "Engine event"),
                None => break,
            },
        }
    }
}
