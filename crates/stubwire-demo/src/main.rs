//! Scripted GAP session over an in-process stubwire link.
//!
//! A [`GapClient`] drives a [`SimController`] through every `bt_rpc`
//! operation, either on the calling thread or through a worker thread.
//!
//! Usage:
//!   cargo run -p stubwire-demo
//!   cargo run -p stubwire-demo -- --transport threaded --name "my device"
//!   RUST_LOG=stubwire_core=trace cargo run -p stubwire-demo -- --corrupt 0.2 --seed 7

use std::{
    process::ExitCode,
    sync::{Arc, mpsc},
    time::Duration,
};

use clap::{Parser, ValueEnum};
use stubwire_core::{
    CallbackPolicy, Caller, ConfigError, RegistryError, RpcConfig, RpcError, Transport,
};
use stubwire_gap::{BtAddrLe, BtData, GapClient, ID_MAX, IRK_ANY, SimController, host_registry};
use stubwire_harness::{FaultPlan, HarnessError, LoopbackTransport, ThreadedPeer};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// Deliver on the calling thread
    Loopback,
    /// Deliver to a host worker thread
    Threaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    Once,
    Repeated,
}

impl From<Policy> for CallbackPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Once => Self::Once,
            Policy::Repeated => Self::Repeated,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "stubwire-demo",
    about = "Run a scripted GAP session over stubwire",
    long_about = None
)]
struct Args {
    /// Link between client and host
    #[arg(long, value_enum, default_value_t = TransportKind::Loopback)]
    transport: TransportKind,

    /// Device name to set
    #[arg(long, default_value = "stubwire demo")]
    name: String,

    /// Largest message either side may allocate, in bytes
    #[arg(long, default_value_t = 1024)]
    max_message_size: usize,

    /// Largest scratchpad an inbound message may announce, in bytes
    #[arg(long, default_value_t = 4096)]
    max_scratchpad: usize,

    /// Command response timeout, in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Messages that may be in flight at once
    #[arg(long, default_value_t = 16)]
    message_slots: usize,

    /// How often a registered callback may fire
    #[arg(long, value_enum, default_value_t = Policy::Once)]
    callback_policy: Policy,

    /// Probability of corrupting one byte of each request (loopback only)
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// Fault injection seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn config(&self) -> Result<RpcConfig, ConfigError> {
        let config = RpcConfig::default()
            .with_max_message_size(self.max_message_size)
            .with_max_scratchpad(self.max_scratchpad)
            .with_response_timeout(Duration::from_millis(self.timeout_ms))
            .with_message_slots(self.message_slots)
            .with_callback_policy(self.callback_policy.into());
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
enum DemoError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("harness: {0}")]
    Harness(#[from] HarnessError),

    #[error("ready callback did not fire within {0:?}")]
    NotReady(Duration),
}

/// Both ends of the link.
struct Session {
    client: GapClient,
    controller: Arc<SimController>,
    // keeps the host worker running
    _peer: Option<ThreadedPeer>,
}

fn connect(args: &Args, config: &RpcConfig) -> Result<Session, DemoError> {
    let controller = Arc::new(SimController::new());
    let to_client = LoopbackTransport::new();
    let events = Caller::new(Arc::new(to_client.clone()), config.clone());
    let host = host_registry(&controller, events, config.clone())?;

    let (transport, peer): (Arc<dyn Transport>, Option<ThreadedPeer>) = match args.transport {
        TransportKind::Loopback => {
            let plan = FaultPlan { corrupt: args.corrupt, ..FaultPlan::none() };
            let to_host = LoopbackTransport::with_faults(plan, args.seed);
            to_host.bind(host)?;
            (Arc::new(to_host), None)
        },
        TransportKind::Threaded => {
            let peer = ThreadedPeer::spawn(host, config.response_timeout)?;
            (Arc::new(peer.transport()), Some(peer))
        },
    };

    let client = GapClient::new(Caller::new(transport, config.clone()));
    to_client.bind(client.event_registry(config.clone())?)?;
    tracing::debug!(transport = ?args.transport, "link up");
    Ok(Session { client, controller, _peer: peer })
}

fn run_script(session: &Session, name: &str, timeout: Duration) -> Result<(), DemoError> {
    let client = &session.client;
    tracing::info!(alive = client.test1(1)?, "test1");

    let (ready_tx, ready_rx) = mpsc::channel();
    let err = client.bt_enable(Some(Box::new(move |err| {
        let _ = ready_tx.send(err);
    })))?;
    tracing::info!(err, "bt_enable");
    let ready = ready_rx.recv_timeout(timeout).map_err(|_| DemoError::NotReady(timeout))?;
    tracing::info!(err = ready, "bt_ready_cb");

    tracing::info!(err = client.bt_set_name(name)?, name, "bt_set_name");
    tracing::info!(name = ?client.bt_get_name()?, "bt_get_name");

    let mut addr = BtAddrLe::ANY;
    let mut irk = IRK_ANY;
    let id = client.bt_id_create(Some(&mut addr), Some(&mut irk))?;
    tracing::info!(id, %addr, "bt_id_create");

    let mut addrs = [BtAddrLe::ANY; ID_MAX];
    let count = client.bt_id_get(&mut addrs)?;
    for (id, addr) in addrs.iter().take(count).enumerate() {
        tracing::info!(id, %addr, "identity");
    }

    let flags = [0x06];
    let ad = [BtData::new(0x01, &flags), BtData::new(0x09, name.as_bytes())];
    let err = client.bt_le_adv_update_data(&ad, &[])?;
    let elements = session.controller.advertising_data().len();
    tracing::info!(err, elements, "bt_le_adv_update_data");

    tracing::info!(in_flight = client.caller().pool().in_use(), "session finished");
    Ok(())
}

fn run(args: &Args) -> Result<(), DemoError> {
    let config = args.config()?;
    let session = connect(args, &config)?;
    run_script(&session, &args.name, config.response_timeout)
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "demo failed");
            ExitCode::FAILURE
        },
    }
}
