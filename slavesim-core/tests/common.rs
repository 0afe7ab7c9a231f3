use slavesim_core::{
    console::ConsoleProtocolAdapter,
    transport::{TcpHandler, TransportHandler},
    Gateway, ProtocolPort,
};
use std::{
    net::SocketAddr,
    sync::{Arc, Once},
};
use tokio_util::sync::CancellationToken;
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Address the TCP transport is configured with; the listener picks an
/// ephemeral port, the registry keys slaves by this string.
pub const TRANSPORT_ADDRESS: &str = "127.0.0.1:0";

pub struct TestBus {
    pub gateway: Arc<Gateway>,
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
}

/// Start a gateway with one TCP transport on an ephemeral port and one
/// slave connected with the given configuration (rules included).
#[allow(dead_code)]
pub async fn start_tcp_bus_with_config(slave: slavesim_models::SlaveConfig) -> TestBus {
    init_tracing();

    let port: Arc<dyn ProtocolPort> = Arc::new(ConsoleProtocolAdapter::new());
    port.mute();

    let handler = Arc::new(TcpHandler::new(TRANSPORT_ADDRESS, Arc::clone(&port)));
    let gateway = Gateway::new(
        vec![Arc::clone(&handler) as Arc<dyn TransportHandler>],
        port,
    );

    let cancel = CancellationToken::new();
    gateway
        .start(cancel.clone())
        .await
        .expect("failed to start gateway");
    gateway
        .connect_slave_with_config(&slave, TRANSPORT_ADDRESS)
        .expect("failed to connect slave");

    let addr = handler.bound_addr().expect("listener not bound");
    TestBus {
        gateway,
        addr,
        cancel,
    }
}

/// Start a gateway with one TCP transport on an ephemeral port and one
/// connected slave.
#[allow(dead_code)]
pub async fn start_tcp_bus(unit_id: u8) -> TestBus {
    init_tracing();

    let port: Arc<dyn ProtocolPort> = Arc::new(ConsoleProtocolAdapter::new());
    port.mute();

    let handler = Arc::new(TcpHandler::new(TRANSPORT_ADDRESS, Arc::clone(&port)));
    let gateway = Gateway::new(
        vec![Arc::clone(&handler) as Arc<dyn TransportHandler>],
        port,
    );

    let cancel = CancellationToken::new();
    gateway
        .start(cancel.clone())
        .await
        .expect("failed to start gateway");
    gateway
        .connect_slave(unit_id, TRANSPORT_ADDRESS)
        .expect("failed to connect slave");

    let addr = handler.bound_addr().expect("listener not bound");
    TestBus {
        gateway,
        addr,
        cancel,
    }
}
