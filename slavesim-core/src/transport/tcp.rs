use super::{PduProcessor, TransportHandler};
use crate::port::{Message, ProtocolPort};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use slavesim_error::{SimError, SimResult};
use slavesim_protocol::{
    codec::{MbapCodec, MbapFrame},
    convert::hex,
    frame::mbap,
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, error, warn};

/// MBAP transport: one listener, one task per accepted connection.
///
/// Within a connection requests are strictly sequential: the next read
/// starts only after the response (if any) has been written. Parallelism
/// across connections is serialized by the bus, not here.
pub struct TcpHandler {
    address: String,
    protocol_port: Arc<dyn ProtocolPort>,
    bound_addr: Mutex<Option<SocketAddr>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl TcpHandler {
    pub fn new(address: impl Into<String>, protocol_port: Arc<dyn ProtocolPort>) -> Self {
        Self {
            address: address.into(),
            protocol_port,
            bound_addr: Mutex::new(None),
            cancel: Mutex::new(None),
        }
    }

    /// The address the listener actually bound to. Differs from the
    /// configured address when it names port 0.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().unwrap()
    }
}

#[async_trait]
impl TransportHandler for TcpHandler {
    async fn start(
        &self,
        cancel: CancellationToken,
        processor: Arc<dyn PduProcessor>,
    ) -> SimResult<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|e| SimError::TransportStart(self.address.clone(), e.to_string()))?;
        *self.bound_addr.lock().unwrap() = Some(listener.local_addr()?);

        let token = cancel.child_token();
        *self.cancel.lock().unwrap() = Some(token.clone());

        let port = Arc::clone(&self.protocol_port);
        let address = self.address.clone();
        tokio::spawn(accept_loop(listener, token, processor, port, address));

        debug!(address = %self.address, "TCP listener started");
        Ok(())
    }

    async fn stop(&self) -> SimResult<()> {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            debug!(address = %self.address, "stopping TCP listener");
            token.cancel();
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.address.clone()
    }
}

async fn accept_loop(
    listener: TcpListener,
    cancel: CancellationToken,
    processor: Arc<dyn PduProcessor>,
    port: Arc<dyn ProtocolPort>,
    address: String,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "master connected");
                    tokio::spawn(connection_loop(
                        stream,
                        peer,
                        cancel.clone(),
                        Arc::clone(&processor),
                        Arc::clone(&port),
                    ));
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
        }
    }
    debug!(address = %address, "TCP listener stopped");
}

async fn connection_loop(
    stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
    processor: Arc<dyn PduProcessor>,
    port: Arc<dyn ProtocolPort>,
) {
    let mut framed = Framed::new(stream, MbapCodec);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = framed.next() => match next {
                None => {
                    debug!(peer = %peer, "client disconnected");
                    break;
                }
                Some(Err(e)) => {
                    error!(peer = %peer, error = %e, "failed to read MBAP frame");
                    break;
                }
                Some(Ok(frame)) => {
                    if !handle_request(&mut framed, frame, &*processor, &*port).await {
                        break;
                    }
                }
            },
        }
    }
}

/// Run one request through the bus and write the response, if any.
/// Returns false when the connection should close.
async fn handle_request(
    framed: &mut Framed<TcpStream, MbapCodec>,
    frame: MbapFrame,
    processor: &dyn PduProcessor,
    port: &dyn ProtocolPort,
) -> bool {
    let MbapFrame { txn_id, pdu } = frame;
    debug!(%pdu, txn_id, "MBAP frame received");

    port.separator();
    port.info_typed(Message::unencoded(format!(
        "TX {}",
        hex(&mbap::assemble(txn_id, &pdu))
    )));

    let mut alive = true;
    if let Some(response) = processor.process_pdu(&pdu) {
        let raw = mbap::assemble(txn_id, &response);
        match framed
            .send(MbapFrame {
                txn_id,
                pdu: response,
            })
            .await
        {
            Ok(()) => {
                debug!(frame = %hex(&raw), "MBAP response written");
                port.info_typed(Message::unencoded(format!("RX {}", hex(&raw))));
            }
            Err(e) => {
                error!(error = %e, "failed to write response");
                alive = false;
            }
        }
    }
    port.separator();
    alive
}
