use super::{PduProcessor, TransportHandler};
use crate::port::ProtocolPort;
use async_trait::async_trait;
use slavesim_error::{SimError, SimResult};
use slavesim_protocol::{convert::hex, frame::rtu};
use std::{
    io::ErrorKind,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::sleep,
};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const BAUD_RATE: u32 = 9600;
const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause after EOF, timeout or a transient I/O error.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Serial RTU transport: a single sequential read → decode → dispatch →
/// write cycle. The medium allows only one request in flight.
pub struct RtuHandler {
    address: String,
    protocol_port: Arc<dyn ProtocolPort>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl RtuHandler {
    pub fn new(address: impl Into<String>, protocol_port: Arc<dyn ProtocolPort>) -> Self {
        Self {
            address: address.into(),
            protocol_port,
            cancel: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportHandler for RtuHandler {
    async fn start(
        &self,
        cancel: CancellationToken,
        processor: Arc<dyn PduProcessor>,
    ) -> SimResult<()> {
        let serial = tokio_serial::new(&self.address, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open_native_async()
            .map_err(|e| SimError::TransportStart(self.address.clone(), e.to_string()))?;

        let token = cancel.child_token();
        *self.cancel.lock().unwrap() = Some(token.clone());

        let port = Arc::clone(&self.protocol_port);
        let address = self.address.clone();
        tokio::spawn(read_loop(serial, token, processor, port, address));

        debug!(address = %self.address, "RTU listener started");
        Ok(())
    }

    async fn stop(&self) -> SimResult<()> {
        if let Some(token) = self.cancel.lock().unwrap().take() {
            debug!(address = %self.address, "closing serial port");
            token.cancel();
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.address.clone()
    }
}

async fn read_loop(
    mut serial: SerialStream,
    cancel: CancellationToken,
    processor: Arc<dyn PduProcessor>,
    port: Arc<dyn ProtocolPort>,
    address: String,
) {
    let mut buf = [0u8; rtu::MAX_READ_LEN];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = serial.read(&mut buf) => match read {
                Ok(0) => sleep(RETRY_DELAY).await,
                Ok(n) => {
                    handle_frame(&mut serial, &buf[..n], &*processor, &*port, &address).await;
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    error!(error = %e, "error reading from serial port");
                    sleep(RETRY_DELAY).await;
                }
            },
        }
    }
    debug!(address = %address, "serial read loop stopped");
}

async fn handle_frame(
    serial: &mut SerialStream,
    data: &[u8],
    processor: &dyn PduProcessor,
    port: &dyn ProtocolPort,
    address: &str,
) {
    // RTU has no exception response for framing errors: short frames and
    // CRC mismatches are dropped and the loop continues.
    let pdu = match rtu::decode(data) {
        Ok(pdu) => pdu,
        Err(e) => {
            error!(frame = %hex(data), error = %e, "dropping RTU frame");
            return;
        }
    };

    port.separator();
    port.info(&format!(
        "Incoming request on {} => {}",
        address, pdu.unit_id
    ));
    port.info(&format!("TX {}", hex(data)));

    if let Some(response) = processor.process_pdu(&pdu) {
        let frame = rtu::encode(&response);
        if let Err(e) = serial.write_all(&frame).await {
            error!(error = %e, "failed to write RTU response");
            return;
        }
        port.info(&format!("RX {}", hex(&frame)));
    }
}
