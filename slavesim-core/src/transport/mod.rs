pub mod rtu;
pub mod tcp;

pub use rtu::RtuHandler;
pub use tcp::TcpHandler;

use async_trait::async_trait;
use slavesim_error::SimResult;
use slavesim_protocol::Pdu;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Routing seam between a transport and the bus.
///
/// The contract is a pure function over the request: `None` means the
/// transport sends no response and proceeds to the next request.
pub trait PduProcessor: Send + Sync {
    fn process_pdu(&self, pdu: &Pdu) -> Option<Pdu>;
}

/// Common contract of the TCP and RTU carriers.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// Acquire the medium and spawn the request loop. Returns once the
    /// transport accepts traffic; acquisition failures are fatal start-up
    /// errors.
    async fn start(
        &self,
        cancel: CancellationToken,
        processor: Arc<dyn PduProcessor>,
    ) -> SimResult<()>;

    /// Stop the request loop and release the medium.
    async fn stop(&self) -> SimResult<()>;

    /// The configured address; doubles as the slave-registry key.
    fn description(&self) -> String;
}
