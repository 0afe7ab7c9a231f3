pub mod console;
pub mod gateway;
pub mod port;
pub mod rules;
pub mod slave;
pub mod transport;

pub use gateway::Gateway;
pub use port::{ControlPort, Message, MessageKind, ProtocolPort};
pub use rules::RuleEngine;
pub use slave::Slave;
pub use transport::{PduProcessor, RtuHandler, TcpHandler, TransportHandler};
