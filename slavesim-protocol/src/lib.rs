pub mod codec;
pub mod convert;
pub mod error;
pub mod frame;

pub use codec::{MbapCodec, MbapFrame};
pub use error::ProtocolError;
pub use frame::Pdu;
