use std::result::Result as StdResult;
use thiserror::Error;

pub type Result<T> = StdResult<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("short MBAP header")]
    ShortHeader,
    #[error("invalid protocol id 0x{0:04X}")]
    InvalidProtocolId(u16),
    #[error("invalid MBAP length {0}")]
    InvalidLength(u16),
    #[error("frame length {0} exceeds maximum")]
    FrameTooLong(usize),
    #[error("truncated frame")]
    TruncatedFrame,
    #[error("RTU frame too short ({0} bytes)")]
    FrameTooShort(usize),
    #[error("CRC mismatch: received 0x{received:04X}, computed 0x{computed:04X}")]
    CrcMismatch { received: u16, computed: u16 },
}
