pub mod mbap;
pub mod rtu;

use crate::convert::hex;
use bytes::Bytes;
use std::fmt::{Display, Formatter};

pub const FC2_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC4_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC5_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC6_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC16_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const FC17_READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;

/// A Modbus protocol data unit together with the unit id it addresses.
///
/// The payload is everything after the function code. Response PDUs carry
/// copies of request bytes where the protocol echoes them, never aliases
/// into a shared receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub unit_id: u8,
    pub function_code: u8,
    pub payload: Bytes,
}

impl Pdu {
    pub fn new(unit_id: u8, function_code: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            unit_id,
            function_code,
            payload: payload.into(),
        }
    }

    /// Build a response preserving this request's unit id and function code.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Self {
        Self {
            unit_id: self.unit_id,
            function_code: self.function_code,
            payload: payload.into(),
        }
    }
}

impl Display for Pdu {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UnitId:{} FC:{} Payload:{}",
            self.unit_id,
            self.function_code,
            hex(&self.payload)
        )
    }
}
