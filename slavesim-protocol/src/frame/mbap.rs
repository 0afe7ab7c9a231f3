use super::Pdu;

/// Size of the MBAP header: transaction id, protocol id, length, unit id.
pub const MBAP_HEADER_LEN: usize = 7;

/// Upper bound on a complete MBAP frame (header + PDU).
pub const MAX_FRAME_LEN: usize = 260;

/// The only protocol identifier defined for Modbus.
pub const PROTOCOL_ID: u16 = 0x0000;

/// Assemble a complete MBAP frame (header + PDU) as raw bytes.
///
/// The length field covers the unit id, function code and payload. All
/// multi-byte integers are big-endian.
pub fn assemble(txn_id: u16, pdu: &Pdu) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + 1 + pdu.payload.len());
    frame.extend_from_slice(&txn_id.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
    frame.extend_from_slice(&((2 + pdu.payload.len()) as u16).to_be_bytes());
    frame.push(pdu.unit_id);
    frame.push(pdu.function_code);
    frame.extend_from_slice(&pdu.payload);
    frame
}
