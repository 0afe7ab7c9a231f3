use super::Pdu;
use crate::error::ProtocolError;
use bytes::Bytes;

/// Smallest valid RTU frame: unit id, function code and a 2-byte CRC.
pub const MIN_FRAME_LEN: usize = 4;

/// Read buffer size for one serial scheduling slice.
pub const MAX_READ_LEN: usize = 256;

/// Modbus CRC-16: polynomial 0xA001 applied LSB-first, seeded with 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Validate length and CRC of a raw serial frame and split it into a PDU.
///
/// The CRC is recomputed over everything except the trailing two bytes,
/// which carry the received CRC little-endian.
pub fn decode(frame: &[u8]) -> Result<Pdu, ProtocolError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::FrameTooShort(frame.len()));
    }
    let body = &frame[..frame.len() - 2];
    let received = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
    let computed = crc16(body);
    if received != computed {
        return Err(ProtocolError::CrcMismatch { received, computed });
    }
    Ok(Pdu {
        unit_id: body[0],
        function_code: body[1],
        payload: Bytes::copy_from_slice(&body[2..]),
    })
}

/// Serialize a PDU as an RTU frame with the CRC appended little-endian.
pub fn encode(pdu: &Pdu) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + pdu.payload.len() + 2);
    frame.push(pdu.unit_id);
    frame.push(pdu.function_code);
    frame.extend_from_slice(&pdu.payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_roundtrip_verifies() {
        let frames: [&[u8]; 3] = [
            &[0x65, 0x06, 0x00, 0x10, 0x12, 0x34],
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x08],
            &[0xFF],
        ];
        for body in frames {
            let crc = crc16(body);
            let mut frame = body.to_vec();
            frame.extend_from_slice(&crc.to_le_bytes());
            assert!(decode(&frame).is_ok(), "frame {body:02X?} failed to verify");
        }
    }

    #[test]
    fn known_crc_value() {
        // 65 06 00 10 12 34 has CRC 0x5C8D, serialized 8D 5C.
        assert_eq!(crc16(&[0x65, 0x06, 0x00, 0x10, 0x12, 0x34]), 0x5C8D);
    }

    #[test]
    fn decode_rejects_corrupted_crc() {
        let mut frame = encode(&Pdu::new(
            0x65,
            0x06,
            Bytes::from_static(&[0x00, 0x10, 0x12, 0x34]),
        ));
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decode(&frame),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(matches!(
            decode(&[0x65, 0x06, 0x00]),
            Err(ProtocolError::FrameTooShort(3))
        ));
    }

    #[test]
    fn encode_then_decode_preserves_pdu() {
        let pdu = Pdu::new(0x0A, 0x10, Bytes::from_static(&[0x00, 0x01, 0x00, 0x01]));
        let frame = encode(&pdu);
        assert_eq!(decode(&frame).unwrap(), pdu);
    }
}
