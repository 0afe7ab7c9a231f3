use crate::{
    error::ProtocolError,
    frame::{
        mbap::{MAX_FRAME_LEN, MBAP_HEADER_LEN, PROTOCOL_ID},
        Pdu,
    },
};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One decoded MBAP frame: the transaction id and the PDU it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbapFrame {
    pub txn_id: u16,
    pub pdu: Pdu,
}

/// Framing codec for Modbus TCP.
///
/// Header checks run in order: protocol id, length, maximum frame size.
/// A buffer shorter than the declared frame is not an error; the decoder
/// waits for more bytes. End of stream with a partial frame surfaces as
/// [`ProtocolError::TruncatedFrame`].
#[derive(Debug, Default)]
pub struct MbapCodec;

impl Decoder for MbapCodec {
    type Item = MbapFrame;
    type Error = ProtocolError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<MbapFrame>, ProtocolError> {
        if buf.len() < MBAP_HEADER_LEN {
            return Ok(None);
        }

        let txn_id = u16::from_be_bytes([buf[0], buf[1]]);
        let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
        if protocol_id != PROTOCOL_ID {
            return Err(ProtocolError::InvalidProtocolId(protocol_id));
        }

        // The length field counts the unit id, which is part of the header.
        let length = u16::from_be_bytes([buf[4], buf[5]]);
        if length <= 1 {
            return Err(ProtocolError::InvalidLength(length));
        }
        let body_len = length as usize - 1;
        if MBAP_HEADER_LEN + body_len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLong(MBAP_HEADER_LEN + body_len));
        }

        if buf.len() < MBAP_HEADER_LEN + body_len {
            buf.reserve(MBAP_HEADER_LEN + body_len - buf.len());
            return Ok(None);
        }

        let unit_id = buf[6];
        buf.advance(MBAP_HEADER_LEN);
        let body = buf.split_to(body_len).freeze();
        Ok(Some(MbapFrame {
            txn_id,
            pdu: Pdu {
                unit_id,
                function_code: body[0],
                payload: body.slice(1..),
            },
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<MbapFrame>, ProtocolError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame),
        }
    }
}

impl Encoder<MbapFrame> for MbapCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: MbapFrame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let MbapFrame { txn_id, pdu } = frame;
        buf.reserve(MBAP_HEADER_LEN + 1 + pdu.payload.len());
        buf.put_u16(txn_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16((2 + pdu.payload.len()) as u16);
        buf.put_u8(pdu.unit_id);
        buf.put_u8(pdu.function_code);
        buf.extend_from_slice(&pdu.payload);
        Ok(())
    }
}
