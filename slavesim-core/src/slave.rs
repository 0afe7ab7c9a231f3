use crate::{
    port::{Message, ProtocolPort},
    rules::RuleEngine,
};
use bytes::Bytes;
use slavesim_protocol::{
    convert::{be_u16, pack_bits},
    frame::{
        FC16_WRITE_MULTIPLE_REGISTERS, FC17_READ_WRITE_MULTIPLE_REGISTERS,
        FC2_READ_DISCRETE_INPUTS, FC4_READ_INPUT_REGISTERS, FC5_WRITE_SINGLE_COIL,
        FC6_WRITE_SINGLE_REGISTER,
    },
    Pdu,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Register that answers FC4 reads with the device time-sync payload.
const TIME_SYNC_ADDR: u16 = 0x8FFC;

/// Device-specific time-sync value; reproduced verbatim from the field
/// device this simulator impersonates.
const SYNC_TIME: u64 = 2_815_470_101_985_099_801;

/// Synthetic FC23 read payload: upgrade response command 0x81, 4 data
/// bytes, firmware version 0.0.9.4 little-endian.
const FIRMWARE_RESPONSE: [u8; 6] = [0x81, 0x04, 0x04, 0x09, 0x00, 0x00];

/// Largest bit read a response frame can carry.
const MAX_BIT_QUANTITY: u16 = 0x07D0;

/// Largest register read a response frame can carry.
const MAX_REGISTER_QUANTITY: u16 = 0x007D;

/// One simulated field device: its registers, behavioral rules and
/// connection flag. Disconnected slaves keep their state but reject
/// traffic at the gateway.
pub struct Slave {
    unit_id: u8,
    registers: HashMap<u16, u16>,
    connected: bool,
    rules: RuleEngine,
    protocol_port: Arc<dyn ProtocolPort>,
}

impl Slave {
    pub fn new(
        unit_id: u8,
        connected: bool,
        rules: RuleEngine,
        protocol_port: Arc<dyn ProtocolPort>,
    ) -> Self {
        Self {
            unit_id,
            registers: HashMap::new(),
            connected,
            rules,
            protocol_port,
        }
    }

    #[inline]
    pub fn connected(&self) -> bool {
        self.connected
    }

    #[inline]
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Current value of a register; absent registers read as zero.
    #[inline]
    pub fn register(&self, address: u16) -> u16 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Register contents sorted by address, for status output.
    pub fn registers_sorted(&self) -> Vec<(u16, u16)> {
        let mut regs: Vec<(u16, u16)> = self.registers.iter().map(|(a, v)| (*a, *v)).collect();
        regs.sort_unstable_by_key(|(a, _)| *a);
        regs
    }

    pub fn rules_status(&self) -> String {
        self.rules.status()
    }

    /// Execute one request against this slave's state.
    ///
    /// `None` means the request was unsupported or malformed; the transport
    /// sends nothing and moves on.
    pub fn process(&mut self, pdu: &Pdu) -> Option<Pdu> {
        match pdu.function_code {
            FC2_READ_DISCRETE_INPUTS => self.process_fc2(pdu),
            FC4_READ_INPUT_REGISTERS => self.process_fc4(pdu),
            FC5_WRITE_SINGLE_COIL => self.process_fc5(pdu),
            FC6_WRITE_SINGLE_REGISTER => self.process_fc6(pdu),
            FC16_WRITE_MULTIPLE_REGISTERS => self.process_fc16(pdu),
            FC17_READ_WRITE_MULTIPLE_REGISTERS => self.process_fc17(pdu),
            fc => {
                debug!(unit_id = self.unit_id, fc, "function code not implemented");
                None
            }
        }
    }

    /// FC2: read discrete inputs, one bit per register, LSB-first packing.
    fn process_fc2(&mut self, pdu: &Pdu) -> Option<Pdu> {
        let (addr, qty) = read_window(&pdu.payload)?;
        if qty > MAX_BIT_QUANTITY || !window_in_range(addr, qty) {
            debug!(addr, qty, "FC2 quantity out of range");
            return None;
        }

        self.protocol_port.info_typed(Message::encoded(format!(
            "TX FC={} UnitID={} Address=0x{:X} Quantity={}",
            pdu.function_code, pdu.unit_id, addr, qty
        )));

        let mut bits = Vec::with_capacity(qty as usize);
        for i in 0..qty {
            let current_addr = addr + i;
            let value = self.register(current_addr);

            // The rule changes the value after it has been read: the store
            // is updated, the master sees the pre-image.
            let (new_value, modified) = self.rules.apply_read(current_addr, value);
            if modified {
                self.registers.insert(current_addr, new_value);
                self.protocol_port.info_typed(Message::encoded(format!(
                    "R1 FC=2 Rule applied UnitID={} Address=0x{:X} NewValue(after read)=0x{:X}",
                    pdu.unit_id, current_addr, new_value
                )));
            }

            // Coil convention: 0x0000 is off, anything else (0xFF00 from
            // FC5 writes) is on.
            bits.push(value != 0x0000);
        }

        let mut payload = Vec::with_capacity(1 + bits.len().div_ceil(8));
        payload.push(bits.len().div_ceil(8) as u8);
        payload.extend_from_slice(&pack_bits(&bits));

        self.protocol_port.info_typed(Message::encoded(format!(
            "RX FC={} UnitID={} Address=0x{:X} Quantity={} Values={:?}",
            pdu.function_code, pdu.unit_id, addr, qty, bits
        )));
        Some(pdu.reply(payload))
    }

    /// FC4: read input registers; absent registers read as zero.
    fn process_fc4(&mut self, pdu: &Pdu) -> Option<Pdu> {
        let (addr, qty) = read_window(&pdu.payload)?;
        if qty > MAX_REGISTER_QUANTITY || !window_in_range(addr, qty) {
            debug!(addr, qty, "FC4 quantity out of range");
            return None;
        }

        self.protocol_port.info_typed(Message::encoded(format!(
            "TX FC={} UnitID={} Address=0x{:X} Quantity={}",
            pdu.function_code, pdu.unit_id, addr, qty
        )));

        let byte_count = qty as usize * 2;
        let mut payload = Vec::with_capacity(1 + byte_count);
        payload.push(byte_count as u8);
        for i in 0..qty {
            let value = self.register(addr + i);
            payload.extend_from_slice(&value.to_be_bytes());
        }

        // Reads at the time-sync register answer with the device timestamp
        // overlaid on the register words.
        if addr == TIME_SYNC_ADDR && byte_count > 0 {
            let sync = SYNC_TIME.to_be_bytes();
            let n = sync.len().min(byte_count);
            payload[1..1 + n].copy_from_slice(&sync[..n]);
        }

        self.protocol_port.info_typed(Message::encoded(format!(
            "RX FC={} UnitID={} Address=0x{:X} ByteCount={}",
            pdu.function_code, pdu.unit_id, addr, byte_count
        )));
        Some(pdu.reply(payload))
    }

    /// FC5: write single coil, value stored verbatim (0xFF00 or 0x0000).
    fn process_fc5(&mut self, pdu: &Pdu) -> Option<Pdu> {
        if pdu.payload.len() < 4 {
            debug!(len = pdu.payload.len(), "FC5 payload too short");
            return None;
        }
        let addr = be_u16(&pdu.payload[0..2]);
        let value = be_u16(&pdu.payload[2..4]);

        self.registers.insert(addr, value);
        debug!(
            unit_id = pdu.unit_id,
            addr = format_args!("0x{addr:04X}"),
            value = format_args!("0x{value:04X}"),
            "FC5 write single coil"
        );
        self.protocol_port.info_typed(Message::encoded(format!(
            "FC={:X} UnitID={} Address=0x{:X} Value=0x{:X}",
            pdu.function_code, pdu.unit_id, addr, value
        )));

        Some(pdu.reply(Bytes::copy_from_slice(&pdu.payload[0..4])))
    }

    /// FC6: write single register, then run write-triggered rules.
    fn process_fc6(&mut self, pdu: &Pdu) -> Option<Pdu> {
        if pdu.payload.len() < 4 {
            debug!(len = pdu.payload.len(), "FC6 payload too short");
            return None;
        }
        let addr = be_u16(&pdu.payload[0..2]);
        let value = be_u16(&pdu.payload[2..4]);

        self.protocol_port.info_typed(Message::encoded(format!(
            "TX FC={} UnitID={} Address=0x{:X} Value=0x{:X}",
            pdu.function_code, pdu.unit_id, addr, value
        )));

        self.store_write(addr, value, pdu.function_code, pdu.unit_id);

        self.protocol_port.info_typed(Message::encoded(format!(
            "RX FC={} UnitID={} Address=0x{:X} Value=0x{:X}",
            pdu.function_code, pdu.unit_id, addr, value
        )));
        Some(pdu.reply(Bytes::copy_from_slice(&pdu.payload[0..4])))
    }

    /// FC16: write multiple registers after validating the byte count.
    fn process_fc16(&mut self, pdu: &Pdu) -> Option<Pdu> {
        if pdu.payload.len() < 5 {
            debug!(len = pdu.payload.len(), "FC16 payload too short");
            return None;
        }
        let addr = be_u16(&pdu.payload[0..2]);
        let qty = be_u16(&pdu.payload[2..4]);
        let byte_count = pdu.payload[4] as usize;

        if pdu.payload.len() < 5 + byte_count {
            debug!(
                expected = 5 + byte_count,
                got = pdu.payload.len(),
                "FC16 invalid payload length"
            );
            return None;
        }
        if byte_count != qty as usize * 2 {
            debug!(
                expected = qty as usize * 2,
                got = byte_count,
                "FC16 byte count mismatch"
            );
            return None;
        }
        if qty == 0 || !window_in_range(addr, qty) {
            debug!(addr, qty, "FC16 quantity out of range");
            return None;
        }

        for i in 0..qty {
            let offset = 5 + i as usize * 2;
            let value = be_u16(&pdu.payload[offset..offset + 2]);
            self.registers.insert(addr + i, value);
            debug!(
                unit_id = pdu.unit_id,
                addr = format_args!("0x{:04X}", addr + i),
                value = format_args!("0x{value:04X}"),
                "FC16 write register"
            );
        }

        self.protocol_port.info_typed(Message::encoded(format!(
            "TX FC={} UnitID={} Address=0x{:04X} Quantity={} ByteCount={}",
            pdu.function_code, pdu.unit_id, addr, qty, byte_count
        )));

        // Echo the starting address and quantity.
        Some(pdu.reply(Bytes::copy_from_slice(&pdu.payload[0..4])))
    }

    /// FC23 (0x17): write phase first, then a synthetic read response
    /// carrying the firmware-version payload.
    fn process_fc17(&mut self, pdu: &Pdu) -> Option<Pdu> {
        if pdu.payload.len() < 9 {
            debug!(len = pdu.payload.len(), "FC17 payload too short");
            return None;
        }
        let read_addr = be_u16(&pdu.payload[0..2]);
        let read_qty = be_u16(&pdu.payload[2..4]);
        let write_addr = be_u16(&pdu.payload[4..6]);
        let write_qty = be_u16(&pdu.payload[6..8]);
        let byte_count = pdu.payload[8] as usize;

        if pdu.payload.len() < 9 + byte_count || byte_count != write_qty as usize * 2 {
            debug!(
                byte_count,
                write_qty,
                len = pdu.payload.len(),
                "FC17 invalid write block"
            );
            return None;
        }
        if !window_in_range(write_addr, write_qty) {
            debug!(write_addr, write_qty, "FC17 write window out of range");
            return None;
        }

        self.protocol_port.info_typed(Message::encoded(format!(
            "TX FC={} UnitID={} ReadAddr=0x{:X} ReadQty={} WriteAddr=0x{:X} WriteQty={} ByteCount={}",
            pdu.function_code, pdu.unit_id, read_addr, read_qty, write_addr, write_qty, byte_count
        )));

        for i in 0..write_qty {
            let offset = 9 + i as usize * 2;
            let value = be_u16(&pdu.payload[offset..offset + 2]);
            self.store_write(write_addr + i, value, pdu.function_code, pdu.unit_id);
        }

        let read_byte_count = (read_qty as usize * 2) as u8;
        let mut payload = Vec::with_capacity(1 + FIRMWARE_RESPONSE.len());
        payload.push(read_byte_count);
        payload.extend_from_slice(&FIRMWARE_RESPONSE);

        self.protocol_port.info_typed(Message::encoded(format!(
            "RX FC={} UnitID={} ReadAddr=0x{:X} ReadQty={} Payload=0x{:X?}",
            pdu.function_code, pdu.unit_id, read_addr, read_qty, payload
        )));
        Some(pdu.reply(payload))
    }

    /// Persist one written word and any rule-driven side effect.
    fn store_write(&mut self, addr: u16, value: u16, fc: u8, unit_id: u8) {
        self.registers.insert(addr, value);
        debug!(
            unit_id,
            fc,
            addr = format_args!("0x{addr:04X}"),
            value = format_args!("0x{value:04X}"),
            "write register"
        );

        if let Some((target, target_value)) = self.rules.apply_write(addr, value) {
            self.registers.insert(target, target_value);
            self.protocol_port.info_typed(Message::encoded(format!(
                "R1 FC={fc} Rule applied UnitID={unit_id} WriteAddress=0x{target:X} NewValue=0x{target_value:X}"
            )));
        }
    }
}

/// Parse the leading `addr(2), qty(2)` window of a read request.
fn read_window(payload: &[u8]) -> Option<(u16, u16)> {
    if payload.len() < 4 {
        debug!(len = payload.len(), "request payload too short");
        return None;
    }
    Some((be_u16(&payload[0..2]), be_u16(&payload[2..4])))
}

/// Reject windows running past the 16-bit address space instead of
/// wrapping around.
#[inline]
fn window_in_range(addr: u16, qty: u16) -> bool {
    addr as u32 + qty as u32 <= 0x1_0000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::testing::NullPort;
    use slavesim_models::{Rule, RuleAction, RuleTrigger};

    fn slave_with_rules(rules: &[Rule]) -> Slave {
        Slave::new(0x65, true, RuleEngine::new(rules), Arc::new(NullPort))
    }

    fn slave() -> Slave {
        slave_with_rules(&[])
    }

    fn pdu(fc: u8, payload: &[u8]) -> Pdu {
        Pdu::new(0x65, fc, Bytes::copy_from_slice(payload))
    }

    #[test]
    fn fc6_stores_and_echoes() {
        let mut s = slave();
        let req = pdu(0x06, &[0x00, 0x10, 0x12, 0x34]);
        let rsp = s.process(&req).unwrap();

        assert_eq!(rsp.unit_id, req.unit_id);
        assert_eq!(rsp.function_code, req.function_code);
        assert_eq!(&rsp.payload[..], &[0x00, 0x10, 0x12, 0x34]);
        assert_eq!(s.register(0x0010), 0x1234);
    }

    #[test]
    fn fc4_reads_back_written_register() {
        let mut s = slave();
        s.process(&pdu(0x06, &[0x00, 0x10, 0x12, 0x34])).unwrap();

        let rsp = s.process(&pdu(0x04, &[0x00, 0x10, 0x00, 0x01])).unwrap();
        assert_eq!(&rsp.payload[..], &[0x02, 0x12, 0x34]);
    }

    #[test]
    fn fc4_unwritten_registers_read_as_zero() {
        let mut s = slave();
        let rsp = s.process(&pdu(0x04, &[0x00, 0x20, 0x00, 0x02])).unwrap();
        assert_eq!(&rsp.payload[..], &[0x04, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn fc4_time_sync_overlay() {
        let mut s = slave();
        let rsp = s.process(&pdu(0x04, &[0x8F, 0xFC, 0x00, 0x04])).unwrap();
        // 2815470101985099801 == 0x27128F24088E0019, big-endian.
        assert_eq!(
            &rsp.payload[..],
            &[0x08, 0x27, 0x12, 0x8F, 0x24, 0x08, 0x8E, 0x00, 0x19]
        );
    }

    #[test]
    fn fc5_coil_then_fc2_reads_it_back() {
        let mut s = slave();
        let rsp = s.process(&pdu(0x05, &[0x00, 0x01, 0xFF, 0x00])).unwrap();
        assert_eq!(&rsp.payload[..], &[0x00, 0x01, 0xFF, 0x00]);
        assert_eq!(s.register(0x0001), 0xFF00);

        let rsp = s.process(&pdu(0x02, &[0x00, 0x01, 0x00, 0x01])).unwrap();
        assert_eq!(&rsp.payload[..], &[0x01, 0x01]);
    }

    #[test]
    fn fc2_byte_count_is_bit_ceiling() {
        let mut s = slave();
        for (qty, expected) in [(1u16, 1usize), (8, 1), (9, 2), (16, 2), (17, 3)] {
            let rsp = s
                .process(&pdu(0x02, &[0x00, 0x00, (qty >> 8) as u8, qty as u8]))
                .unwrap();
            assert_eq!(rsp.payload[0] as usize, expected);
            assert_eq!(rsp.payload.len(), 1 + expected);
        }
    }

    #[test]
    fn fc2_read_rule_modifies_store_after_read() {
        let mut s = slave_with_rules(&[Rule {
            trigger: RuleTrigger::OnRead,
            register: 0x0001,
            action: RuleAction::Toggle,
            value: None,
            write_register: None,
            write_value: None,
        }]);
        s.process(&pdu(0x05, &[0x00, 0x01, 0xFF, 0x00])).unwrap();

        // First read sees the stored value, then the toggle lands.
        let rsp = s.process(&pdu(0x02, &[0x00, 0x01, 0x00, 0x01])).unwrap();
        assert_eq!(&rsp.payload[..], &[0x01, 0x01]);
        assert_eq!(s.register(0x0001), 0x0000);

        let rsp = s.process(&pdu(0x02, &[0x00, 0x01, 0x00, 0x01])).unwrap();
        assert_eq!(&rsp.payload[..], &[0x01, 0x00]);
        assert_eq!(s.register(0x0001), 0xFF00);
    }

    #[test]
    fn fc6_conditional_write_register_rule() {
        let mut s = slave_with_rules(&[Rule {
            trigger: RuleTrigger::OnWrite,
            register: 0x0010,
            action: RuleAction::WriteRegister,
            value: Some(0x0001),
            write_register: Some(0x0020),
            write_value: Some(0xBEEF),
        }]);

        s.process(&pdu(0x06, &[0x00, 0x10, 0x00, 0x02])).unwrap();
        assert_eq!(s.register(0x0020), 0);

        s.process(&pdu(0x06, &[0x00, 0x10, 0x00, 0x01])).unwrap();
        assert_eq!(s.register(0x0020), 0xBEEF);
    }

    #[test]
    fn fc16_writes_all_registers_and_echoes_window() {
        let mut s = slave();
        let rsp = s
            .process(&pdu(
                0x10,
                &[0x00, 0x10, 0x00, 0x02, 0x04, 0x11, 0x22, 0x33, 0x44],
            ))
            .unwrap();
        assert_eq!(&rsp.payload[..], &[0x00, 0x10, 0x00, 0x02]);
        assert_eq!(s.register(0x0010), 0x1122);
        assert_eq!(s.register(0x0011), 0x3344);
    }

    #[test]
    fn fc16_byte_count_mismatch_yields_no_response() {
        let mut s = slave();
        // qty = 2 but byte count claims 3.
        let rsp = s.process(&pdu(
            0x10,
            &[0x00, 0x10, 0x00, 0x02, 0x03, 0x11, 0x22, 0x33],
        ));
        assert!(rsp.is_none());
        assert_eq!(s.register(0x0010), 0);
    }

    #[test]
    fn fc16_zero_quantity_rejected() {
        let mut s = slave();
        assert!(s.process(&pdu(0x10, &[0x00, 0x10, 0x00, 0x00, 0x00])).is_none());
    }

    #[test]
    fn fc17_writes_then_answers_firmware_payload() {
        let mut s = slave();
        let rsp = s
            .process(&pdu(
                0x17,
                &[0xF1, 0xFF, 0x00, 0x03, 0x00, 0x40, 0x00, 0x01, 0x02, 0x01, 0x00],
            ))
            .unwrap();
        assert_eq!(s.register(0x0040), 0x0100);
        assert_eq!(
            &rsp.payload[..],
            &[0x06, 0x81, 0x04, 0x04, 0x09, 0x00, 0x00]
        );
    }

    #[test]
    fn unknown_function_code_is_dropped() {
        let mut s = slave();
        assert!(s.process(&pdu(0x2B, &[0x00])).is_none());
    }

    #[test]
    fn read_past_address_space_is_rejected() {
        let mut s = slave();
        assert!(s.process(&pdu(0x04, &[0xFF, 0xFF, 0x00, 0x02])).is_none());
        assert!(s.process(&pdu(0x04, &[0xFF, 0xFF, 0x00, 0x01])).is_some());
    }

    #[test]
    fn rtu_fc6_round_trip_echoes_frame() {
        use slavesim_protocol::frame::rtu;

        let mut s = slave();
        let mut frame = vec![0x65, 0x06, 0x00, 0x10, 0x12, 0x34];
        let crc = rtu::crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let req = rtu::decode(&frame).unwrap();
        let rsp = s.process(&req).unwrap();
        assert_eq!(rtu::encode(&rsp), frame);
        assert_eq!(s.register(0x0010), 0x1234);

        let mut corrupted = frame.clone();
        corrupted[6] ^= 0xFF;
        assert!(rtu::decode(&corrupted).is_err());
    }

    #[test]
    fn responses_preserve_unit_and_function_code() {
        let mut s = slave();
        let requests = [
            pdu(0x02, &[0x00, 0x00, 0x00, 0x08]),
            pdu(0x04, &[0x00, 0x00, 0x00, 0x01]),
            pdu(0x05, &[0x00, 0x01, 0xFF, 0x00]),
            pdu(0x06, &[0x00, 0x01, 0x00, 0x01]),
        ];
        for req in requests {
            let rsp = s.process(&req).unwrap();
            assert_eq!(rsp.unit_id, req.unit_id);
            assert_eq!(rsp.function_code, req.function_code);
        }
    }
}
