use crate::{
    port::{ControlPort, ProtocolPort},
    rules::RuleEngine,
    slave::Slave,
    transport::{PduProcessor, TransportHandler},
};
use slavesim_error::{SimError, SimResult};
use slavesim_models::SlaveConfig;
use slavesim_protocol::Pdu;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The bus: owns the slave registry and routes decoded PDUs from any
/// transport to the addressed slave.
///
/// The registry (including every slave's registers and rules) sits behind
/// one process-wide mutex; each `process_pdu` holds it for the full
/// dispatch, so function-code processing is mutually exclusive across all
/// connections and transports.
pub struct Gateway {
    transports: Vec<Arc<dyn TransportHandler>>,
    protocol_port: Arc<dyn ProtocolPort>,
    registry: Mutex<Registry>,
}

/// Slaves keyed by transport address, then unit id. Transport registration
/// order decides which match wins when a unit exists on several transports.
struct Registry {
    order: Vec<String>,
    slaves: HashMap<String, HashMap<u8, Slave>>,
}

impl Registry {
    fn find_slave_mut(&mut self, unit_id: u8) -> Option<&mut Slave> {
        for address in &self.order {
            if self
                .slaves
                .get(address)
                .is_some_and(|units| units.contains_key(&unit_id))
            {
                return self.slaves.get_mut(address).unwrap().get_mut(&unit_id);
            }
        }
        None
    }
}

impl Gateway {
    pub fn new(
        transports: Vec<Arc<dyn TransportHandler>>,
        protocol_port: Arc<dyn ProtocolPort>,
    ) -> Arc<Self> {
        let mut order = Vec::with_capacity(transports.len());
        let mut slaves = HashMap::with_capacity(transports.len());
        for handler in &transports {
            let address = handler.description();
            order.push(address.clone());
            slaves.insert(address, HashMap::new());
        }
        Arc::new(Self {
            transports,
            protocol_port,
            registry: Mutex::new(Registry { order, slaves }),
        })
    }

    /// Start every transport with this gateway as the PDU processor.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> SimResult<()> {
        let processor: Arc<dyn PduProcessor> = Arc::clone(self) as Arc<dyn PduProcessor>;
        for handler in &self.transports {
            handler
                .start(cancel.clone(), Arc::clone(&processor))
                .await?;
        }
        Ok(())
    }

    pub async fn stop(&self) {
        for handler in &self.transports {
            if let Err(e) = handler.stop().await {
                error!(transport = %handler.description(), error = %e, "failed to stop transport");
            }
        }
    }

    /// Create a slave on a transport, or mark an existing one connected.
    pub fn connect_slave(&self, unit_id: u8, address: &str) -> SimResult<()> {
        let mut registry = self.registry.lock().unwrap();
        let units = registry
            .slaves
            .get_mut(address)
            .ok_or_else(|| SimError::UnknownTransport(address.to_string()))?;

        if let Some(slave) = units.get_mut(&unit_id) {
            slave.set_connected(true);
            debug!(unit_id, address, "slave reconnected");
            return Ok(());
        }

        units.insert(
            unit_id,
            Slave::new(
                unit_id,
                true,
                RuleEngine::new(&[]),
                Arc::clone(&self.protocol_port),
            ),
        );
        debug!(unit_id, address, "slave connected");
        Ok(())
    }

    /// Create a slave with its configured rule set installed.
    pub fn connect_slave_with_config(&self, config: &SlaveConfig, address: &str) -> SimResult<()> {
        let mut registry = self.registry.lock().unwrap();
        let units = registry
            .slaves
            .get_mut(address)
            .ok_or_else(|| SimError::UnknownTransport(address.to_string()))?;

        if !units.contains_key(&config.id) {
            units.insert(
                config.id,
                Slave::new(
                    config.id,
                    true,
                    RuleEngine::new(&config.rules),
                    Arc::clone(&self.protocol_port),
                ),
            );
            info!(
                unit_id = config.id,
                address,
                rule_count = config.rules.len(),
                "slave connected with rules"
            );
        }
        Ok(())
    }

    /// Mark a unit disconnected on every transport it is registered with.
    /// Registers and rules are retained.
    pub fn disconnect_slave(&self, unit_id: u8) {
        let mut registry = self.registry.lock().unwrap();
        for units in registry.slaves.values_mut() {
            if let Some(slave) = units.get_mut(&unit_id) {
                slave.set_connected(false);
            }
        }
    }

    /// Multi-line summary of transports, slaves, rules and registers.
    pub fn status(&self) -> String {
        let registry = self.registry.lock().unwrap();
        let mut status = String::new();
        for (i, address) in registry.order.iter().enumerate() {
            if i > 0 {
                status.push('\n');
            }
            status.push_str(&format!("Port {i}: {address}"));

            let Some(units) = registry.slaves.get(address) else {
                continue;
            };
            if units.is_empty() {
                status.push_str("\n  <no slaves connected>");
            }

            let mut ids: Vec<u8> = units.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                let slave = &units[&id];
                let state = if slave.connected() {
                    "connected"
                } else {
                    "disconnected"
                };
                status.push_str(&format!("\n  - Unit {id}: {state}"));
                status.push_str(&slave.rules_status());

                let registers = slave.registers_sorted();
                if !registers.is_empty() {
                    status.push_str("\n    Registers:");
                    for (addr, value) in registers {
                        status.push_str(&format!("\n    - 0x{addr:X} => 0x{value:X}"));
                    }
                }
            }
        }
        status
    }

    /// Current value of one register, mainly for diagnostics and tests.
    pub fn register_value(&self, address: &str, unit_id: u8, register: u16) -> Option<u16> {
        let registry = self.registry.lock().unwrap();
        registry
            .slaves
            .get(address)
            .and_then(|units| units.get(&unit_id))
            .map(|slave| slave.register(register))
    }
}

impl PduProcessor for Gateway {
    fn process_pdu(&self, pdu: &Pdu) -> Option<Pdu> {
        let mut registry = self.registry.lock().unwrap();
        match registry.find_slave_mut(pdu.unit_id) {
            Some(slave) if slave.connected() => slave.process(pdu),
            _ => {
                self.protocol_port.info(&format!(
                    "slave {} does not exist or is offline",
                    pdu.unit_id
                ));
                None
            }
        }
    }
}

impl ControlPort for Gateway {
    fn status(&self) -> String {
        Gateway::status(self)
    }

    fn connect_slave(&self, unit_id: u8, address: &str) -> SimResult<()> {
        Gateway::connect_slave(self, unit_id, address)
    }

    fn disconnect_slave(&self, unit_id: u8) {
        Gateway::disconnect_slave(self, unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::testing::NullPort;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Transport stub: contributes its address to the registry and nothing
    /// else.
    struct StubTransport {
        address: String,
    }

    #[async_trait]
    impl TransportHandler for StubTransport {
        async fn start(
            &self,
            _cancel: CancellationToken,
            _processor: Arc<dyn PduProcessor>,
        ) -> SimResult<()> {
            Ok(())
        }

        async fn stop(&self) -> SimResult<()> {
            Ok(())
        }

        fn description(&self) -> String {
            self.address.clone()
        }
    }

    fn gateway_with(addresses: &[&str]) -> Arc<Gateway> {
        let transports: Vec<Arc<dyn TransportHandler>> = addresses
            .iter()
            .map(|a| {
                Arc::new(StubTransport {
                    address: a.to_string(),
                }) as Arc<dyn TransportHandler>
            })
            .collect();
        Gateway::new(transports, Arc::new(NullPort))
    }

    fn fc6(unit_id: u8, addr: u16, value: u16) -> Pdu {
        let mut payload = Vec::new();
        payload.extend_from_slice(&addr.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
        Pdu::new(unit_id, 0x06, Bytes::from(payload))
    }

    #[test]
    fn connect_rejects_unknown_transport() {
        let gateway = gateway_with(&["localhost:1502"]);
        assert!(gateway.connect_slave(101, "localhost:9999").is_err());
        assert!(gateway.connect_slave(101, "localhost:1502").is_ok());
    }

    #[test]
    fn unconnected_unit_gets_no_response() {
        let gateway = gateway_with(&["localhost:1502"]);
        assert!(gateway.process_pdu(&fc6(101, 0x10, 1)).is_none());
    }

    #[test]
    fn disconnected_slave_rejects_traffic_but_keeps_state() {
        let gateway = gateway_with(&["localhost:1502"]);
        gateway.connect_slave(101, "localhost:1502").unwrap();
        assert!(gateway.process_pdu(&fc6(101, 0x10, 0x1234)).is_some());

        gateway.disconnect_slave(101);
        assert!(gateway.process_pdu(&fc6(101, 0x10, 0x5678)).is_none());
        assert_eq!(
            gateway.register_value("localhost:1502", 101, 0x10),
            Some(0x1234)
        );

        gateway.connect_slave(101, "localhost:1502").unwrap();
        assert!(gateway.process_pdu(&fc6(101, 0x10, 0x5678)).is_some());
    }

    #[test]
    fn dispatch_prefers_first_registered_transport() {
        let gateway = gateway_with(&["localhost:1502", "/dev/ttyV0"]);
        gateway.connect_slave(101, "/dev/ttyV0").unwrap();
        gateway.connect_slave(101, "localhost:1502").unwrap();

        gateway.process_pdu(&fc6(101, 0x10, 0x1234)).unwrap();
        assert_eq!(
            gateway.register_value("localhost:1502", 101, 0x10),
            Some(0x1234)
        );
        assert_eq!(gateway.register_value("/dev/ttyV0", 101, 0x10), Some(0));
    }

    #[test]
    fn status_lists_transports_and_slaves() {
        let gateway = gateway_with(&["localhost:1502", "/dev/ttyV0"]);
        gateway.connect_slave(101, "localhost:1502").unwrap();
        gateway.process_pdu(&fc6(101, 0x10, 0x1234)).unwrap();
        gateway.disconnect_slave(101);

        let status = gateway.status();
        assert!(status.contains("Port 0: localhost:1502"));
        assert!(status.contains("Port 1: /dev/ttyV0"));
        assert!(status.contains("Unit 101: disconnected"));
        assert!(status.contains("0x10 => 0x1234"));
        assert!(status.contains("<no slaves connected>"));
    }
}
