use crate::enums::{RuleAction, RuleTrigger, TransportKind};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use slavesim_error::{SimError, SimResult};
use std::{collections::HashSet, path::Path};

/// Root of the simulator configuration document.
///
/// The on-disk shape is TOML with `[[transport]]`, `[[slave]]` and nested
/// `[[slave.rule]]` tables:
///
/// ```toml
/// [[transport]]
/// type = "tcp"
/// address = "localhost:1502"
///
/// [[slave]]
/// id = 101
/// address = "localhost:1502"
///
/// [[slave.rule]]
/// trigger = "on_read"
/// register = 16
/// action = "increment"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    #[serde(default, rename = "transport")]
    pub transports: Vec<TransportConfig>,
    #[serde(default, rename = "slave")]
    pub slaves: Vec<SlaveConfig>,
}

/// One transport handler to spin up: a TCP listener or a serial line.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// `host:port` for TCP, a device path for RTU.
    pub address: String,
}

/// A simulated slave bound to one transport address.
#[derive(Debug, Clone, Deserialize)]
pub struct SlaveConfig {
    pub id: u8,
    /// Must match the `address` of a configured transport.
    pub address: String,
    #[serde(default, rename = "rule")]
    pub rules: Vec<Rule>,
}

/// Behavioral rule attached to a single register of a slave.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub trigger: RuleTrigger,
    pub register: u16,
    pub action: RuleAction,
    /// Payload for `set_value`; for `on_write` rules also the firing
    /// condition: the rule runs only when this exact value is written.
    #[serde(default)]
    pub value: Option<u16>,
    /// Target register for `write_register`.
    #[serde(default)]
    pub write_register: Option<u16>,
    /// Value written into `write_register` when the rule fires.
    #[serde(default)]
    pub write_value: Option<u16>,
}

impl SimConfig {
    /// Read and validate a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let builder = Config::builder().add_source(
            File::from(path.as_ref())
                .format(FileFormat::Toml)
                .required(true),
        );
        let cfg: SimConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Structural validation beyond what deserialization enforces.
    pub fn validate(&self) -> SimResult<()> {
        if self.transports.is_empty() {
            return Err(SimError::InvalidConfig(
                "at least one transport must be defined".to_string(),
            ));
        }

        let mut addresses = HashSet::new();
        for (i, t) in self.transports.iter().enumerate() {
            if t.address.is_empty() {
                return Err(SimError::InvalidConfig(format!(
                    "transport[{i}]: address is required"
                )));
            }
            if !addresses.insert(t.address.as_str()) {
                return Err(SimError::InvalidConfig(format!(
                    "transport[{i}]: duplicate address {:?}",
                    t.address
                )));
            }
        }

        for (i, s) in self.slaves.iter().enumerate() {
            if s.id == 0 {
                return Err(SimError::InvalidConfig(format!(
                    "slave[{i}]: invalid ID 0, must be between 1 and 255"
                )));
            }
            if !addresses.contains(s.address.as_str()) {
                return Err(SimError::InvalidConfig(format!(
                    "slave[{i}]: address {:?} does not match any transport",
                    s.address
                )));
            }
            for (j, rule) in s.rules.iter().enumerate() {
                rule.validate()
                    .map_err(|e| SimError::InvalidConfig(format!("slave[{i}].rule[{j}]: {e}")))?;
            }
        }

        Ok(())
    }

    /// Transport configuration for a given address, if any.
    pub fn transport_by_address(&self, address: &str) -> Option<&TransportConfig> {
        self.transports.iter().find(|t| t.address == address)
    }
}

impl Rule {
    /// Action-specific field requirements.
    pub fn validate(&self) -> Result<(), String> {
        match self.action {
            RuleAction::SetValue if self.value.is_none() => {
                Err("set_value action requires 'value' field".to_string())
            }
            RuleAction::WriteRegister if self.write_register.is_none() => {
                Err("write_register action requires 'write_register' field".to_string())
            }
            RuleAction::WriteRegister if self.write_value.is_none() => {
                Err("write_register action requires 'write_value' field".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_transport(address: &str) -> TransportConfig {
        TransportConfig {
            kind: TransportKind::Tcp,
            address: address.to_string(),
        }
    }

    #[test]
    fn rejects_empty_transport_list() {
        let cfg = SimConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_transport_addresses() {
        let cfg = SimConfig {
            transports: vec![tcp_transport("localhost:1502"), tcp_transport("localhost:1502")],
            slaves: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_slave_with_unknown_address() {
        let cfg = SimConfig {
            transports: vec![tcp_transport("localhost:1502")],
            slaves: vec![SlaveConfig {
                id: 101,
                address: "localhost:9999".to_string(),
                rules: vec![],
            }],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_slave_id_zero() {
        let cfg = SimConfig {
            transports: vec![tcp_transport("localhost:1502")],
            slaves: vec![SlaveConfig {
                id: 0,
                address: "localhost:1502".to_string(),
                rules: vec![],
            }],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn set_value_requires_value() {
        let rule = Rule {
            trigger: RuleTrigger::OnRead,
            register: 0x10,
            action: RuleAction::SetValue,
            value: None,
            write_register: None,
            write_value: None,
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn write_register_requires_both_targets() {
        let rule = Rule {
            trigger: RuleTrigger::OnWrite,
            register: 0x10,
            action: RuleAction::WriteRegister,
            value: Some(1),
            write_register: Some(0x20),
            write_value: None,
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let cfg = SimConfig {
            transports: vec![tcp_transport("localhost:1502")],
            slaves: vec![SlaveConfig {
                id: 101,
                address: "localhost:1502".to_string(),
                rules: vec![Rule {
                    trigger: RuleTrigger::OnWrite,
                    register: 0x10,
                    action: RuleAction::WriteRegister,
                    value: Some(0x0001),
                    write_register: Some(0x20),
                    write_value: Some(0xFF00),
                }],
            }],
        };
        assert!(cfg.validate().is_ok());
    }
}
