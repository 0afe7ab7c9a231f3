use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Carrier kind of a configured transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Rtu,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Rtu => write!(f, "rtu"),
        }
    }
}

/// Register event that causes a rule to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    OnRead,
    OnWrite,
    OnReadWrite,
}

impl RuleTrigger {
    /// Whether this trigger fires for a read event.
    #[inline]
    pub fn matches_read(self) -> bool {
        matches!(self, RuleTrigger::OnRead | RuleTrigger::OnReadWrite)
    }

    /// Whether this trigger fires for a write event.
    #[inline]
    pub fn matches_write(self) -> bool {
        matches!(self, RuleTrigger::OnWrite | RuleTrigger::OnReadWrite)
    }
}

impl Display for RuleTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleTrigger::OnRead => write!(f, "on_read"),
            RuleTrigger::OnWrite => write!(f, "on_write"),
            RuleTrigger::OnReadWrite => write!(f, "on_read_write"),
        }
    }
}

/// Effect a rule has on the register it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    SetValue,
    Increment,
    Decrement,
    Toggle,
    WriteRegister,
}

impl Display for RuleAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::SetValue => write!(f, "set_value"),
            RuleAction::Increment => write!(f, "increment"),
            RuleAction::Decrement => write!(f, "decrement"),
            RuleAction::Toggle => write!(f, "toggle"),
            RuleAction::WriteRegister => write!(f, "write_register"),
        }
    }
}
