use slavesim_models::{Rule, RuleAction};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Per-slave rule engine: rules indexed by register, declaration order
/// preserved within each register.
pub struct RuleEngine {
    rules: HashMap<u16, Vec<Rule>>,
}

impl RuleEngine {
    pub fn new(rules: &[Rule]) -> Self {
        let mut index: HashMap<u16, Vec<Rule>> = HashMap::new();
        for rule in rules {
            index.entry(rule.register).or_default().push(rule.clone());
        }
        Self { rules: index }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run read-triggered rules against the value just read.
    ///
    /// Returns the transformed value and whether any rule fired. The caller
    /// persists the new value; the master still receives the pre-image, so
    /// the change is visible from the next read on.
    pub fn apply_read(&self, register: u16, current: u16) -> (u16, bool) {
        let Some(rules) = self.rules.get(&register) else {
            return (current, false);
        };

        let mut value = current;
        let mut modified = false;
        for rule in rules.iter().filter(|r| r.trigger.matches_read()) {
            if rule.action == RuleAction::WriteRegister {
                // Side-effect writes only make sense for write events.
                warn!(register = format_args!("0x{register:04X}"), "write_register rule ignored on read");
                continue;
            }
            let old = value;
            value = execute(rule, value);
            modified = true;
            debug!(
                register = format_args!("0x{register:04X}"),
                trigger = %rule.trigger,
                action = %rule.action,
                old_value = format_args!("0x{old:04X}"),
                new_value = format_args!("0x{value:04X}"),
                "rule executed"
            );
        }
        (value, modified)
    }

    /// Run write-triggered rules against the value just written.
    ///
    /// Returns the register/value pair to persist, if any rule fired. A
    /// rule with a non-null `value` is conditional and fires only when the
    /// written value equals it. `write_register` rules redirect to another
    /// register; all other actions transform the written register itself.
    pub fn apply_write(&self, register: u16, written: u16) -> Option<(u16, u16)> {
        let rules = self.rules.get(&register)?;

        let mut value = written;
        let mut modified = false;
        for rule in rules.iter().filter(|r| r.trigger.matches_write()) {
            if !rule.value.map_or(true, |condition| condition == written) {
                continue;
            }
            match rule.action {
                RuleAction::WriteRegister => {
                    if let (Some(target), Some(target_value)) =
                        (rule.write_register, rule.write_value)
                    {
                        debug!(
                            register = format_args!("0x{register:04X}"),
                            target = format_args!("0x{target:04X}"),
                            value = format_args!("0x{target_value:04X}"),
                            "write_register rule fired"
                        );
                        return Some((target, target_value));
                    }
                }
                _ => {
                    value = execute(rule, value);
                    modified = true;
                }
            }
        }
        modified.then_some((register, value))
    }

    /// Indented rule listing for the gateway status output.
    pub fn status(&self) -> String {
        if self.rules.is_empty() {
            return String::new();
        }
        let mut out = String::from("\n      Rules:");
        let mut registers: Vec<u16> = self.rules.keys().copied().collect();
        registers.sort_unstable();
        for register in registers {
            for (i, rule) in self.rules[&register].iter().enumerate() {
                out.push_str(&format!(
                    "\n      - R{}: 0x{:04X} => {} {}",
                    i + 1,
                    register,
                    rule.trigger,
                    rule.action
                ));
            }
        }
        out
    }
}

fn execute(rule: &Rule, current: u16) -> u16 {
    match rule.action {
        RuleAction::SetValue => rule.value.unwrap_or(current),
        RuleAction::Increment => current.wrapping_add(1),
        RuleAction::Decrement => current.saturating_sub(1),
        // Coil convention: only 0x0000 toggles on, everything else goes off.
        RuleAction::Toggle => {
            if current == 0x0000 {
                0xFF00
            } else {
                0x0000
            }
        }
        RuleAction::WriteRegister => current,
    }
}
