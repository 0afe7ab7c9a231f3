use crate::port::{ControlPort, ProtocolPort};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Interactive stdin driver: parses operator commands and invokes the
/// simulator's control port.
pub struct KeyboardAdapter {
    control: Arc<dyn ControlPort>,
    protocol_port: Arc<dyn ProtocolPort>,
    cancel: CancellationToken,
}

impl KeyboardAdapter {
    pub fn new(
        control: Arc<dyn ControlPort>,
        protocol_port: Arc<dyn ProtocolPort>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            control,
            protocol_port,
            cancel,
        }
    }

    /// Read commands until quit, EOF or cancellation.
    pub async fn run(self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.protocol_port
            .println("Enter 'h' followed by <enter> for help...");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(input)) => {
                        if !self.dispatch(&input) {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read from stdin");
                        break;
                    }
                },
            }
        }
    }

    /// Handle one input line; returns false when the REPL should exit.
    fn dispatch(&self, input: &str) -> bool {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return true;
        };

        match command {
            "quit" | "exit" | "q" => {
                self.protocol_port.println("Terminating simulator...");
                self.cancel.cancel();
                return false;
            }
            "status" | "s" => self.protocol_port.println(&self.control.status()),
            "mute" | "m" => {
                self.protocol_port.mute();
                self.protocol_port
                    .println("Protocol output muted. Type 'u' to unmute.");
            }
            "unmute" | "u" => self.protocol_port.unmute(),
            "toggle" | "t" => self.protocol_port.toggle(),
            "connect" | "c" => self.connect(&parts),
            "disconnect" | "d" => self.disconnect(&parts),
            "help" | "h" => self.help(),
            _ => self
                .protocol_port
                .println(&format!("Unknown command: {input} (use 'h' for help)")),
        }
        true
    }

    fn connect(&self, parts: &[&str]) {
        let (Some(raw_unit), Some(address)) = (parts.get(1), parts.get(2)) else {
            self.protocol_port.println(
                "Error: connect command requires a unit ID and a transport address (e.g., 'connect 1 localhost:1502')",
            );
            return;
        };
        let Some(unit_id) = parse_unit_id(raw_unit, &*self.protocol_port) else {
            return;
        };
        match self.control.connect_slave(unit_id, address) {
            Ok(()) => self
                .protocol_port
                .println(&format!("Connected slave with unit ID {unit_id}")),
            Err(e) => self.protocol_port.println(&format!("Error: {e}")),
        }
    }

    fn disconnect(&self, parts: &[&str]) {
        let Some(raw_unit) = parts.get(1) else {
            self.protocol_port
                .println("Error: disconnect command requires a unit ID (e.g., 'disconnect 1')");
            return;
        };
        let Some(unit_id) = parse_unit_id(raw_unit, &*self.protocol_port) else {
            return;
        };
        self.control.disconnect_slave(unit_id);
        self.protocol_port
            .println(&format!("Disconnected slave with unit ID {unit_id}"));
    }

    fn help(&self) {
        let port = &self.protocol_port;
        port.println("Commands:");
        port.println("  quit/exit/q                    - Quit simulator");
        port.println("  status/s                       - Show simulator status");
        port.println("  mute/m                         - Mute protocol output");
        port.println("  unmute/u                       - Unmute protocol output");
        port.println("  toggle/t                       - Toggle encoded/unencoded view");
        port.println("  connect/c <unitID> <address>   - Connect slave on a transport");
        port.println("  disconnect/d <unitID>          - Disconnect slave");
        port.println("  help/h                         - Show help");
    }
}

fn parse_unit_id(raw: &str, port: &dyn ProtocolPort) -> Option<u8> {
    match raw.parse::<u8>() {
        Ok(unit_id) => Some(unit_id),
        Err(_) => {
            port.println(&format!(
                "Error: invalid unit ID '{raw}', must be a number between 0-255"
            ));
            None
        }
    }
}
