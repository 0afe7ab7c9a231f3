use crate::port::{Message, MessageKind, ProtocolPort};
use chrono::Local;
use std::sync::Mutex;

const SEPARATOR_WIDTH: usize = 80;

/// Console implementation of the protocol port.
///
/// Lines are timestamped, duplicate lines are suppressed, and a mute flag
/// silences everything except `println`. One of the two trace views
/// (unencoded hex frames or encoded field summaries) is active at a time.
pub struct ConsoleProtocolAdapter {
    state: Mutex<State>,
}

struct State {
    muted: bool,
    view: MessageKind,
    last_line: String,
}

impl ConsoleProtocolAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                muted: false,
                view: MessageKind::Unencoded,
                last_line: String::new(),
            }),
        }
    }

    fn print(&self, line: &str, force: bool) {
        let mut state = self.state.lock().unwrap();
        if !force && state.muted {
            return;
        }
        if state.last_line == line {
            return;
        }
        println!("{line}");
        state.last_line = line.to_string();
    }
}

impl Default for ConsoleProtocolAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolPort for ConsoleProtocolAdapter {
    fn info(&self, msg: &str) {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.print(&format!("{ts} {msg}"), false);
    }

    fn info_typed(&self, message: Message) {
        let view = self.state.lock().unwrap().view;
        if message.kind() == view {
            self.info(message.text());
        }
    }

    fn println(&self, msg: &str) {
        self.print(msg, true);
    }

    fn separator(&self) {
        self.print(&"─".repeat(SEPARATOR_WIDTH), false);
    }

    fn mute(&self) {
        self.state.lock().unwrap().muted = true;
    }

    fn unmute(&self) {
        self.state.lock().unwrap().muted = false;
    }

    fn toggle(&self) {
        let view = {
            let mut state = self.state.lock().unwrap();
            state.view = match state.view {
                MessageKind::Unencoded => MessageKind::Encoded,
                MessageKind::Encoded => MessageKind::Unencoded,
            };
            state.view
        };
        match view {
            MessageKind::Unencoded => self.println("loglevel set to 'Unencoded'"),
            MessageKind::Encoded => self.println("loglevel set to 'Encoded'"),
        }
    }
}
