use slavesim_error::SimResult;

/// View a protocol trace line belongs to.
///
/// The console shows one view at a time: raw hex frames (`Unencoded`) or
/// decoded field summaries (`Encoded`). The REPL `toggle` command switches
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Unencoded,
    Encoded,
}

/// A typed protocol trace line.
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    text: String,
}

impl Message {
    pub fn unencoded(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Unencoded,
            text: text.into(),
        }
    }

    pub fn encoded(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Encoded,
            text: text.into(),
        }
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Output sink for protocol traffic and operator feedback.
pub trait ProtocolPort: Send + Sync {
    /// Timestamped line, suppressed while muted.
    fn info(&self, msg: &str);
    /// Typed line, shown only when its kind matches the active view.
    fn info_typed(&self, message: Message);
    /// Plain line, printed even while muted.
    fn println(&self, msg: &str);
    /// Horizontal rule between requests.
    fn separator(&self);
    fn mute(&self);
    fn unmute(&self);
    /// Switch between the encoded and unencoded views.
    fn toggle(&self);
}

/// Operations the interactive driver may invoke on the simulator.
pub trait ControlPort: Send + Sync {
    fn status(&self) -> String;
    fn connect_slave(&self, unit_id: u8, address: &str) -> SimResult<()>;
    fn disconnect_slave(&self, unit_id: u8);
}
