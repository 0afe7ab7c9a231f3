pub mod keyboard;
pub mod protocol;

pub use keyboard::KeyboardAdapter;
pub use protocol::ConsoleProtocolAdapter;
