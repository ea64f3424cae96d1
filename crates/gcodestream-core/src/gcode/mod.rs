//! G-Code commands, command sources, and modal state

pub mod command;
pub mod state;
pub mod stream;

pub use command::{CommandCompletionListener, CommandId, GcodeCommand};
pub use state::GcodeState;
pub use stream::{CommandSource, StringStreamReader};
