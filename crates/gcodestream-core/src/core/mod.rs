//! Controller event and listener plumbing

pub mod event;
pub mod listener;

pub use crate::data::ControllerState;
pub use event::{ControllerEvent, EventDispatcher, MessageLevel};
pub use listener::{ControllerListener, ControllerListenerHandle, ListenerRegistry};
