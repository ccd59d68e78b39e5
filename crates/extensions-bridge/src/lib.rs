//! Cross-context messaging for scavbot.
//!
//! The background side talks through a [`Messenger`]; the content side
//! answers through a [`ContentRuntime`] installed as the transport's
//! [`CommandEndpoint`]. Both ends share the message protocol from
//! `scavbot-core-types`.

pub mod content;
pub mod errors;
pub mod messenger;
pub mod tab;
pub mod transport;

pub use content::{ContentRuntime, ResumedAction, MAX_RESUMES};
pub use errors::BridgeError;
pub use messenger::{Messenger, DEFAULT_COMMAND_TIMEOUT};
pub use tab::SimulatedTab;
pub use transport::{BusOutbox, CommandEndpoint, LoopbackTransport, Transport};
