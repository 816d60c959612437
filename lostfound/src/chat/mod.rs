//! Conversation list and message synchronization.
//!
//! - [`list`]: the user's conversations, with search filtering
//! - [`engine`]: initial load, polling, and sending for the open conversation
//! - [`log`]: the id-deduplicated message sequence both paths merge into
//! - [`composer`]: draft text for the message input

pub mod composer;
pub mod engine;
pub mod list;
pub mod log;

pub use composer::Composer;
pub use engine::{EngineConfig, EngineEvent, MessageSyncEngine, Phase, PollOutcome, SendError};
pub use list::{ChatListStore, LoadOutcome, filter};
pub use log::MessageLog;
