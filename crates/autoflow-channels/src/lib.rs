//! # Autoflow Channels
//! Picks the best communication channel for a contact from historical
//! engagement, and tries channels in sequence with a cooldown between
//! attempts. Message history and actual sending are external collaborators.

pub mod history;
pub mod selector;

pub use history::{Direction, MessageHistory, MessageRecord};
pub use selector::{ChannelChoice, ChannelSelector, ChannelSender, ContactProfile};
