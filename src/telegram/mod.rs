pub mod client;
pub mod types;

pub use client::{DispatchError, Dispatcher};
pub use types::{ChatTarget, MessagePart, ParseMode};
