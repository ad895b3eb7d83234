//! Chat transport abstraction and the Telegram implementation.

pub mod channel;
pub mod telegram;

pub use channel::*;
pub use telegram::TelegramTransport;
