//! Alert delivery over the Telegram Bot API.

mod dispatcher;
mod telegram;

pub use dispatcher::{AlertDispatcher, DispatchStats};
pub use telegram::{MessageTransport, TelegramClient};
