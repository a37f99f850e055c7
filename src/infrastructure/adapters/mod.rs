//! Bot API adapters

pub mod console;
pub mod telegram;

pub use console::ConsoleApi;
pub use telegram::TelegramApi;
