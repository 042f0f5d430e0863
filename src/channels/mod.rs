pub(crate) mod formatting;
mod telegram;

pub use telegram::TelegramChannel;
