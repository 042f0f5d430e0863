use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode};
use tracing::{debug, info, warn};

use super::formatting::{split_message, strip_html};
use crate::dispatcher::Dispatcher;
use crate::traits::Channel;
use crate::types::{OutgoingMessage, OwnerId, ReplyMarkup};

/// Telegram's hard limit for one message.
const MAX_MESSAGE_LEN: usize = 4096;

pub struct TelegramChannel {
    bot: Bot,
    /// Bot username fetched from Telegram API via getMe on first start.
    bot_username: StdRwLock<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
            bot_username: StdRwLock::new("telegram".to_string()),
        }
    }

    async fn get_bot_username(&self) -> String {
        match self.bot.get_me().await {
            Ok(me) => {
                let name = me.username().to_string();
                if let Ok(mut guard) = self.bot_username.write() {
                    *guard = name.clone();
                }
                name
            }
            Err(e) => {
                warn!("Failed to fetch bot username: {}", e);
                self.bot_username
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone()
            }
        }
    }

    /// Start the Telegram dispatcher with automatic retry on crash.
    /// Uses exponential backoff: 5s, 10s, 20s, 40s, then 60s cap.
    /// Resets backoff to initial after a stable run (60s+).
    pub async fn start_with_retry(self: Arc<Self>, dispatcher: Arc<Dispatcher>) {
        let bot_username = self.get_bot_username().await;

        let initial_backoff = Duration::from_secs(5);
        let max_backoff = Duration::from_secs(60);
        let stable_threshold = Duration::from_secs(60);
        let mut backoff = initial_backoff;

        loop {
            info!(name = %bot_username, "Starting Telegram dispatcher");
            let started = tokio::time::Instant::now();
            self.clone().start(dispatcher.clone()).await;
            let ran_for = started.elapsed();

            if ran_for >= stable_threshold {
                backoff = initial_backoff;
            }

            warn!(
                name = %bot_username,
                backoff_secs = backoff.as_secs(),
                ran_for_secs = ran_for.as_secs(),
                "Telegram dispatcher stopped, restarting"
            );
            tokio::time::sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, max_backoff);
        }
    }

    pub async fn start(self: Arc<Self>, dispatcher: Arc<Dispatcher>) {
        let handler = dptree::entry().branch(Update::filter_message().endpoint({
            let dispatcher = Arc::clone(&dispatcher);
            move |msg: teloxide::types::Message| {
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    handle_message(&dispatcher, msg).await;
                    respond(())
                }
            }
        }));

        teloxide::dispatching::Dispatcher::builder(self.bot.clone(), handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }
}

async fn handle_message(dispatcher: &Dispatcher, msg: teloxide::types::Message) {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "Ignoring non-text message");
        return;
    };
    let owner = OwnerId(msg.chat.id.0);
    if let Err(e) = dispatcher.handle(owner, text).await {
        warn!(owner = %owner, "Failed to handle message: {}", e);
    }
}

fn to_telegram_markup(markup: &ReplyMarkup) -> Option<teloxide::types::ReplyMarkup> {
    match markup {
        ReplyMarkup::Keep => None,
        ReplyMarkup::Remove => Some(teloxide::types::ReplyMarkup::KeyboardRemove(
            KeyboardRemove::new(),
        )),
        ReplyMarkup::Keyboard(rows) => {
            let buttons = rows
                .iter()
                .map(|row| row.iter().map(|label| KeyboardButton::new(label.as_str())));
            Some(teloxide::types::ReplyMarkup::Keyboard(
                KeyboardMarkup::new(buttons).resize_keyboard(),
            ))
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> String {
        format!(
            "telegram:{}",
            self.bot_username
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        )
    }

    async fn send(&self, owner: OwnerId, message: &OutgoingMessage) -> anyhow::Result<()> {
        let chat_id = ChatId(owner.0);
        let chunks = split_message(&message.text, MAX_MESSAGE_LEN);
        let last = chunks.len() - 1;
        let mut first_err: Option<anyhow::Error> = None;

        for (i, chunk) in chunks.iter().enumerate() {
            // The menu belongs under the final chunk.
            let markup = if i == last {
                to_telegram_markup(&message.markup)
            } else {
                None
            };
            let result = if message.html {
                send_html_or_fallback(&self.bot, chat_id, chunk, markup).await
            } else {
                send_plain(&self.bot, chat_id, chunk, markup).await
            };
            if let Err(e) = result {
                warn!(owner = %owner, "Failed to send message: {}", e);
                if first_err.is_none() {
                    first_err = Some(anyhow::anyhow!("Failed to send Telegram message: {}", e));
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        Ok(())
    }
}

async fn send_plain(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: Option<teloxide::types::ReplyMarkup>,
) -> Result<(), teloxide::RequestError> {
    let mut request = bot.send_message(chat_id, text);
    if let Some(markup) = markup {
        request = request.reply_markup(markup);
    }
    request.await?;
    Ok(())
}

/// Send a message with HTML parse mode, falling back to plain text on failure.
async fn send_html_or_fallback(
    bot: &Bot,
    chat_id: ChatId,
    html: &str,
    markup: Option<teloxide::types::ReplyMarkup>,
) -> Result<(), teloxide::RequestError> {
    let mut request = bot.send_message(chat_id, html).parse_mode(ParseMode::Html);
    if let Some(markup) = markup.clone() {
        request = request.reply_markup(markup);
    }
    match request.await {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("HTML send failed, falling back to plain text: {}", e);
            send_plain(bot, chat_id, &strip_html(html), markup).await
        }
    }
}
