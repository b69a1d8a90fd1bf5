//! Message delivery to Telegram chats.
//!
//! The pipeline only sees the [`Notifier`] trait; [`TelegramNotifier`] posts
//! to the Bot API `sendMessage` method, one request per chat. A failure for
//! one chat does not stop delivery to the others.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::TelegramSettings;
use crate::error::NotifierError;
use crate::utils::truncate_for_log;

/// Longest text Telegram accepts in one message, in characters.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

/// Message sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message` to every chat in `chats`.
    async fn send(&self, message: &str, chats: &[i64]) -> Result<(), NotifierError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// [`Notifier`] posting through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    parse_mode: Option<String>,
}

impl fmt::Debug for TelegramNotifier {
    // The endpoint embeds the bot token.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("parse_mode", &self.parse_mode)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, NotifierError> {
        let token = settings
            .api_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(NotifierError::MissingToken)?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint: send_message_url(&settings.api_base, token),
            parse_mode: settings.parse_mode.clone(),
        })
    }

    async fn send_one(&self, chat_id: i64, text: &str) -> Result<(), NotifierError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: self.parse_mode.as_deref(),
            disable_web_page_preview: false,
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        match serde_json::from_str::<TelegramReply>(&raw) {
            Ok(reply) if status.is_success() && reply.ok => Ok(()),
            Ok(reply) => Err(NotifierError::Api {
                chat_id,
                status: status.as_u16(),
                description: reply
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
            Err(_) if status.is_success() => Ok(()),
            Err(_) => Err(NotifierError::Api {
                chat_id,
                status: status.as_u16(),
                description: truncate_for_log(&raw, 200),
            }),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(level = "info", skip_all, fields(chats = chats.len(), chars = message.chars().count()))]
    async fn send(&self, message: &str, chats: &[i64]) -> Result<(), NotifierError> {
        if chats.is_empty() {
            return Err(NotifierError::NoDestinations);
        }
        let t0 = Instant::now();
        let parts = split_message(message, TELEGRAM_MAX_CHARS);

        let (delivered, failures) = deliver(chats, &parts, |chat_id, part| async move {
            self.send_one(chat_id, &part).await
        })
        .await;

        info!(
            delivered = delivered.len(),
            failed = failures.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Telegram send finished"
        );
        combine_failures(failures, chats.len())
    }
}

/// Send every part to every chat, moving on to the next chat at the first
/// part that fails. Returns the chats that received the whole message and
/// the failures of the others.
async fn deliver<F, Fut>(
    chats: &[i64],
    parts: &[String],
    mut send_part: F,
) -> (Vec<i64>, Vec<NotifierError>)
where
    F: FnMut(i64, String) -> Fut,
    Fut: Future<Output = Result<(), NotifierError>>,
{
    let mut delivered = Vec::with_capacity(chats.len());
    let mut failures = Vec::new();
    'chats: for &chat_id in chats {
        for part in parts {
            if let Err(e) = send_part(chat_id, part.clone()).await {
                warn!(chat_id, error = %e, "Telegram delivery failed");
                failures.push(e);
                continue 'chats;
            }
        }
        debug!(chat_id, parts = parts.len(), "Delivered to chat");
        delivered.push(chat_id);
    }
    (delivered, failures)
}

fn send_message_url(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token)
}

/// Fold per-chat failures into one result.
fn combine_failures(mut failures: Vec<NotifierError>, total: usize) -> Result<(), NotifierError> {
    match failures.len() {
        0 => Ok(()),
        1 if total == 1 => Err(failures.remove(0)),
        failed => Err(NotifierError::Partial {
            failed,
            total,
            first: Box::new(failures.remove(0)),
        }),
    }
}

/// Break `text` into pieces of at most `max` characters, preferring line
/// boundaries.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max {
            // A single overlong line is cut hard.
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(max) {
                parts.push(chunk.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
