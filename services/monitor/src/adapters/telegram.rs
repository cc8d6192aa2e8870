//! services/monitor/src/adapters/telegram.rs
//!
//! Delivers notifications through the Telegram Bot API. The ledger's user
//! id is the Telegram chat id.

use async_trait::async_trait;
use paper_watch_core::domain::UserId;
use paper_watch_core::ports::{Notifier, PortError, PortResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: UserId,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct BotResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(http: reqwest::Client, api_url: String, token: String) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: UserId, message: &str) -> PortResult<()> {
        let body = SendMessage {
            chat_id: user_id,
            text: message,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        // Telegram answers 4xx with a JSON body, so the status is not checked first.
        let response: BotResponse = self
            .http
            .post(format!("{}/bot{}/sendMessage", self.api_url, self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Provider(format!("Telegram request failed: {}", e.without_url())))?
            .json()
            .await
            .map_err(|e| PortError::Provider(format!("Telegram response unreadable: {}", e.without_url())))?;

        if !response.ok {
            return Err(PortError::Provider(format!(
                "Telegram rejected message to {}: {}",
                user_id,
                response.description.unwrap_or_default()
            )));
        }
        debug!(user_id, "Notification delivered");
        Ok(())
    }
}
