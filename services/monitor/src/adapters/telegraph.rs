//! services/monitor/src/adapters/telegraph.rs
//!
//! Publishes summary pages on Telegraph. Implements the `PagePublisher` port.

use async_trait::async_trait;
use paper_watch_core::domain::PublishablePage;
use paper_watch_core::ports::{PagePublisher, PortError, PortResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::info;

/// Telegraph wraps every answer as `{ ok, result | error }`.
#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct Account {
    access_token: String,
}

#[derive(Deserialize)]
struct Page {
    url: String,
}

pub struct TelegraphPublisher {
    http: reqwest::Client,
    api_url: String,
    short_name: String,
    access_token: OnceCell<String>,
}

impl TelegraphPublisher {
    /// Without an access token, an account is created on first publish.
    pub fn new(
        http: reqwest::Client,
        api_url: String,
        short_name: String,
        access_token: Option<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            short_name,
            access_token: OnceCell::new_with(access_token),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> PortResult<T> {
        let envelope: Envelope<T> = self
            .http
            .post(format!("{}/{}", self.api_url, method))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PortError::Provider(format!("Telegraph {} failed: {}", method, e)))?
            .json()
            .await
            .map_err(|e| PortError::Provider(format!("Telegraph {} response: {}", method, e)))?;

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(PortError::Provider(format!(
                "Telegraph {} rejected: {}",
                method,
                envelope.error.unwrap_or_else(|| "unknown error".to_string())
            ))),
        }
    }

    async fn token(&self) -> PortResult<&String> {
        self.access_token
            .get_or_try_init(|| async {
                let account: Account = self
                    .call("createAccount", json!({ "short_name": self.short_name }))
                    .await?;
                info!(short_name = %self.short_name, "Created Telegraph account");
                Ok::<_, PortError>(account.access_token)
            })
            .await
    }
}

/// Converts the plain-text summary into Telegraph nodes: "- " lines become
/// list items, every other non-empty line a paragraph.
pub fn page_content(page: &PublishablePage) -> Vec<Value> {
    let mut nodes = vec![
        json!({ "tag": "h4", "children": [page.title] }),
        json!({ "tag": "hr" }),
    ];
    let mut items: Vec<Value> = Vec::new();

    for line in page.summary.lines().map(str::trim) {
        let bullet = ["- ", "* ", "• "]
            .iter()
            .find_map(|marker| line.strip_prefix(marker));
        match bullet {
            Some(text) => items.push(json!({ "tag": "li", "children": [text.trim()] })),
            None => {
                if !items.is_empty() {
                    nodes.push(json!({ "tag": "ul", "children": std::mem::take(&mut items) }));
                }
                if !line.is_empty() {
                    nodes.push(json!({ "tag": "p", "children": [line] }));
                }
            }
        }
    }
    if !items.is_empty() {
        nodes.push(json!({ "tag": "ul", "children": items }));
    }

    nodes.push(json!({
        "tag": "p",
        "children": [{ "tag": "a", "attrs": { "href": page.source_link }, "children": ["Source (arXiv)"] }]
    }));
    nodes
}

#[async_trait]
impl PagePublisher for TelegraphPublisher {
    async fn publish(&self, page: &PublishablePage) -> PortResult<String> {
        let token = self.token().await?;
        let created: Page = self
            .call(
                "createPage",
                json!({
                    "access_token": token,
                    "title": page.title,
                    "content": page_content(page),
                    "return_content": false,
                }),
            )
            .await?;
        Ok(created.url)
    }
}
