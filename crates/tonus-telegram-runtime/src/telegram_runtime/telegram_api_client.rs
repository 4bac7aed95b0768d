//! Telegram Bot API client with bounded retry.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::telegram_update_helpers::TelegramUpdate;

const RETRY_ATTEMPT_HEADER: &str = "x-tonus-retry-attempt";
const MAX_RETRY_DELAY_MS: u64 = 30_000;
const CHART_FILE_NAME: &str = "chart.png";

#[derive(Debug, Clone, Deserialize)]
struct TelegramResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TelegramEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<TelegramResponseParameters>,
}

impl<T> TelegramEnvelope<T> {
    fn into_result(self, operation: &str) -> Result<T> {
        if !self.ok {
            bail!(
                "telegram {operation} failed: {}",
                self.description
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        self.result
            .ok_or_else(|| anyhow!("telegram {operation} response missing result"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramSentMessage {
    pub(super) message_id: i64,
}

#[derive(Clone)]
pub(super) struct TelegramApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl TelegramApiClient {
    pub(super) fn new(
        api_base: &str,
        bot_token: &str,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let api_base = api_base.trim().trim_end_matches('/');
        if api_base.is_empty() {
            bail!("telegram api base cannot be empty");
        }
        let bot_token = bot_token.trim();
        if bot_token.is_empty() {
            bail!("telegram bot token cannot be empty");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tonus-telegram-bot"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create telegram api client")?;

        Ok(Self {
            http,
            api_base: api_base.to_string(),
            bot_token: bot_token.to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Long-polls for updates starting at `offset`. `timeout_seconds` is the
    /// server-side hold time, so the HTTP timeout must exceed it.
    pub(super) async fn get_updates(
        &self,
        offset: i64,
        timeout_seconds: u64,
    ) -> Result<Vec<TelegramUpdate>> {
        let url = self.method_url("getUpdates");
        let offset = offset.to_string();
        let timeout = timeout_seconds.to_string();
        let envelope: TelegramEnvelope<Vec<TelegramUpdate>> = self
            .request_json("getUpdates", || {
                self.http.get(url.as_str()).query(&[
                    ("offset", offset.as_str()),
                    ("timeout", timeout.as_str()),
                    ("allowed_updates", r#"["message","callback_query"]"#),
                ])
            })
            .await?;
        envelope.into_result("getUpdates")
    }

    pub(super) async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<TelegramSentMessage> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(reply_markup) = reply_markup {
            payload["reply_markup"] = reply_markup;
        }
        let url = self.method_url("sendMessage");
        let envelope: TelegramEnvelope<TelegramSentMessage> = self
            .request_json("sendMessage", || self.http.post(url.as_str()).json(&payload))
            .await?;
        envelope.into_result("sendMessage")
    }

    pub(super) async fn send_photo(
        &self,
        chat_id: i64,
        png: &[u8],
        caption: &str,
    ) -> Result<TelegramSentMessage> {
        if png.is_empty() {
            bail!("telegram sendPhoto requires a non-empty image");
        }
        let url = self.method_url("sendPhoto");
        let envelope: TelegramEnvelope<TelegramSentMessage> = self
            .request_json("sendPhoto", || {
                let photo =
                    reqwest::multipart::Part::bytes(png.to_vec()).file_name(CHART_FILE_NAME);
                let form = reqwest::multipart::Form::new()
                    .text("chat_id", chat_id.to_string())
                    .text("caption", caption.to_string())
                    .part("photo", photo);
                self.http.post(url.as_str()).multipart(form)
            })
            .await?;
        envelope.into_result("sendPhoto")
    }

    pub(super) async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let url = self.method_url("answerCallbackQuery");
        let payload = json!({ "callback_query_id": callback_query_id });
        let envelope: TelegramEnvelope<bool> = self
            .request_json("answerCallbackQuery", || {
                self.http.post(url.as_str()).json(&payload)
            })
            .await?;
        envelope.into_result("answerCallbackQuery").map(|_| ())
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(reqwest::Error::without_url)
                            .with_context(|| format!("failed to decode telegram {operation}"));
                    }

                    let header_retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let retry_after = header_retry_after.or_else(|| body_retry_after(&body));
                    if attempt < self.retry_max_attempts
                        && is_retryable_telegram_status(status.as_u16())
                    {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "telegram api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    // reqwest errors carry the request URL, which embeds the token.
                    let error = error.without_url();
                    return Err(error)
                        .with_context(|| format!("telegram api {operation} request failed"));
                }
            }
        }
    }
}

pub(super) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Telegram reports flood-control waits in `parameters.retry_after`.
fn body_retry_after(body: &str) -> Option<Duration> {
    let envelope = serde_json::from_str::<TelegramEnvelope<Value>>(body).ok()?;
    envelope
        .parameters
        .and_then(|parameters| parameters.retry_after)
        .map(Duration::from_secs)
}

pub(super) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(MAX_RETRY_DELAY_MS))
}

pub(super) fn is_retryable_telegram_status(status: u16) -> bool {
    status == 429 || status >= 500
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub(super) fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
