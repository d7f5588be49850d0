//! Telegram Bot API adapter for [`OutboundChannel`].
//!
//! Narration goes out through `sendMessage`, draws through `sendDice`, whose
//! response carries the value Telegram rolled.

use async_trait::async_trait;
use dice_baccarat::{
    ChannelError, OutboundChannel, RoomId,
    effects::ChannelResult,
    game::DieValue,
};
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::config::TelegramConfig;

/// Emoji that makes `sendDice` roll a six-sided die
const DIE_EMOJI: &str = "🎲";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: RoomId,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SendDice<'a> {
    chat_id: RoomId,
    emoji: &'a str,
}

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Message {
    dice: Option<Dice>,
}

#[derive(Debug, Deserialize)]
struct Dice {
    value: DieValue,
}

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramChannel {
    client: reqwest::Client,
    /// `<api_base>/bot<token>`
    endpoint: String,
}

impl TelegramChannel {
    /// Build a channel for the configured bot.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.token
            ),
        })
    }

    async fn call<T, B>(&self, method: &str, body: &B) -> ChannelResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let header_retry = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.map_err(network_error)?;
        let parsed = serde_json::from_str::<ApiResponse<T>>(&text).ok();

        let err = match parsed {
            Some(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) if (200..300).contains(&status) => return Ok(result),
            Some(envelope) => classify_failure(
                status,
                envelope.description.unwrap_or(text),
                envelope
                    .parameters
                    .and_then(|p| p.retry_after)
                    .or(header_retry),
            ),
            None if (200..300).contains(&status) => {
                ChannelError::Network(format!("unreadable {} response", method))
            }
            None => classify_failure(status, text, header_retry),
        };

        log::warn!("Telegram {} failed: {}", method, err);
        crate::metrics::telegram_errors_total(error_class(&err));
        Err(err)
    }
}

#[async_trait]
impl OutboundChannel for TelegramChannel {
    async fn notify(&self, destination: RoomId, text: &str) -> ChannelResult<()> {
        let _: Message = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id: destination,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn draw(&self, destination: RoomId) -> ChannelResult<DieValue> {
        let message: Message = self
            .call(
                "sendDice",
                &SendDice {
                    chat_id: destination,
                    emoji: DIE_EMOJI,
                },
            )
            .await?;

        message.dice.map(|d| d.value).ok_or_else(|| {
            ChannelError::Network("sendDice response carried no dice".to_string())
        })
    }
}

/// Map a failed response onto the channel error taxonomy.
fn classify_failure(status: u16, reason: String, retry_after: Option<u64>) -> ChannelError {
    match status {
        429 => ChannelError::RateLimited {
            retry_after: retry_after.map(Duration::from_secs),
        },
        500..=599 => ChannelError::Server(status),
        // An ok:false envelope on a 2xx still means the call was refused
        _ => ChannelError::Rejected { status, reason },
    }
}

fn network_error(err: reqwest::Error) -> ChannelError {
    ChannelError::Network(err.without_url().to_string())
}

fn error_class(err: &ChannelError) -> &'static str {
    match err {
        ChannelError::RateLimited { .. } => "rate_limited",
        ChannelError::Server(_) => "server",
        ChannelError::Network(_) => "network",
        ChannelError::Rejected { .. } => "rejected",
    }
}
