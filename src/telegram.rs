use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned, de::IgnoredAny};
use thiserror::Error;

use crate::domain::Credentials;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

/// Outbound chat channel bound to a single recipient.
pub trait MessageTransport {
    fn send_text(&self, text: &str) -> Result<(), SendError>;

    /// Account the transport is authenticated as.
    fn identity(&self) -> Result<BotIdentity, SendError>;
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

impl BotIdentity {
    /// True when this identity is a bot account owning `token`.
    pub fn matches_token(&self, token: &str) -> bool {
        self.is_bot && bot_id_from_token(token) == Some(self.id.to_string().as_str())
    }
}

/// Bot tokens look like `<bot id>:<secret>`.
pub fn bot_id_from_token(token: &str) -> Option<&str> {
    token
        .rsplit_once(':')
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty())
}

/// Telegram Bot API transport. The token never leaves this type: request
/// errors are stripped of their URL before being returned.
pub struct TelegramBot<'a> {
    http: Client,
    credentials: &'a Credentials,
}

impl<'a> TelegramBot<'a> {
    pub fn new(http: Client, credentials: &'a Credentials) -> Self {
        Self { http, credentials }
    }

    fn method_url(&self, method: &str) -> Result<String, SendError> {
        if self.credentials.telegram_token.is_empty() {
            return Err(SendError::MissingToken);
        }
        Ok(format!(
            "{TELEGRAM_API_BASE}{}/{method}",
            self.credentials.telegram_token
        ))
    }

    fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SendError> {
        let response: ApiResponse<T> = request
            .send()
            .map_err(redact)?
            .json()
            .map_err(redact)?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(SendError::Api {
                code: other.error_code,
                description: other
                    .description
                    .unwrap_or_else(|| "no description".to_owned()),
            }),
        }
    }
}

impl MessageTransport for TelegramBot<'_> {
    fn send_text(&self, text: &str) -> Result<(), SendError> {
        let url = self.method_url("sendMessage")?;
        if self.credentials.telegram_chat_id.is_empty() {
            return Err(SendError::MissingRecipient);
        }

        let body = serde_json::json!({
            "chat_id": self.credentials.telegram_chat_id,
            "text": text,
        });
        let _: IgnoredAny = self.call(self.http.post(url).json(&body))?;
        Ok(())
    }

    fn identity(&self) -> Result<BotIdentity, SendError> {
        let url = self.method_url("getMe")?;
        self.call(self.http.get(url))
    }
}

fn redact(err: reqwest::Error) -> SendError {
    SendError::Http(err.without_url())
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Telegram request failed: {0}")]
    Http(reqwest::Error),
    #[error("Telegram API error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },
    #[error("Bot token is missing")]
    MissingToken,
    #[error("Chat id is missing")]
    MissingRecipient,
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}
