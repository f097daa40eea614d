use std::time::Duration;

use reqwest::{
    StatusCode,
    blocking::Client,
    header::{ACCEPT, AUTHORIZATION},
};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{config::Config, domain::PollWindow};

const USER_AGENT_HEADER: &str = "homework-bot/0.1";

/// Untyped JSON object returned by the status endpoint.
pub type RawPayload = Map<String, Value>;

/// Anything that can answer a homework status query for a window.
pub trait StatusSource {
    fn fetch(&self, window: &PollWindow) -> Result<RawPayload, FetchError>;
}

pub fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT_HEADER)
        .timeout(timeout)
        .build()
        .map_err(FetchError::Transport)
}

/// Status API client. Issues exactly one request per `fetch`; retries are the
/// poller's business.
pub struct PracticumClient<'a> {
    http: Client,
    config: &'a Config,
}

impl<'a> PracticumClient<'a> {
    pub fn new(http: Client, config: &'a Config) -> Self {
        Self { http, config }
    }
}

impl StatusSource for PracticumClient<'_> {
    fn fetch(&self, window: &PollWindow) -> Result<RawPayload, FetchError> {
        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&[("from_date", window.from_timestamp_secs())])
            .header(ACCEPT, "application/json")
            .header(
                AUTHORIZATION,
                format!("OAuth {}", self.config.credentials.practicum_token),
            )
            .send()?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus {
                code: status.as_u16(),
            });
        }

        let body = response.text()?;
        parse_payload(&body)
    }
}

fn parse_payload(body: &str) -> Result<RawPayload, FetchError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FetchError::MalformedBody(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(err) => Err(FetchError::MalformedBody(err.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unexpected status API response code {code}")]
    UnexpectedStatus { code: u16 },
    #[error("status API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status API returned a malformed body: {0}")]
    MalformedBody(String),
}
