//! Shape checks for status API payloads.
//!
//! Nothing from a payload is trusted until it has passed [`validate`].

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{domain::HomeworkRecord, practicum::RawPayload};

/// Checks the payload contract and decodes its records, most recent first.
pub fn validate(payload: &RawPayload) -> Result<Vec<HomeworkRecord>, ValidationError> {
    if payload.contains_key("error") || payload.contains_key("code") {
        return Err(api_error(payload));
    }

    let homeworks = match payload.get("homeworks") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ValidationError::shape("`homeworks` is not a list")),
        None => return Err(ValidationError::shape("`homeworks` is missing")),
    };
    if payload.get("current_date").is_none_or(Value::is_null) {
        return Err(ValidationError::shape("`current_date` is missing or null"));
    }

    homeworks
        .iter()
        .enumerate()
        .map(|(index, item)| decode_record(index, item))
        .collect()
}

fn decode_record(index: usize, item: &Value) -> Result<HomeworkRecord, ValidationError> {
    if !item.is_object() {
        return Err(ValidationError::shape(format!(
            "homework #{index} is not an object"
        )));
    }
    let entry = HomeworkEntry::deserialize(item).map_err(|err| {
        ValidationError::shape(format!("homework #{index} could not be decoded: {err}"))
    })?;

    let status = entry
        .status
        .ok_or(ValidationError::MissingStatusField { index })?;
    let name = entry
        .homework_name
        .ok_or(ValidationError::MissingNameField { index })?;

    Ok(HomeworkRecord { name, status })
}

fn api_error(payload: &RawPayload) -> ValidationError {
    let code = payload.get("code").map(describe).unwrap_or_default();
    let message = payload
        .get("error")
        .or_else(|| payload.get("message"))
        .map(describe)
        .unwrap_or_default();
    ValidationError::ApiError { code, message }
}

// The API nests its error text in various ways; flatten to something printable.
fn describe(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("error") {
            Some(inner) => describe(inner),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unexpected API response shape: {reason}")]
    UnexpectedShape { reason: String },
    #[error("API reported an error (code: {code:?}, message: {message:?})")]
    ApiError { code: String, message: String },
    #[error("homework #{index} has no `status` field")]
    MissingStatusField { index: usize },
    #[error("homework #{index} has no `homework_name` field")]
    MissingNameField { index: usize },
}

impl ValidationError {
    fn shape(reason: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            reason: reason.into(),
        }
    }
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HomeworkEntry {
    homework_name: Option<String>,
    status: Option<String>,
}
