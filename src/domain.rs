use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

// Domain data structures shared across modules.

/// Earliest `from_date` the status API is ever queried with (2019-02-12 09:00 UTC).
pub const WINDOW_FLOOR_TIMESTAMP: i64 = 1_549_962_000;

#[derive(Clone, Default)]
pub struct Credentials {
    pub practicum_token: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
}

impl Credentials {
    /// Names of the environment variables whose values are empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("PRACTICUM_TOKEN", &self.practicum_token),
            ("TELEGRAM_TOKEN", &self.telegram_token),
            ("TELEGRAM_CHAT_ID", &self.telegram_chat_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("practicum_token", &"<redacted>")
            .field("telegram_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeworkStatus {
    Reviewing,
    Approved,
    Rejected,
}

impl HomeworkStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reviewing" => Some(Self::Reviewing),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HomeworkStatus::Reviewing => "reviewing",
            HomeworkStatus::Approved => "approved",
            HomeworkStatus::Rejected => "rejected",
        }
    }

    /// Text shown to the user for this status.
    pub fn verdict(&self) -> &'static str {
        match self {
            HomeworkStatus::Approved => "Reviewed: the reviewer liked everything. Hooray!",
            HomeworkStatus::Reviewing => "The reviewer has taken the work for review.",
            HomeworkStatus::Rejected => "Reviewed: the reviewer left remarks.",
        }
    }
}

impl fmt::Display for HomeworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reviewed submission as reported by the API.
///
/// `status` stays raw here; it is only interpreted by the tracker so that an
/// unknown value is reported against the record that carried it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HomeworkRecord {
    pub name: String,
    pub status: String,
}

/// Lower time bound sent to the API as `from_date`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollWindow {
    from_timestamp: i64,
}

impl PollWindow {
    /// Window covering the `lookback` period that ends at `now`.
    pub fn ending_at(now: DateTime<Utc>, lookback: Duration) -> Result<Self, WindowError> {
        match now.checked_sub_signed(lookback) {
            Some(start) => Self::from_timestamp(start.timestamp(), now),
            None if lookback < Duration::zero() => Err(WindowError::InFuture {
                from_timestamp: i64::MAX,
            }),
            None => Err(WindowError::BeforeFloor {
                from_timestamp: i64::MIN,
            }),
        }
    }

    pub fn from_timestamp(from_timestamp: i64, now: DateTime<Utc>) -> Result<Self, WindowError> {
        if from_timestamp < WINDOW_FLOOR_TIMESTAMP {
            return Err(WindowError::BeforeFloor { from_timestamp });
        }
        if from_timestamp > now.timestamp() {
            return Err(WindowError::InFuture { from_timestamp });
        }
        Ok(Self { from_timestamp })
    }

    pub fn from_timestamp_secs(&self) -> i64 {
        self.from_timestamp
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("poll window starts in the future ({from_timestamp}); check the system clock")]
    InFuture { from_timestamp: i64 },
    #[error("poll window starts before 1549962000 ({from_timestamp}); check the lookback setting")]
    BeforeFloor { from_timestamp: i64 },
}

/// A detected status transition for one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationEvent {
    pub homework_name: String,
    pub old_status: HomeworkStatus,
    pub new_status: HomeworkStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn window_covers_lookback_period() {
        let window = PollWindow::ending_at(now(), Duration::days(30)).expect("window");
        assert_eq!(
            window.from_timestamp_secs(),
            Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0)
                .unwrap()
                .timestamp()
        );
    }

    #[test]
    fn window_rejects_future_and_pre_floor_starts() {
        let future = now().timestamp() + 60;
        assert_eq!(
            PollWindow::from_timestamp(future, now()),
            Err(WindowError::InFuture {
                from_timestamp: future
            })
        );
        assert!(matches!(
            PollWindow::ending_at(now(), Duration::days(365 * 20)),
            Err(WindowError::BeforeFloor { .. })
        ));
        assert!(PollWindow::from_timestamp(WINDOW_FLOOR_TIMESTAMP, now()).is_ok());
    }

    #[test]
    fn window_arithmetic_overflow_is_an_error() {
        assert!(matches!(
            PollWindow::ending_at(now(), Duration::MAX),
            Err(WindowError::BeforeFloor { .. })
        ));
        assert!(matches!(
            PollWindow::ending_at(now(), Duration::MIN),
            Err(WindowError::InFuture { .. })
        ));
    }

    #[test]
    fn status_parsing_accepts_only_known_values() {
        assert_eq!(HomeworkStatus::parse("approved"), Some(HomeworkStatus::Approved));
        assert_eq!(HomeworkStatus::parse("reviewing"), Some(HomeworkStatus::Reviewing));
        assert_eq!(HomeworkStatus::parse("rejected"), Some(HomeworkStatus::Rejected));
        assert_eq!(HomeworkStatus::parse("Approved"), None);
        assert_eq!(HomeworkStatus::parse(""), None);
    }

    #[test]
    fn missing_credentials_are_named() {
        let creds = Credentials {
            practicum_token: "abc".into(),
            telegram_token: "  ".into(),
            telegram_chat_id: String::new(),
        };
        assert_eq!(creds.missing(), vec!["TELEGRAM_TOKEN", "TELEGRAM_CHAT_ID"]);
    }

    #[test]
    fn credentials_debug_hides_tokens() {
        let creds = Credentials {
            practicum_token: "secret-a".into(),
            telegram_token: "secret-b".into(),
            telegram_chat_id: "42".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("42"));
    }
}
