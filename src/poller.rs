//! Fixed-interval poll loop.
//!
//! One cycle is fetch → validate → track → notify. Errors never escape a
//! cycle: they are logged, reported to the chat once, and the loop carries on
//! after the usual sleep. Only the startup checks can stop the process.

use std::{convert::Infallible, thread};

use chrono::Utc;
use thiserror::Error;

use crate::{
    config::Config,
    domain::{HomeworkStatus, PollWindow, WindowError},
    notifier::Notifier,
    practicum::{FetchError, StatusSource},
    telegram::{MessageTransport, SendError},
    tracker::{StatusTracker, TrackerDecision, TrackerError},
    validate::{ValidationError, validate},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    NoData,
    Unchanged,
    Changed {
        status: HomeworkStatus,
        delivered: bool,
    },
    Failed,
}

pub struct Poller<'a, S, T> {
    config: &'a Config,
    source: S,
    notifier: Notifier<T>,
    tracker: StatusTracker,
}

impl<'a, S, T> Poller<'a, S, T>
where
    S: StatusSource,
    T: MessageTransport,
{
    pub fn new(config: &'a Config, source: S, transport: T) -> Self {
        Self {
            config,
            source,
            notifier: Notifier::new(transport),
            tracker: StatusTracker::default(),
        }
    }

    pub fn last_known_status(&self) -> HomeworkStatus {
        self.tracker.last_known()
    }

    /// Runs the startup checks, then polls until the process is stopped.
    pub fn run(&mut self) -> Result<Infallible, StartupError> {
        self.startup()?;
        tracing::info!(
            interval_secs = self.config.retry_time.as_secs(),
            initial_status = %self.last_known_status(),
            "Entering poll loop"
        );
        loop {
            if let CycleOutcome::Changed {
                status,
                delivered: false,
            } = self.run_cycle()
            {
                tracing::warn!(%status, "Status change recorded but the user was not told");
            }
            thread::sleep(self.config.retry_time);
        }
    }

    pub fn startup(&self) -> Result<(), StartupError> {
        let missing = self.config.credentials.missing();
        if !missing.is_empty() {
            return Err(self.halt(StartupError::MissingCredentials {
                names: missing.join(", "),
            }));
        }

        let identity = self
            .notifier
            .transport()
            .identity()
            .map_err(|err| self.halt(StartupError::IdentityUnavailable(err)))?;
        if !identity.matches_token(&self.config.credentials.telegram_token) {
            return Err(self.halt(StartupError::IdentityMismatch {
                id: identity.id,
                is_bot: identity.is_bot,
            }));
        }

        tracing::info!(
            bot_id = identity.id,
            username = identity.username.as_deref().unwrap_or(""),
            "Bot identity verified"
        );
        Ok(())
    }

    fn halt(&self, err: StartupError) -> StartupError {
        tracing::error!(error = %err, "Fatal startup failure, not entering the poll loop");
        // Best effort: with a missing token or chat id this cannot succeed.
        self.notifier
            .notify(&format!("Bot misconfiguration: {err}"))
            .ok();
        err
    }

    /// One full pass. Never fails; failures are reported and folded into
    /// [`CycleOutcome::Failed`].
    pub fn run_cycle(&mut self) -> CycleOutcome {
        match self.try_cycle() {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "Poll cycle failed");
                self.notifier
                    .notify(&format!("Program failure: {err}"))
                    .ok();
                CycleOutcome::Failed
            }
        }
    }

    fn try_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let window = PollWindow::ending_at(Utc::now(), self.config.lookback)?;
        let payload = self.source.fetch(&window)?;
        let records = validate(&payload)?;

        match self.tracker.observe(&records)? {
            TrackerDecision::NoData => {
                tracing::info!(
                    from_date = window.from_timestamp_secs(),
                    "No homework in the poll window"
                );
                Ok(CycleOutcome::NoData)
            }
            TrackerDecision::Unchanged => {
                tracing::info!(status = %self.tracker.last_known(), "Status unchanged");
                Ok(CycleOutcome::Unchanged)
            }
            TrackerDecision::Changed {
                new_status,
                message,
            } => {
                let delivered = self.notifier.notify(&message).is_ok();
                self.tracker.commit(new_status);
                tracing::info!(status = %new_status, delivered, "Homework status changed");
                Ok(CycleOutcome::Changed {
                    status: new_status,
                    delivered,
                })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required environment variables are empty: {names}")]
    MissingCredentials { names: String },
    #[error("could not query the bot identity: {0}")]
    IdentityUnavailable(#[source] SendError),
    #[error("bot identity {id} (is_bot: {is_bot}) does not match the configured token")]
    IdentityMismatch { id: i64, is_bot: bool },
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque};

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        domain::Credentials, notifier::testing::RecordingTransport, practicum::RawPayload,
        telegram::BotIdentity,
    };

    const BOT_TOKEN: &str = "123456:AAE-secret";

    /// Replays queued responses and remembers the windows it was asked for.
    #[derive(Default)]
    struct ScriptedSource {
        responses: RefCell<VecDeque<Result<RawPayload, FetchError>>>,
        windows: RefCell<Vec<PollWindow>>,
    }

    impl ScriptedSource {
        fn push_json(&self, value: Value) -> &Self {
            let Value::Object(map) = value else {
                panic!("payload must be an object");
            };
            self.responses.borrow_mut().push_back(Ok(map));
            self
        }

        fn push_err(&self, err: FetchError) -> &Self {
            self.responses.borrow_mut().push_back(Err(err));
            self
        }
    }

    impl StatusSource for &ScriptedSource {
        fn fetch(&self, window: &PollWindow) -> Result<RawPayload, FetchError> {
            self.windows.borrow_mut().push(*window);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::MalformedBody("script exhausted".into())))
        }
    }

    impl MessageTransport for &RecordingTransport {
        fn send_text(&self, text: &str) -> Result<(), SendError> {
            (**self).send_text(text)
        }

        fn identity(&self) -> Result<BotIdentity, SendError> {
            (**self).identity()
        }
    }

    fn config() -> Config {
        Config {
            credentials: Credentials {
                practicum_token: "y0_practicum".into(),
                telegram_token: BOT_TOKEN.into(),
                telegram_chat_id: "987".into(),
            },
            ..Config::default()
        }
    }

    fn bot() -> RecordingTransport {
        RecordingTransport::with_identity(BotIdentity {
            id: 123456,
            is_bot: true,
            username: Some("homework_bot".into()),
        })
    }

    fn homeworks(name: &str, status: &str) -> Value {
        json!({
            "homeworks": [{"homework_name": name, "status": status}],
            "current_date": 1_700_000_000
        })
    }

    #[test]
    fn transition_is_notified_once_and_remembered() {
        let config = config();
        let source = ScriptedSource::default();
        source
            .push_json(homeworks("hw1", "approved"))
            .push_json(homeworks("hw1", "approved"));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(
            poller.run_cycle(),
            CycleOutcome::Changed {
                status: HomeworkStatus::Approved,
                delivered: true
            }
        );
        assert_eq!(poller.last_known_status(), HomeworkStatus::Approved);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("hw1"));
        assert!(sent[0].contains(HomeworkStatus::Approved.verdict()));

        assert_eq!(poller.run_cycle(), CycleOutcome::Unchanged);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(poller.last_known_status(), HomeworkStatus::Approved);
    }

    #[test]
    fn unchanged_status_sends_nothing() {
        let config = config();
        let source = ScriptedSource::default();
        source.push_json(homeworks("hw1", "reviewing"));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(poller.run_cycle(), CycleOutcome::Unchanged);
        assert!(transport.sent().is_empty());
        assert_eq!(poller.last_known_status(), HomeworkStatus::Reviewing);
    }

    #[test]
    fn http_error_reports_failure_and_keeps_state() {
        let config = config();
        let source = ScriptedSource::default();
        source
            .push_err(FetchError::UnexpectedStatus { code: 503 })
            .push_json(homeworks("hw1", "rejected"));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(poller.run_cycle(), CycleOutcome::Failed);
        assert_eq!(poller.last_known_status(), HomeworkStatus::Reviewing);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Program failure:"));
        assert!(sent[0].contains("503"));

        // The next cycle proceeds normally.
        assert!(matches!(
            poller.run_cycle(),
            CycleOutcome::Changed {
                status: HomeworkStatus::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn unknown_status_fails_cycle_without_touching_state() {
        let config = config();
        let source = ScriptedSource::default();
        source.push_json(homeworks("hw1", "on_hold"));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(poller.run_cycle(), CycleOutcome::Failed);
        assert_eq!(poller.last_known_status(), HomeworkStatus::Reviewing);
        assert!(transport.sent()[0].contains("on_hold"));
    }

    #[test]
    fn shape_and_contract_errors_are_cycle_scoped() {
        let config = config();
        let source = ScriptedSource::default();
        source
            .push_json(json!({"homeworks": {}, "current_date": 1}))
            .push_json(json!({"homeworks": [{"homework_name": "hw1"}], "current_date": 1}))
            .push_json(json!({"code": "not_authenticated", "message": "no token"}));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        for _ in 0..3 {
            assert_eq!(poller.run_cycle(), CycleOutcome::Failed);
        }
        assert_eq!(transport.sent().len(), 3);
        assert_eq!(poller.last_known_status(), HomeworkStatus::Reviewing);
    }

    #[test]
    fn empty_window_is_not_an_error() {
        let config = config();
        let source = ScriptedSource::default();
        source.push_json(json!({"homeworks": [], "current_date": 1}));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(poller.run_cycle(), CycleOutcome::NoData);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn failed_delivery_still_advances_state() {
        let config = config();
        let source = ScriptedSource::default();
        source
            .push_json(homeworks("hw1", "approved"))
            .push_json(homeworks("hw1", "approved"));
        let transport = bot();
        transport.fail_sends.set(true);
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(
            poller.run_cycle(),
            CycleOutcome::Changed {
                status: HomeworkStatus::Approved,
                delivered: false
            }
        );
        assert_eq!(poller.run_cycle(), CycleOutcome::Unchanged);
        assert_eq!(transport.attempts.get(), 1);
    }

    #[test]
    fn each_cycle_queries_a_fresh_thirty_day_window() {
        let config = config();
        let source = ScriptedSource::default();
        source.push_json(homeworks("hw1", "reviewing"));
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        let before = (Utc::now() - chrono::Duration::days(30)).timestamp();
        poller.run_cycle();
        let after = (Utc::now() - chrono::Duration::days(30)).timestamp();

        let windows = source.windows.borrow();
        assert_eq!(windows.len(), 1);
        let from = windows[0].from_timestamp_secs();
        assert!(before <= from && from <= after);
    }

    #[test]
    fn oversized_lookback_fails_the_cycle_without_fetching() {
        let config = Config {
            lookback: chrono::Duration::days(100_000_000),
            ..config()
        };
        let source = ScriptedSource::default();
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        assert_eq!(poller.run_cycle(), CycleOutcome::Failed);
        assert!(source.windows.borrow().is_empty());
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn missing_credentials_halt_with_one_notification() {
        let mut config = config();
        config.credentials.practicum_token = String::new();
        let source = ScriptedSource::default();
        let transport = bot();
        let mut poller = Poller::new(&config, &source, &transport);

        let err = poller.run().unwrap_err();
        assert!(matches!(err, StartupError::MissingCredentials { ref names } if names == "PRACTICUM_TOKEN"));
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("PRACTICUM_TOKEN"));
        assert!(source.windows.borrow().is_empty());
    }

    #[test]
    fn identity_mismatch_is_fatal() {
        let config = config();
        let source = ScriptedSource::default();
        let transport = RecordingTransport::with_identity(BotIdentity {
            id: 999,
            is_bot: true,
            username: None,
        });
        let mut poller = Poller::new(&config, &source, &transport);

        assert!(matches!(
            poller.run(),
            Err(StartupError::IdentityMismatch { id: 999, .. })
        ));
        assert_eq!(transport.sent().len(), 1);
        assert!(source.windows.borrow().is_empty());
    }

    #[test]
    fn unreachable_identity_is_fatal() {
        let config = config();
        let source = ScriptedSource::default();
        let transport = RecordingTransport::default();
        let poller = Poller::new(&config, &source, &transport);

        assert!(matches!(
            poller.startup(),
            Err(StartupError::IdentityUnavailable(_))
        ));
    }

    #[test]
    fn valid_setup_passes_startup() {
        let config = config();
        let source = ScriptedSource::default();
        let transport = bot();
        let poller = Poller::new(&config, &source, &transport);

        assert!(poller.startup().is_ok());
        assert!(transport.sent().is_empty());
    }
}
