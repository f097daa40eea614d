use thiserror::Error;

use crate::{
    domain::{HomeworkRecord, HomeworkStatus, NotificationEvent},
    notifier,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerDecision {
    /// The API returned no submissions in the window.
    NoData,
    Unchanged,
    Changed {
        new_status: HomeworkStatus,
        message: String,
    },
}

/// Compares the most recent record against `prior`.
pub fn observe(
    records: &[HomeworkRecord],
    prior: HomeworkStatus,
) -> Result<TrackerDecision, TrackerError> {
    let Some(latest) = records.first() else {
        return Ok(TrackerDecision::NoData);
    };

    let status = HomeworkStatus::parse(&latest.status).ok_or_else(|| TrackerError::UnknownStatus {
        value: latest.status.clone(),
    })?;

    if status == prior {
        return Ok(TrackerDecision::Unchanged);
    }

    let event = NotificationEvent {
        homework_name: latest.name.clone(),
        old_status: prior,
        new_status: status,
    };
    Ok(TrackerDecision::Changed {
        new_status: status,
        message: notifier::render(&event),
    })
}

/// Holds the last status the user was told about.
#[derive(Debug)]
pub struct StatusTracker {
    last_known: HomeworkStatus,
}

impl Default for StatusTracker {
    /// A freshly handed-in submission is presumed to be under review.
    fn default() -> Self {
        Self::new(HomeworkStatus::Reviewing)
    }
}

impl StatusTracker {
    pub fn new(initial: HomeworkStatus) -> Self {
        Self {
            last_known: initial,
        }
    }

    pub fn last_known(&self) -> HomeworkStatus {
        self.last_known
    }

    pub fn observe(&self, records: &[HomeworkRecord]) -> Result<TrackerDecision, TrackerError> {
        observe(records, self.last_known)
    }

    /// Records a transition once it has been handed to the notifier.
    pub fn commit(&mut self, status: HomeworkStatus) {
        self.last_known = status;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("unknown homework status {value:?}")]
    UnknownStatus { value: String },
}
