use std::fmt;

use crate::error::StatusError;

const DEFAULT_MESSAGE: &str = "Scrapping not completed";
const OK_MESSAGE: &str = "Scrapping completed successfully";
const SERVER_DOWN_MSG: &str = "access denied or server down";

/// Why a film ended in the error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapFailure {
    /// The source host could not be reached at all.
    ServerDown,
    /// The page was reachable but required content was missing.
    Content(String),
}

/// Completion marker of a single film.
///
/// `NotCompleted` is the initial state; `Completed` and `Error` are terminal
/// and can only be entered from `NotCompleted`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScrapStatus {
    #[default]
    NotCompleted,
    Completed,
    Error(ScrapFailure),
}

impl ScrapStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, ScrapStatus::Completed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ScrapStatus::Error(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ScrapStatus::NotCompleted)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, ScrapStatus::Error(ScrapFailure::ServerDown))
    }

    pub fn message(&self) -> &str {
        match self {
            ScrapStatus::NotCompleted => DEFAULT_MESSAGE,
            ScrapStatus::Completed => OK_MESSAGE,
            ScrapStatus::Error(ScrapFailure::ServerDown) => SERVER_DOWN_MSG,
            ScrapStatus::Error(ScrapFailure::Content(msg)) => msg,
        }
    }

    pub fn set_completed(&mut self) -> Result<(), StatusError> {
        self.transition(ScrapStatus::Completed)
    }

    pub fn set_server_error(&mut self) -> Result<(), StatusError> {
        self.transition(ScrapStatus::Error(ScrapFailure::ServerDown))
    }

    pub fn set_error(&mut self, message: impl Into<String>) -> Result<(), StatusError> {
        self.transition(ScrapStatus::Error(ScrapFailure::Content(message.into())))
    }

    fn transition(&mut self, next: ScrapStatus) -> Result<(), StatusError> {
        if !self.is_pending() {
            return Err(StatusError {
                from: self.name(),
                to: next.name(),
            });
        }
        *self = next;
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self {
            ScrapStatus::NotCompleted => "NotCompleted",
            ScrapStatus::Completed => "Completed",
            ScrapStatus::Error(_) => "Error",
        }
    }
}

impl fmt::Display for ScrapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.message())
    }
}
