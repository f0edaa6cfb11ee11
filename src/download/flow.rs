//! Password prompt flow for a single download visit
//!
//! States: Idle -> AttemptingNoPassword -> PasswordRequired -> AttemptingWithPassword
//! -> Succeeded | Failed. The password is asked for at most once on an
//! unauthorized answer without one; after that an unauthorized answer is
//! either "still required" (no password sent) or "incorrect" (password sent).

use tracing::debug;

use crate::api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AttemptingNoPassword,
    PasswordRequired,
    AttemptingWithPassword,
    Succeeded,
    /// Last password was rejected; it has been cleared and must be re-entered
    Failed,
}

/// Server answer to one download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Unauthorized,
    LimitExceeded,
    Expired,
    RateLimited,
    Error,
}

impl From<&ApiError> for Outcome {
    fn from(error: &ApiError) -> Self {
        match error {
            ApiError::Unauthorized => Outcome::Unauthorized,
            ApiError::LimitExceeded => Outcome::LimitExceeded,
            ApiError::Expired => Outcome::Expired,
            ApiError::RateLimited => Outcome::RateLimited,
            _ => Outcome::Error,
        }
    }
}

/// What to tell the user after an attempt resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Save the content; `remember` holds the password to cache, if one was used
    Downloaded { remember: Option<String> },
    /// First unauthorized answer without a password
    PasswordRequired,
    /// Unauthorized again without a password having been sent
    StillPasswordRequired,
    /// The password that was sent was rejected
    IncorrectPassword,
    /// Limit, expiry, rate limit or another failure; nothing to prompt for
    Rejected(Outcome),
}

/// Password to send with one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct PasswordFlow {
    state: FlowState,
    /// Password currently entered (possibly pre-filled)
    password: String,
    /// Whether the user has already been asked for a password this visit
    prompted: bool,
    /// Waiting state to fall back to when an attempt fails for a non-password reason
    resume: FlowState,
}

impl PasswordFlow {
    pub fn new() -> Self {
        Self {
            state: FlowState::Idle,
            password: String::new(),
            prompted: false,
            resume: FlowState::Idle,
        }
    }

    /// The file is known to be protected: ask before the first attempt
    pub fn prompt_upfront(&mut self) {
        if self.state == FlowState::Idle {
            self.state = FlowState::PasswordRequired;
            self.prompted = true;
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    #[cfg(test)]
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    /// Whether the user must enter a password before the next attempt
    pub fn needs_password(&self) -> bool {
        matches!(self.state, FlowState::PasswordRequired | FlowState::Failed)
            && self.password.is_empty()
    }

    /// Whether an attempt is outstanding
    pub fn is_attempting(&self) -> bool {
        matches!(
            self.state,
            FlowState::AttemptingNoPassword | FlowState::AttemptingWithPassword
        )
    }

    /// Start an attempt. Returns None while another attempt is outstanding.
    pub fn begin(&mut self) -> Option<Attempt> {
        if self.is_attempting() {
            return None;
        }

        self.resume = match self.state {
            FlowState::Succeeded => FlowState::Idle,
            waiting => waiting,
        };

        let attempt = if self.password.is_empty() {
            self.state = FlowState::AttemptingNoPassword;
            Attempt { password: None }
        } else {
            self.state = FlowState::AttemptingWithPassword;
            Attempt {
                password: Some(self.password.clone()),
            }
        };

        debug!(state = ?self.state, "Download attempt started");
        Some(attempt)
    }

    /// Apply the server's answer. Returns None when no attempt was outstanding.
    pub fn resolve(&mut self, outcome: Outcome) -> Option<FlowEvent> {
        let with_password = match self.state {
            FlowState::AttemptingNoPassword => false,
            FlowState::AttemptingWithPassword => true,
            _ => return None,
        };

        let event = match outcome {
            Outcome::Success => {
                self.state = FlowState::Succeeded;
                FlowEvent::Downloaded {
                    remember: with_password.then(|| self.password.clone()),
                }
            }
            Outcome::Unauthorized if with_password => {
                self.state = FlowState::Failed;
                self.prompted = true;
                self.password.clear();
                FlowEvent::IncorrectPassword
            }
            Outcome::Unauthorized => {
                self.state = FlowState::PasswordRequired;
                if self.prompted {
                    FlowEvent::StillPasswordRequired
                } else {
                    self.prompted = true;
                    FlowEvent::PasswordRequired
                }
            }
            other => {
                self.state = self.resume;
                FlowEvent::Rejected(other)
            }
        };

        debug!(state = ?self.state, event = ?event, "Download attempt resolved");
        Some(event)
    }
}

impl Default for PasswordFlow {
    fn default() -> Self {
        Self::new()
    }
}
