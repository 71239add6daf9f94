//! Validation state machine
//!
//! IDLE → VALIDATING → SUCCESS | ERROR
//! SUCCESS → REDIRECTING → IDLE
//!
//! `transition` is pure; timers and remote calls live in the workflow. Every
//! run carries a sequence number so results and timers belonging to an
//! abandoned run are ignored.

use serde::Serialize;

use crate::keys::Provider;

pub const REDIRECT_MESSAGE: &str = "Redirecting to Dashboard...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStage {
    Idle,
    Validating,
    Success,
    Error,
    Redirecting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationState {
    pub stage: ValidationStage,
    /// Provider owning the current (or last) run
    pub provider: Option<Provider>,
    /// Inline confirmation for the provider's form
    pub message: Option<String>,
    /// Inline error for the provider's form
    pub error: Option<String>,
    /// Sequence number of the current run
    pub run: u64,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self {
            stage: ValidationStage::Idle,
            provider: None,
            message: None,
            error: None,
            run: 0,
        }
    }
}

impl ValidationState {
    /// A remote call or a redirect is still pending
    pub fn is_active(&self) -> bool {
        matches!(
            self.stage,
            ValidationStage::Validating | ValidationStage::Success | ValidationStage::Redirecting
        )
    }

    /// Whichever inline text is showing, error first
    pub fn text(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }

    fn cancelled(&self) -> Self {
        Self {
            stage: ValidationStage::Idle,
            provider: self.provider,
            message: None,
            error: None,
            run: self.run + 1,
        }
    }

    fn settle(
        &self,
        run: u64,
        expected: ValidationStage,
        stage: ValidationStage,
        message: Option<String>,
        error: Option<String>,
    ) -> Self {
        if run != self.run || self.stage != expected {
            return self.clone();
        }
        Self {
            stage,
            provider: self.provider,
            message,
            error,
            run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEvent {
    /// User asked to validate `input` for `provider`
    Start { provider: Provider, input: String },
    /// Remote service accepted the credential
    Accepted { run: u64 },
    /// Remote service rejected the credential
    Rejected { run: u64 },
    /// Remote call failed; `reason` is the server's message when it sent one
    Failed { run: u64, reason: Option<String> },
    /// First delay after success elapsed
    RedirectDue { run: u64 },
    /// Second delay elapsed; dashboard navigation fires
    NavigateDue { run: u64 },
    InputEdited,
    NavigatedAway,
    Reset,
}

pub fn required_message(provider: Provider) -> String {
    format!("{} API key is required.", provider.name())
}

pub fn success_message(provider: Provider) -> String {
    format!("{} API key validated successfully!", provider.name())
}

pub fn invalid_message(provider: Provider) -> String {
    format!("Invalid {} API key.", provider.name())
}

pub fn failure_message(provider: Provider) -> String {
    format!(
        "Failed to validate {} API key. Please try again later.",
        provider.name()
    )
}

pub fn deleted_message(provider: Provider) -> String {
    format!("{} API key has been deleted.", provider.name())
}

pub fn store_failed_message(provider: Provider) -> String {
    format!("Failed to store {} API key.", provider.name())
}

pub fn remove_failed_message(provider: Provider) -> String {
    format!("Failed to remove {} API key.", provider.name())
}

/// Compute the next state
pub fn transition(state: &ValidationState, event: ValidationEvent) -> ValidationState {
    use ValidationStage::*;

    match event {
        ValidationEvent::Start { provider, input } => {
            if input.trim().is_empty() {
                return ValidationState {
                    stage: Idle,
                    provider: Some(provider),
                    message: None,
                    error: Some(required_message(provider)),
                    run: state.run + 1,
                };
            }
            ValidationState {
                stage: Validating,
                provider: Some(provider),
                message: None,
                error: None,
                run: state.run + 1,
            }
        }
        ValidationEvent::Accepted { run } => {
            let message = state.provider.map(success_message);
            state.settle(run, Validating, Success, message, None)
        }
        ValidationEvent::Rejected { run } => {
            let error = state.provider.map(invalid_message);
            state.settle(run, Validating, Error, None, error)
        }
        ValidationEvent::Failed { run, reason } => {
            let error = reason
                .filter(|r| !r.trim().is_empty())
                .or_else(|| state.provider.map(failure_message));
            state.settle(run, Validating, Error, None, error)
        }
        ValidationEvent::RedirectDue { run } => {
            state.settle(run, Success, Redirecting, Some(REDIRECT_MESSAGE.to_string()), None)
        }
        ValidationEvent::NavigateDue { run } => state.settle(run, Redirecting, Idle, None, None),
        ValidationEvent::InputEdited | ValidationEvent::NavigatedAway | ValidationEvent::Reset => {
            state.cancelled()
        }
    }
}
