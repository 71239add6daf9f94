//! Validation workflow
//!
//! Drives the state machine: calls the remote validation endpoint, writes the
//! outcome to the key store, broadcasts credential updates and schedules the
//! two redirect delays. Only one run is live at a time; starting another,
//! editing the input or navigating away cancels the pending delays.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{
    deleted_message, remove_failed_message, store_failed_message, transition, ValidationEvent, ValidationStage,
    ValidationState,
};
use crate::api::EnrichmentApi;
use crate::events::{EventBus, IntelEvent, KeyUpdateStatus};
use crate::keys::{broadcast_key_update, KeyStore, Provider};
use crate::{Error, Result};

/// Default pause at each redirect step
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(1500);

struct Inner {
    api: Arc<dyn EnrichmentApi>,
    store: KeyStore,
    bus: EventBus,
    redirect_delay: Duration,
    state_tx: watch::Sender<ValidationState>,
    pending: Mutex<CancellationToken>,
}

impl Inner {
    /// Apply an event, returning (previous, next)
    fn apply(&self, event: ValidationEvent) -> (ValidationState, ValidationState) {
        let mut previous = ValidationState::default();
        let mut next = ValidationState::default();
        self.state_tx.send_if_modified(|state| {
            previous = state.clone();
            next = transition(state, event);
            let changed = next != *state;
            *state = next.clone();
            changed
        });
        (previous, next)
    }

    /// Cancel any pending delay and arm a fresh token
    fn rearm(&self) -> CancellationToken {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.cancel();
        *pending = CancellationToken::new();
        pending.clone()
    }

    fn cancel_pending(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

#[derive(Clone)]
pub struct ValidationWorkflow {
    inner: Arc<Inner>,
}

impl ValidationWorkflow {
    pub fn new(api: Arc<dyn EnrichmentApi>, store: KeyStore, bus: EventBus) -> Self {
        Self::with_redirect_delay(api, store, bus, DEFAULT_REDIRECT_DELAY)
    }

    pub fn with_redirect_delay(
        api: Arc<dyn EnrichmentApi>,
        store: KeyStore,
        bus: EventBus,
        redirect_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ValidationState::default());
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                bus,
                redirect_delay,
                state_tx,
                pending: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn state(&self) -> ValidationState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationState> {
        self.inner.state_tx.subscribe()
    }

    /// Validate `input` as the credential for `provider`
    ///
    /// Returns the state right after the remote call settled. A blank input
    /// returns immediately without contacting the remote service.
    pub async fn validate(&self, provider: Provider, input: &str) -> ValidationState {
        let token = self.inner.rearm();
        let (_, started) = self.inner.apply(ValidationEvent::Start {
            provider,
            input: input.to_string(),
        });
        if started.stage != ValidationStage::Validating {
            return started;
        }

        let run = started.run;
        let secret = input.trim();
        debug!(%provider, run, "Validating API key");

        match self.inner.api.validate_api_key(secret).await {
            Ok(true) => {
                if !self.inner.store.set(provider, secret) {
                    warn!(%provider, "Accepted API key could not be stored");
                    self.inner.apply(ValidationEvent::Failed {
                        run,
                        reason: Some(store_failed_message(provider)),
                    });
                    return self.state();
                }
                broadcast_key_update(&self.inner.store, &self.inner.bus, provider, KeyUpdateStatus::Validated);
                let (_, next) = self.inner.apply(ValidationEvent::Accepted { run });
                if next.stage == ValidationStage::Success && next.run == run {
                    info!(%provider, "API key validated");
                    self.schedule_redirect(run, token);
                }
            }
            Ok(false) => {
                if !self.inner.store.remove(provider) {
                    warn!(%provider, "Rejected API key could not be removed");
                    self.inner.apply(ValidationEvent::Failed {
                        run,
                        reason: Some(remove_failed_message(provider)),
                    });
                    return self.state();
                }
                broadcast_key_update(&self.inner.store, &self.inner.bus, provider, KeyUpdateStatus::Error);
                self.inner.apply(ValidationEvent::Rejected { run });
                info!(%provider, "API key rejected");
            }
            Err(e) => {
                warn!(%provider, "Error validating API key: {}", e);
                let reason = e.server_message().map(str::to_string);
                self.inner.apply(ValidationEvent::Failed { run, reason });
            }
        }

        self.state()
    }

    fn schedule_redirect(&self, run: u64, token: CancellationToken) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.redirect_delay) => {}
            }
            inner.apply(ValidationEvent::RedirectDue { run });

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.redirect_delay) => {}
            }
            let (previous, next) = inner.apply(ValidationEvent::NavigateDue { run });
            if previous.stage == ValidationStage::Redirecting && next.stage == ValidationStage::Idle {
                debug!(run, "Redirect delay elapsed, requesting dashboard");
                inner.bus.emit_lossy(IntelEvent::NavigateToDashboard {
                    timestamp: chrono::Utc::now(),
                });
            }
        });
    }

    /// The user changed the credential text
    pub fn input_edited(&self) -> ValidationState {
        self.cancel(ValidationEvent::InputEdited)
    }

    /// The user left the settings page
    pub fn navigate_away(&self) -> ValidationState {
        self.cancel(ValidationEvent::NavigatedAway)
    }

    pub fn reset(&self) -> ValidationState {
        self.cancel(ValidationEvent::Reset)
    }

    fn cancel(&self, event: ValidationEvent) -> ValidationState {
        self.inner.cancel_pending();
        self.inner.apply(event).1
    }

    /// Remove a provider's credential and announce it
    ///
    /// Returns the inline confirmation message. Nothing is announced when
    /// the storage area refuses the removal.
    pub fn delete(&self, provider: Provider) -> Result<String> {
        if self.state().provider == Some(provider) {
            self.reset();
        }
        if !self.inner.store.remove(provider) {
            return Err(Error::Storage(remove_failed_message(provider)));
        }
        broadcast_key_update(&self.inner.store, &self.inner.bus, provider, KeyUpdateStatus::Removed);
        info!(%provider, "API key deleted");
        Ok(deleted_message(provider))
    }
}
