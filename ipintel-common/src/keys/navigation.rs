//! Page navigation gated on key state

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::KeyState;
use crate::events::IntelEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    Dashboard,
    Settings,
}

/// Tracks the current page; the dashboard needs at least one credential
#[derive(Debug, Clone)]
pub struct Navigator {
    current: Page,
    can_navigate: bool,
}

impl Navigator {
    pub fn new(state: &KeyState) -> Self {
        let mut nav = Self {
            current: Page::Dashboard,
            can_navigate: false,
        };
        nav.on_key_state(state);
        nav
    }

    pub fn current(&self) -> Page {
        self.current
    }

    pub fn can_navigate(&self) -> bool {
        self.can_navigate
    }

    /// Follow a new key state; losing the last key moves the dashboard to settings
    pub fn on_key_state(&mut self, state: &KeyState) {
        self.can_navigate = state.has_valid_key;
        if !self.can_navigate && self.current == Page::Dashboard {
            debug!("No API key configured, redirecting to settings");
            self.current = Page::Settings;
        }
    }

    /// Move to a page. Returns `false` if the dashboard is locked.
    pub fn navigate_to(&mut self, page: Page) -> bool {
        if page == Page::Dashboard && !self.can_navigate {
            warn!("Cannot navigate to dashboard: no valid API key");
            return false;
        }
        self.current = page;
        true
    }

    /// Handle a broadcast; returns `true` if the page changed
    pub fn on_event(&mut self, event: &IntelEvent) -> bool {
        match event {
            IntelEvent::NavigateToDashboard { .. } => {
                if self.can_navigate && self.current != Page::Dashboard {
                    self.current = Page::Dashboard;
                    true
                } else {
                    if !self.can_navigate {
                        warn!("Navigation blocked: no valid API key");
                    }
                    false
                }
            }
            _ => false,
        }
    }
}
