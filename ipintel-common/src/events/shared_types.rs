//! Supporting enums carried by IntelEvent variants

use serde::{Deserialize, Serialize};

/// Outcome reported by a credential-update broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUpdateStatus {
    /// Remote service accepted the credential and it was stored
    Validated,
    /// User deleted the credential
    Removed,
    /// Remote service rejected the credential (any stored copy was removed)
    Error,
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}
