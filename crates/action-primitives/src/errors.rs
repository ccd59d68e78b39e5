//! Error types for action primitives

use thiserror::Error;

/// Failures raised while acting on the page.
///
/// Handlers never let these escape: they are folded into the status
/// payload returned to the requester.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Selector resolved to zero elements
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Event dispatch threw on the target element
    #[error("Event dispatch failed: {0}")]
    DispatchFailed(String),

    /// Navigation could not be started
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Message could not be posted back to the requesting context
    #[error("Outbox error: {0}")]
    Outbox(String),
}
