//! Error taxonomy for scenario evaluation.
//!
//! Mismatches and cancellations are *outcomes*, not errors, and never appear
//! here; see [`crate::matcher`]. `ScenarioError` covers the user-visible
//! failure channel: errors raised explicitly with
//! [`Scenario::raise_error`](crate::scenario::Scenario::raise_error) and
//! errors returned by user effects. Both flow through `flat_map` until a
//! `handle_error_with`/`attempt` catches them.

use miette::Diagnostic;
use thiserror::Error;

/// Error carried on the failure channel of a scenario.
///
/// Kept deliberately flat and cloneable: an error stored in the episode IR
/// may be re-raised each time the episode is re-evaluated, and recovery
/// handlers receive it by value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ScenarioError {
    /// An error raised by user code, either via `raise_error` or returned
    /// from an effect.
    #[error("{message}")]
    #[diagnostic(code(colloquy::scenario::user))]
    User { message: String },

    /// An external failure wrapped into the scenario failure channel.
    #[error("effect failed: {message}")]
    #[diagnostic(
        code(colloquy::scenario::effect),
        help("Effects report failures as ScenarioError; wrap external errors with ScenarioError::from_err.")
    )]
    Effect { message: String },

    /// A selector accepted an event its projection could not handle.
    ///
    /// Selectors are contractually coherent (`project` succeeds whenever
    /// `is_defined` holds); this surfaces a broken user-supplied selector
    /// instead of panicking mid-session.
    #[error("selector accepted an event it could not project")]
    #[diagnostic(
        code(colloquy::scenario::selector),
        help("A Selector's project must return Some for every event its is_defined accepts.")
    )]
    SelectorProjection,
}

impl ScenarioError {
    /// Create a user error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        ScenarioError::User {
            message: message.into(),
        }
    }

    /// Wrap an external error into the scenario failure channel.
    pub fn from_err(error: impl std::fmt::Display) -> Self {
        ScenarioError::Effect {
            message: error.to_string(),
        }
    }
}

/// Errors produced by [`UpdateSource`](crate::sources::UpdateSource)
/// implementations when an update stream cannot be established.
#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    /// The source could not produce an update stream.
    #[error("update source unavailable: {message}")]
    #[diagnostic(
        code(colloquy::sources::unavailable),
        help("Check connectivity to the update source and retry.")
    )]
    Unavailable { message: String },
}

impl SourceError {
    /// Create an `Unavailable` error from a message.
    pub fn unavailable(message: impl Into<String>) -> Self {
        SourceError::Unavailable {
            message: message.into(),
        }
    }
}
