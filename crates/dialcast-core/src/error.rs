//! Error taxonomy for the whole workspace.
//!
//! Adapter clients map transport failures into these variants at their own
//! boundary; nothing above the adapters ever sees a raw `reqwest` error.

use thiserror::Error;

/// All errors Dialcast components can produce.
#[derive(Error, Debug)]
pub enum DialError {
    /// Configuration load/parse problem.
    #[error("config error: {0}")]
    Config(String),

    /// The shared telephony token was rejected. Refresh and retry next tick.
    #[error("telephony token expired or rejected")]
    AuthExpired,

    /// The assigned agent is not in the "Available" profile. Soft skip:
    /// the campaign is tagged `error_not_available`, never `error`.
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Telephony platform call failed (dial, poll, hangup, device lookup).
    #[error("telephony platform error: {0}")]
    Platform(String),

    /// CRM request failed.
    #[error("CRM error: {0}")]
    Crm(String),

    /// A campaign with this project id is already registered.
    #[error("project {0} already registered")]
    DuplicateProject(String),

    /// No campaign with this project id.
    #[error("project {0} not found")]
    NotFound(String),

    /// Operation not allowed in the campaign's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operator asked for a state the API does not accept.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DialError {
    /// Whether this error should halt a campaign (`error` state) or is a
    /// soft per-tick skip.
    pub fn is_soft(&self) -> bool {
        matches!(self, DialError::AgentUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, DialError>;
