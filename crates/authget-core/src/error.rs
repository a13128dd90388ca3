/// Error taxonomy for the authentication flows.
///
/// Every flow step returns one of these; nothing is retried or recovered
/// internally, the caller decides how to report it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The challenge header does not offer the scheme the flow is attempting.
    #[error("{expected} authentication is not supported by the server (offered: {offered})")]
    UnsupportedScheme { expected: String, offered: String },

    /// The probe answered with a status outside `200`, `<400`, `401`, `407`.
    #[error("error in HTTP request: {status} {reason}")]
    UnexpectedStatus { status: u16, reason: String },

    /// Malformed challenge header, or an NTLM round ended with the wrong status.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Underlying I/O failure: refused, reset, timed out, garbled response.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        AuthError::ProtocolViolation(message.into())
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        AuthError::Transport(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.into(),
        ))
    }
}
