//! Error types for authentication and dispatch.
//!
//! # Design
//! Every failure `dispatch` can report is a variant of `DispatchError`. The
//! login-response shape errors (`CsrfNotFound`, `CookieNotFound`,
//! `SetCookieMissing`) stay distinct from `InvalidCredentials` because the
//! former usually mean the endpoint is wrong while the latter means the
//! appliance rejected the username/password. `LogoutFailed` is only returned
//! by the logout operations; `dispatch` downgrades it to a warning.

use thiserror::Error;

/// Errors produced while authenticating, transmitting, or tearing down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Neither an API token nor a username/password pair is configured.
    #[error("no API token and no username/password configured")]
    MissingCredential,

    /// No login strategy produced usable auth material.
    #[error("login failed: {reason}")]
    LoginFailed { reason: String },

    /// The login endpoint answered but flagged the username/password as bad.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("CSRF token not found in login response cookies")]
    CsrfNotFound,

    #[error("session cookie not found in login response")]
    CookieNotFound,

    /// The login response carried no `Set-Cookie` header at all.
    #[error("login response has no Set-Cookie header")]
    SetCookieMissing,

    /// Certificate validation failed. Never retried.
    #[error("TLS certificate validation failed: {0}")]
    Tls(String),

    /// A response arrived but its body could not be read. Never retried,
    /// since the appliance has already acted on the request.
    #[error("response body could not be read: {0}")]
    ResponseBody(String),

    /// Transient connection failures exhausted the retry budget.
    #[error("connection lost after {attempts} attempts: {last_error}")]
    ConnectionLost { attempts: u32, last_error: String },

    /// Teardown failed. Non-fatal for `dispatch`.
    #[error("logout failed: {reason}")]
    LogoutFailed { reason: String },

    /// A login payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl DispatchError {
    pub fn login_failed(reason: impl Into<String>) -> Self {
        DispatchError::LoginFailed {
            reason: reason.into(),
        }
    }

    pub fn logout_failed(reason: impl Into<String>) -> Self {
        DispatchError::LogoutFailed {
            reason: reason.into(),
        }
    }
}
