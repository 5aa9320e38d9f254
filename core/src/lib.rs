//! Authentication and dispatch core for a firewall appliance REST API.
//!
//! # Overview
//! Turns "send this operation to the appliance" into an authenticated,
//! retried and cleanly torn-down HTTP exchange. Requests and responses are
//! plain data; a `Transport` performs the I/O.
//!
//! # Design
//! - `Credentials` is read-only input. A configured API token is used
//!   directly; otherwise each dispatch logs in (token login, falling back to
//!   `/logincheck` session login) and logs out again before returning.
//! - Login answers are decoded into typed structs; the CSRF cookie pair is
//!   recovered from `Set-Cookie` headers by `cookie::extract`.
//! - Only connection failures are retried, after a fixed delay. Certificate
//!   failures and every auth failure end the call immediately.
//! - `UreqTransport` (feature `ureq`) is the built-in blocking transport.

pub mod cookie;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;
pub mod url_builder;

pub use cookie::CookiePair;
pub use credentials::Credentials;
pub use dispatch::{DispatchOptions, Dispatcher};
pub use error::DispatchError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, PendingRequest};
pub use session::{AuthMethod, SessionCredential};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use transport::{Transport, TransportError};
