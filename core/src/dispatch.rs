//! Authenticated, retried, torn-down dispatch of one operation.
//!
//! # Design
//! `Dispatcher` owns a `Transport` and nothing else; every call logs in,
//! transmits, and logs out on its own, so concurrent callers sharing one
//! `Credentials` value never share session state.
//!
//! Flow of `dispatch`:
//! 1. Resolve auth: a configured token is used directly. Otherwise token
//!    login runs first and session login is the fallback.
//! 2. Build the request value: extra headers, JSON content headers, then the
//!    auth headers, and the URL with its scope clause.
//! 3. Transmit. Only connection failures are retried, after a fixed delay.
//!    Any HTTP status ends the loop. Certificate failures and failures
//!    reading an already-received response end it at once.
//! 4. Log out with the strategy that logged in, on every exit path after a
//!    successful login. Logout failures only produce warnings.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::credentials::Credentials;
use crate::error::DispatchError;
use crate::http::{HttpRequest, HttpResponse, PendingRequest};
use crate::session::{self, AuthMethod, SessionCredential};
use crate::transport::{Transport, TransportError};
use crate::url_builder;

pub const DEFAULT_MAX_RETRIES: u32 = 15;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-call knobs for `Dispatcher::dispatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Leave the credentials' vdom scope out of the URL.
    pub ignore_vdom_scope: bool,
    /// Applied before the auth headers; empty values are skipped.
    pub extra_headers: Vec<(String, String)>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            ignore_vdom_scope: false,
            extra_headers: Vec::new(),
        }
    }
}

impl DispatchOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn ignoring_vdom_scope(mut self) -> Self {
        self.ignore_vdom_scope = true;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

/// Auth material plus the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub method: AuthMethod,
    pub credential: SessionCredential,
}

/// Synchronous dispatcher over a `Transport`.
#[derive(Debug, Clone)]
pub struct Dispatcher<T> {
    transport: T,
    retry_delay: Duration,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Replace the fixed delay between transmission attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// `dispatch` with `DispatchOptions::default()`.
    pub fn send(
        &self,
        creds: &Credentials,
        req: &PendingRequest,
    ) -> Result<HttpResponse, DispatchError> {
        self.dispatch(creds, req, &DispatchOptions::default())
    }

    /// Authenticate, transmit `req` with retries, then log out.
    ///
    /// Returns the response whatever its HTTP status; interpreting the status
    /// is the caller's job.
    pub fn dispatch(
        &self,
        creds: &Credentials,
        req: &PendingRequest,
        options: &DispatchOptions,
    ) -> Result<HttpResponse, DispatchError> {
        let auth = self.authenticate(creds)?;
        let request = self.prepare(creds, req, options, &auth.credential);
        let outcome = self.transmit(&request, options.max_retries);
        self.logout(creds, &auth);
        outcome
    }

    /// Prove the credentials can log in and out. No protected call is made;
    /// a configured token is accepted without any network traffic.
    pub fn check_valid(&self, creds: &Credentials) -> Result<(), DispatchError> {
        let auth = self.authenticate(creds)?;
        self.logout(creds, &auth);
        info!(host = %creds.host, method = ?auth.method, "credentials validated");
        Ok(())
    }

    /// Pick the auth strategy: configured token, else token login with
    /// session login as the fallback.
    pub fn authenticate(&self, creds: &Credentials) -> Result<Authenticated, DispatchError> {
        if let Ok(token) = creds.resolve_bearer_token() {
            return Ok(Authenticated {
                method: AuthMethod::Preconfigured,
                credential: SessionCredential::Token {
                    bearer_token: token.to_string(),
                },
            });
        }
        if creds.login().is_none() {
            return Err(DispatchError::MissingCredential);
        }

        let token_err = match session::login_token(&self.transport, creds) {
            Ok(credential) => {
                debug!(host = %creds.host, "authenticated with token login");
                return Ok(Authenticated {
                    method: AuthMethod::Token,
                    credential,
                });
            }
            Err(err) => err,
        };
        debug!(host = %creds.host, error = %token_err, "token login failed, trying session login");

        match session::login_session(&self.transport, creds) {
            Ok(pair) => {
                debug!(host = %creds.host, "authenticated with session login");
                Ok(Authenticated {
                    method: AuthMethod::Session,
                    credential: SessionCredential::Cookie(pair),
                })
            }
            Err(DispatchError::LoginFailed { reason }) => Err(DispatchError::login_failed(
                format!("{token_err}; {reason}"),
            )),
            Err(err) => Err(err),
        }
    }

    fn prepare(
        &self,
        creds: &Credentials,
        req: &PendingRequest,
        options: &DispatchOptions,
        credential: &SessionCredential,
    ) -> HttpRequest {
        let scope = if options.ignore_vdom_scope { "" } else { creds.vdom() };
        let url = url_builder::build(
            &creds.host,
            &req.path,
            scope,
            req.query_extra.as_deref().unwrap_or(""),
        );

        let mut request = HttpRequest::new(req.method, url);
        for (name, value) in &options.extra_headers {
            request = request.with_header(name, value);
        }
        request = request
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");
        if let Some(token) = credential.bearer_token().filter(|t| !t.is_empty()) {
            request = request.with_header("Authorization", &format!("Bearer {token}"));
        }
        if let Some(pair) = credential.cookies() {
            request = request
                .with_header("X-CSRFTOKEN", &pair.csrf_token)
                .with_header("Cookie", &pair.cookie_header);
        }
        if let Some(body) = &req.body {
            request = request.with_body(body.clone());
        }
        request
    }

    fn transmit(&self, request: &HttpRequest, max_retries: u32) -> Result<HttpResponse, DispatchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(method = request.method.as_str(), url = %request.url, attempt, "transmitting");
            match self.transport.send(request) {
                Ok(response) => return Ok(response),
                Err(TransportError::Certificate(msg)) => return Err(DispatchError::Tls(msg)),
                Err(TransportError::ResponseBody(msg)) => {
                    return Err(DispatchError::ResponseBody(msg))
                }
                Err(TransportError::Connection(msg)) => {
                    if attempt > max_retries {
                        return Err(DispatchError::ConnectionLost {
                            attempts: attempt,
                            last_error: msg,
                        });
                    }
                    warn!(url = %request.url, attempt, error = %msg, "connection failed, retrying");
                    std::thread::sleep(self.retry_delay);
                }
            }
        }
    }

    fn logout(&self, creds: &Credentials, auth: &Authenticated) {
        let result = match auth.method {
            AuthMethod::Preconfigured => return,
            AuthMethod::Token => session::logout_token(
                &self.transport,
                creds,
                auth.credential.bearer_token().unwrap_or(""),
                auth.credential.cookies(),
            ),
            AuthMethod::Session => match auth.credential.cookies() {
                Some(pair) => session::logout_session(&self.transport, creds, pair),
                None => Ok(()),
            },
        };
        if let Err(err) = result {
            warn!(host = %creds.host, method = ?auth.method, error = %err, "logout failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    struct Refusing;

    impl Transport for Refusing {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connection("refused".into()))
        }
    }

    #[test]
    fn options_default() {
        let options = DispatchOptions::default();
        assert_eq!(options.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!options.ignore_vdom_scope);
        assert!(options.extra_headers.is_empty());
    }

    #[test]
    fn prepare_sets_bearer_and_scope() {
        let dispatcher = Dispatcher::new(Refusing);
        let creds = Credentials::new("fw").with_token("tok").with_vdom("root");
        let auth = dispatcher.authenticate(&creds).unwrap();
        assert_eq!(auth.method, AuthMethod::Preconfigured);

        let req = PendingRequest::post("/api/v2/cmdb/firewall/address")
            .with_query("action=move")
            .with_body("{}");
        let options = DispatchOptions::default()
            .with_header("X-Trace", "1")
            .with_header("Accept", "text/plain")
            .with_header("X-Empty", "");
        let request = dispatcher.prepare(&creds, &req, &options, &auth.credential);

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://fw/api/v2/cmdb/firewall/address?vdom=root&action=move");
        assert_eq!(request.header("Authorization"), Some("Bearer tok"));
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.header("X-Trace"), Some("1"));
        assert!(request.header("X-Empty").is_none());
        assert!(request.header("Cookie").is_none());
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn prepare_ignores_scope_when_asked() {
        let dispatcher = Dispatcher::new(Refusing);
        let creds = Credentials::new("fw").with_token("tok").with_vdom("global");
        let auth = dispatcher.authenticate(&creds).unwrap();
        let req = PendingRequest::get("/api/v2/monitor/system/status");
        let request = dispatcher.prepare(
            &creds,
            &req,
            &DispatchOptions::default().ignoring_vdom_scope(),
            &auth.credential,
        );
        assert_eq!(request.url, "https://fw/api/v2/monitor/system/status");
    }

    #[test]
    fn prepare_sets_cookie_headers() {
        let dispatcher = Dispatcher::new(Refusing);
        let creds = Credentials::new("fw");
        let credential = SessionCredential::Cookie(crate::cookie::CookiePair {
            csrf_token: "c".into(),
            cookie_header: "ccsrftoken=\"c\"; APSCOOKIE_1=\"s\"".into(),
        });
        let request = dispatcher.prepare(
            &creds,
            &PendingRequest::get("/x"),
            &DispatchOptions::default(),
            &credential,
        );
        assert_eq!(request.header("X-CSRFTOKEN"), Some("c"));
        assert_eq!(request.header("Cookie"), Some("ccsrftoken=\"c\"; APSCOOKIE_1=\"s\""));
        assert!(request.header("Authorization").is_none());
    }

    #[test]
    fn missing_credentials_fail_before_any_io() {
        let dispatcher = Dispatcher::new(Refusing);
        let err = dispatcher
            .dispatch(&Credentials::new("fw"), &PendingRequest::get("/x"), &DispatchOptions::default())
            .unwrap_err();
        assert_eq!(err, DispatchError::MissingCredential);
    }

    #[test]
    fn zero_retries_means_one_attempt() {
        let dispatcher = Dispatcher::new(Refusing).with_retry_delay(Duration::ZERO);
        let creds = Credentials::new("fw").with_token("tok");
        let err = dispatcher
            .dispatch(&creds, &PendingRequest::get("/x"), &DispatchOptions::default().with_max_retries(0))
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::ConnectionLost {
                attempts: 1,
                last_error: "refused".into()
            }
        );
    }
}
