//! Login and logout against the appliance.
//!
//! # Design
//! Two strategies exist. Token login posts JSON to `/api/v2/authentication`
//! and normally receives a `session_key`, but older firmware answers with a
//! CSRF cookie pair instead. Session login posts a form to `/logincheck` and
//! always answers with cookies. Each strategy has a matching logout; the
//! dispatcher records which one succeeded (`AuthMethod`) so teardown always
//! pairs with login.
//!
//! Every exchange here is a single attempt; only the dispatched operation is
//! retried.

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::cookie::{self, CookiePair};
use crate::credentials::Credentials;
use crate::error::DispatchError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError};
use crate::url_builder;

pub const AUTH_PATH: &str = "/api/v2/authentication";
pub const LOGINCHECK_PATH: &str = "/logincheck";
pub const LOGOUT_PATH: &str = "/logout";

/// `status` / `status_code` values meaning a session key was issued.
const TOKEN_ISSUED_CODES: [i64; 2] = [5, 6];

/// Auth material obtained for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCredential {
    Token { bearer_token: String },
    Cookie(CookiePair),
}

impl SessionCredential {
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            SessionCredential::Token { bearer_token } => Some(bearer_token),
            SessionCredential::Cookie(_) => None,
        }
    }

    pub fn cookies(&self) -> Option<&CookiePair> {
        match self {
            SessionCredential::Cookie(pair) => Some(pair),
            SessionCredential::Token { .. } => None,
        }
    }
}

/// Which path produced the auth material, and so which logout must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Credentials.token` was used as is; nothing to tear down.
    Preconfigured,
    Token,
    Session,
}

#[derive(Serialize)]
struct TokenLoginBody<'a> {
    username: &'a str,
    password: &'a str,
    secretkey: &'a str,
    request_key: bool,
    ack_pre_disclaimer: bool,
    ack_post_disclaimer: bool,
}

/// The fields of a token-login answer that matter for authentication.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub status: Option<i64>,
    pub status_code: Option<i64>,
    pub session_key: Option<String>,
    pub status_message: Option<String>,
}

impl LoginResponse {
    /// Decode field by field. A field of unexpected type reads as absent and a
    /// body that is not JSON yields an empty answer, so one odd field never
    /// hides a valid `session_key`.
    pub fn from_body(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        Self {
            status: status_field(&value["status"]),
            status_code: status_field(&value["status_code"]),
            session_key: value["session_key"].as_str().map(str::to_string),
            status_message: value["status_message"].as_str().map(str::to_string),
        }
    }

    /// The issued session key, if the status code says one was issued.
    pub fn issued_token(&self) -> Option<&str> {
        let code = self.status.or(self.status_code)?;
        if !TOKEN_ISSUED_CODES.contains(&code) {
            return None;
        }
        self.session_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// `5`, `5.0` and `"5"` all read as 5.
fn status_field(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn login_pair(creds: &Credentials) -> Result<(&str, &str), DispatchError> {
    creds.login().ok_or(DispatchError::MissingCredential)
}

fn transport_failure(stage: &str, err: TransportError) -> DispatchError {
    match err {
        TransportError::Certificate(msg) => DispatchError::Tls(msg),
        TransportError::Connection(msg) | TransportError::ResponseBody(msg) => {
            DispatchError::login_failed(format!("{stage}: {msg}"))
        }
    }
}

fn with_cookies(request: HttpRequest, cookies: Option<&CookiePair>) -> HttpRequest {
    match cookies {
        Some(pair) => request
            .with_header("X-CSRFTOKEN", &pair.csrf_token)
            .with_header("Cookie", &pair.cookie_header),
        None => request,
    }
}

/// Token login. Yields a bearer token, or a cookie pair when the appliance
/// set the CSRF cookie instead of returning a key.
pub fn login_token<T: Transport>(
    transport: &T,
    creds: &Credentials,
) -> Result<SessionCredential, DispatchError> {
    let (username, password) = login_pair(creds)?;
    let body = serde_json::to_string(&TokenLoginBody {
        username,
        password,
        secretkey: password,
        request_key: true,
        ack_pre_disclaimer: true,
        ack_post_disclaimer: true,
    })
    .map_err(|e| DispatchError::Serialization(e.to_string()))?;

    let request = HttpRequest::new(HttpMethod::Post, url_builder::build(&creds.host, AUTH_PATH, "", ""))
        .with_header("Content-Type", "application/json")
        .with_header("Accept", "application/json")
        .with_body(body);
    let response = transport
        .send(&request)
        .map_err(|e| transport_failure("token login", e))?;

    if response.status != 200 {
        return Err(DispatchError::login_failed(format!(
            "token login returned HTTP {}",
            response.status
        )));
    }

    let parsed = LoginResponse::from_body(&response.body);
    if let Some(token) = parsed.issued_token() {
        return Ok(SessionCredential::Token {
            bearer_token: token.to_string(),
        });
    }

    cookie::extract_from_response(&response)
        .map(SessionCredential::Cookie)
        .map_err(|e| match parsed.status_message {
            Some(msg) if !msg.is_empty() => {
                DispatchError::login_failed(format!("token login: {msg} ({e})"))
            }
            _ => DispatchError::login_failed(format!("token login: {e}")),
        })
}

/// Session login through `/logincheck`.
pub fn login_session<T: Transport>(
    transport: &T,
    creds: &Credentials,
) -> Result<CookiePair, DispatchError> {
    let (username, password) = login_pair(creds)?;
    let body = form_urlencoded::Serializer::new(String::new())
        .append_pair("username", username)
        .append_pair("secretkey", password)
        .append_pair("ajax", "1")
        .finish();

    let request = HttpRequest::new(
        HttpMethod::Post,
        url_builder::build(&creds.host, LOGINCHECK_PATH, "", ""),
    )
    .with_header("Content-Type", "application/x-www-form-urlencoded")
    .with_body(body);
    let response = transport
        .send(&request)
        .map_err(|e| transport_failure("session login", e))?;

    cookie::extract_from_response(&response)
}

/// Release a token-login session. `token` is empty when the login yielded
/// cookies; the request is still sent so the appliance can drop the cookie
/// session.
pub fn logout_token<T: Transport>(
    transport: &T,
    creds: &Credentials,
    token: &str,
    cookies: Option<&CookiePair>,
) -> Result<(), DispatchError> {
    let body = form_urlencoded::Serializer::new(String::new())
        .append_pair("session_key", token)
        .finish();
    let request = HttpRequest::new(HttpMethod::Delete, url_builder::build(&creds.host, AUTH_PATH, "", ""))
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body(body);
    let request = with_cookies(request, cookies);

    expect_ok(transport.send(&request), "token logout")
}

/// Release a `/logincheck` session. A pair without a CSRF token never
/// established a session, so nothing is sent.
pub fn logout_session<T: Transport>(
    transport: &T,
    creds: &Credentials,
    cookies: &CookiePair,
) -> Result<(), DispatchError> {
    if cookies.csrf_token.is_empty() {
        return Ok(());
    }
    let request = HttpRequest::new(HttpMethod::Post, url_builder::build(&creds.host, LOGOUT_PATH, "", ""));
    let request = with_cookies(request, Some(cookies));

    expect_ok(transport.send(&request), "session logout")
}

fn expect_ok(
    result: Result<HttpResponse, TransportError>,
    stage: &str,
) -> Result<(), DispatchError> {
    match result {
        Ok(response) if response.status == 200 => Ok(()),
        Ok(response) => Err(DispatchError::logout_failed(format!(
            "{stage} returned HTTP {}",
            response.status
        ))),
        Err(e) => Err(DispatchError::logout_failed(format!("{stage}: {e}"))),
    }
}
