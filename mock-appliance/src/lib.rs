//! In-process stand-in for the appliance's REST API.
//!
//! Speaks the authentication endpoints (`/api/v2/authentication`,
//! `/logincheck`, `/logout`), one configuration table
//! (`/api/v2/cmdb/firewall/address`), a binary configuration backup
//! (`/api/v2/monitor/system/config/backup`) and a `/__mock/stats` endpoint exposing
//! login/logout counters so tests can assert that every login was paired
//! with a logout.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// CSRF value set by `/logincheck` for a rejected username/password.
pub const BAD_CREDENTIALS_CSRF: &str = "0%260";

/// How `POST /api/v2/authentication` behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenLoginMode {
    /// Answer `{"status":5,"session_key":...}`.
    SessionKey,
    /// Answer with a CSRF cookie pair and no key, like older firmware.
    CsrfCookie,
    /// 404, forcing clients onto `/logincheck`.
    Disabled,
}

#[derive(Clone, Debug)]
pub struct ApplianceConfig {
    pub admin_user: String,
    pub admin_password: String,
    pub api_tokens: Vec<String>,
    pub token_login: TokenLoginMode,
    /// Raw bytes served as the configuration backup.
    pub backup: Vec<u8>,
}

impl Default for ApplianceConfig {
    fn default() -> Self {
        Self {
            admin_user: "admin".to_string(),
            admin_password: "password".to_string(),
            api_tokens: Vec::new(),
            token_login: TokenLoginMode::SessionKey,
            backup: b"#config-version=FGT60F-7.4.1-FW-build2463\n".to_vec(),
        }
    }
}

/// Counters served by `GET /__mock/stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub token_logins: u32,
    pub token_logouts: u32,
    pub session_logins: u32,
    pub session_logouts: u32,
    pub rejected_logins: u32,
    pub active_sessions: u32,
}

#[derive(Default)]
struct ApplianceState {
    session_keys: HashSet<String>,
    /// CSRF token -> session cookie value.
    cookie_sessions: HashMap<String, String>,
    /// vdom -> address objects.
    addresses: HashMap<String, Vec<Value>>,
    stats: Stats,
}

impl ApplianceState {
    fn refresh_active(&mut self) {
        self.stats.active_sessions = (self.session_keys.len() + self.cookie_sessions.len()) as u32;
    }
}

#[derive(Clone)]
pub struct Appliance {
    config: Arc<ApplianceConfig>,
    state: Arc<RwLock<ApplianceState>>,
}

impl Appliance {
    pub fn new(config: ApplianceConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(ApplianceState::default())),
        }
    }

    pub async fn stats(&self) -> Stats {
        self.state.read().await.stats.clone()
    }

    fn credentials_match(&self, username: &str, password: &str) -> bool {
        username == self.config.admin_user && password == self.config.admin_password
    }
}

pub fn app(appliance: Appliance) -> Router {
    Router::new()
        .route(
            "/api/v2/authentication",
            post(token_login).delete(token_logout),
        )
        .route("/logincheck", post(login_check))
        .route("/logout", post(logout))
        .route(
            "/api/v2/cmdb/firewall/address",
            get(list_addresses).post(create_address),
        )
        .route("/api/v2/monitor/system/config/backup", get(config_backup))
        .route("/__mock/stats", get(stats))
        .with_state(appliance)
}

pub async fn run(listener: TcpListener, appliance: Appliance) -> Result<(), std::io::Error> {
    axum::serve(listener, app(appliance)).await
}

#[derive(Deserialize)]
struct TokenLoginBody {
    username: String,
    secretkey: String,
}

#[derive(Deserialize)]
struct TokenLogoutForm {
    #[serde(default)]
    session_key: String,
}

#[derive(Deserialize)]
struct LoginCheckForm {
    username: String,
    secretkey: String,
}

fn session_cookies(csrf: &str, session: &str) -> AppendHeaders<Vec<(header::HeaderName, String)>> {
    AppendHeaders(vec![
        (header::SET_COOKIE, format!("ccsrftoken=\"{csrf}\"; path=/; secure")),
        (
            header::SET_COOKIE,
            format!("APSCOOKIE_3946543212=\"{session}\"; path=/; secure; HttpOnly"),
        ),
    ])
}

/// Issued keys use the base64 alphabet, so clients must form-encode them.
fn session_key() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}+{}/=", &raw[..16], &raw[16..])
}

async fn open_cookie_session(appliance: &Appliance) -> (String, String) {
    let csrf = Uuid::new_v4().simple().to_string();
    let session = Uuid::new_v4().to_string();
    let mut state = appliance.state.write().await;
    state.cookie_sessions.insert(csrf.clone(), session.clone());
    state.refresh_active();
    (csrf, session)
}

async fn token_login(State(appliance): State<Appliance>, Json(input): Json<TokenLoginBody>) -> Response {
    if appliance.config.token_login == TokenLoginMode::Disabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !appliance.credentials_match(&input.username, &input.secretkey) {
        tracing::warn!(user = %input.username, "token login rejected");
        appliance.state.write().await.stats.rejected_logins += 1;
        return Json(json!({"status": 0, "status_message": "LOGIN_FAILED"})).into_response();
    }

    match appliance.config.token_login {
        TokenLoginMode::CsrfCookie => {
            let (csrf, session) = open_cookie_session(&appliance).await;
            appliance.state.write().await.stats.token_logins += 1;
            (session_cookies(&csrf, &session), Json(json!({"status": 5}))).into_response()
        }
        _ => {
            let key = session_key();
            let mut state = appliance.state.write().await;
            state.session_keys.insert(key.clone());
            state.stats.token_logins += 1;
            state.refresh_active();
            Json(json!({"status": 5, "session_key": key})).into_response()
        }
    }
}

async fn token_logout(
    State(appliance): State<Appliance>,
    headers: HeaderMap,
    Form(input): Form<TokenLogoutForm>,
) -> StatusCode {
    let mut state = appliance.state.write().await;
    let mut removed = state.session_keys.remove(&input.session_key);
    if let Some(csrf) = header_str(&headers, "x-csrftoken") {
        removed |= state.cookie_sessions.remove(csrf).is_some();
    }
    if !removed {
        return StatusCode::UNAUTHORIZED;
    }
    state.stats.token_logouts += 1;
    state.refresh_active();
    StatusCode::OK
}

async fn login_check(State(appliance): State<Appliance>, Form(input): Form<LoginCheckForm>) -> Response {
    if !appliance.credentials_match(&input.username, &input.secretkey) {
        tracing::warn!(user = %input.username, "logincheck rejected");
        appliance.state.write().await.stats.rejected_logins += 1;
        let cookie = AppendHeaders(vec![(
            header::SET_COOKIE,
            format!("ccsrftoken=\"{BAD_CREDENTIALS_CSRF}\"; path=/"),
        )]);
        return (cookie, "0").into_response();
    }
    let (csrf, session) = open_cookie_session(&appliance).await;
    appliance.state.write().await.stats.session_logins += 1;
    (session_cookies(&csrf, &session), "1").into_response()
}

async fn logout(State(appliance): State<Appliance>, headers: HeaderMap) -> StatusCode {
    let Some(csrf) = header_str(&headers, "x-csrftoken") else {
        return StatusCode::FORBIDDEN;
    };
    let mut state = appliance.state.write().await;
    if state.cookie_sessions.remove(csrf).is_none() {
        return StatusCode::FORBIDDEN;
    }
    state.stats.session_logouts += 1;
    state.refresh_active();
    tracing::debug!(active = state.stats.active_sessions, "session logout");
    StatusCode::OK
}

async fn stats(State(appliance): State<Appliance>) -> Json<Stats> {
    Json(appliance.stats().await)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn authorized(appliance: &Appliance, headers: &HeaderMap) -> bool {
    if let Some(token) = header_str(headers, "authorization").and_then(|v| v.strip_prefix("Bearer ")) {
        if appliance.config.api_tokens.iter().any(|t| t == token) {
            return true;
        }
        return appliance.state.read().await.session_keys.contains(token);
    }
    let (Some(csrf), Some(cookie)) = (
        header_str(headers, "x-csrftoken"),
        header_str(headers, "cookie"),
    ) else {
        return false;
    };
    match appliance.state.read().await.cookie_sessions.get(csrf) {
        Some(session) => cookie.contains(session.as_str()),
        None => false,
    }
}

async fn config_backup(State(appliance): State<Appliance>, headers: HeaderMap) -> Response {
    if !authorized(&appliance, &headers).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        appliance.config.backup.clone(),
    )
        .into_response()
}

/// The vdom a request targets, and its echo in the response envelope.
fn scope(query: &HashMap<String, String>) -> (String, Value) {
    if query.get("scope").map(String::as_str) == Some("global") {
        return ("global".to_string(), json!("global"));
    }
    let vdom = query.get("vdom").cloned().unwrap_or_else(|| "root".to_string());
    (vdom.clone(), json!(vdom))
}

async fn list_addresses(
    State(appliance): State<Appliance>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&appliance, &headers).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (vdom, echo) = scope(&query);
    let results = appliance
        .state
        .read()
        .await
        .addresses
        .get(&vdom)
        .cloned()
        .unwrap_or_default();
    Json(json!({
        "http_method": "GET",
        "results": results,
        "vdom": echo,
        "status": "success",
        "http_status": 200,
    }))
    .into_response()
}

async fn create_address(
    State(appliance): State<Appliance>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(object): Json<Value>,
) -> Response {
    if !authorized(&appliance, &headers).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(name) = object.get("name").and_then(Value::as_str).map(str::to_string) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "http_status": 500, "error": -651})),
        )
            .into_response();
    };
    let (vdom, echo) = scope(&query);
    appliance
        .state
        .write()
        .await
        .addresses
        .entry(vdom)
        .or_default()
        .push(object);
    Json(json!({
        "http_method": "POST",
        "mkey": name,
        "vdom": echo,
        "status": "success",
        "http_status": 200,
    }))
    .into_response()
}
