//! Credential store for one appliance.
//!
//! # Design
//! `Credentials` is plain data and is never mutated by a dispatch. A non-empty
//! `token` always wins over `username`/`password`. Values missing from the
//! explicit configuration can be filled from the `FORTIOS_*` environment
//! variables; `from_lookup` takes the lookup as a function so tests do not
//! touch the process environment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

pub const ENV_HOSTNAME: &str = "FORTIOS_ACCESS_HOSTNAME";
pub const ENV_TOKEN: &str = "FORTIOS_ACCESS_TOKEN";
pub const ENV_USERNAME: &str = "FORTIOS_ACCESS_USERNAME";
pub const ENV_PASSWORD: &str = "FORTIOS_ACCESS_PASSWORD";
pub const ENV_VDOM: &str = "FORTIOS_VDOM";
pub const ENV_INSECURE: &str = "FORTIOS_INSECURE";

/// Target appliance and the secrets used to reach it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdom_scope: Option<String>,
    #[serde(default)]
    pub insecure_tls: bool,
}

impl Credentials {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_vdom(mut self, vdom: impl Into<String>) -> Self {
        self.vdom_scope = Some(vdom.into());
        self
    }

    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    /// Credentials built entirely from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_fallback()
    }

    /// Fill every empty field from the process environment.
    pub fn with_env_fallback(self) -> Self {
        self.with_lookup_fallback(|key| std::env::var(key).ok())
    }

    /// Credentials built entirely from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::default().with_lookup_fallback(lookup)
    }

    /// Fill every empty field from `lookup`. Explicit non-empty values win.
    pub fn with_lookup_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fetch = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if self.host.is_empty() {
            self.host = fetch(ENV_HOSTNAME).unwrap_or_default();
        }
        fill(&mut self.token, || fetch(ENV_TOKEN));
        fill(&mut self.username, || fetch(ENV_USERNAME));
        fill(&mut self.password, || fetch(ENV_PASSWORD));
        fill(&mut self.vdom_scope, || fetch(ENV_VDOM));
        if !self.insecure_tls {
            self.insecure_tls = fetch(ENV_INSECURE)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false);
        }
        self
    }

    /// The configured API token, or `MissingCredential` when it is empty.
    pub fn resolve_bearer_token(&self) -> Result<&str, DispatchError> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(DispatchError::MissingCredential),
        }
    }

    /// Username and password, when both are non-empty.
    pub fn login(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    pub fn vdom(&self) -> &str {
        self.vdom_scope.as_deref().unwrap_or("")
    }
}

fn fill(slot: &mut Option<String>, fallback: impl FnOnce() -> Option<String>) {
    if slot.as_deref().is_none_or(str::is_empty) {
        if let Some(value) = fallback() {
            *slot = Some(value);
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("token", &redact(&self.token))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("vdom_scope", &self.vdom_scope)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}
