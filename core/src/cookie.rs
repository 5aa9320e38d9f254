//! CSRF token and session cookie extraction from login responses.
//!
//! The appliance answers a successful login with a CSRF cookie (spelled
//! `ccsrftoken` or `ccsrf_token`) next to one or more opaque session
//! cookies. Every `name=value` pair is echoed back in the outgoing `Cookie`
//! header and the CSRF value goes into `X-CSRFTOKEN`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::DispatchError;
use crate::http::HttpResponse;

/// CSRF value the appliance sets when it rejects the username/password.
pub const INVALID_CREDENTIALS_SENTINEL: &str = "0%260";

static CSRF_COOKIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^ccsrf_?token=(?:"([^"]*)"|(.*))$"#).expect("CSRF cookie pattern is valid")
});

/// CSRF token plus the `Cookie` header that authenticates a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePair {
    pub csrf_token: String,
    pub cookie_header: String,
}

/// Extract the cookie pair from a response's `Set-Cookie` headers.
pub fn extract_from_response(response: &HttpResponse) -> Result<CookiePair, DispatchError> {
    extract(&response.header_values("Set-Cookie"))
}

/// Extract the cookie pair from raw `Set-Cookie` values, in header order.
pub fn extract(set_cookies: &[&str]) -> Result<CookiePair, DispatchError> {
    if set_cookies.is_empty() {
        return Err(DispatchError::SetCookieMissing);
    }

    let mut csrf_token: Option<String> = None;
    let mut pairs: Vec<&str> = Vec::with_capacity(set_cookies.len());

    for raw in set_cookies {
        let pair = raw.split(';').next().unwrap_or_default().trim();
        if let Some(caps) = CSRF_COOKIE.captures(pair) {
            let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
            if let Some(value) = value {
                csrf_token = Some(value.to_string());
            }
        }
        if !pair.is_empty() {
            pairs.push(pair);
        }
    }

    let csrf_token = match csrf_token {
        None => return Err(DispatchError::CsrfNotFound),
        Some(token) if token == INVALID_CREDENTIALS_SENTINEL => {
            return Err(DispatchError::InvalidCredentials)
        }
        // An empty token would pass the X-CSRFTOKEN check of nothing.
        Some(token) if token.is_empty() => return Err(DispatchError::CsrfNotFound),
        Some(token) => token,
    };

    if pairs.is_empty() {
        return Err(DispatchError::CookieNotFound);
    }

    Ok(CookiePair {
        csrf_token,
        cookie_header: pairs.join("; "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_csrf_and_attributes_stripped() {
        let pair = extract(&[r#"ccsrftoken="abc123"; Path=/"#, "othercookie=xyz; HttpOnly"]).unwrap();
        assert_eq!(pair.csrf_token, "abc123");
        assert_eq!(pair.cookie_header, r#"ccsrftoken="abc123"; othercookie=xyz"#);
    }

    #[test]
    fn unquoted_underscore_spelling() {
        let pair = extract(&["APSCOOKIE_1=\"s1\"; Secure", "ccsrf_token=DEF456; path=/"]).unwrap();
        assert_eq!(pair.csrf_token, "DEF456");
        assert_eq!(pair.cookie_header, "APSCOOKIE_1=\"s1\"; ccsrf_token=DEF456");
    }

    #[test]
    fn later_csrf_cookie_wins() {
        let pair = extract(&["ccsrftoken=\"first\"", "ccsrftoken=\"second\""]).unwrap();
        assert_eq!(pair.csrf_token, "second");
    }

    #[test]
    fn sentinel_means_invalid_credentials() {
        let err = extract(&[r#"ccsrftoken="0%260"; path=/"#]).unwrap_err();
        assert_eq!(err, DispatchError::InvalidCredentials);
        let err = extract(&["ccsrftoken=0%260"]).unwrap_err();
        assert_eq!(err, DispatchError::InvalidCredentials);
    }

    #[test]
    fn no_set_cookie_header() {
        assert_eq!(extract(&[]).unwrap_err(), DispatchError::SetCookieMissing);
    }

    #[test]
    fn no_csrf_cookie() {
        let err = extract(&["APSCOOKIE_9=\"x\"; HttpOnly"]).unwrap_err();
        assert_eq!(err, DispatchError::CsrfNotFound);
    }

    #[test]
    fn empty_csrf_value_is_not_a_token() {
        let err = extract(&["ccsrftoken=\"\"; path=/"]).unwrap_err();
        assert_eq!(err, DispatchError::CsrfNotFound);
    }

    #[test]
    fn similar_names_do_not_match() {
        let err = extract(&["xccsrftoken=abc", "ccsrftokens=abc"]).unwrap_err();
        assert_eq!(err, DispatchError::CsrfNotFound);
    }

    #[test]
    fn reads_set_cookie_from_response() {
        let response = HttpResponse {
            status: 200,
            headers: vec![
                ("set-cookie".to_string(), "ccsrftoken=\"tok\"; path=/".to_string()),
                ("content-type".to_string(), "text/html".to_string()),
                ("Set-Cookie".to_string(), "APSCOOKIE_1=\"sess\"; HttpOnly".to_string()),
            ],
            body: Vec::new(),
        };
        let pair = extract_from_response(&response).unwrap();
        assert_eq!(pair.csrf_token, "tok");
        assert_eq!(pair.cookie_header, "ccsrftoken=\"tok\"; APSCOOKIE_1=\"sess\"");
    }
}
