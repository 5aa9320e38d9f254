//! Verify cookie extraction and URL construction against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Each vector names its inputs and either the expected result or the name of
//! the expected error variant.

use fortirest_core::{cookie, url_builder, DispatchError};

fn error_name(err: &DispatchError) -> &'static str {
    match err {
        DispatchError::MissingCredential => "MissingCredential",
        DispatchError::LoginFailed { .. } => "LoginFailed",
        DispatchError::InvalidCredentials => "InvalidCredentials",
        DispatchError::CsrfNotFound => "CsrfNotFound",
        DispatchError::CookieNotFound => "CookieNotFound",
        DispatchError::SetCookieMissing => "SetCookieMissing",
        DispatchError::Tls(_) => "Tls",
        DispatchError::ResponseBody(_) => "ResponseBody",
        DispatchError::ConnectionLost { .. } => "ConnectionLost",
        DispatchError::LogoutFailed { .. } => "LogoutFailed",
        DispatchError::Serialization(_) => "Serialization",
    }
}

// ---------------------------------------------------------------------------
// Set-Cookie extraction
// ---------------------------------------------------------------------------

#[test]
fn cookie_test_vectors() {
    let raw = include_str!("../../test-vectors/cookies.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let headers: Vec<&str> = case["set_cookie"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h.as_str().unwrap())
            .collect();

        let result = cookie::extract(&headers);

        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            assert_eq!(error_name(&err), expected_error.as_str().unwrap(), "{name}: error");
        } else {
            let pair = result.unwrap_or_else(|e| panic!("{name}: unexpected error {e}"));
            let expected = &case["expected"];
            assert_eq!(pair.csrf_token, expected["csrf_token"].as_str().unwrap(), "{name}: csrf");
            assert_eq!(
                pair.cookie_header,
                expected["cookie_header"].as_str().unwrap(),
                "{name}: cookie header"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

#[test]
fn url_test_vectors() {
    let raw = include_str!("../../test-vectors/urls.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let url = url_builder::build(
            case["host"].as_str().unwrap(),
            case["path"].as_str().unwrap(),
            case["vdom"].as_str().unwrap(),
            case["extra_query"].as_str().unwrap(),
        );
        assert_eq!(url, case["expected"].as_str().unwrap(), "{name}: url");
    }
}
