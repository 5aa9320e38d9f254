//! Target URL construction.
//!
//! Scope values and extra query fragments are passed through verbatim;
//! callers pre-encode anything that needs it.

/// Reserved scope name that selects the global configuration partition.
pub const GLOBAL_SCOPE: &str = "global";

/// Build `https://<host><path>` plus the scope clause and any extra query.
///
/// `"global"` becomes `scope=global`, any other non-empty scope becomes
/// `vdom=<scope>`. `extra_query` is joined after the scope clause with `&`.
pub fn build(host: &str, path: &str, vdom_scope: &str, extra_query: &str) -> String {
    let mut url = format!("https://{host}{path}");
    let mut clauses: Vec<String> = Vec::with_capacity(2);

    if vdom_scope == GLOBAL_SCOPE {
        clauses.push(format!("scope={GLOBAL_SCOPE}"));
    } else if !vdom_scope.is_empty() {
        clauses.push(format!("vdom={vdom_scope}"));
    }
    if !extra_query.is_empty() {
        clauses.push(extra_query.to_string());
    }

    if !clauses.is_empty() {
        url.push('?');
        url.push_str(&clauses.join("&"));
    }
    url
}
