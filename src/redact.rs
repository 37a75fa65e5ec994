//! Token redaction for logs, errors, and telemetry.
//!
//! The bearer token must never appear literally in a log line or error
//! message (spec.md §4.1, §8 property 4). This module is the single place
//! that builds a loggable URL or message, so there is exactly one spot to
//! audit for the property to hold.

use std::sync::OnceLock;

use regex::Regex;

/// Matches the report-token path segment in a forecast URL, independent of
/// whether the bearer token happens to equal that segment.
fn report_token_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/cost_reports/[^/?]+/forecast").expect("path regex is a fixed literal")
    })
}

/// Replace every occurrence of `token` in `input` with a fixed placeholder.
///
/// Used on URLs before they are logged (query parameters and path segments
/// can both carry a report token) and on vendor error bodies before they are
/// wrapped into a [`crate::error::TransportError`].
#[must_use]
pub fn redact_token(input: &str, token: &str) -> String {
    if token.is_empty() {
        return input.to_string();
    }
    input.replace(token, "***REDACTED***")
}

/// Redact a URL for logging: replaces the bearer token if present anywhere
/// in it, scrubs the `cost_report_token`/`workspace_token`/`cursor` query
/// parameters, and scrubs the `/cost_reports/{token}/forecast` path segment
/// so a leaked query string or URL path alone cannot recover the scope
/// token either. The path segment is redacted independent of the bearer
/// token's value, since a report token is a distinct value from it.
#[must_use]
pub fn redact_url(url: &str, token: &str) -> String {
    let mut redacted = redact_token(url, token);
    for param in ["cost_report_token", "workspace_token", "cursor"] {
        redacted = redact_query_param(&redacted, param);
    }
    redacted = report_token_path_pattern()
        .replace_all(&redacted, "/cost_reports/***REDACTED***/forecast")
        .into_owned();
    redacted
}

fn redact_query_param(url: &str, param: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let rebuilt: Vec<String> = query
        .split('&')
        .map(|pair| {
            if let Some((key, _)) = pair.split_once('=') {
                if key == param {
                    return format!("{key}=***REDACTED***");
                }
            }
            pair.to_string()
        })
        .collect();
    format!("{base}?{}", rebuilt.join("&"))
}
