//! Post-login redirects.
//!
//! A protected page that finds the session expired sends the user to
//! `/account/login/?next=/where/they/were`. After login the UI lands on
//! `next`, but only if it is a path on this site; anything else (an
//! absolute URL, `//evil.example`) falls back to the default landing page.

use url::form_urlencoded;

use crate::AuthlineConfig;

/// The login page URL, carrying `next` if given.
pub fn login_url(config: &AuthlineConfig, next: Option<&str>) -> String {
    match next {
        Some(next) => {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("next", next)
                .finish();
            format!("{}?{query}", config.login_path)
        }
        None => config.login_path.clone(),
    }
}

/// Extracts `next` from a query string (with or without the leading `?`).
pub fn next_from_query(query: &str) -> Option<String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(key, _)| key == "next")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Where to go after a successful login.
pub fn landing_for(config: &AuthlineConfig, next: Option<&str>) -> String {
    match next {
        Some(path) if is_same_site_path(path) => path.to_string(),
        Some(path) => {
            tracing::debug!(next = %path, "ignoring unsafe post-login redirect");
            config.default_landing.clone()
        }
        None => config.default_landing.clone(),
    }
}

/// `/a/b?c` yes; `//host`, `/\host`, `https://host`, `a/b` no.
fn is_same_site_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}
