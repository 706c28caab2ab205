// CDP <-> port type conversions

use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::error::CdpError;
use scrapeflow_core::domain::SessionCookie;
use scrapeflow_core::port::{BrowserError, BrowserResult};

pub(crate) fn protocol_error(err: CdpError) -> BrowserError {
    match err {
        CdpError::Timeout => BrowserError::Timeout {
            what: "CDP request".to_string(),
            timeout_ms: 0,
        },
        other => BrowserError::Protocol(other.to_string()),
    }
}

/// Wrap `body` in an IIFE with `el` bound to the first match of `selector`
pub(crate) fn script_with_selector(selector: &str, body: &str) -> BrowserResult<String> {
    let literal =
        serde_json::to_string(selector).map_err(|e| BrowserError::Script(e.to_string()))?;
    Ok(format!(
        "(() => {{ const el = document.querySelector({}); {} }})()",
        literal, body
    ))
}

fn same_site_name(value: &CookieSameSite) -> &'static str {
    match value {
        CookieSameSite::Strict => "Strict",
        CookieSameSite::Lax => "Lax",
        CookieSameSite::None => "None",
    }
}

fn same_site_from_name(name: &str) -> Option<CookieSameSite> {
    match name.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" => Some(CookieSameSite::None),
        _ => None,
    }
}

pub(crate) fn cookie_from_cdp(cookie: Cookie) -> SessionCookie {
    SessionCookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        // CDP reports -1 for session cookies
        expires: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site: cookie.same_site.as_ref().map(|s| same_site_name(s).to_string()),
    }
}

pub(crate) fn cookie_to_cdp(cookie: &SessionCookie) -> BrowserResult<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .http_only(cookie.http_only)
        .secure(cookie.secure);
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    if let Some(same_site) = cookie.same_site.as_deref().and_then(same_site_from_name) {
        builder = builder.same_site(same_site);
    }
    builder
        .build()
        .map_err(|e| BrowserError::Protocol(format!("invalid cookie {}: {}", cookie.name, e)))
}
