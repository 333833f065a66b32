//! Request classification.

use appshell_common::WorkerConfig;
use appshell_net::Request;
use http::Method;

use crate::{Result, ServiceWorkerError};

/// Category of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
    /// Not intercepted; platform default networking applies.
    Ignored,
    /// Same-origin API call; network only.
    Api,
    /// Top-level page load; network first with offline fallback.
    Navigation,
    /// Everything else; stale-while-revalidate.
    StaticAsset,
}

impl RequestCategory {
    /// Whether responses in this category may be written to a cache.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, RequestCategory::Navigation | RequestCategory::StaticAsset)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCategory::Ignored => "ignored",
            RequestCategory::Api => "api",
            RequestCategory::Navigation => "navigation",
            RequestCategory::StaticAsset => "static-asset",
        }
    }
}

/// Map a request to exactly one category.
///
/// Precedence: method, then origin, then API prefix, then navigation flag.
/// The prefix check runs before the navigation split so a same-origin GET to
/// the API is never cached.
pub fn classify(config: &WorkerConfig, request: &Request) -> RequestCategory {
    if request.method != Method::GET {
        return RequestCategory::Ignored;
    }
    if !config.is_same_origin(&request.url) {
        return RequestCategory::Ignored;
    }
    if config.is_api_path(&request.url) {
        return RequestCategory::Api;
    }
    if request.is_navigation() {
        return RequestCategory::Navigation;
    }
    RequestCategory::StaticAsset
}

/// Reject requests whose responses must never be stored.
pub fn ensure_cacheable(config: &WorkerConfig, request: &Request) -> Result<()> {
    let reason = match classify(config, request) {
        category if category.is_cacheable() => return Ok(()),
        RequestCategory::Api => "API path",
        _ if request.method != Method::GET => "non-GET method",
        _ => "cross-origin",
    };

    Err(ServiceWorkerError::Uncacheable {
        url: request.url.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use appshell_net::RequestMode;
    use bytes::Bytes;
    use url::Url;

    fn config() -> WorkerConfig {
        WorkerConfig::default().with_origin(Url::parse("https://app.example.com").unwrap())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_non_get_is_ignored() {
        let config = config();
        let post = Request::post(url("https://app.example.com/index.html"), Bytes::new());
        assert_eq!(classify(&config, &post), RequestCategory::Ignored);

        let api_post = Request::post(url("https://app.example.com/api/leads"), Bytes::new());
        assert_eq!(classify(&config, &api_post), RequestCategory::Ignored);
    }

    #[test]
    fn test_cross_origin_is_ignored() {
        let config = config();
        let request = Request::get(url("https://cdn.example.net/lib.js"));
        assert_eq!(classify(&config, &request), RequestCategory::Ignored);

        let other_port = Request::navigate(url("https://app.example.com:8443/"));
        assert_eq!(classify(&config, &other_port), RequestCategory::Ignored);
    }

    #[test]
    fn test_api_wins_over_navigation() {
        let config = config();
        let request = Request::navigate(url("https://app.example.com/api/export"));
        assert_eq!(classify(&config, &request), RequestCategory::Api);
    }

    #[test]
    fn test_navigation_and_static() {
        let config = config();
        let page = Request::navigate(url("https://app.example.com/dashboard"));
        assert_eq!(classify(&config, &page), RequestCategory::Navigation);

        let script = Request::get(url("https://app.example.com/js/app.js"));
        assert_eq!(classify(&config, &script), RequestCategory::StaticAsset);

        let fetched = Request::get(url("https://app.example.com/data.json"))
            .mode(RequestMode::SameOrigin);
        assert_eq!(classify(&config, &fetched), RequestCategory::StaticAsset);
    }

    #[test]
    fn test_category_cacheability() {
        assert!(RequestCategory::Navigation.is_cacheable());
        assert!(RequestCategory::StaticAsset.is_cacheable());
        assert!(!RequestCategory::Api.is_cacheable());
        assert!(!RequestCategory::Ignored.is_cacheable());
        assert_eq!(RequestCategory::StaticAsset.as_str(), "static-asset");
    }

    #[test]
    fn test_ensure_cacheable_reasons() {
        let config = config();
        let asset = Request::get(url("https://app.example.com/a.css"));
        assert!(ensure_cacheable(&config, &asset).is_ok());

        let api = ensure_cacheable(&config, &Request::get(url("https://app.example.com/api/me")));
        assert!(matches!(
            api,
            Err(ServiceWorkerError::Uncacheable { reason: "API path", .. })
        ));

        let foreign = ensure_cacheable(&config, &Request::get(url("https://evil.example/a.css")));
        assert!(matches!(
            foreign,
            Err(ServiceWorkerError::Uncacheable { reason: "cross-origin", .. })
        ));

        let put = Request::new(Method::PUT, url("https://app.example.com/a.css"));
        assert!(matches!(
            ensure_cacheable(&config, &put),
            Err(ServiceWorkerError::Uncacheable { reason: "non-GET method", .. })
        ));
    }
}
