//! `reqwest`-backed fetcher for the real origin.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::{log_response, Fetcher, NetError, Request, Response};

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Transport timeout; the only timeout the interception layer relies on.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("AppShell/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Fetcher that talks to the network through `reqwest`.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(timeout = ?config.timeout, "HttpFetcher initialized");

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .header("Accept-Language", &self.config.accept_language);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(self.config.timeout)
            } else {
                warn!(url = %request.url, error = %e, "Network request failed");
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        let response = Response {
            url,
            status,
            headers,
            body,
        };
        log_response(request, &response);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(LoaderConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.user_agent.starts_with("AppShell/"));
        assert_eq!(config.max_redirects, 10);
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/css/styles.css"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/css")
                    .set_body_string("body{}"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/css/styles.css", server.uri())).unwrap();
        let response = fetcher().fetch(&Request::get(url)).await.unwrap();

        assert!(response.ok());
        assert_eq!(response.content_type(), Some("text/css"));
        assert_eq!(response.text().unwrap(), "body{}");
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let response = fetcher().fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_fetch_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/leads"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/api/leads", server.uri())).unwrap();
        let request = Request::post(url, bytes::Bytes::from_static(b"{\"name\":\"x\"}"));
        let response = fetcher().fetch(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_error() {
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let result = fetcher().fetch(&Request::get(url)).await;
        assert!(result.is_err());
    }
}
