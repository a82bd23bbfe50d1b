//! Fetcher backend: the capability the scheduler uses to retrieve pages.
//!
//! `HttpFetcher` is the production implementation. Direct fetches go straight
//! to the target with the configured headers and cookie jar; render fetches
//! are routed through the configured proxy/rendering provider, which is the
//! anti-bot fallback path.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::FetchError;
use crate::config::{FetchConfig, ProxyConfig};

/// How a fetch should be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Plain request to the target URL
    Direct,

    /// Request routed through the proxy/JS-rendering service
    Render,
}

/// Per-request options handed to the fetcher
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub headers: BTreeMap<String, String>,
    pub mode: FetchMode,
}

impl FetchOptions {
    /// Options for a direct fetch under the given configuration
    pub fn direct(config: &FetchConfig) -> Self {
        Self {
            timeout: config.timeout(),
            headers: config.headers.clone(),
            mode: FetchMode::Direct,
        }
    }

    /// Options for a render fetch; render services get the longer timeout
    pub fn render(config: &FetchConfig) -> Self {
        Self {
            timeout: config.render_timeout(),
            headers: config.headers.clone(),
            mode: FetchMode::Render,
        }
    }
}

/// Response returned by a fetcher backend
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability for retrieving a URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions)
        -> Result<FetchResponse, FetchError>;
}

/// HTTP fetcher with optional proxy/rendering fallback support
pub struct HttpFetcher {
    client: reqwest::Client,
    proxy: Option<ProxyConfig>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if config.use_cookies {
            builder = builder.cookie_store(true);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            proxy: config.proxy.clone(),
        })
    }

    fn render_request(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<reqwest::RequestBuilder, FetchError> {
        let proxy = self
            .proxy
            .as_ref()
            .ok_or_else(|| FetchError::Proxy("no proxy service configured".to_string()))?;
        let request = match proxy {
            ProxyConfig::ZenRows { api_key, js_render } => self
                .client
                .get("https://api.zenrows.com/v1/")
                .query(&[
                    ("url", url),
                    ("apikey", api_key.as_str()),
                    ("js_render", if *js_render { "true" } else { "false" }),
                ]),
            ProxyConfig::Browserless { api_key, endpoint } => {
                let base = endpoint
                    .as_deref()
                    .unwrap_or("https://chrome.browserless.io");
                self.client
                    .post(format!("{}/content", base.trim_end_matches('/')))
                    .query(&[("token", api_key.as_str())])
                    .json(&serde_json::json!({ "url": url }))
            }
        };
        Ok(request.timeout(timeout))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let request = match options.mode {
            FetchMode::Direct => {
                let mut request = self.client.get(url).timeout(options.timeout);
                for (name, value) in &options.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request
            }
            FetchMode::Render => self.render_request(url, options.timeout)?,
        };

        debug!("Dispatching {:?} fetch for {}", options.mode, url);
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(e)
            }
        })?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use mockito::Server;

    fn test_config() -> FetchConfig {
        FetchConfig {
            use_cookies: false,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_direct_fetch_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>hello</html>")
            .expect(1)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let options = FetchOptions::direct(&test_config());
        let response = fetcher
            .fetch(&format!("{}/page", server.url()), &options)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body, "<html>hello</html>");
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("text/html")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_custom_headers_are_forwarded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .match_header("x-custom", "yes")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let mut config = test_config();
        config
            .headers
            .insert("x-custom".to_string(), "yes".to_string());

        let fetcher = HttpFetcher::new(&config).unwrap();
        let options = FetchOptions::direct(&config);
        let response = fetcher
            .fetch(&format!("{}/page", server.url()), &options)
            .await
            .unwrap();
        assert_eq!(response.body, "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned_not_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let options = FetchOptions::direct(&test_config());
        let response = fetcher
            .fetch(&format!("{}/missing", server.url()), &options)
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_render_without_proxy_is_an_error() {
        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let options = FetchOptions::render(&test_config());
        let result = fetcher.fetch("https://example.com", &options).await;
        assert!(matches!(result, Err(FetchError::Proxy(_))));
    }
}
