use crate::config::ProxyConfig;
use crate::error::{FrkError, Result};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("frk/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Network path for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Straight to the origin, ignoring any proxy settings.
    Direct,
    /// Through the configured proxy, or the system proxy from the environment.
    Proxy,
}

/// Network retrieval used by the cache manager.
pub trait Fetcher: Send + Sync {
    fn fetch_bytes(&self, url: &str, route: Route) -> Result<Vec<u8>>;
    fn fetch_json(&self, url: &str, route: Route) -> Result<serde_json::Value>;
}

/// Blocking HTTP fetcher with one client per route.
pub struct HttpFetcher {
    direct: reqwest::blocking::Client,
    proxied: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(proxy: Option<&ProxyConfig>) -> Result<Self> {
        let direct = base_builder()
            .no_proxy()
            .build()
            .map_err(|e| FrkError::Fetch(format!("failed to build HTTP client: {e}")))?;

        let mut builder = base_builder();
        if let Some(cfg) = proxy {
            let mut p = reqwest::Proxy::all(&cfg.url)
                .map_err(|e| FrkError::Fetch(format!("invalid proxy '{}': {e}", cfg.url)))?;
            if let Some(user) = &cfg.username {
                p = p.basic_auth(user, cfg.password.as_deref().unwrap_or(""));
            }
            builder = builder.proxy(p);
        }
        let proxied = builder
            .build()
            .map_err(|e| FrkError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { direct, proxied })
    }

    fn client(&self, route: Route) -> &reqwest::blocking::Client {
        match route {
            Route::Direct => &self.direct,
            Route::Proxy => &self.proxied,
        }
    }

    fn get(&self, url: &str, route: Route) -> Result<reqwest::blocking::Response> {
        tracing::debug!(url, ?route, "GET");
        self.client(route)
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| FrkError::Fetch(format!("{url}: {e}")))
    }
}

fn base_builder() -> reqwest::blocking::ClientBuilder {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
}

impl Fetcher for HttpFetcher {
    fn fetch_bytes(&self, url: &str, route: Route) -> Result<Vec<u8>> {
        let bytes = self
            .get(url, route)?
            .bytes()
            .map_err(|e| FrkError::Fetch(format!("{url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    fn fetch_json(&self, url: &str, route: Route) -> Result<serde_json::Value> {
        self.get(url, route)?
            .json()
            .map_err(|e| FrkError::Fetch(format!("{url}: invalid JSON: {e}")))
    }
}

/// Refuses every request. For cache operations that must stay local.
pub struct Offline;

impl Fetcher for Offline {
    fn fetch_bytes(&self, url: &str, _route: Route) -> Result<Vec<u8>> {
        Err(FrkError::Fetch(format!("{url}: network access is disabled")))
    }

    fn fetch_json(&self, url: &str, _route: Route) -> Result<serde_json::Value> {
        Err(FrkError::Fetch(format!("{url}: network access is disabled")))
    }
}
