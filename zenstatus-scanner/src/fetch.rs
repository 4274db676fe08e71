use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A single HTTP request issued through a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub timeout: Duration,
    pub follow_redirects: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            timeout,
            follow_redirects: true,
        }
    }

    pub fn head(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Head,
            ..Self::get(url, timeout)
        }
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects were followed.
    pub final_url: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP capability shared by the sitemap crawler and the page auditor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`Fetcher`] backed by two pooled reqwest clients, one following redirects
/// and one returning 3xx responses as-is.
#[derive(Clone)]
pub struct ReqwestFetcher {
    following: Client,
    manual: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            following: Self::build_client(reqwest::redirect::Policy::limited(10))?,
            manual: Self::build_client(reqwest::redirect::Policy::none())?,
        })
    }

    fn build_client(policy: reqwest::redirect::Policy) -> Result<Client, FetchError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(policy)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to create HTTP client: {}", e)))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        debug!("{:?} {}", request.method, request.url);

        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.manual
        };
        let builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Head => client.head(&request.url),
        };

        let response = builder.timeout(request.timeout).send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse {
            status,
            final_url,
            headers,
            body,
        })
    }
}
