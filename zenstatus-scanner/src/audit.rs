use crate::error::{FetchError, ScanError};
use crate::extract::extract_page;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::links::{check_link_status, redirect_chain, redirect_count};
use crate::normalize::site_root;
use crate::record::{AuditRecord, StatusMessage};
use crate::rules::derive_warnings;
use crate::site_info::{SiteInfo, SiteInfoProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct AuditorConfig {
    /// Page fetch timeout.
    pub timeout: Duration,
    /// Total fetch attempts on timeout or connection failure.
    pub max_retries: u32,
    /// Backoff before retry `n` is `n * backoff_base`.
    pub backoff_base: Duration,
    pub link_probe_timeout: Duration,
    /// Internal links actually probed per page.
    pub link_probe_limit: usize,
    /// Internal links collected per page for probing.
    pub link_sample_limit: usize,
    pub broken_sample_limit: usize,
    pub redirect_timeout: Duration,
    pub max_redirects: usize,
    /// Timeout for the robots.txt / sitemap probes of a site.
    pub site_info_timeout: Duration,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
            link_probe_timeout: Duration::from_secs(3),
            link_probe_limit: 5,
            link_sample_limit: 10,
            broken_sample_limit: 3,
            redirect_timeout: Duration::from_secs(5),
            max_redirects: 10,
            site_info_timeout: Duration::from_secs(5),
        }
    }
}

/// Audits single pages through an injected [`Fetcher`].
pub struct PageAuditor {
    fetcher: Arc<dyn Fetcher>,
    site_info: Arc<dyn SiteInfoProvider>,
    config: AuditorConfig,
}

impl PageAuditor {
    pub fn new(fetcher: Arc<dyn Fetcher>, site_info: Arc<dyn SiteInfoProvider>) -> Self {
        Self::with_config(fetcher, site_info, AuditorConfig::default())
    }

    pub fn with_config(
        fetcher: Arc<dyn Fetcher>,
        site_info: Arc<dyn SiteInfoProvider>,
        config: AuditorConfig,
    ) -> Self {
        Self {
            fetcher,
            site_info,
            config,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn config(&self) -> &AuditorConfig {
        &self.config
    }

    pub fn site_info(&self) -> &Arc<dyn SiteInfoProvider> {
        &self.site_info
    }

    /// Audit `url`. Failures are folded into a classified record.
    pub async fn audit(&self, url: &str) -> AuditRecord {
        match self.try_audit(url).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Audit of {} failed: {}", url, e);
                AuditRecord::from_error(url, &e)
            }
        }
    }

    pub async fn try_audit(&self, url: &str) -> Result<AuditRecord, ScanError> {
        let (response, elapsed) = self.fetch_with_retry(url).await?;
        let response_secs = elapsed.as_secs_f64();

        let page = extract_page(
            &response.text(),
            &response.final_url,
            self.config.link_sample_limit,
        );
        let mut signals = page.signals;

        signals.https = response.final_url.starts_with("https://");
        signals.url_length = url.chars().count();
        signals.url_has_underscores = match Url::parse(url) {
            Ok(parsed) => parsed.path().contains('_'),
            Err(_) => url.contains('_'),
        };
        signals.page_size_kb = response.body.len() as f64 / 1024.0;
        signals.ttfb_estimate = response_secs;

        for link in page.internal_link_urls.iter().take(self.config.link_probe_limit) {
            let status =
                check_link_status(self.fetcher.as_ref(), link, self.config.link_probe_timeout)
                    .await;
            if status == 0 || status >= 400 {
                signals.broken_links += 1;
                if signals.broken_link_samples.len() < self.config.broken_sample_limit {
                    signals.broken_link_samples.push(link.clone());
                }
            }
        }

        signals.redirect_chain = redirect_chain(
            self.fetcher.as_ref(),
            url,
            self.config.redirect_timeout,
            self.config.max_redirects,
        )
        .await;
        signals.redirect_count = redirect_count(&signals.redirect_chain);

        let site = match site_root(url) {
            Some(root) => self.site_info.get_or_compute(&root).await,
            None => SiteInfo::default(),
        };
        signals.has_robots_txt = site.has_robots_txt;
        signals.has_sitemap = site.has_sitemap;
        signals.sitemap_url_count = site.sitemap_url_count;

        let warnings = derive_warnings(&signals, response_secs);

        signals.page_size_kb = round_to(signals.page_size_kb, 1);
        signals.ttfb_estimate = round_to(signals.ttfb_estimate, 2);

        debug!(
            "Audited {} -> {} in {:.2}s ({} warnings)",
            url,
            response.status,
            response_secs,
            warnings.len()
        );

        Ok(AuditRecord {
            url: url.to_string(),
            status_code: Some(response.status),
            status_message: StatusMessage::from_status(response.status),
            response_time: Some(elapsed),
            signals,
            warnings,
            duplicate_of: None,
        })
    }

    /// GET `url`, retrying timeouts and connection failures with linear
    /// backoff until `max_retries` attempts have been made.
    async fn fetch_with_retry(&self, url: &str) -> Result<(FetchResponse, Duration), FetchError> {
        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            match self
                .fetcher
                .fetch(FetchRequest::get(url, self.config.timeout))
                .await
            {
                Ok(response) => return Ok((response, started.elapsed())),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    debug!("Retrying {} after attempt {}: {}", url, attempt, e);
                    tokio::time::sleep(self.config.backoff_base * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ReqwestFetcher;
    use crate::site_info::SiteCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FailingFetcher {
        error: FetchError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    fn failing(error: FetchError) -> Arc<FailingFetcher> {
        Arc::new(FailingFetcher {
            error,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_exhausts_retries() {
        let fetcher = failing(FetchError::Timeout("slow".into()));
        let site = Arc::new(SiteCache::new(fetcher.clone()));
        let auditor = PageAuditor::new(fetcher.clone(), site).with_max_retries(2);

        let started = Instant::now();
        let record = auditor.audit("https://slow.example/page").await;

        assert_eq!(record.status_message, StatusMessage::Timeout);
        assert_eq!(record.status_code, None);
        assert_eq!(record.warnings, vec!["Timeout"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_is_classified() {
        let fetcher = failing(FetchError::Connection("refused".into()));
        let site = Arc::new(SiteCache::new(fetcher.clone()));
        let auditor = PageAuditor::new(fetcher.clone(), site).with_max_retries(3);

        let record = auditor.audit("https://down.example/").await;
        assert_eq!(record.status_message, StatusMessage::ConnectionError);
        assert_eq!(record.warnings, vec!["Connection error"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let fetcher = failing(FetchError::Other("bad".into()));
        let site = Arc::new(SiteCache::new(fetcher.clone()));
        let auditor = PageAuditor::new(fetcher.clone(), site).with_max_retries(5);

        let record = auditor.audit("https://odd.example/").await;
        assert_eq!(record.status_message, StatusMessage::Error);
        assert_eq!(record.warnings, vec!["Unexpected error"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_audit_full_page() {
        let server = MockServer::start().await;
        let body = r#"<html lang="en"><head>
            <title>Short</title>
            <meta name="viewport" content="width=device-width">
            </head><body>
            <h1>Hello</h1>
            <a href="/ok">ok</a>
            <a href="/gone">gone</a>
            <a href="https://elsewhere.example/">out</a>
            </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/my_page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/my_page"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("User-agent: *\nDisallow: /admin\n"),
            )
            .mount(&server)
            .await;

        let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new().unwrap());
        let site = Arc::new(SiteCache::new(fetcher.clone()));
        let auditor = PageAuditor::new(fetcher, site);

        let url = format!("{}/my_page", server.uri());
        let record = auditor.audit(&url).await;

        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.status_message, StatusMessage::Ok);
        assert!(record.response_time.is_some());

        let s = &record.signals;
        assert_eq!(s.title, "Short");
        assert_eq!(s.h1_count, 1);
        assert_eq!(s.internal_links, 2);
        assert_eq!(s.external_links, 1);
        assert_eq!(s.broken_links, 1);
        assert_eq!(s.broken_link_samples, vec![format!("{}/gone", server.uri())]);
        assert_eq!(s.redirect_count, 0);
        assert!(!s.https);
        assert!(s.url_has_underscores);
        assert!(s.has_robots_txt);
        assert!(!s.has_sitemap);

        for expected in [
            "Title too short (< 30 chars)",
            "Missing meta description",
            "Not using HTTPS",
            "Broken internal links found (1)",
            "No sitemap.xml found",
            "URL contains underscores (use hyphens)",
            "No Open Graph tags",
        ] {
            assert!(
                record.warnings.iter().any(|w| w == expected),
                "missing {:?} in {:?}",
                expected,
                record.warnings
            );
        }
        assert!(!record.warnings.iter().any(|w| w == "No robots.txt file"));
        assert!(!record.warnings.iter().any(|w| w == "Missing viewport meta tag"));
    }

    #[tokio::test]
    async fn test_error_status_is_page_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestFetcher::new().unwrap());
        let site = Arc::new(SiteCache::new(fetcher.clone()));
        let auditor = PageAuditor::new(fetcher, site);

        let record = auditor.audit(&format!("{}/broken", server.uri())).await;
        assert_eq!(record.status_code, Some(500));
        assert_eq!(record.status_message, StatusMessage::PageError);
        assert!(record.warnings.iter().any(|w| w == "Missing title"));
    }
}
