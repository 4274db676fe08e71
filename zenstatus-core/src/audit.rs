//! Audit requests: optional sitemap expansion of the seed URLs followed by a
//! pipeline run.

use crate::error::{PipelineError, Result};
use crate::events::AuditEvent;
use crate::pipeline::{AuditPipeline, PipelineConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zenstatus_scanner::{
    AuditRecord, AuditTarget, AuditorConfig, Fetcher, PageAuditor, SiteCache, SiteInfoProvider,
    SitemapCrawler, SitemapCrawlerConfig, SitemapDiagnostic, normalize, site_root,
};

pub const DEFAULT_MAX_PAGES: usize = 100;
pub const MAX_PAGES_LIMIT: usize = 10_000;
pub const EMPTY_SITEMAPS_NOTE: &str = "No URLs found in sitemaps. Auditing entered URLs only.";

const EVENT_BUFFER: usize = 64;

/// What to audit.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    pub urls: Vec<String>,
    /// Expand each seed into the pages listed by its sitemap.
    pub use_sitemap: bool,
    /// Sitemap to use for every seed instead of `<seed>/sitemap.xml`.
    pub sitemap_url: Option<String>,
    /// Page cap per sitemap crawl, within `1..=MAX_PAGES_LIMIT`.
    pub max_pages: usize,
}

impl AuditRequest {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            use_sitemap: false,
            sitemap_url: None,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_sitemap(mut self, use_sitemap: bool) -> Self {
        self.use_sitemap = use_sitemap;
        self
    }

    pub fn with_sitemap_url(mut self, sitemap_url: Option<String>) -> Self {
        self.sitemap_url = sitemap_url
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.clamp(1, MAX_PAGES_LIMIT);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(PipelineError::NoUrls);
        }
        Ok(())
    }
}

/// Targets after sitemap expansion, plus the crawl trace.
#[derive(Debug, Clone, Default)]
pub struct ExpandedTargets {
    pub targets: Vec<AuditTarget>,
    pub diagnostics: Vec<SitemapDiagnostic>,
}

/// Final results of a request.
#[derive(Debug, Clone, Default)]
pub struct AuditOutcome {
    pub results: Vec<AuditRecord>,
    pub sitemap_debug: Vec<SitemapDiagnostic>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub crawler: SitemapCrawlerConfig,
    pub auditor: AuditorConfig,
    pub pipeline: PipelineConfig,
}

/// Equality key for seeds and pages across sitemaps.
fn dedup_key(url: &str) -> String {
    match normalize(url) {
        Ok(normalized) => normalized.to_string(),
        Err(_) => url.to_lowercase().trim_end_matches('/').to_string(),
    }
}

/// Entry point for audit requests. Holds the fetcher and the site-info
/// cache shared by every request it serves.
pub struct AuditService {
    fetcher: Arc<dyn Fetcher>,
    site_info: Arc<dyn SiteInfoProvider>,
    options: AuditOptions,
}

impl AuditService {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_options(fetcher, AuditOptions::default())
    }

    pub fn with_options(fetcher: Arc<dyn Fetcher>, options: AuditOptions) -> Self {
        let site_info = Arc::new(
            SiteCache::new(fetcher.clone()).with_timeout(options.auditor.site_info_timeout),
        );
        Self {
            fetcher,
            site_info,
            options,
        }
    }

    pub fn with_site_info(mut self, site_info: Arc<dyn SiteInfoProvider>) -> Self {
        self.site_info = site_info;
        self
    }

    pub fn options(&self) -> &AuditOptions {
        &self.options
    }

    pub fn site_info(&self) -> &Arc<dyn SiteInfoProvider> {
        &self.site_info
    }

    /// Turn the request's seeds into audit targets.
    ///
    /// Without sitemap expansion the seeds are audited as given. With it,
    /// each seed contributes the pages of its sitemap, or itself when the
    /// sitemap yields nothing. Pages already contributed by an earlier seed
    /// are kept but marked as duplicates of the first one.
    pub async fn expand(&self, request: &AuditRequest) -> ExpandedTargets {
        if !request.use_sitemap {
            return ExpandedTargets {
                targets: request.urls.iter().map(AuditTarget::new).collect(),
                diagnostics: Vec::new(),
            };
        }

        let crawler = SitemapCrawler::with_config(self.fetcher.clone(), self.options.crawler.clone())
            .with_max_urls(request.max_pages);

        let mut expanded = ExpandedTargets::default();
        let mut seen: HashMap<String, String> = HashMap::new();

        for seed in &request.urls {
            let base = seed.trim_end_matches('/');
            let sitemap_url = request
                .sitemap_url
                .clone()
                .unwrap_or_else(|| format!("{}/sitemap.xml", base));

            let crawl = crawler.crawl(&sitemap_url).await;
            expanded.diagnostics.extend(crawl.diagnostics.iter().cloned());

            if crawl.pages.is_empty() {
                debug!("Sitemap {} listed no pages, auditing {}", sitemap_url, seed);
                let key = dedup_key(seed);
                if !seen.contains_key(&key) {
                    seen.insert(key, seed.clone());
                    expanded.targets.push(AuditTarget::new(seed.as_str()));
                }
                continue;
            }

            let root = site_root(base).unwrap_or_else(|| base.to_string());
            self.site_info
                .mark_sitemap_found(&root, &sitemap_url, crawl.pages.len());

            for mut target in crawl.targets() {
                let key = dedup_key(&target.url);
                match seen.get(&key) {
                    Some(first) => {
                        if target.duplicate_of.is_none() {
                            target.duplicate_of = Some(first.clone());
                        }
                    }
                    None => {
                        seen.insert(key, target.url.clone());
                    }
                }
                expanded.targets.push(target);
            }
        }

        if expanded.targets.is_empty() {
            expanded
                .diagnostics
                .push(SitemapDiagnostic::warning("All sitemaps", EMPTY_SITEMAPS_NOTE));
            expanded.targets = request.urls.iter().map(AuditTarget::new).collect();
        }

        info!(
            "Expanded {} seeds into {} pages",
            request.urls.len(),
            expanded.targets.len()
        );
        expanded
    }

    /// Run `request` to completion, streaming events to `events`.
    ///
    /// The terminal [`AuditEvent::Complete`] is only sent when the run was
    /// not cancelled.
    pub async fn execute(
        &self,
        request: AuditRequest,
        events: mpsc::Sender<AuditEvent>,
        cancel: CancellationToken,
    ) -> Result<AuditOutcome> {
        request.validate()?;
        self.options.pipeline.validate()?;

        let expanded = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Cancelled during sitemap expansion");
                return Ok(AuditOutcome { cancelled: true, ..Default::default() });
            }
            expanded = self.expand(&request) => expanded,
        };

        let auditor = Arc::new(PageAuditor::with_config(
            self.fetcher.clone(),
            self.site_info.clone(),
            self.options.auditor.clone(),
        ));
        let pipeline = AuditPipeline::with_config(auditor, self.options.pipeline.clone())?;
        let run = pipeline.run(expanded.targets, &events, &cancel).await;

        let outcome = AuditOutcome {
            results: run.results,
            sitemap_debug: expanded.diagnostics,
            cancelled: run.cancelled,
        };

        if !outcome.cancelled {
            let complete = AuditEvent::Complete {
                results: outcome.results.clone(),
                sitemap_debug: outcome.sitemap_debug.clone(),
            };
            if events.send(complete).await.is_err() {
                debug!("Event receiver gone before completion");
            }
        }
        Ok(outcome)
    }

    /// Run `request` on a background task, returning its event stream.
    pub fn spawn(
        self: Arc<Self>,
        request: AuditRequest,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<AuditEvent>, JoinHandle<Result<AuditOutcome>>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(async move { self.execute(request, tx, cancel).await });
        (rx, handle)
    }
}
