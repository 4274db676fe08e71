use crate::fetch::{FetchRequest, Fetcher};
use crate::normalize::{NormalizedUrl, normalize};
use crate::result::{CrawlResult, DiagnosticType, DuplicateUrl, SitemapDiagnostic, SkippedUrl};
use crate::sitemap::{self, ParsedDocument};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SitemapCrawlerConfig {
    pub max_urls: usize,
    pub max_depth: usize,
    pub document_timeout: Duration,
    pub skipped_sample_limit: usize,
}

impl Default for SitemapCrawlerConfig {
    fn default() -> Self {
        Self {
            max_urls: 250,
            max_depth: 15,
            document_timeout: Duration::from_secs(15),
            skipped_sample_limit: 50,
        }
    }
}

/// Queue entry: a sitemap document and how many indexes deep it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapNode {
    pub url: String,
    pub depth: usize,
}

/// Mutable state of a single traversal.
struct CrawlContext {
    queue: VecDeque<SitemapNode>,
    visited: HashSet<String>,
    enqueued: HashSet<String>,
    first_seen: HashMap<NormalizedUrl, String>,
    result: CrawlResult,
}

impl CrawlContext {
    fn new(seed_url: &str) -> Self {
        let mut ctx = Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            enqueued: HashSet::new(),
            first_seen: HashMap::new(),
            result: CrawlResult::default(),
        };
        ctx.enqueue(seed_url.to_string(), 0);
        ctx
    }

    fn enqueue(&mut self, url: String, depth: usize) -> bool {
        if self.visited.contains(&url) || !self.enqueued.insert(url.clone()) {
            return false;
        }
        self.queue.push_back(SitemapNode { url, depth });
        true
    }

    fn page_count(&self) -> usize {
        self.result.pages.len()
    }

    fn record_skip(&mut self, limit: usize, url: &str, source: &str, reason: &str) {
        if self.result.skipped.len() < limit {
            self.result.skipped.push(SkippedUrl {
                url: url.to_string(),
                source: source.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    /// Append page URLs, reporting normalized duplicates without dropping them.
    fn add_pages(&mut self, urls: Vec<String>, source: &str, config: &SitemapCrawlerConfig) -> usize {
        let mut added = 0;
        for url in urls {
            if self.page_count() >= config.max_urls {
                break;
            }
            match normalize(&url) {
                Ok(norm) => {
                    if let Some(first) = self.first_seen.get(&norm) {
                        self.result.duplicates.push(DuplicateUrl {
                            url: url.clone(),
                            duplicate_of: first.clone(),
                            source: source.to_string(),
                            position: self.page_count(),
                        });
                    } else {
                        self.first_seen.insert(norm, url.clone());
                    }
                }
                Err(e) => {
                    debug!("Could not normalize {}: {}", url, e);
                    self.record_skip(config.skipped_sample_limit, &url, source, "normalize-failed");
                }
            }
            self.result.pages.push(url);
            added += 1;
        }
        added
    }
}

/// Breadth-first traversal of sitemap and sitemap-index documents.
pub struct SitemapCrawler {
    fetcher: Arc<dyn Fetcher>,
    config: SitemapCrawlerConfig,
}

impl SitemapCrawler {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_config(fetcher, SitemapCrawlerConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn Fetcher>, config: SitemapCrawlerConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn with_max_urls(mut self, max_urls: usize) -> Self {
        self.config.max_urls = max_urls;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn with_document_timeout(mut self, timeout: Duration) -> Self {
        self.config.document_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SitemapCrawlerConfig {
        &self.config
    }

    /// Crawl from `seed_url`, collecting at most `max_urls` page URLs.
    ///
    /// Failures of individual documents are recorded in the diagnostics and
    /// never abort the traversal.
    pub async fn crawl(&self, seed_url: &str) -> CrawlResult {
        info!(
            "Starting sitemap crawl of {} (max {} urls, depth {})",
            seed_url, self.config.max_urls, self.config.max_depth
        );

        let mut ctx = CrawlContext::new(seed_url);

        while ctx.page_count() < self.config.max_urls {
            let Some(node) = ctx.queue.pop_front() else {
                break;
            };
            if ctx.visited.contains(&node.url) || node.depth > self.config.max_depth {
                continue;
            }
            ctx.visited.insert(node.url.clone());

            let diagnostic = self.visit(&mut ctx, &node).await;
            ctx.result.diagnostics.push(diagnostic);
        }

        info!(
            "Sitemap crawl of {} complete: {} documents, {} pages, {} duplicates",
            seed_url,
            ctx.result.diagnostics.len(),
            ctx.result.pages.len(),
            ctx.result.duplicates.len()
        );
        ctx.result
    }

    async fn visit(&self, ctx: &mut CrawlContext, node: &SitemapNode) -> SitemapDiagnostic {
        debug!("Fetching sitemap {} (depth {})", node.url, node.depth);

        let request = FetchRequest::get(&node.url, self.config.document_timeout);
        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Sitemap fetch failed for {}: {}", node.url, e);
                return SitemapDiagnostic::failed(&node.url, node.depth, None, e.to_string());
            }
        };

        if response.status >= 400 {
            warn!("Sitemap {} returned {}", node.url, response.status);
            return SitemapDiagnostic::failed(
                &node.url,
                node.depth,
                Some(response.status),
                format!("HTTP {}", response.status),
            );
        }

        let parsed = sitemap::parse(
            &response.body,
            response.header("content-type"),
            response.header("content-encoding"),
            &node.url,
        );

        let mut diagnostic = SitemapDiagnostic {
            url: node.url.clone(),
            depth: node.depth,
            http_status: Some(response.status),
            parsed: true,
            document_type: DiagnosticType::Unknown,
            entries_found: 0,
            entries_added: 0,
            note: None,
        };

        match parsed {
            Err(e) => {
                warn!("Skipping unparseable sitemap {}: {}", node.url, e);
                diagnostic.parsed = false;
                diagnostic.document_type = DiagnosticType::Unparsed;
                diagnostic.note = Some(e.to_string());
            }
            Ok(ParsedDocument::SitemapIndex(children)) => {
                diagnostic.document_type = DiagnosticType::SitemapIndex;
                if node.depth < self.config.max_depth {
                    for child in children {
                        if ctx.page_count() >= self.config.max_urls {
                            break;
                        }
                        if ctx.enqueue(child, node.depth + 1) {
                            diagnostic.entries_found += 1;
                        }
                    }
                }
                debug!("{} queued {} child sitemaps", node.url, diagnostic.entries_found);
            }
            Ok(ParsedDocument::UrlSet(mut urls)) => {
                diagnostic.document_type = DiagnosticType::UrlSet;
                urls.truncate(self.config.max_urls.saturating_sub(ctx.page_count()));
                diagnostic.entries_found = urls.len();
                diagnostic.entries_added = ctx.add_pages(urls, &node.url, &self.config);
            }
            Ok(ParsedDocument::Other { root }) => {
                debug!("{} has unrecognised root <{}>", node.url, root);
                diagnostic.note = Some(format!("unrecognised root element <{}>", root));
            }
        }

        diagnostic
    }
}
