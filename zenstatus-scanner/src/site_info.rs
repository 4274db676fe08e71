//! Per-site robots.txt / sitemap presence, shared across concurrent audits.

use crate::fetch::{FetchRequest, Fetcher};
use crate::sitemap::{self, ParsedDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

const MAX_ROBOTS_RULES: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub has_robots_txt: bool,
    pub robots_rules: Vec<String>,
    pub has_sitemap: bool,
    pub sitemap_url: String,
    pub sitemap_url_count: usize,
}

impl SiteInfo {
    /// Fold in another observation of the same site. Presence flags only ever
    /// go from false to true.
    pub fn merge(&mut self, other: SiteInfo) {
        if other.has_robots_txt && !self.has_robots_txt {
            self.has_robots_txt = true;
            self.robots_rules = other.robots_rules;
        }
        if other.has_sitemap && !self.has_sitemap {
            self.has_sitemap = true;
            self.sitemap_url = other.sitemap_url;
            self.sitemap_url_count = other.sitemap_url_count;
        } else if self.sitemap_url.is_empty() {
            self.sitemap_url = other.sitemap_url;
        }
    }
}

/// Get-or-compute store of [`SiteInfo`] keyed by `scheme://host[:port]`.
#[async_trait]
pub trait SiteInfoProvider: Send + Sync {
    async fn get_or_compute(&self, site_root: &str) -> SiteInfo;

    /// Record that a sitemap was found for the site after all.
    fn mark_sitemap_found(&self, site_root: &str, sitemap_url: &str, url_count: usize);
}

#[derive(Debug, Default)]
struct CacheEntry {
    info: SiteInfo,
    /// False while the entry only holds what `mark_sitemap_found` recorded.
    computed: bool,
}

/// Process-wide [`SiteInfoProvider`] that checks sites through a [`Fetcher`].
///
/// Two audits racing on an unknown site may both compute it; whichever
/// writes second merges into the first, so the entry only improves.
pub struct SiteCache {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl SiteCache {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            timeout: Duration::from_secs(5),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn get(&self, site_root: &str) -> Option<SiteInfo> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(site_root)
            .map(|entry| entry.info.clone())
    }

    fn get_computed(&self, site_root: &str) -> Option<SiteInfo> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(site_root)
            .filter(|entry| entry.computed)
            .map(|entry| entry.info.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn compute(&self, site_root: &str) -> SiteInfo {
        let mut info = SiteInfo::default();

        let robots_url = format!("{}/robots.txt", site_root);
        if let Ok(resp) = self
            .fetcher
            .fetch(FetchRequest::get(&robots_url, self.timeout))
            .await
            && resp.status == 200
            && resp.header("content-type").is_some_and(|ct| ct.contains("text"))
        {
            info.has_robots_txt = true;
            let text = resp.text();
            parse_robots(&text, &mut info);
        }

        let sitemap_url = if info.sitemap_url.is_empty() {
            format!("{}/sitemap.xml", site_root)
        } else {
            info.sitemap_url.clone()
        };
        if let Ok(resp) = self
            .fetcher
            .fetch(FetchRequest::get(&sitemap_url, self.timeout))
            .await
            && resp.status == 200
        {
            info.has_sitemap = true;
            info.sitemap_url_count = match sitemap::parse(
                &resp.body,
                resp.header("content-type"),
                resp.header("content-encoding"),
                &sitemap_url,
            ) {
                Ok(ParsedDocument::UrlSet(urls)) | Ok(ParsedDocument::SitemapIndex(urls)) => urls.len(),
                _ => 0,
            };
            info.sitemap_url = sitemap_url;
        }

        debug!(
            "Site info for {}: robots={} sitemap={}",
            site_root, info.has_robots_txt, info.has_sitemap
        );
        info
    }
}

fn parse_robots(text: &str, info: &mut SiteInfo) {
    for line in text.lines().map(str::trim) {
        if line.starts_with("Disallow:") || line.starts_with("Allow:") {
            if info.robots_rules.len() < MAX_ROBOTS_RULES {
                info.robots_rules.push(line.to_string());
            }
        } else if let Some(("Sitemap", location)) = line.split_once(':') {
            info.sitemap_url = location.trim().to_string();
        }
    }
}

#[async_trait]
impl SiteInfoProvider for SiteCache {
    async fn get_or_compute(&self, site_root: &str) -> SiteInfo {
        if let Some(info) = self.get_computed(site_root) {
            return info;
        }

        let computed = self.compute(site_root).await;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(site_root.to_string()).or_default();
        entry.info.merge(computed);
        entry.computed = true;
        entry.info.clone()
    }

    fn mark_sitemap_found(&self, site_root: &str, sitemap_url: &str, url_count: usize) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let info = &mut entries.entry(site_root.to_string()).or_default().info;
        info.has_sitemap = true;
        info.sitemap_url = sitemap_url.to_string();
        if url_count > 0 {
            info.sitemap_url_count = url_count;
        }
    }
}
