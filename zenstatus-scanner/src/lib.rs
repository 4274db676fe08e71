pub mod audit;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod links;
pub mod normalize;
pub mod record;
pub mod result;
pub mod rules;
pub mod site_info;
pub mod sitemap;

pub use audit::{AuditorConfig, PageAuditor};
pub use crawler::{SitemapCrawler, SitemapCrawlerConfig};
pub use error::{FetchError, ScanError};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, ReqwestFetcher};
pub use normalize::{NormalizedUrl, normalize, site_root};
pub use record::{AuditRecord, PageSignals, RedirectHop, StatusMessage};
pub use result::{AuditTarget, CrawlResult, DiagnosticType, SitemapDiagnostic};
pub use site_info::{SiteCache, SiteInfo, SiteInfoProvider};
