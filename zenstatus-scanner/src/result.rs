use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A page URL that normalized to the same value as an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateUrl {
    pub url: String,
    /// Raw URL of the first page with the same normalized form.
    pub duplicate_of: String,
    /// Sitemap document the duplicate was found in.
    pub source: String,
    /// Index of the duplicate within [`CrawlResult::pages`].
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticType {
    /// The document could not be fetched or returned an error status.
    Error,
    /// The document was fetched but is neither XML nor gzipped XML.
    Unparsed,
    SitemapIndex,
    UrlSet,
    /// Parsed XML with an unrecognised root element.
    Unknown,
    /// Run-level note, not tied to a single fetched document.
    Warning,
}

/// One trace record per sitemap document the crawler attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapDiagnostic {
    pub url: String,
    pub depth: usize,
    pub http_status: Option<u16>,
    pub parsed: bool,
    pub document_type: DiagnosticType,
    pub entries_found: usize,
    pub entries_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SitemapDiagnostic {
    pub fn failed(url: &str, depth: usize, http_status: Option<u16>, note: String) -> Self {
        Self {
            url: url.to_string(),
            depth,
            http_status,
            parsed: false,
            document_type: DiagnosticType::Error,
            entries_found: 0,
            entries_added: 0,
            note: Some(note),
        }
    }

    pub fn warning(url: &str, note: impl Into<String>) -> Self {
        Self {
            document_type: DiagnosticType::Warning,
            ..Self::failed(url, 0, None, note.into())
        }
    }
}

/// Outcome of one sitemap traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Page URLs in discovery order, raw duplicates included.
    pub pages: Vec<String>,
    pub duplicates: Vec<DuplicateUrl>,
    pub skipped: Vec<SkippedUrl>,
    pub diagnostics: Vec<SitemapDiagnostic>,
}

impl CrawlResult {
    /// Raw URL to the raw URL of its first-seen equivalent.
    pub fn duplicate_map(&self) -> HashMap<String, String> {
        self.duplicates
            .iter()
            .map(|d| (d.url.clone(), d.duplicate_of.clone()))
            .collect()
    }

    /// Pages paired with their duplicate annotation.
    ///
    /// Annotations are positional, so when the same raw URL is listed twice
    /// only the second occurrence is marked.
    pub fn targets(&self) -> Vec<AuditTarget> {
        let by_position: HashMap<usize, &str> = self
            .duplicates
            .iter()
            .map(|d| (d.position, d.duplicate_of.as_str()))
            .collect();

        self.pages
            .iter()
            .enumerate()
            .map(|(idx, url)| AuditTarget {
                url: url.clone(),
                duplicate_of: by_position.get(&idx).map(|s| s.to_string()),
            })
            .collect()
    }
}

/// A page URL queued for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub url: String,
    pub duplicate_of: Option<String>,
}

impl AuditTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duplicate_of: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawl_with_literal_duplicate() -> CrawlResult {
        CrawlResult {
            pages: vec![
                "https://a.com/x".to_string(),
                "https://a.com/y".to_string(),
                "https://a.com/x".to_string(),
            ],
            duplicates: vec![DuplicateUrl {
                url: "https://a.com/x".to_string(),
                duplicate_of: "https://a.com/x".to_string(),
                source: "https://a.com/sitemap.xml".to_string(),
                position: 2,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_targets_mark_only_later_occurrence() {
        let targets = crawl_with_literal_duplicate().targets();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].duplicate_of, None);
        assert_eq!(targets[1].duplicate_of, None);
        assert_eq!(targets[2].duplicate_of.as_deref(), Some("https://a.com/x"));
    }

    #[test]
    fn test_duplicate_map() {
        let map = crawl_with_literal_duplicate().duplicate_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["https://a.com/x"], "https://a.com/x");
    }

    #[test]
    fn test_warning_diagnostic() {
        let d = SitemapDiagnostic::warning("All sitemaps", "nothing found");
        assert_eq!(d.document_type, DiagnosticType::Warning);
        assert!(!d.parsed);
        assert_eq!(d.note.as_deref(), Some("nothing found"));
    }
}
