use crate::error::{FetchError, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DUPLICATE_WARNING: &str = "Duplicate URL";

/// Classification of one page audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusMessage {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Page Error")]
    PageError,
    Timeout,
    #[serde(rename = "Connection Error")]
    ConnectionError,
    Error,
}

impl StatusMessage {
    pub fn from_status(status: u16) -> Self {
        if status < 400 {
            StatusMessage::Ok
        } else {
            StatusMessage::PageError
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusMessage::Ok => "OK",
            StatusMessage::PageError => "Page Error",
            StatusMessage::Timeout => "Timeout",
            StatusMessage::ConnectionError => "Connection Error",
            StatusMessage::Error => "Error",
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    /// 0 when the hop could not be fetched.
    pub status: u16,
}

/// Signals extracted from a page and its site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSignals {
    pub title: String,
    pub title_length: usize,
    pub meta_description: String,
    pub meta_description_length: usize,
    pub h1_count: usize,
    pub h2_count: usize,
    pub h3_count: usize,
    pub h4_count: usize,
    pub h5_count: usize,
    pub h6_count: usize,
    pub h1_samples: Vec<String>,
    pub canonical: String,
    pub robots: String,
    pub word_count: usize,
    pub internal_links: usize,
    pub external_links: usize,
    pub broken_links: usize,
    pub broken_link_samples: Vec<String>,
    pub images_missing_alt: usize,
    pub images_no_dimensions: usize,
    pub images_not_lazy: usize,
    pub total_images: usize,
    pub https: bool,
    pub url_length: usize,
    pub url_has_underscores: bool,
    pub redirect_count: usize,
    pub redirect_chain: Vec<RedirectHop>,
    pub has_robots_txt: bool,
    pub has_sitemap: bool,
    pub sitemap_url_count: usize,
    pub has_viewport: bool,
    pub has_lang: bool,
    pub lang: String,
    pub has_og_tags: bool,
    pub og_title: String,
    pub og_description: String,
    pub og_image: String,
    pub has_twitter_cards: bool,
    pub has_schema: bool,
    pub schema_types: Vec<String>,
    pub page_size_kb: f64,
    pub ttfb_estimate: f64,
    pub render_blocking_count: usize,
    pub inline_css_count: usize,
    pub external_scripts: usize,
}

/// Outcome of auditing a single page URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub url: String,
    #[serde(with = "status_code")]
    pub status_code: Option<u16>,
    pub status_message: StatusMessage,
    #[serde(with = "response_time")]
    pub response_time: Option<Duration>,
    #[serde(flatten)]
    pub signals: PageSignals,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

impl AuditRecord {
    /// Record for a page that could not be audited.
    pub fn failed(url: &str, status_message: StatusMessage) -> Self {
        let warning = match status_message {
            StatusMessage::Timeout => "Timeout",
            StatusMessage::ConnectionError => "Connection error",
            _ => "Unexpected error",
        };
        Self {
            url: url.to_string(),
            status_code: None,
            status_message,
            response_time: None,
            signals: PageSignals {
                url_length: url.chars().count(),
                url_has_underscores: url.contains('_'),
                ..PageSignals::default()
            },
            warnings: vec![warning.to_string()],
            duplicate_of: None,
        }
    }

    pub fn from_error(url: &str, err: &ScanError) -> Self {
        let status_message = match err {
            ScanError::NetworkTimeout(_) => StatusMessage::Timeout,
            ScanError::ConnectionFailure(_) => StatusMessage::ConnectionError,
            _ => StatusMessage::Error,
        };
        Self::failed(url, status_message)
    }

    pub fn from_fetch_error(url: &str, err: FetchError) -> Self {
        Self::from_error(url, &ScanError::from(err))
    }

    pub fn is_ok(&self) -> bool {
        self.status_message == StatusMessage::Ok
    }

    /// Mark this record as a duplicate of an earlier URL.
    pub fn annotate_duplicate(&mut self, duplicate_of: &str) {
        self.duplicate_of = Some(duplicate_of.to_string());
        if !self.warnings.iter().any(|w| w == DUPLICATE_WARNING) {
            self.warnings.push(DUPLICATE_WARNING.to_string());
        }
    }
}

/// `Some(code)` as a number, `None` as `"N/A"`.
pub mod status_code {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(code) => serializer.serialize_u16(*code),
            None => serializer.serialize_str("N/A"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u16),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Some(code),
            Raw::Text(text) => text.parse().ok(),
        })
    }
}

/// Durations as `"1.23s"`, missing ones as `"N/A"`.
pub mod response_time {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&format!("{:.2}s", d.as_secs_f64())),
            None => serializer.serialize_str("N/A"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(text
            .trim_end_matches('s')
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64))
    }
}
