//! HTML signal extraction for the page auditor.

use crate::record::PageSignals;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {:?}: {:?}", css, e))
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="description"]"#));
static META_ROBOTS: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="robots"]"#));
static META_VIEWPORT: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="viewport"]"#));
static TWITTER_CARD: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[name="twitter:card"]"#));
static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="og:description"]"#));
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:image"]"#));
static LINK_REL: LazyLock<Selector> = LazyLock::new(|| selector("link[rel]"));
static HTML_ROOT: LazyLock<Selector> = LazyLock::new(|| selector("html"));
static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));
static HEADINGS: LazyLock<[Selector; 6]> = LazyLock::new(|| {
    ["h1", "h2", "h3", "h4", "h5", "h6"].map(selector)
});
static IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static HEAD_SCRIPTS: LazyLock<Selector> = LazyLock::new(|| selector("head script[src]"));
static HEAD_STYLESHEETS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"head link[rel~="stylesheet"]"#));
static HEAD_STYLES: LazyLock<Selector> = LazyLock::new(|| selector("head style"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

/// Signals read from the HTML alone, plus the internal links worth probing.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub signals: PageSignals,
    pub internal_link_urls: Vec<String>,
}

fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name)
}

fn first_attr(doc: &Html, sel: &Selector, name: &str) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| attr(el, name))
        .map(|v| v.trim().to_string())
}

fn joined_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect::<Vec<_>>().join("")
}

/// Number of `\w+` runs in the text.
pub fn count_words(text: &str) -> usize {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .count()
}

fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Authority an `href` points at, empty for relative references.
fn href_authority(base: &Url, href: &str) -> String {
    if href.starts_with("//") {
        base.join(href).map(|u| authority(&u)).unwrap_or_default()
    } else {
        Url::parse(href).map(|u| authority(&u)).unwrap_or_default()
    }
}

fn schema_types(doc: &Html) -> Vec<String> {
    let type_of = |value: &serde_json::Value| -> Option<String> {
        match value.get("@type")? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    };

    let mut types = Vec::new();
    for script in doc.select(&LD_JSON).take(3) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        match &data {
            serde_json::Value::Object(_) => types.extend(type_of(&data)),
            serde_json::Value::Array(items) => {
                types.extend(items.iter().take(2).filter_map(&type_of));
            }
            _ => {}
        }
    }
    types
}

/// Extract on-page signals from `html`, resolving links against `page_url`
/// (the URL the page was finally served from).
pub fn extract_page(html: &str, page_url: &str, link_sample_limit: usize) -> ExtractedPage {
    let doc = Html::parse_document(html);
    let mut s = PageSignals::default();

    s.title = doc.select(&TITLE).next().map(joined_text).unwrap_or_default();
    s.title_length = s.title.chars().count();

    s.meta_description = first_attr(&doc, &META_DESCRIPTION, "content").unwrap_or_default();
    s.meta_description_length = s.meta_description.chars().count();

    s.canonical = doc
        .select(&LINK_REL)
        .find(|el| attr(*el, "rel").is_some_and(|rel| rel.to_lowercase().contains("canonical")))
        .and_then(|el| attr(el, "href"))
        .unwrap_or_default()
        .to_string();

    s.robots = first_attr(&doc, &META_ROBOTS, "content")
        .unwrap_or_default()
        .to_lowercase();
    s.has_viewport = doc.select(&META_VIEWPORT).next().is_some();

    s.lang = first_attr(&doc, &HTML_ROOT, "lang").unwrap_or_default();
    s.has_lang = !s.lang.is_empty();

    s.og_title = first_attr(&doc, &OG_TITLE, "content").unwrap_or_default();
    s.og_description = first_attr(&doc, &OG_DESCRIPTION, "content").unwrap_or_default();
    s.og_image = first_attr(&doc, &OG_IMAGE, "content").unwrap_or_default();
    s.has_og_tags = !(s.og_title.is_empty() && s.og_description.is_empty() && s.og_image.is_empty());
    s.has_twitter_cards = doc.select(&TWITTER_CARD).next().is_some();

    s.has_schema = doc.select(&LD_JSON).next().is_some();
    s.schema_types = schema_types(&doc);

    let h1: Vec<String> = doc.select(&HEADINGS[0]).map(joined_text).collect();
    s.h1_count = h1.len();
    s.h1_samples = h1.into_iter().take(3).collect();
    s.h2_count = doc.select(&HEADINGS[1]).count();
    s.h3_count = doc.select(&HEADINGS[2]).count();
    s.h4_count = doc.select(&HEADINGS[3]).count();
    s.h5_count = doc.select(&HEADINGS[4]).count();
    s.h6_count = doc.select(&HEADINGS[5]).count();

    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    s.word_count = count_words(&text);

    for img in doc.select(&IMAGES) {
        s.total_images += 1;
        if attr(img, "alt").is_none_or(|alt| alt.trim().is_empty()) {
            s.images_missing_alt += 1;
        }
        let has_dimension = [attr(img, "width"), attr(img, "height")]
            .iter()
            .any(|v| v.is_some_and(|v| !v.is_empty()));
        if !has_dimension {
            s.images_no_dimensions += 1;
        }
        let lazy = attr(img, "loading").is_some_and(|l| l.eq_ignore_ascii_case("lazy"));
        let prioritised = attr(img, "fetchpriority").is_some_and(|p| !p.is_empty());
        if !lazy && !prioritised {
            s.images_not_lazy += 1;
        }
    }

    for script in doc.select(&HEAD_SCRIPTS) {
        if attr(script, "src").is_some_and(|src| src.is_empty()) {
            continue;
        }
        s.external_scripts += 1;
        if attr(script, "async").is_none() && attr(script, "defer").is_none() {
            s.render_blocking_count += 1;
        }
    }
    for link in doc.select(&HEAD_STYLESHEETS) {
        let media = attr(link, "media").unwrap_or_default().to_lowercase();
        if media.is_empty() || media == "all" || media == "screen" {
            s.render_blocking_count += 1;
        }
    }
    s.inline_css_count = doc.select(&HEAD_STYLES).count();

    let mut internal_link_urls = Vec::new();
    if let Ok(base) = Url::parse(page_url) {
        let base_authority = authority(&base);
        for anchor in doc.select(&ANCHORS) {
            let Some(href) = attr(anchor, "href") else {
                continue;
            };
            let target = href_authority(&base, href);
            if target.is_empty() || target == base_authority {
                s.internal_links += 1;
                if internal_link_urls.len() < link_sample_limit
                    && let Ok(full) = base.join(href)
                    && matches!(full.scheme(), "http" | "https")
                {
                    internal_link_urls.push(full.to_string());
                }
            } else {
                s.external_links += 1;
            }
        }
    }

    ExtractedPage {
        signals: s,
        internal_link_urls,
    }
}
