//! Parsing of individual sitemap documents.
//!
//! A document is either a `<urlset>` of page URLs or a `<sitemapindex>` of
//! child sitemap URLs. Element names are matched on their local name so that
//! namespaced and prefixed documents are handled the same way.

use crate::error::{Result, ScanError};
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    SitemapIndex,
    UrlSet,
    /// Well-formed XML with some other root element.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDocument {
    /// Child sitemap URLs from `<sitemap><loc>` entries.
    SitemapIndex(Vec<String>),
    /// Page URLs from `<url><loc>` entries.
    UrlSet(Vec<String>),
    Other { root: String },
}

impl ParsedDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            ParsedDocument::SitemapIndex(_) => DocumentKind::SitemapIndex,
            ParsedDocument::UrlSet(_) => DocumentKind::UrlSet,
            ParsedDocument::Other { .. } => DocumentKind::Other,
        }
    }
}

/// Parse a fetched sitemap document.
///
/// The bytes are parsed as XML first. When that fails and the URL or content
/// type hint at gzip, while the content encoding says the transport has not
/// already inflated the body, the bytes are decompressed and parsed again.
pub fn parse(
    bytes: &[u8],
    content_type: Option<&str>,
    content_encoding: Option<&str>,
    url: &str,
) -> Result<ParsedDocument> {
    let direct_err = match parse_xml(bytes) {
        Ok(doc) => return Ok(doc),
        Err(e) => e,
    };

    let gzip_hint = url.to_ascii_lowercase().ends_with(".gz")
        || content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("gzip"));
    let already_inflated =
        content_encoding.is_some_and(|ce| ce.to_ascii_lowercase().contains("gzip"));

    if !gzip_hint || already_inflated {
        return Err(direct_err);
    }

    debug!("Retrying {} as gzip", url);
    let inflated = decompress_gzip(bytes)
        .map_err(|e| ScanError::UnparseableDocument(format!("{}: gzip: {}", url, e)))?;
    parse_xml(&inflated)
}

fn decompress_gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Keep a `<loc>` value only if it is an absolute http(s) URL.
fn clean_loc(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.starts_with("http://") || text.starts_with("https://") {
        Some(text.to_string())
    } else {
        None
    }
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_ascii_lowercase()
}

fn parse_xml(bytes: &[u8]) -> Result<ParsedDocument> {
    let unparseable = |msg: String| ScanError::UnparseableDocument(msg);

    // Strip a UTF-8 BOM and require markup up front; binary payloads such as
    // gzip would otherwise be read as stray text.
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => {}
        _ => return Err(unparseable("document does not start with markup".into())),
    }

    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();

    let mut root: Option<String> = None;
    let mut depth = 0usize;
    // Local name of the current depth-2 entry (`url` / `sitemap`)
    let mut entry: Option<String> = None;
    let mut entry_has_loc = false;
    let mut in_loc = false;
    let mut loc_text = String::new();
    let mut locs = Vec::new();
    let mut finished = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| unparseable(format!("XML error at {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(e) => {
                let name = local_name(e.local_name().as_ref());
                if finished {
                    return Err(unparseable("content after root element".into()));
                }
                depth += 1;
                match depth {
                    1 => root = Some(name),
                    2 => {
                        entry = Some(name);
                        entry_has_loc = false;
                    }
                    3 if name == "loc" && !entry_has_loc => {
                        in_loc = true;
                        loc_text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if finished {
                    return Err(unparseable("content after root element".into()));
                }
                if depth == 0 {
                    root = Some(local_name(e.local_name().as_ref()));
                    finished = true;
                }
            }
            Event::Text(e) if in_loc => {
                let text = e
                    .unescape()
                    .map_err(|err| unparseable(format!("bad text in <loc>: {}", err)))?;
                loc_text.push_str(&text);
            }
            Event::CData(e) if in_loc => {
                loc_text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(unparseable("unbalanced closing tag".into()));
                }
                match depth {
                    3 if in_loc => {
                        in_loc = false;
                        entry_has_loc = true;
                        if let Some(entry_name) = &entry {
                            locs.push((entry_name.clone(), loc_text.clone()));
                        }
                    }
                    2 => entry = None,
                    1 => finished = true,
                    _ => {}
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(unparseable("unexpected end of document".into()));
    }
    let root = root.ok_or_else(|| unparseable("no root element".into()))?;

    let collect = |wanted: &str| -> Vec<String> {
        locs.iter()
            .filter(|(entry_name, _)| entry_name == wanted)
            .filter_map(|(_, loc)| clean_loc(loc))
            .collect()
    };

    if root == "sitemapindex" {
        Ok(ParsedDocument::SitemapIndex(collect("sitemap")))
    } else if root == "urlset" {
        Ok(ParsedDocument::UrlSet(collect("url")))
    } else {
        Ok(ParsedDocument::Other { root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc> https://example.com/ </loc><priority>1.0</priority></url>
          <url><loc>https://example.com/about?a=1&amp;b=2</loc></url>
          <url><loc>/relative/path</loc></url>
          <url><loc>ftp://example.com/file</loc></url>
          <url><lastmod>2024-01-15</lastmod></url>
        </urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <sm:sitemapindex xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sm:sitemap><sm:loc>https://example.com/sitemap-posts.xml</sm:loc></sm:sitemap>
          <sm:sitemap><sm:loc><![CDATA[https://example.com/sitemap-pages.xml]]></sm:loc></sm:sitemap>
        </sm:sitemapindex>"#;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_urlset_filters_and_trims_locs() {
        let doc = parse(URLSET.as_bytes(), None, None, "https://example.com/sitemap.xml").unwrap();
        assert_eq!(
            doc,
            ParsedDocument::UrlSet(vec![
                "https://example.com/".to_string(),
                "https://example.com/about?a=1&b=2".to_string(),
            ])
        );
        assert_eq!(doc.kind(), DocumentKind::UrlSet);
    }

    #[test]
    fn test_parse_prefixed_sitemap_index() {
        let doc = parse(INDEX.as_bytes(), Some("application/xml"), None, "https://example.com/index.xml")
            .unwrap();
        assert_eq!(
            doc,
            ParsedDocument::SitemapIndex(vec![
                "https://example.com/sitemap-posts.xml".to_string(),
                "https://example.com/sitemap-pages.xml".to_string(),
            ])
        );
    }

    #[test]
    fn test_other_root_yields_no_entries() {
        let doc = parse(b"<rss><channel><url><loc>https://x.com</loc></url></channel></rss>", None, None, "u")
            .unwrap();
        assert_eq!(doc, ParsedDocument::Other { root: "rss".to_string() });
    }

    #[test]
    fn test_empty_root_element() {
        let doc = parse(b"<urlset/>", None, None, "u").unwrap();
        assert_eq!(doc, ParsedDocument::UrlSet(vec![]));
    }

    #[test]
    fn test_gzip_payload_with_gz_suffix() {
        let compressed = gzip(URLSET.as_bytes());
        let doc = parse(&compressed, None, None, "https://example.com/sitemap.xml.gz").unwrap();
        assert!(matches!(doc, ParsedDocument::UrlSet(ref urls) if urls.len() == 2));
    }

    #[test]
    fn test_gzip_payload_with_content_type_hint() {
        let compressed = gzip(INDEX.as_bytes());
        let doc = parse(&compressed, Some("application/x-gzip"), None, "https://example.com/sm").unwrap();
        assert_eq!(doc.kind(), DocumentKind::SitemapIndex);
    }

    #[test]
    fn test_gzip_without_hint_is_unparseable() {
        let compressed = gzip(URLSET.as_bytes());
        let err = parse(&compressed, Some("application/xml"), None, "https://example.com/sitemap.xml");
        assert!(matches!(err, Err(ScanError::UnparseableDocument(_))));
    }

    #[test]
    fn test_gzip_not_retried_when_transport_inflated() {
        let compressed = gzip(URLSET.as_bytes());
        let err = parse(&compressed, None, Some("gzip"), "https://example.com/sitemap.xml.gz");
        assert!(err.is_err());
    }

    #[test]
    fn test_malformed_documents_are_errors() {
        let inputs: [&[u8]; 6] = [
            b"",
            b"not xml at all",
            b"<urlset><url><loc>https://x.com</loc></url>",
            b"<urlset></sitemapindex>",
            b"<html><body>oops</body></html><extra/>",
            b"\x00\x01\x02\x03",
        ];
        for input in inputs {
            assert!(
                parse(input, None, None, "https://example.com/sitemap.xml").is_err(),
                "expected error for {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_only_first_loc_per_entry() {
        let xml = b"<urlset><url><loc>https://a.com/1</loc><loc>https://a.com/2</loc></url></urlset>";
        let doc = parse(xml, None, None, "u").unwrap();
        assert_eq!(doc, ParsedDocument::UrlSet(vec!["https://a.com/1".to_string()]));
    }
}
