//! Warning rules applied to an audited page.
//!
//! Each rule is evaluated independently; the returned list follows the order
//! of the checks below.

use crate::record::PageSignals;

pub fn derive_warnings(s: &PageSignals, response_secs: f64) -> Vec<String> {
    let mut w: Vec<String> = Vec::new();

    if s.title.is_empty() {
        w.push("Missing title".into());
    } else if s.title_length < 30 {
        w.push("Title too short (< 30 chars)".into());
    } else if s.title_length > 60 {
        w.push("Title too long (> 60 chars)".into());
    }

    if s.meta_description.is_empty() {
        w.push("Missing meta description".into());
    } else if s.meta_description_length < 120 {
        w.push("Description too short (< 120 chars)".into());
    } else if s.meta_description_length > 160 {
        w.push("Description too long (> 160 chars)".into());
    }

    match s.h1_count {
        0 => w.push("Missing H1".into()),
        1 => {}
        n => w.push(format!("Multiple H1 tags ({})", n)),
    }
    if s.h2_count == 0 && s.word_count > 300 {
        w.push("No H2 headings for content structure".into());
    }

    if s.canonical.is_empty() {
        w.push("No canonical tag".into());
    }
    if s.robots.contains("noindex") {
        w.push("Noindex set".into());
    }
    if !s.https {
        w.push("Not using HTTPS".into());
    }

    if s.images_missing_alt > 0 {
        w.push(format!("Images missing alt text ({})", s.images_missing_alt));
    }
    if s.word_count < 300 {
        w.push("Thin content (< 300 words)".into());
    }
    if s.images_no_dimensions > 0 && s.total_images > 0 {
        w.push(format!(
            "Images without dimensions ({}) - affects CLS",
            s.images_no_dimensions
        ));
    }
    if s.images_not_lazy > 3 {
        w.push(format!("Images not lazy-loaded ({})", s.images_not_lazy));
    }

    if s.broken_links > 0 {
        w.push(format!("Broken internal links found ({})", s.broken_links));
    }
    if s.redirect_count > 1 {
        w.push(format!("Redirect chain ({} hops)", s.redirect_count));
    }

    if !s.has_robots_txt {
        w.push("No robots.txt file".into());
    }
    if !s.has_sitemap {
        w.push("No sitemap.xml found".into());
    }

    if s.page_size_kb > 500.0 {
        w.push(format!("Large page size ({:.0}KB)", s.page_size_kb));
    }
    if s.url_length > 75 {
        w.push("URL too long (> 75 chars)".into());
    }
    if s.url_has_underscores {
        w.push("URL contains underscores (use hyphens)".into());
    }
    if response_secs > 3.0 {
        w.push(format!("Slow response ({:.1}s)", response_secs));
    }

    if !s.has_viewport {
        w.push("Missing viewport meta tag".into());
    }
    if !s.has_lang {
        w.push("Missing lang attribute on HTML".into());
    }
    if !s.has_og_tags {
        w.push("No Open Graph tags".into());
    }
    if !s.has_schema {
        w.push("No structured data (schema.org)".into());
    }

    if s.render_blocking_count > 3 {
        w.push(format!(
            "Many render-blocking resources ({})",
            s.render_blocking_count
        ));
    }
    if s.ttfb_estimate > 1.5 {
        w.push(format!(
            "Slow TTFB ({:.2}s) - consider CDN/caching",
            s.ttfb_estimate
        ));
    }

    w
}
