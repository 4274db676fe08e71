// Report generation from audit results

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use url::Url;
use zenstatus_scanner::{AuditRecord, SitemapDiagnostic, StatusMessage};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

const HIGH_SEVERITY: [&str; 8] = [
    "Missing title",
    "Missing H1",
    "Missing meta description",
    "Noindex set",
    "Page Error",
    "Missing viewport",
    "Not using HTTPS",
    "Broken internal links",
];

const MEDIUM_SEVERITY: [&str; 10] = [
    "Title too long",
    "Description too long",
    "Multiple H1 tags",
    "No canonical tag",
    "No Open Graph",
    "No structured data",
    "No schema",
    "Redirect chain",
    "No robots.txt",
    "No sitemap",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

pub fn warning_severity(warning: &str) -> Severity {
    if HIGH_SEVERITY.iter().any(|h| warning.contains(h)) {
        Severity::High
    } else if MEDIUM_SEVERITY.iter().any(|m| warning.contains(m)) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// 0-100 score for one page; every failed check subtracts its weight.
pub fn seo_score(record: &AuditRecord) -> u32 {
    let s = &record.signals;
    let mut score: i64 = 100;

    // Indexability
    if let Some(code) = record.status_code {
        if code >= 400 {
            score -= 20;
        }
        if code >= 500 {
            score -= 25;
        }
    }
    if s.robots.contains("noindex") {
        score -= 20;
    }
    if !s.https {
        score -= 15;
    }

    // Essentials
    if s.title.is_empty() {
        score -= 12;
    }
    if s.meta_description.is_empty() {
        score -= 12;
    }
    if s.h1_count == 0 {
        score -= 12;
    }

    if !s.title.is_empty() && s.title_length < 30 {
        score -= 8;
    }
    if !s.title.is_empty() && s.title_length > 60 {
        score -= 8;
    }
    if !s.meta_description.is_empty() && s.meta_description_length < 120 {
        score -= 8;
    }
    if !s.meta_description.is_empty() && s.meta_description_length > 160 {
        score -= 8;
    }

    if s.h1_count > 1 {
        score -= 7;
    }
    if s.canonical.is_empty() {
        score -= 7;
    }
    if !s.has_viewport {
        score -= 7;
    }
    if s.word_count < 300 {
        score -= 7;
    }

    if !s.has_sitemap {
        score -= 5;
    }
    if !s.has_robots_txt {
        score -= 4;
    }
    if s.redirect_count > 0 {
        score -= 4;
    }
    if s.url_has_underscores {
        score -= 3;
    }

    if s.images_missing_alt > 0 {
        score -= (s.images_missing_alt as i64 / 5 + 3).min(10);
    }
    if s.images_no_dimensions > 10 {
        score -= (s.images_no_dimensions as i64 / 10 + 2).min(7);
    }
    if s.images_not_lazy > 10 {
        score -= (s.images_not_lazy as i64 / 15 + 2).min(6);
    }
    if s.broken_links > 0 {
        score -= (s.broken_links as i64 * 2).min(8);
    }

    if !s.has_lang {
        score -= 3;
    }
    if !s.has_og_tags {
        score -= 3;
    }
    if !s.has_schema {
        score -= 3;
    }
    if !s.has_twitter_cards {
        score -= 2;
    }

    // Performance
    if s.render_blocking_count > 20 {
        score -= (s.render_blocking_count as i64 / 10).min(8);
    }
    if let Some(elapsed) = record.response_time {
        let secs = elapsed.as_secs_f64();
        if secs > 3.0 {
            score -= 6;
        } else if secs > 2.0 {
            score -= 4;
        } else if secs > 1.0 {
            score -= 2;
        }
    }
    if s.page_size_kb > 2000.0 {
        score -= (((s.page_size_kb - 2000.0) / 500.0).floor() as i64).min(5);
    }

    score.clamp(0, 100) as u32
}

pub fn score_label(score: u32) -> &'static str {
    match score {
        90.. => "Excellent",
        70..=89 => "Good",
        50..=69 => "Average",
        30..=49 => "Poor",
        _ => "Critical",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCount {
    pub warning: String,
    pub pages: usize,
    pub severity: Severity,
}

/// Warnings ranked by the number of pages carrying them. Ties keep the
/// order in which the warnings first appeared.
pub fn top_issues(results: &[AuditRecord], limit: usize) -> Vec<IssueCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for warning in results.iter().flat_map(|r| r.warnings.iter()) {
        let count = counts.entry(warning.as_str()).or_insert(0);
        if *count == 0 {
            order.push(warning.as_str());
        }
        *count += 1;
    }

    let mut ranked: Vec<IssueCount> = order
        .into_iter()
        .map(|w| IssueCount {
            warning: w.to_string(),
            pages: counts.get(w).copied().unwrap_or(0),
            severity: warning_severity(w),
        })
        .collect();
    ranked.sort_by(|a, b| b.pages.cmp(&a.pages));
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
    pub critical: usize,
}

#[derive(Debug, Clone)]
pub struct ReportData {
    pub results: Vec<AuditRecord>,
    pub sitemap_debug: Vec<SitemapDiagnostic>,
    pub generated_at: DateTime<Utc>,
}

impl ReportData {
    pub fn new(results: Vec<AuditRecord>, sitemap_debug: Vec<SitemapDiagnostic>) -> Self {
        Self {
            results,
            sitemap_debug,
            generated_at: Utc::now(),
        }
    }

    pub fn average_score(&self) -> u32 {
        if self.results.is_empty() {
            return 0;
        }
        let total: u32 = self.results.iter().map(seo_score).sum();
        (f64::from(total) / self.results.len() as f64).round() as u32
    }

    pub fn ok_pages(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for warning in self.results.iter().flat_map(|r| r.warnings.iter()) {
            match warning_severity(warning) {
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn score_distribution(&self) -> ScoreDistribution {
        let mut dist = ScoreDistribution::default();
        for score in self.results.iter().map(seo_score) {
            match score_label(score) {
                "Excellent" => dist.excellent += 1,
                "Good" => dist.good += 1,
                "Average" => dist.average += 1,
                "Poor" => dist.poor += 1,
                _ => dist.critical += 1,
            }
        }
        dist
    }

    /// Distinct hosts in first-appearance order.
    fn hosts(&self) -> Vec<(String, Vec<&AuditRecord>)> {
        let mut groups: Vec<(String, Vec<&AuditRecord>)> = Vec::new();
        for record in &self.results {
            let host = Url::parse(&record.url)
                .ok()
                .and_then(|u| u.host_str().map(String::from))
                .unwrap_or_else(|| "unknown".to_string());
            match groups.iter_mut().find(|(h, _)| *h == host) {
                Some((_, records)) => records.push(record),
                None => groups.push((host, vec![record])),
            }
        }
        groups
    }
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Csv => Ok(generate_csv_report(data)),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
    }
}

fn status_cell(record: &AuditRecord) -> String {
    let code = record
        .status_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    match record.status_message {
        StatusMessage::Ok => match record.status_code {
            Some(300..=399) => code.cyan().to_string(),
            _ => code.green().to_string(),
        },
        StatusMessage::PageError => code.red().to_string(),
        StatusMessage::Timeout | StatusMessage::ConnectionError => {
            format!("{} {}", code, record.status_message).yellow().to_string()
        }
        StatusMessage::Error => format!("{} {}", code, record.status_message).red().to_string(),
    }
}

fn path_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| match u.query() {
            Some(q) => format!("{}?{}", u.path(), q),
            None => u.path().to_string(),
        })
        .unwrap_or_else(|_| url.to_string())
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                          ZENSTATUS SEO AUDIT REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    let avg = data.average_score();
    report.push_str(&format!(
        "Generated:    {}\n",
        data.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("Pages:        {}\n", data.results.len()));
    report.push_str(&format!("OK:           {}\n", data.ok_pages()));
    report.push_str(&format!("SEO Score:    {}/100 ({})\n\n", avg, score_label(avg)));

    let issues = top_issues(&data.results, 10);
    if !issues.is_empty() {
        report.push_str(RULE);
        report.push_str("TOP ISSUES\n");
        report.push_str(RULE);
        report.push('\n');
        for (idx, issue) in issues.iter().enumerate() {
            report.push_str(&format!(
                "  {:>2}. [{}] {} ({} pages)\n",
                idx + 1,
                format!("{:?}", issue.severity).to_uppercase(),
                issue.warning,
                issue.pages
            ));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("PAGES\n");
    report.push_str(RULE);
    report.push('\n');

    for (host, records) in data.hosts() {
        report.push_str(&format!("## {}\n", host));
        report.push_str(&format!("  {} pages audited\n\n", records.len()));

        for record in records {
            let score = seo_score(record);
            let time = record
                .response_time
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());
            report.push_str(&format!(
                "  {} {}  score {} ({})  {}\n",
                status_cell(record),
                path_of(&record.url),
                score,
                score_label(score),
                time.dimmed()
            ));
            if let Some(ref first) = record.duplicate_of {
                report.push_str(&format!("      duplicate of {}\n", first));
            }
            for warning in &record.warnings {
                report.push_str(&format!("      - {}\n", warning));
            }
        }
        report.push('\n');
    }

    if !data.sitemap_debug.is_empty() {
        report.push_str(RULE);
        report.push_str("SITEMAP TRACE\n");
        report.push_str(RULE);
        report.push('\n');
        for d in &data.sitemap_debug {
            let status = d
                .http_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            report.push_str(&format!(
                "  [{:?}] {} (depth {}, status {}, {} found, {} added)\n",
                d.document_type, d.url, d.depth, status, d.entries_found, d.entries_added
            ));
            if let Some(ref note) = d.note {
                report.push_str(&format!("      {}\n", note));
            }
        }
        report.push('\n');
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let scores: Vec<u32> = data.results.iter().map(seo_score).collect();
    let pages: Vec<serde_json::Value> = data
        .results
        .iter()
        .zip(&scores)
        .map(|(record, score)| {
            let mut value = serde_json::to_value(record)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("seo_score".to_string(), serde_json::json!(score));
            }
            Ok(value)
        })
        .collect::<Result<_, serde_json::Error>>()?;

    let avg = data.average_score();
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "ZenStatus",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": data.generated_at.to_rfc3339(),
                "format": "json"
            },
            "summary": {
                "total_pages": data.results.len(),
                "ok_pages": data.ok_pages(),
                "average_score": avg,
                "score_label": score_label(avg),
                "score_distribution": data.score_distribution(),
                "severity_breakdown": data.severity_counts(),
                "top_issues": top_issues(&data.results, 10)
            },
            "results": pages,
            "sitemap_debug": data.sitemap_debug
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn escape_csv(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

pub fn generate_csv_report(data: &ReportData) -> String {
    let headers = [
        "url",
        "seo_score",
        "status_code",
        "status_message",
        "response_time",
        "title",
        "title_length",
        "meta_description",
        "meta_description_length",
        "h1_count",
        "h2_count",
        "h3_count",
        "h4_count",
        "word_count",
        "internal_links",
        "external_links",
        "images_missing_alt",
        "total_images",
        "https",
        "robots",
        "canonical",
        "has_viewport",
        "has_lang",
        "lang",
        "has_og_tags",
        "og_title",
        "has_schema",
        "schema_types",
        "duplicate_of",
        "warnings",
        "h1_samples",
    ];

    let mut csv = headers.join(",");
    csv.push('\n');

    for r in &data.results {
        let s = &r.signals;
        let row = [
            r.url.clone(),
            seo_score(r).to_string(),
            r.status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            r.status_message.to_string(),
            r.response_time
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string()),
            s.title.clone(),
            s.title_length.to_string(),
            s.meta_description.clone(),
            s.meta_description_length.to_string(),
            s.h1_count.to_string(),
            s.h2_count.to_string(),
            s.h3_count.to_string(),
            s.h4_count.to_string(),
            s.word_count.to_string(),
            s.internal_links.to_string(),
            s.external_links.to_string(),
            s.images_missing_alt.to_string(),
            s.total_images.to_string(),
            yes_no(s.https).to_string(),
            s.robots.clone(),
            s.canonical.clone(),
            yes_no(s.has_viewport).to_string(),
            yes_no(s.has_lang).to_string(),
            s.lang.clone(),
            yes_no(s.has_og_tags).to_string(),
            s.og_title.clone(),
            yes_no(s.has_schema).to_string(),
            s.schema_types.join(" | "),
            r.duplicate_of.clone().unwrap_or_default(),
            r.warnings.join(" | "),
            s.h1_samples.join(" | "),
        ];
        let line: Vec<String> = row.iter().map(|v| escape_csv(v)).collect();
        csv.push_str(&line.join(","));
        csv.push('\n');
    }

    csv
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let avg = data.average_score();
    let counts = data.severity_counts();

    let mut report = String::from("# SEO Audit Executive Summary\n\n");
    report.push_str(&format!(
        "Generated: {}\n\n",
        data.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!(
        "## Overall Score: {}/100 ({})\n\n",
        avg,
        score_label(avg)
    ));

    report.push_str("## Key Metrics\n\n");
    report.push_str(&format!("- **Pages Audited:** {}\n", data.results.len()));
    report.push_str(&format!("- **Pages OK:** {}\n", data.ok_pages()));
    report.push_str(&format!("- **High Priority Issues:** {}\n", counts.high));
    report.push_str(&format!("- **Medium Priority Issues:** {}\n", counts.medium));
    report.push_str(&format!("- **Low Priority Issues:** {}\n\n", counts.low));

    report.push_str("## Top Issues\n\n");
    let issues = top_issues(&data.results, 10);
    if issues.is_empty() {
        report.push_str("No issues found.\n");
    }
    for (idx, issue) in issues.iter().enumerate() {
        report.push_str(&format!(
            "{}. **{}** - {} pages\n",
            idx + 1,
            issue.warning,
            issue.pages
        ));
    }

    report.push_str("\n## Recommended Actions\n\n");
    report.push_str("1. Fix all high-priority issues first (missing titles, H1s)\n");
    report.push_str("2. Add meta descriptions to improve click-through rates\n");
    report.push_str("3. Ensure all pages have canonical tags\n");
    report.push_str("4. Optimize images with proper alt text\n");
    report.push_str("5. Improve page speed if response times exceed 2 seconds\n");

    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
