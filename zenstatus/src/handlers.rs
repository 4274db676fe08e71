use anyhow::Context;
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;
use zenstatus_core::audit::DEFAULT_MAX_PAGES;
use zenstatus_core::report::{generate_report, save_report, score_label};
use zenstatus_core::{
    AuditEvent, AuditOptions, AuditRequest, AuditService, ProgressEvent, ReportData, ReportFormat,
};
use zenstatus_scanner::ReqwestFetcher;

/// Install the stderr log subscriber. `RUST_LOG` wins unless `--verbose` is set.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn print_banner() {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!(
        "{} {}",
        "  ZENSTATUS".bright_white().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("{}", "  sitemap-aware SEO audits".bright_cyan());
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!();
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Load URLs from either a single URL or a hosts file
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file, skipping blanks and `#` comments
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as an http(s) URL, adding https:// when no scheme is given
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|h| h.contains('.') || h == "localhost")
    {
        return Some(with_scheme);
    }

    eprintln!("{}  Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// Build the audit request from `audit` subcommand arguments
pub fn build_request(args: &ArgMatches) -> Result<AuditRequest, String> {
    let hosts_file = args.get_one::<String>("hosts-file").map(|p| expand_path(p));
    let urls = load_urls_from_source(args.get_one::<Url>("url"), hosts_file.as_ref())?;

    let sitemap_url = args.get_one::<String>("sitemap-url").cloned();
    let use_sitemap = args.get_flag("sitemap") || sitemap_url.is_some();
    let max_pages = args
        .get_one::<usize>("max-pages")
        .copied()
        .unwrap_or(DEFAULT_MAX_PAGES);

    Ok(AuditRequest::new(urls)
        .with_sitemap(use_sitemap)
        .with_sitemap_url(sitemap_url)
        .with_max_pages(max_pages))
}

/// Build pipeline and auditor options from `audit` subcommand arguments
pub fn build_options(args: &ArgMatches) -> Result<AuditOptions, String> {
    let mut options = AuditOptions::default();

    if let Some(&batch_size) = args.get_one::<usize>("batch-size") {
        options.pipeline.batch_size = batch_size;
    }
    if let Some(&secs) = args.get_one::<u64>("timeout") {
        if secs == 0 {
            return Err("--timeout must be at least 1 second".to_string());
        }
        options.auditor.timeout = Duration::from_secs(secs);
    }
    if let Some(&retries) = args.get_one::<u32>("retries") {
        if retries == 0 {
            return Err("--retries must be at least 1".to_string());
        }
        options.auditor.max_retries = retries;
    }

    options.pipeline.validate().map_err(|e| e.to_string())?;
    Ok(options)
}

pub async fn handle_audit(args: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    let request = build_request(args).map_err(anyhow::Error::msg)?;
    let options = build_options(args).map_err(anyhow::Error::msg)?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args.get_one::<String>("output").map(|p| expand_path(p));

    if !quiet {
        println!(
            "{} Auditing {} seed URL(s)",
            "→".blue(),
            request.urls.len()
        );
        if request.use_sitemap {
            match &request.sitemap_url {
                Some(sitemap_url) => println!("{} Sitemap: {}", "→".blue(), sitemap_url),
                None => println!(
                    "{} Sitemap discovery: up to {} pages per seed",
                    "→".blue(),
                    request.max_pages
                ),
            }
        }
        println!();
    }

    let fetcher = Arc::new(ReqwestFetcher::new().context("Failed to build HTTP client")?);
    let service = Arc::new(AuditService::with_options(fetcher, options));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling audit");
            interrupt.cancel();
        }
    });

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    progress.set_message("Discovering pages...");
    progress.enable_steady_tick(Duration::from_millis(100));

    let (mut events, handle) = service.spawn(request, cancel.clone());
    while let Some(event) = events.recv().await {
        match event {
            AuditEvent::Progress(ProgressEvent { completed, total }) => {
                progress.set_length(total as u64);
                progress.set_position(completed as u64);
                progress.set_message("Auditing pages");
            }
            AuditEvent::Heartbeat => progress.tick(),
            AuditEvent::Complete { .. } => progress.finish_with_message("Audit complete"),
        }
    }

    let outcome = handle.await.context("Audit task failed")??;
    if outcome.cancelled {
        progress.abandon_with_message("Audit cancelled");
        eprintln!(
            "{} Audit interrupted, reporting {} completed page(s)",
            "⚠".yellow(),
            outcome.results.len()
        );
    }

    let data = ReportData::new(outcome.results, outcome.sitemap_debug);

    match output {
        Some(path) => {
            colored::control::set_override(false);
            let report = generate_report(&data, format);
            colored::control::unset_override();
            save_report(&report?, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                println!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => println!("{}", generate_report(&data, format)?),
    }

    if !quiet {
        let score = data.average_score();
        println!(
            "{} Audited {} page(s), {} OK, average score {} ({})",
            "✓".green().bold(),
            data.results.len(),
            data.ok_pages(),
            score,
            score_label(score)
        );
    }

    Ok(())
}
