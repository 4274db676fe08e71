// End-to-end tests: sitemap expansion followed by a pipeline run

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zenstatus_core::audit::EMPTY_SITEMAPS_NOTE;
use zenstatus_core::{AuditEvent, AuditOutcome, AuditRequest, AuditService, PipelineError};
use zenstatus_scanner::{DiagnosticType, ReqwestFetcher, StatusMessage};

const PAGE: &str = r#"<html lang="en"><head><title>A reasonably descriptive page title</title></head>
<body><h1>Heading</h1><p>Body text</p></body></html>"#;

fn service() -> Arc<AuditService> {
    Arc::new(AuditService::new(Arc::new(ReqwestFetcher::new().unwrap())))
}

fn urlset(locs: &[String]) -> String {
    let entries: String = locs
        .iter()
        .map(|l| format!("<url><loc>{}</loc></url>", l))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        entries
    )
}

async fn mount_page(server: &MockServer, p: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(status).set_body_string(PAGE))
        .mount(server)
        .await;
}

async fn mount_sitemap(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn run(
    service: Arc<AuditService>,
    request: AuditRequest,
) -> (Result<AuditOutcome, PipelineError>, Vec<AuditEvent>) {
    let (mut rx, handle) = service.spawn(request, CancellationToken::new());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (handle.await.unwrap(), events)
}

#[tokio::test]
async fn test_sitemap_expansion_audits_listed_pages() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_sitemap(
        &server,
        urlset(&[
            format!("{}/a", base),
            format!("{}/b", base),
            format!("{}/a/", base),
        ]),
    )
    .await;
    mount_page(&server, "/a", 200).await;
    mount_page(&server, "/a/", 200).await;
    mount_page(&server, "/b", 404).await;

    let request = AuditRequest::new(vec![base.clone()]).with_sitemap(true);
    let (outcome, events) = run(service(), request).await;
    let outcome = outcome.unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(outcome.results.len(), 3);

    // OK pages first, then the 404
    assert_eq!(outcome.results[2].url, format!("{}/b", base));
    assert_eq!(outcome.results[2].status_message, StatusMessage::PageError);

    let dup = outcome
        .results
        .iter()
        .find(|r| r.url == format!("{}/a/", base))
        .unwrap();
    assert_eq!(dup.duplicate_of.as_deref(), Some(format!("{}/a", base).as_str()));
    assert!(dup.warnings.iter().any(|w| w == "Duplicate URL"));

    // the sitemap was found, so no page carries the missing-sitemap warning
    assert!(outcome.results.iter().all(|r| r.signals.has_sitemap));
    assert!(
        outcome
            .results
            .iter()
            .all(|r| !r.warnings.iter().any(|w| w == "No sitemap.xml found"))
    );

    assert_eq!(outcome.sitemap_debug.len(), 1);
    assert_eq!(outcome.sitemap_debug[0].document_type, DiagnosticType::UrlSet);
    assert_eq!(outcome.sitemap_debug[0].entries_added, 3);

    assert_eq!(events.first(), Some(&AuditEvent::Heartbeat));
    let progress = events
        .iter()
        .filter(|e| matches!(e, AuditEvent::Progress(_)))
        .count();
    assert_eq!(progress, 3);
    match events.last() {
        Some(AuditEvent::Complete {
            results,
            sitemap_debug,
        }) => {
            assert_eq!(results, &outcome.results);
            assert_eq!(sitemap_debug, &outcome.sitemap_debug);
        }
        other => panic!("expected a complete event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sitemap_expansion_keeps_robots_txt_presence() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("User-agent: *\nDisallow: /admin\n"),
        )
        .mount(&server)
        .await;
    mount_sitemap(&server, urlset(&[format!("{}/a", base)])).await;
    mount_page(&server, "/a", 200).await;

    let request = AuditRequest::new(vec![base.clone()]).with_sitemap(true);
    let (outcome, _) = run(service(), request).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.results.len(), 1);
    let page = &outcome.results[0];
    assert!(page.signals.has_robots_txt);
    assert!(page.signals.has_sitemap);
    assert!(!page.warnings.iter().any(|w| w == "No robots.txt file"));
}

#[tokio::test]
async fn test_missing_sitemap_falls_back_to_seed() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(&server, "/", 200).await;

    let request = AuditRequest::new(vec![format!("{}/", base)]).with_sitemap(true);
    let (outcome, _) = run(service(), request).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].url, format!("{}/", base));
    assert_eq!(outcome.results[0].status_code, Some(200));
    assert_eq!(outcome.results[0].duplicate_of, None);

    assert_eq!(outcome.sitemap_debug.len(), 1);
    assert_eq!(outcome.sitemap_debug[0].document_type, DiagnosticType::Error);
    assert_eq!(outcome.sitemap_debug[0].http_status, Some(404));
    assert!(
        !outcome
            .sitemap_debug
            .iter()
            .any(|d| d.note.as_deref() == Some(EMPTY_SITEMAPS_NOTE))
    );
}

#[tokio::test]
async fn test_pages_shared_between_seeds_are_duplicates() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_sitemap(&server, urlset(&[format!("{}/a", base), format!("{}/b", base)])).await;
    mount_page(&server, "/a", 200).await;
    mount_page(&server, "/b", 200).await;

    // both seeds resolve to the same sitemap
    let request =
        AuditRequest::new(vec![base.clone(), format!("{}/", base)]).with_sitemap(true);
    let (outcome, _) = run(service(), request).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.results.len(), 4);
    let dups: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.duplicate_of.is_some())
        .collect();
    assert_eq!(dups.len(), 2);
    for dup in dups {
        assert_eq!(dup.duplicate_of.as_deref(), Some(dup.url.as_str()));
    }
    assert_eq!(outcome.sitemap_debug.len(), 2);
}

#[tokio::test]
async fn test_max_pages_caps_expansion() {
    let server = MockServer::start().await;
    let base = server.uri();
    let locs: Vec<String> = (1..=5).map(|i| format!("{}/p{}", base, i)).collect();
    mount_sitemap(&server, urlset(&locs)).await;
    for i in 1..=5 {
        mount_page(&server, &format!("/p{}", i), 200).await;
    }

    let request = AuditRequest::new(vec![base.clone()])
        .with_sitemap(true)
        .with_max_pages(2);
    let (outcome, _) = run(service(), request).await;
    let outcome = outcome.unwrap();

    let mut urls: Vec<&str> = outcome.results.iter().map(|r| r.url.as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec![locs[0].as_str(), locs[1].as_str()]);
}

#[tokio::test]
async fn test_sitemap_override_is_used_for_every_seed() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/maps/pages.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[format!("{}/a", base)])))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/a", 200).await;

    let request = AuditRequest::new(vec![base.clone()])
        .with_sitemap(true)
        .with_sitemap_url(Some(format!("{}/maps/pages.xml", base)));
    let (outcome, _) = run(service(), request).await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].url, format!("{}/a", base));
}

#[tokio::test]
async fn test_direct_audit_without_sitemap() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(&server, "/one", 200).await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[])))
        .mount(&server)
        .await;

    let request = AuditRequest::new(vec![format!("{}/one", base), format!("{}/one", base)]);
    let (outcome, _) = run(service(), request).await;
    let outcome = outcome.unwrap();

    // no expansion: both entries audited, neither annotated
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| r.duplicate_of.is_none()));
    assert!(outcome.sitemap_debug.is_empty());
}

#[tokio::test]
async fn test_empty_request_is_rejected() {
    let (outcome, events) = run(service(), AuditRequest::new(vec![])).await;
    assert_eq!(outcome.unwrap_err(), PipelineError::NoUrls);
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_sends_no_completion() {
    let server = MockServer::start().await;
    mount_page(&server, "/", 200).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = AuditRequest::new(vec![format!("{}/", server.uri())]);
    let (mut rx, handle) = service().spawn(request, cancel);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let outcome = handle.await.unwrap().unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());
    assert!(!events.iter().any(AuditEvent::is_terminal));
}
