use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use skitter_crawler::{
    crawl, Document, FetchError, Fetcher, FetcherConfig, Item, ParseResult, ReqwestFetcher,
    RequestTemplate, RetryPolicy, RunConfig,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> ReqwestFetcher {
    ReqwestFetcher::new(&FetcherConfig { timeout: 5.0 }).unwrap()
}

#[tokio::test]
async fn fetches_body_with_template_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "SkitterBot"))
        .and(header("accept-language", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = RequestTemplate::default();
    request
        .headers
        .insert("Accept-Language".into(), "en".into());

    let url = format!("{}/page", server.uri());
    let doc = fetcher().fetch(&url, &request).await.unwrap();
    assert_eq!(doc.url, url);
    assert_eq!(doc.text(), "<p>hello</p>");
}

#[tokio::test]
async fn error_status_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let err = fetcher()
        .fetch(&url, &RequestTemplate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn malformed_urls_are_final() {
    for url in ["not a url", "/relative/path", "ftp://files.test/a.txt"] {
        let err = fetcher()
            .fetch(url, &RequestTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }), "{url}: {err}");
        assert!(!err.is_retryable());
    }
}

#[tokio::test]
async fn gzipped_content_is_decompressed() {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(b"<urlset></urlset>").unwrap();
    let body = gz.finish().unwrap();

    let server = MockServer::start().await;
    Mock::given(path("/sitemap.xml.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/gzip"))
        .mount(&server)
        .await;

    let url = format!("{}/sitemap.xml.gz", server.uri());
    let doc = fetcher().fetch(&url, &RequestTemplate::default()).await.unwrap();
    assert_eq!(doc.content, b"<urlset></urlset>");
}

#[tokio::test]
async fn crawls_a_small_site() {
    let server = MockServer::start().await;
    let base = server.uri();
    for (page, body) in [
        ("/", "/a\n/b\n/broken"),
        ("/a", "/b\n/"),
        ("/b", "/a"),
    ] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    // One link per line, one item per page
    let prefix = base.clone();
    let handler = move |doc: &Document| -> skitter_crawler::anyhow::Result<ParseResult> {
        let text = doc.text();
        Ok(ParseResult {
            items: vec![Item::from([("url".to_string(), doc.url.clone())])],
            discovered_urls: text.lines().map(|l| format!("{prefix}{l}")).collect(),
        })
    };

    let config = RunConfig {
        start_urls: vec![format!("{base}/")],
        crawl_workers: 3,
        parse_workers: 2,
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
        },
        handle_sigint: false,
        ..Default::default()
    };
    let report = crawl(
        config,
        Arc::new(fetcher()),
        Arc::new(handler),
        Arc::new(skitter_crawler::DiscardSink),
    )
    .await
    .unwrap();

    let mut succeeded = report.succeeded.clone();
    succeeded.sort();
    assert_eq!(
        succeeded,
        vec![format!("{base}/"), format!("{base}/a"), format!("{base}/b")]
    );
    assert_eq!(report.failed, vec![format!("{base}/broken")]);
    assert_eq!(report.item_count, 3);
    assert_eq!(report.retries[&format!("{base}/broken")], 3);
}
