use std::fs;
use std::sync::Arc;
use std::time::Duration;

use skitter_crawler::{
    crawl, CsvSink, CsvWriterConfig, FetcherConfig, ReqwestFetcher, RetryPolicy, RunConfig,
};
use skitter_extract::{Backend, ExtractionRules, RulesHandler};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(title: &str, links: &[&str]) -> String {
    let links = links
        .iter()
        .map(|l| format!(r#"<li><a href="{l}">{l}</a></li>"#))
        .collect::<String>();
    format!("<html><head><title>{title}</title></head><body><ul>{links}</ul></body></html>")
}

async fn site() -> MockServer {
    let server = MockServer::start().await;
    let pages = [
        ("/", page("Home", &["/docs/", "/blog", "https://elsewhere.test/"])),
        ("/docs/", page("Docs", &["intro#top", "../", "/missing"])),
        ("/docs/intro", page("Intro", &["/blog"])),
        ("/blog", page("Blog", &["/"])),
    ];
    for (route, body) in pages {
        Mock::given(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn crawl_site_to_csv() {
    let server = site().await;

    let rules = ExtractionRules {
        backend: Backend::Css,
        links: vec!["ul a".into()],
        fields: [("title".to_string(), "title".to_string())].into(),
        same_host: true,
    };
    let columns = rules.columns();
    let handler = RulesHandler::new(rules).unwrap();

    let out = tempfile::NamedTempFile::new().unwrap();
    let sink = Arc::new(CsvSink::create(out.path(), columns, &CsvWriterConfig::default()).unwrap());

    let config = RunConfig {
        start_urls: vec![format!("{}/", server.uri())],
        crawl_workers: 2,
        parse_workers: 2,
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
        },
        handle_sigint: false,
        ..Default::default()
    };
    let fetcher = ReqwestFetcher::new(&FetcherConfig::default()).unwrap();
    let report = crawl(config, Arc::new(fetcher), Arc::new(handler), sink.clone())
        .await
        .unwrap();
    sink.finish();

    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(report.failed, vec![format!("{}/missing", server.uri())]);
    assert_eq!(report.item_count, 4);
    assert_eq!(report.parse_errors, 0);

    let csv = fs::read_to_string(out.path()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("url,title"));
    let mut rows = lines.collect::<Vec<_>>();
    rows.sort();
    let base = server.uri();
    assert_eq!(
        rows,
        vec![
            format!("{base}/,Home"),
            format!("{base}/blog,Blog"),
            format!("{base}/docs/,Docs"),
            format!("{base}/docs/intro,Intro"),
        ]
    );
}

#[tokio::test]
async fn xpath_backend_follows_the_same_links() {
    let server = site().await;

    let rules = ExtractionRules {
        backend: Backend::XPath,
        links: vec!["//ul/li/a/@href".into()],
        fields: Default::default(),
        same_host: true,
    };
    let config = RunConfig {
        start_urls: vec![format!("{}/", server.uri())],
        crawl_workers: 3,
        parse_workers: 1,
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
        },
        handle_sigint: false,
        ..Default::default()
    };
    let report = crawl(
        config,
        Arc::new(ReqwestFetcher::new(&FetcherConfig::default()).unwrap()),
        Arc::new(RulesHandler::new(rules).unwrap()),
        Arc::new(skitter_crawler::DiscardSink),
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.item_count, 0);
}
