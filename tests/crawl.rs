//! Crawler behavior over an in-memory fixture site, plus the HTTP fetcher
//! against a local mock server.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use httpmock::prelude::*;
use sitechat::{
    normalize_url, CrawlOptions, Crawler, FetchError, FetchedDocument, HttpFetcher, PageFetcher,
};

/// Serves canned HTML bodies keyed by normalized URL and counts fetches.
struct FixtureFetcher {
    pages: HashMap<String, String>,
    fetches: AtomicUsize,
}

impl FixtureFetcher {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (normalize_url(url), body.to_string()))
                .collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(body) => Ok(FetchedDocument {
                status: 200,
                body: body.clone(),
            }),
            None => Err(FetchError::Status(404)),
        }
    }
}

fn options(max_depth: usize, max_pages: usize) -> CrawlOptions {
    CrawlOptions {
        max_depth,
        max_pages,
        same_domain_only: true,
    }
}

#[tokio::test]
async fn fixture_site_crawl_stays_on_domain() {
    // Start page links to one on-domain page and one off-domain page.
    let fetcher = FixtureFetcher::new(&[
        (
            "https://shop.test/",
            r#"<html><head><title>Shop</title></head><body><main>
                <p>Welcome to the shop, we print everything.</p>
                <a href="/services">services</a>
                <a href="https://elsewhere.test/about">partner</a>
            </main></body></html>"#,
        ),
        (
            "https://shop.test/services",
            r#"<html><head><title>Services</title></head><body><main>
                <p>We offer laser printing and binding.</p>
            </main></body></html>"#,
        ),
        (
            "https://elsewhere.test/about",
            "<html><body>should never be fetched</body></html>",
        ),
    ]);

    let crawler = Crawler::new(fetcher);
    let pages = crawler
        .crawl("https://shop.test/", &options(1, 10))
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].title, "Shop");
    assert_eq!(pages[0].depth, 0);
    assert_eq!(pages[1].title, "Services");
    assert_eq!(pages[1].depth, 1);
    assert!(pages.iter().all(|p| p.url.starts_with("https://shop.test")));
}

#[tokio::test]
async fn depth_zero_fetches_only_the_start_page() {
    let fetcher = FixtureFetcher::new(&[(
        "https://shop.test/",
        r#"<body><main><a href="/a">a</a><a href="/b">b</a></main></body>"#,
    )]);
    let crawler = Crawler::new(fetcher);
    let pages = crawler
        .crawl("https://shop.test/", &options(0, 10))
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(crawler.fetcher().fetch_count(), 1);
}

#[tokio::test]
async fn never_emits_duplicate_normalized_urls() {
    // Pages link to each other with fragment and trailing-slash variants.
    let fetcher = FixtureFetcher::new(&[
        (
            "https://shop.test/",
            r#"<body><main>
                <a href="/faq">faq</a>
                <a href="/faq/">faq slash</a>
                <a href="/faq#top">faq fragment</a>
            </main></body>"#,
        ),
        (
            "https://shop.test/faq",
            r#"<body><main><a href="/">home</a><a href="/faq">self</a></main></body>"#,
        ),
    ]);
    let crawler = Crawler::new(fetcher);
    let pages = crawler
        .crawl("https://shop.test/", &options(3, 10))
        .await
        .unwrap();

    let urls: HashSet<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls.len(), pages.len(), "duplicate normalized URL crawled");
    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn respects_the_page_budget() {
    let fetcher = FixtureFetcher::new(&[
        (
            "https://shop.test/",
            r#"<body><main>
                <a href="/p1">1</a><a href="/p2">2</a><a href="/p3">3</a>
            </main></body>"#,
        ),
        ("https://shop.test/p1", "<body><main>one</main></body>"),
        ("https://shop.test/p2", "<body><main>two</main></body>"),
        ("https://shop.test/p3", "<body><main>three</main></body>"),
    ]);
    let crawler = Crawler::new(fetcher);
    let pages = crawler
        .crawl("https://shop.test/", &options(2, 2))
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn single_page_failures_do_not_abort_the_crawl() {
    // /missing is not served; the crawl must still visit /works.
    let fetcher = FixtureFetcher::new(&[
        (
            "https://shop.test/",
            r#"<body><main><a href="/missing">x</a><a href="/works">y</a></main></body>"#,
        ),
        ("https://shop.test/works", "<body><main>alive</main></body>"),
    ]);
    let crawler = Crawler::new(fetcher);
    let pages = crawler
        .crawl("https://shop.test/", &options(1, 10))
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert!(pages.iter().any(|p| p.url.ends_with("/works")));
}

#[tokio::test]
async fn invalid_start_url_is_an_error() {
    let fetcher = FixtureFetcher::new(&[]);
    let crawler = Crawler::new(fetcher);
    assert!(crawler
        .crawl("not a url at all", &CrawlOptions::default())
        .await
        .is_err());
}

#[tokio::test]
async fn http_fetcher_returns_bodies_and_classifies_failures() {
    let server = MockServer::start_async().await;
    let ok = server
        .mock_async(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html><body>hello</body></html>");
        })
        .await;
    let gone = server
        .mock_async(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("nope");
        })
        .await;

    let fetcher = HttpFetcher::new().unwrap();

    let document = fetcher.fetch(&server.url("/page")).await.unwrap();
    assert_eq!(document.status, 200);
    assert!(document.body.contains("hello"));
    ok.assert_async().await;

    let err = fetcher.fetch(&server.url("/gone")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(404)));
    gone.assert_async().await;
}
