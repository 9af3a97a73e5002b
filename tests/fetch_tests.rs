use feedgram::fetch::{FeedFetcher, FetchError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_rss() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>http://example.com/</link>
    <description>Test description</description>
    <item>
      <title>Item 1</title>
      <link>http://example.com/1</link>
      <guid>guid-1</guid>
      <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
      <description>First</description>
    </item>
    <item>
      <title>Item 2</title>
      <link>http://example.com/2</link>
      <guid>guid-2</guid>
      <pubDate>Mon, 21 Oct 2024 08:00:00 GMT</pubDate>
      <description>Second</description>
    </item>
  </channel>
</rss>"#
        .to_string()
}

#[tokio::test]
async fn fetch_parses_feed_and_captures_cache_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .insert_header("etag", "\"v1\"")
                .insert_header("last-modified", "Mon, 21 Oct 2024 08:00:00 GMT")
                .set_body_string(sample_rss()),
        )
        .mount(&server)
        .await;

    let fetcher = FeedFetcher::new();
    let outcome = fetcher
        .fetch(&format!("{}/feed", server.uri()), None, None, None)
        .await
        .unwrap();

    let feed = outcome.feed.expect("feed body expected");
    assert_eq!(feed.title, "Test Feed");
    assert_eq!(feed.items.len(), 2);
    assert_eq!(outcome.etag.as_deref(), Some("\"v1\""));
    assert_eq!(
        outcome.last_modified.as_deref(),
        Some("Mon, 21 Oct 2024 08:00:00 GMT")
    );
}

#[tokio::test]
async fn fetch_sends_conditional_headers_and_handles_304() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .and(header("if-none-match", "\"v1\""))
        .and(header("if-modified-since", "Mon, 21 Oct 2024 08:00:00 GMT"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = FeedFetcher::new();
    let outcome = fetcher
        .fetch(
            &format!("{}/feed", server.uri()),
            Some("\"v1\""),
            Some("Mon, 21 Oct 2024 08:00:00 GMT"),
            None,
        )
        .await
        .unwrap();

    // The canonical "no work" signal: no feed, echoed cache values.
    assert!(outcome.feed.is_none());
    assert_eq!(outcome.etag.as_deref(), Some("\"v1\""));
    assert_eq!(
        outcome.last_modified.as_deref(),
        Some("Mon, 21 Oct 2024 08:00:00 GMT")
    );
}

#[tokio::test]
async fn permanent_status_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone for good"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = FeedFetcher::new();
    let err = fetcher
        .fetch(&format!("{}/feed", server.uri()), None, None, None)
        .await
        .unwrap_err();

    match err {
        FetchError::Permanent { status, snippet } => {
            assert_eq!(status, 404);
            assert!(snippet.contains("gone for good"));
        }
        other => panic!("expected permanent error, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_status_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(sample_rss()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = FeedFetcher::new();
    let outcome = fetcher
        .fetch(&format!("{}/feed", server.uri()), None, None, None)
        .await
        .unwrap();
    assert!(outcome.feed.is_some());
}

#[tokio::test]
async fn malformed_body_gets_exactly_one_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string("this is not a feed"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = FeedFetcher::new();
    let err = fetcher
        .fetch(&format!("{}/feed", server.uri()), None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)));
}

#[tokio::test]
async fn rate_limited_status_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(sample_rss()),
        )
        .mount(&server)
        .await;

    let fetcher = FeedFetcher::new();
    let outcome = fetcher
        .fetch(&format!("{}/feed", server.uri()), None, None, None)
        .await
        .unwrap();
    assert!(outcome.feed.is_some());
}
