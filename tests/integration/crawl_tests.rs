//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock board servers and test the
//! fetcher and the full two-phase crawl end-to-end.

use chrono::{NaiveDate, NaiveDateTime};
use forum_sweep::config::{BoardConfig, Config, CrawlerConfig};
use forum_sweep::crawler::{FetchFailure, FetchRequest, FetchResult, Fetcher};
use forum_sweep::extract::format_instant;
use forum_sweep::record::CONTENT_FETCH_FAILED;
use forum_sweep::{Crawler, Credentials, SweepError};
use std::collections::BTreeMap;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FID: u32 = 853;

/// Creates a test configuration pointing at the mock server, with no delays
fn create_test_config(base_url: &str, pages: u32, retries: u32) -> Config {
    Config {
        board: BoardConfig {
            base_url: base_url.to_string(),
            fid: FID,
            pages,
            encoding: "utf-8".to_string(),
            utc_offset_hours: 8,
        },
        crawler: CrawlerConfig {
            workers: 3,
            min_delay_ms: 0,
            max_delay_ms: 0,
            retries,
            retry_backoff_ms: 0,
            max_backoff_ms: 0,
            timeout_secs: 5,
            connect_timeout_secs: 5,
        },
        headers: Default::default(),
        session: Default::default(),
        output: Default::default(),
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 5)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn topic_row(tid: u32, title: &str, replies: u32, author: &str, date: &str) -> String {
    format!(
        r#"<tr class="topicrow">
            <td class="c1"><a class="replies">{replies}</a></td>
            <td class="c2"><a class="topic" href="/read.php?tid={tid}">{title}</a></td>
            <td class="c3"><a class="author">{author}</a><span class="postdate">{date}</span></td>
        </tr>"#
    )
}

fn listing_page(rows: &[String]) -> String {
    format!(
        r#"<html><head><title>Board</title></head><body>
        <table id="topicrows">{}</table>
        </body></html>"#,
        rows.concat()
    )
}

fn thread_page(posts: &[&str]) -> String {
    let posts: String = posts
        .iter()
        .map(|p| format!(r#"<span class="postcontent ubbcode">{}</span>"#, p))
        .collect();
    format!("<html><body>{}</body></html>", posts)
}

async fn mount_listing(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/thread.php"))
        .and(query_param("fid", FID.to_string()))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_thread(server: &MockServer, tid: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/read.php"))
        .and(query_param("tid", tid.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_succeeds_on_first_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), 1, 3);
    let credentials = Credentials::default();
    let fetcher = Fetcher::new(&config, &credentials, mock_server.uri()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/ok", mock_server.uri()), 3),
        )
        .await;

    assert_eq!(
        result,
        FetchResult::Success {
            body: "hello".to_string(),
            attempts: 1
        }
    );
}

#[tokio::test]
async fn test_fetch_exhausts_retry_budget_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), 1, 3);
    let credentials = Credentials::default();
    let fetcher = Fetcher::new(&config, &credentials, mock_server.uri()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/broken", mock_server.uri()), 3),
        )
        .await;

    assert_eq!(
        result,
        FetchResult::Failed {
            attempts: 3,
            last: FetchFailure::Status(500),
            forbidden: 0
        }
    );
}

#[tokio::test]
async fn test_fetch_stops_at_first_success_after_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), 1, 3);
    let credentials = Credentials::default();
    let fetcher = Fetcher::new(&config, &credentials, mock_server.uri()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/flaky", mock_server.uri()), 3),
        )
        .await;

    assert_eq!(
        result,
        FetchResult::Success {
            body: "recovered".to_string(),
            attempts: 2
        }
    );
}

#[tokio::test]
async fn test_fetch_reports_connection_failure() {
    // Reserve a port, then close it so nothing is listening
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let base_url = format!("http://127.0.0.1:{}", port);

    let config = create_test_config(&base_url, 1, 2);
    let credentials = Credentials::default();
    let fetcher = Fetcher::new(&config, &credentials, base_url.clone()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/unreachable", base_url), 2),
        )
        .await;

    match result {
        FetchResult::Failed {
            attempts,
            last,
            forbidden,
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(forbidden, 0);
            assert!(
                matches!(last, FetchFailure::Network(_) | FetchFailure::Timeout),
                "unexpected failure: {}",
                last
            );
        }
        FetchResult::Success { .. } => panic!("nothing is listening on port {}", port),
    }
}

#[tokio::test]
async fn test_fetch_with_zero_budget_makes_one_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/once"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), 1, 1);
    let credentials = Credentials::default();
    let fetcher = Fetcher::new(&config, &credentials, mock_server.uri()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/once", mock_server.uri()), 0),
        )
        .await;

    assert_eq!(
        result,
        FetchResult::Failed {
            attempts: 1,
            last: FetchFailure::Status(503),
            forbidden: 0
        }
    );
}

#[tokio::test]
async fn test_fetch_retries_forbidden_and_reports_it() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), 1, 2);
    let credentials = Credentials::default();
    let fetcher = Fetcher::new(&config, &credentials, mock_server.uri()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/guarded", mock_server.uri()), 2),
        )
        .await;

    assert!(result.is_forbidden());
    assert_eq!(
        result,
        FetchResult::Failed {
            attempts: 2,
            last: FetchFailure::Forbidden,
            forbidden: 2
        }
    );
}

#[tokio::test]
async fn test_fetch_sends_session_cookies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("cookie", "guestJs=1700000000; ngaPassportUid=42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut cookies = BTreeMap::new();
    cookies.insert("ngaPassportUid".to_string(), "42".to_string());
    cookies.insert("guestJs".to_string(), "1700000000".to_string());
    let credentials = Credentials::new(cookies, None);

    let config = create_test_config(&mock_server.uri(), 1, 1);
    let fetcher = Fetcher::new(&config, &credentials, mock_server.uri()).unwrap();

    let result = fetcher
        .fetch(
            &credentials,
            &FetchRequest::new(format!("{}/private", mock_server.uri()), 1),
        )
        .await;

    assert_eq!(result.into_body().as_deref(), Some("welcome"));
}

#[tokio::test]
async fn test_full_crawl_orders_newest_first() {
    let mock_server = MockServer::start().await;

    mount_listing(
        &mock_server,
        1,
        listing_page(&[
            topic_row(1, "Patch notes", 12, "alice", "2024-01-03"),
            topic_row(2, "Old news", 3, "bob", "2024-01-01"),
            topic_row(3, "Fresh take", 0, "carol", "昨天 10:00"),
        ]),
    )
    .await;
    mount_listing(
        &mock_server,
        2,
        listing_page(&[topic_row(4, "Timestamped", 7, "dave", "1704150000")]),
    )
    .await;

    for tid in 1..=4 {
        let body = thread_page(&[&format!("first post of {}", tid), "a reply"]);
        mount_thread(
            &mock_server,
            tid,
            ResponseTemplate::new(200).set_body_string(body),
        )
        .await;
    }

    let config = create_test_config(&mock_server.uri(), 2, 2);
    let crawler = Crawler::new(config, Credentials::default()).unwrap();
    let report = crawler.run(now()).await.unwrap();

    let tids: Vec<_> = report
        .records
        .iter()
        .map(|r| r.summary.tid.as_str())
        .collect();
    assert_eq!(tids, vec!["3", "1", "4", "2"]);

    let times: Vec<_> = report
        .records
        .iter()
        .map(|r| format_instant(&r.summary.post_time))
        .collect();
    assert_eq!(
        times,
        vec![
            "2024-01-04 10:00:00",
            "2024-01-03 00:00:00",
            "2024-01-02 07:00:00",
            "2024-01-01 00:00:00",
        ]
    );

    let first = &report.records[1];
    assert_eq!(first.summary.title, "Patch notes");
    assert_eq!(first.summary.author, "alice");
    assert_eq!(first.summary.replies, 12);
    assert_eq!(
        first.summary.url,
        format!("{}/read.php?tid=1", mock_server.uri())
    );
    assert!(first.content.starts_with("first post of 1"));
    assert!(first.content.ends_with("a reply"));

    assert!(report.records.iter().all(|r| !r.content_failed()));
    assert_eq!(report.stats.pages_attempted, 2);
    assert_eq!(report.stats.pages_fetched, 2);
    assert_eq!(report.stats.threads_listed, 4);
    assert_eq!(report.stats.threads_fetched, 4);
    assert!(!report.stats.is_degraded());
}

#[tokio::test]
async fn test_failed_thread_gets_sentinel_content() {
    let mock_server = MockServer::start().await;

    mount_listing(
        &mock_server,
        1,
        listing_page(&[
            topic_row(10, "Works", 1, "alice", "2024-01-04"),
            topic_row(11, "Broken", 1, "bob", "2024-01-03"),
        ]),
    )
    .await;
    mount_thread(
        &mock_server,
        10,
        ResponseTemplate::new(200).set_body_string(thread_page(&["body"])),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/read.php"))
        .and(query_param("tid", "11"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), 1, 2);
    let crawler = Crawler::new(config, Credentials::default()).unwrap();
    let report = crawler.run(now()).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].summary.tid, "10");
    assert_eq!(report.records[0].content, "body");
    assert_eq!(report.records[1].summary.tid, "11");
    assert_eq!(report.records[1].content, CONTENT_FETCH_FAILED);

    assert_eq!(report.stats.threads_fetched, 1);
    assert_eq!(report.stats.threads_failed, 1);
    assert!(report.stats.is_degraded());
}

#[tokio::test]
async fn test_failed_index_page_does_not_abort_crawl() {
    let mock_server = MockServer::start().await;

    mount_listing(
        &mock_server,
        1,
        listing_page(&[topic_row(20, "Survivor", 0, "alice", "2024-01-02")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/thread.php"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;
    mount_thread(
        &mock_server,
        20,
        ResponseTemplate::new(200).set_body_string(thread_page(&["still here"])),
    )
    .await;

    let config = create_test_config(&mock_server.uri(), 2, 2);
    let crawler = Crawler::new(config, Credentials::default()).unwrap();
    let report = crawler.run(now()).await.unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].content, "still here");
    assert_eq!(report.stats.pages_failed, 1);
    assert_eq!(report.stats.pages_fetched, 1);
}

#[tokio::test]
async fn test_missing_thread_table_yields_no_data() {
    let mock_server = MockServer::start().await;

    mount_listing(
        &mock_server,
        1,
        "<html><body><p>访客不能直接访问</p></body></html>".to_string(),
    )
    .await;
    mount_listing(&mock_server, 2, listing_page(&[])).await;

    let config = create_test_config(&mock_server.uri(), 2, 1);
    let crawler = Crawler::new(config, Credentials::default()).unwrap();

    match crawler.run(now()).await {
        Err(SweepError::NoData {
            pages_attempted,
            pages_failed,
        }) => {
            assert_eq!(pages_attempted, 2);
            assert_eq!(pages_failed, 0);
        }
        other => panic!("expected NoData, got {:?}", other.map(|r| r.records.len())),
    }
}

#[tokio::test]
async fn test_listing_phase_counts_missing_container() {
    let mock_server = MockServer::start().await;

    mount_listing(
        &mock_server,
        1,
        listing_page(&[topic_row(30, "Only one", 0, "alice", "2024-01-02")]),
    )
    .await;
    mount_listing(&mock_server, 2, "<html><body></body></html>".to_string()).await;

    let config = create_test_config(&mock_server.uri(), 2, 1);
    let crawler = Crawler::new(config, Credentials::default()).unwrap();

    let mut stats = Default::default();
    let threads = crawler.list_threads(now(), &mut stats).await;

    assert_eq!(threads.len(), 1);
    assert_eq!(stats.pages_container_missing, 1);
    assert_eq!(stats.pages_fetched, 2);
}

#[tokio::test]
async fn test_equal_times_keep_page_then_row_order() {
    let mock_server = MockServer::start().await;

    mount_listing(
        &mock_server,
        1,
        listing_page(&[
            topic_row(41, "a", 0, "x", "2024-01-02"),
            topic_row(42, "b", 0, "x", "2024-01-02"),
        ]),
    )
    .await;
    mount_listing(
        &mock_server,
        2,
        listing_page(&[topic_row(43, "c", 0, "x", "2024-01-02")]),
    )
    .await;

    let config = create_test_config(&mock_server.uri(), 2, 1);
    let crawler = Crawler::new(config, Credentials::default()).unwrap();

    let mut stats = Default::default();
    let mut threads = crawler.list_threads(now(), &mut stats).await;
    forum_sweep::record::sort_newest_first(&mut threads);

    let tids: Vec<_> = threads.iter().map(|t| t.tid.as_str()).collect();
    assert_eq!(tids, vec!["41", "42", "43"]);
}
