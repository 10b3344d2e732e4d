use std::sync::Arc;
use std::time::Duration;

use manhuagui::site::{BookEntry, Site};
use manhuagui::{Fetch, HttpConfig, HttpFetcher};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOOK_PAGE: &str = include_str!("fixtures/book.html");
const VOLUME_V2: &str = include_str!("fixtures/volume_v2.html");

fn fast_config() -> HttpConfig {
    HttpConfig {
        timeout: Duration::from_secs(5),
        max_retry: 3,
        retry_delay: Duration::from_millis(10),
        ..HttpConfig::default()
    }
}

#[tokio::test]
async fn test_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/comic/1/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/comic/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(fast_config()).unwrap();
    let text = fetcher
        .get_text(&format!("{}/comic/1/", server.uri()))
        .await
        .unwrap();
    assert_eq!(text, "ok");
    assert_eq!(fetcher.transferred_bytes(), 2);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(fast_config()).unwrap();
    let err = fetcher
        .get_text(&format!("{}/busy", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(fast_config()).unwrap();
    let err = fetcher
        .get_text(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_download_sends_referer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/001.jpg"))
        .and(header("referer", "https://www.manhuagui.com"))
        .and(header("accept-language", "zh-CN"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xffu8; 1000]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("vol").join("001.jpg");
    let fetcher = HttpFetcher::new(fast_config()).unwrap();
    let written = fetcher
        .download(
            &format!("{}/img/001.jpg", server.uri()),
            "https://www.manhuagui.com",
            &target,
        )
        .await
        .unwrap();

    assert_eq!(written, 1000);
    assert_eq!(std::fs::read(&target).unwrap().len(), 1000);
    assert!(!dir.path().join("vol").join("001.jpg.part").exists());
    assert_eq!(fetcher.transferred_bytes(), 1000);
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/001.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xffu8; 100]))
        .mount(&server)
        .await;

    // The target is a directory, so the final rename fails after the body
    // has been written
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("001.jpg");
    std::fs::create_dir(&target).unwrap();

    let fetcher = HttpFetcher::new(fast_config()).unwrap();
    let result = fetcher
        .download(
            &format!("{}/img/001.jpg", server.uri()),
            "https://www.manhuagui.com",
            &target,
        )
        .await;

    assert!(result.is_err());
    assert!(!dir.path().join("001.jpg.part").exists());
    assert!(target.is_dir());
}

#[tokio::test]
async fn test_book_and_volume_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/comic/99/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOOK_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/comic/99/1001.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VOLUME_V2))
        .mount(&server)
        .await;

    let fetcher = Arc::new(HttpFetcher::new(fast_config()).unwrap());
    let site = Site::with_hosts(fetcher, server.uri(), "https://img.test");
    let entry = BookEntry {
        id: "99".to_string(),
        url: format!("{}/comic/99/", server.uri()),
    };

    let book = site.fetch_book(&entry).await.unwrap();
    assert_eq!(book.volumes.len(), 4);
    assert_eq!(book.volumes[0].url, format!("{}/comic/99/1001.html", server.uri()));

    let pages = site.fetch_volume(&book.volumes[0]).await.unwrap();
    let urls: Vec<_> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://img.test/ps3/t/test/vol01/001.jpg.webp?e=1700000000&m=aBc-XyZ_09",
            "https://img.test/ps3/t/test/vol01/002.jpg.webp?e=1700000000&m=aBc-XyZ_09",
            "https://img.test/ps3/t/test/vol01/003.jpg.webp?e=1700000000&m=aBc-XyZ_09",
        ]
    );
}
