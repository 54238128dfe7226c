use std::fs;
use std::time::Duration;

use indicatif::ProgressBar;
use page_mirror::asset_store::{AssetStore, ClaimSet, DownloadError, FetchSession};
use page_mirror::html_rewriter;
use page_mirror::mirror::SourcePage;
use page_mirror::url_resolver::{self, ResourceBucket};
use tempfile::tempdir;
use url::Url;

fn test_session(referer: &str) -> FetchSession {
    FetchSession::new(
        "page-mirror-tests/1.0",
        &Url::parse(referer).unwrap(),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[test]
fn test_url_resolution() {
    let base = Url::parse("https://example.com/subdir/").unwrap();

    let test_cases = vec![
        ("../style.css", "https://example.com/style.css"),
        ("./script.js", "https://example.com/subdir/script.js"),
        ("images/photo.jpg", "https://example.com/subdir/images/photo.jpg"),
        ("/from-root.js", "https://example.com/from-root.js"),
        (
            "https://cdn.example.com/style.css",
            "https://cdn.example.com/style.css",
        ),
        (
            "//cdn.example.com/script.js",
            "https://cdn.example.com/script.js",
        ),
        (
            "photo.jpg?width=200",
            "https://example.com/subdir/photo.jpg?width=200",
        ),
    ];

    for (input, expected) in test_cases {
        let resolved = url_resolver::resolve(&base, input).unwrap();
        assert_eq!(resolved.as_str(), expected, "failed for input: {}", input);
    }
}

#[test]
fn test_resolve_skips_data_uris_and_empty_values() {
    let base = Url::parse("https://example.com/").unwrap();

    assert!(url_resolver::resolve(&base, "data:image/png;base64,iVBORw0KGgo=").is_none());
    assert!(url_resolver::resolve(&base, "").is_none());
    assert!(url_resolver::resolve(&base, "   ").is_none());
}

#[test]
fn test_fragment_stripping_is_idempotent() {
    let base = Url::parse("https://example.com/docs/").unwrap();

    let with_fragment = url_resolver::resolve(&base, "logo.png#header").unwrap();
    let without_fragment = url_resolver::resolve(&base, "logo.png").unwrap();
    assert_eq!(with_fragment, without_fragment);

    // Resolving the already-stripped URL again changes nothing.
    let again = url_resolver::resolve(&base, with_fragment.as_str()).unwrap();
    assert_eq!(again, without_fragment);
}

#[test]
fn test_same_origin() {
    let page = Url::parse("https://example.com/index.html").unwrap();

    let same = Url::parse("https://example.com:443/assets/app.js").unwrap();
    assert!(url_resolver::same_origin(&page, &same));

    let other_scheme = Url::parse("http://example.com/assets/app.js").unwrap();
    assert!(!url_resolver::same_origin(&page, &other_scheme));

    let other_host = Url::parse("https://cdn.example.com/assets/app.js").unwrap();
    assert!(!url_resolver::same_origin(&page, &other_host));

    let other_port = Url::parse("https://example.com:8443/assets/app.js").unwrap();
    assert!(!url_resolver::same_origin(&page, &other_port));
}

#[test]
fn test_derive_filename() {
    let named = Url::parse("https://example.com/assets/logo.png?v=2").unwrap();
    assert_eq!(url_resolver::derive_filename(&named, None), "logo.png");

    let bare = Url::parse("https://example.com/assets/").unwrap();
    assert_eq!(
        url_resolver::derive_filename(&bare, Some("image/png")),
        "unknown_file.png"
    );
    assert_eq!(url_resolver::derive_filename(&bare, None), "unknown_file");

    let extensionless = Url::parse("https://example.com/theme").unwrap();
    assert_eq!(
        url_resolver::derive_filename(&extensionless, Some("text/css; charset=utf-8")),
        "unknown_file.css"
    );
}

#[test]
fn test_relative_path() {
    assert_eq!(
        url_resolver::relative_path("index.html", "img/logo.png"),
        "img/logo.png"
    );
    assert_eq!(
        url_resolver::relative_path("css/site.css", "fonts/font.woff2"),
        "../fonts/font.woff2"
    );
    assert_eq!(
        url_resolver::relative_path("css/site.css", "css/fonts.css"),
        "fonts.css"
    );
}

#[test]
fn test_bucket_classification() {
    let plain = Url::parse("https://example.com/thing").unwrap();

    assert_eq!(
        url_resolver::classify("img", None, &plain),
        ResourceBucket::Image
    );
    assert_eq!(
        url_resolver::classify("link", Some("stylesheet"), &plain),
        ResourceBucket::Stylesheet
    );
    assert_eq!(
        url_resolver::classify("script", None, &plain),
        ResourceBucket::Script
    );
    assert_eq!(
        url_resolver::classify("video", None, &plain),
        ResourceBucket::Video
    );
    assert_eq!(
        url_resolver::classify("source", None, &plain),
        ResourceBucket::Video
    );

    let font = Url::parse("https://example.com/fonts/icons.woff2").unwrap();
    assert_eq!(
        url_resolver::classify("link", Some("preload"), &font),
        ResourceBucket::Font
    );

    let icon = Url::parse("https://example.com/favicon.ico").unwrap();
    assert_eq!(
        url_resolver::classify("link", Some("icon"), &icon),
        ResourceBucket::Other
    );
}

#[test]
fn test_bucket_directories_are_fixed() {
    let names: Vec<&str> = ResourceBucket::ALL.iter().map(|b| b.dir_name()).collect();
    assert_eq!(names, vec!["img", "css", "js", "videos", "fonts", "other"]);
}

#[test]
fn test_claim_set_is_claim_once() {
    let claims = ClaimSet::new();

    assert!(claims.claim("css/site.css"));
    assert!(!claims.claim("css/site.css"));

    claims.release("css/site.css");
    assert!(claims.claim("css/site.css"));
}

#[test]
fn test_source_page_normalization() {
    let page = SourcePage::from_url(&Url::parse("http://example.com/blog/post").unwrap());
    assert_eq!(page.page_url.as_str(), "http://example.com/blog/post/");
    assert_eq!(page.base_url.scheme(), "http");
    assert_eq!(page.base_url.host_str(), Some("example.com"));

    let file = SourcePage::from_url(&Url::parse("http://example.com/blog/post.html").unwrap());
    assert_eq!(file.page_url.as_str(), "http://example.com/blog/post.html");

    let root = SourcePage::from_url(&Url::parse("http://example.com/").unwrap());
    assert_eq!(root.page_url.as_str(), "http://example.com/");
}

#[tokio::test]
async fn test_store_reuses_existing_file_without_fetch() {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("img")).unwrap();
    fs::write(temp.path().join("img").join("logo.png"), b"previous run").unwrap();

    let store = AssetStore::new(temp.path());
    let session = test_session("http://127.0.0.1:1/");

    // Port 1 is closed; a fetch attempt would fail, so success here proves
    // the existing file short-circuited the download.
    let url = Url::parse("http://127.0.0.1:1/logo.png").unwrap();
    let saved = store
        .fetch_and_place(&url, ResourceBucket::Image, &session)
        .await
        .unwrap();

    assert_eq!(saved.as_deref(), Some("img/logo.png"));
    assert_eq!(
        fs::read(temp.path().join("img").join("logo.png")).unwrap(),
        b"previous run"
    );
}

#[tokio::test]
async fn test_store_downloads_once_for_repeated_references() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/logo.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("png bytes")
        .expect(1)
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());
    let url = Url::parse(&format!("{}/logo.png", server.url())).unwrap();

    let first = store
        .fetch_and_place(&url, ResourceBucket::Image, &session)
        .await
        .unwrap();
    let second = store
        .fetch_and_place(&url, ResourceBucket::Image, &session)
        .await
        .unwrap();

    assert_eq!(first.as_deref(), Some("img/logo.png"));
    assert_eq!(first, second);
    assert_eq!(
        fs::read_to_string(temp.path().join("img").join("logo.png")).unwrap(),
        "png bytes"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_store_fragment_variants_share_one_download() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/sprite.svg")
        .with_status(200)
        .with_body("<svg/>")
        .expect(1)
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());

    let plain = Url::parse(&format!("{}/sprite.svg", server.url())).unwrap();
    let with_fragment = Url::parse(&format!("{}/sprite.svg#icon-home", server.url())).unwrap();

    let first = store
        .fetch_and_place(&with_fragment, ResourceBucket::Image, &session)
        .await
        .unwrap();
    let second = store
        .fetch_and_place(&plain, ResourceBucket::Image, &session)
        .await
        .unwrap();

    assert_eq!(first, second);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_store_skips_data_uris() {
    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session("http://example.com/");

    let url = Url::parse("data:image/png;base64,AAAA").unwrap();
    let saved = store
        .fetch_and_place(&url, ResourceBucket::Image, &session)
        .await
        .unwrap();

    assert!(saved.is_none());
}

#[tokio::test]
async fn test_store_names_file_from_content_type() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/asset")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("bytes")
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());
    let url = Url::parse(&format!("{}/asset", server.url())).unwrap();

    let saved = store
        .fetch_and_place(&url, ResourceBucket::Image, &session)
        .await
        .unwrap();

    assert_eq!(saved.as_deref(), Some("img/unknown_file.png"));
    assert!(temp.path().join("img").join("unknown_file.png").exists());
}

#[tokio::test]
async fn test_store_surfaces_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.png")
        .with_status(404)
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());
    let url = Url::parse(&format!("{}/missing.png", server.url())).unwrap();

    match store
        .fetch_and_place(&url, ResourceBucket::Image, &session)
        .await
    {
        Err(DownloadError::Http { status, .. }) => assert_eq!(status.as_u16(), 404),
        other => panic!("expected an HTTP error, got {:?}", other),
    }

    assert!(!temp.path().join("img").join("missing.png").exists());
}

#[tokio::test]
async fn test_document_rewrite_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let logo = server
        .mock("GET", "/logo.png")
        .with_status(200)
        .with_body("logo")
        .expect(1)
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());

    let base_url = Url::parse(&server.url()).unwrap();
    let page_url = Url::parse(&format!("{}/a/", server.url())).unwrap();

    let html = r#"<html><body><img src="../logo.png" alt="logo"></body></html>"#.to_string();
    let progress = ProgressBar::hidden();

    let (rewritten, stats) = html_rewriter::rewrite_document(
        html, &base_url, &page_url, &store, &session, 5, &progress,
    )
    .await;

    assert!(rewritten.contains(r#"src="img/logo.png""#));
    assert!(temp.path().join("img").join("logo.png").exists());
    assert_eq!(stats.rewritten, 1);
    logo.assert_async().await;
}

#[tokio::test]
async fn test_cross_origin_reference_left_untouched() {
    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session("http://example.com/");

    let base_url = Url::parse("http://example.com/").unwrap();
    let page_url = base_url.clone();

    let html =
        r#"<html><body><img src="https://cdn.other.com/pic.png"></body></html>"#.to_string();
    let progress = ProgressBar::hidden();

    let (rewritten, stats) = html_rewriter::rewrite_document(
        html.clone(),
        &base_url,
        &page_url,
        &store,
        &session,
        5,
        &progress,
    )
    .await;

    assert_eq!(rewritten, html);
    assert_eq!(stats.rewritten, 0);
    assert_eq!(stats.skipped, 1);
}

#[tokio::test]
async fn test_failed_fetch_leaves_attribute_and_siblings_unaffected() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("GET", "/missing.png")
        .with_status(404)
        .create_async()
        .await;
    let _ok = server
        .mock("GET", "/ok.png")
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());

    let base_url = Url::parse(&server.url()).unwrap();
    let page_url = Url::parse(&format!("{}/", server.url())).unwrap();

    let html = r#"<html><body><img src="/missing.png"><img src="/ok.png"></body></html>"#
        .to_string();
    let progress = ProgressBar::hidden();

    let (rewritten, stats) = html_rewriter::rewrite_document(
        html, &base_url, &page_url, &store, &session, 5, &progress,
    )
    .await;

    assert!(rewritten.contains(r#"src="/missing.png""#));
    assert!(rewritten.contains(r#"src="img/ok.png""#));
    assert_eq!(stats.rewritten, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_repeated_document_references_share_one_download() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/banner.jpg")
        .with_status(200)
        .with_body("jpeg")
        .expect(1)
        .create_async()
        .await;

    let temp = tempdir().unwrap();
    let store = AssetStore::new(temp.path());
    let session = test_session(&server.url());

    let base_url = Url::parse(&server.url()).unwrap();
    let page_url = Url::parse(&format!("{}/", server.url())).unwrap();

    let html = r#"<html><body><img src="/banner.jpg"><img src="/banner.jpg"></body></html>"#
        .to_string();
    let progress = ProgressBar::hidden();

    let (rewritten, stats) = html_rewriter::rewrite_document(
        html, &base_url, &page_url, &store, &session, 5, &progress,
    )
    .await;

    assert!(!rewritten.contains(r#"src="/banner.jpg""#));
    assert_eq!(stats.rewritten, 2);
    mock.assert_async().await;
}
