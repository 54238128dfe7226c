use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use url::Url;

/// Captures a page with a real browser: navigates, holds the window open
/// for `wait` so the user can interact with the page (dismiss overlays,
/// log in, trigger lazy content), then returns the rendered HTML together
/// with the final URL, since redirects may have moved the page.
pub async fn render_page(url: &str, wait: Duration) -> Result<(String, Url)> {
    let config = BrowserConfig::builder()
        .with_head()
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .context("failed to launch browser")?;

    // The handler must be polled for the whole browser lifetime, and
    // aborted afterwards so it does not outlive the capture.
    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    let captured = capture(&browser, url, wait).await;

    let _ = browser.close().await;
    handler_task.abort();

    captured
}

async fn capture(browser: &Browser, url: &str, wait: Duration) -> Result<(String, Url)> {
    let page = browser.new_page(url).await.context("failed to open page")?;
    let _ = page.wait_for_navigation().await;

    tokio::time::sleep(wait).await;

    let html = page.content().await.context("failed to capture page content")?;
    let final_url = page
        .url()
        .await
        .context("failed to read final URL")?
        .unwrap_or_else(|| url.to_string());
    let final_url = Url::parse(&final_url).context("failed to parse final URL")?;

    Ok((html, final_url))
}
