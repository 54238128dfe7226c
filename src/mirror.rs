use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use crate::asset_store::{AssetStore, FetchSession};
use crate::cli::MirrorCommand;
use crate::html_rewriter;
use crate::render;
use crate::url_resolver::ResourceBucket;

/// The resolved identity of the page being mirrored. Immutable once
/// derived, except that a browser-rendered capture re-derives it from the
/// final URL.
#[derive(Debug, Clone)]
pub struct SourcePage {
    /// scheme + host: the origin the same-origin policy compares against.
    pub base_url: Url,
    /// The base every relative reference resolves against.
    pub page_url: Url,
}

impl SourcePage {
    /// A path whose last segment has no extension resolves like a
    /// directory, so it gets a trailing slash before it becomes the
    /// resolution base.
    pub fn from_url(url: &Url) -> Self {
        let mut base_url = url.clone();
        base_url.set_path("");
        base_url.set_query(None);
        base_url.set_fragment(None);

        let mut page_url = url.clone();
        let path = page_url.path().to_string();
        if !path.ends_with('/') && !crate::url_resolver::has_extension(&path) {
            page_url.set_path(&format!("{}/", path));
        }

        Self { base_url, page_url }
    }
}

/// Owns the whole run: page fetch, reference fan-out, stylesheet cascade,
/// serialization.
pub struct PageMirror {
    requested_url: Url,
    source: SourcePage,
    output_dir: std::path::PathBuf,
    store: AssetStore,
    session: FetchSession,
    max_concurrent: usize,
    manual: bool,
    wait: Duration,
}

impl PageMirror {
    pub fn new(command: &MirrorCommand) -> Result<Self> {
        let requested_url = Url::parse(&command.url)
            .with_context(|| format!("failed to parse page URL: {}", command.url))?;
        let source = SourcePage::from_url(&requested_url);

        let session = FetchSession::new(
            &command.user_agent,
            &source.base_url,
            Duration::from_secs(command.timeout),
        )?;

        create_folder_structure(&command.output_dir)?;
        let store = AssetStore::new(&command.output_dir);

        Ok(Self {
            requested_url,
            source,
            output_dir: command.output_dir.clone(),
            store,
            session,
            max_concurrent: command.max_concurrent,
            manual: command.manual,
            wait: Duration::from_secs(command.wait),
        })
    }

    pub async fn run(&self) -> Result<()> {
        println!("🚀 Mirroring page: {}", self.requested_url.as_str().blue());
        println!("📁 Output directory: {:?}", self.output_dir);

        let (html, source) = if self.manual {
            let (html, final_url) = render::render_page(self.requested_url.as_str(), self.wait)
                .await
                .context("browser-rendered capture failed")?;
            (html, SourcePage::from_url(&final_url))
        } else {
            (self.fetch_page().await?, self.source.clone())
        };

        let progress = ProgressBar::new_spinner();
        progress.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}").unwrap());

        let (rewritten, stats) = html_rewriter::rewrite_document(
            html,
            &source.base_url,
            &source.page_url,
            &self.store,
            &self.session,
            self.max_concurrent,
            &progress,
        )
        .await;

        progress.finish_with_message("all asset downloads completed");

        let index_path = self.output_dir.join("index.html");
        fs::write(&index_path, rewritten)
            .with_context(|| format!("failed to write {:?}", index_path))?;

        println!(
            "📊 {} assets saved, {} references skipped, {} failed",
            stats.rewritten, stats.skipped, stats.failed
        );

        Ok(())
    }

    async fn fetch_page(&self) -> Result<String> {
        let response = self.session.get(&self.requested_url).await?;
        response
            .text()
            .await
            .with_context(|| format!("failed to read page body from {}", self.requested_url))
    }
}

/// Creates the mirror root and all six bucket subdirectories, empty or not.
fn create_folder_structure(output_dir: &Path) -> Result<()> {
    for bucket in ResourceBucket::ALL {
        let dir = output_dir.join(bucket.dir_name());
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory: {:?}", dir))?;
    }
    Ok(())
}
