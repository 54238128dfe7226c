use std::collections::HashSet;
use std::fs;

use colored::*;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use url::Url;

use crate::asset_store::{AssetStore, ClaimSet, FetchSession};
use crate::url_resolver::{self, ResourceBucket};

/// Matches `@import "x"`, `@import 'x'`, `@import url(x)` and
/// `@import url("x")`, capturing the whole statement for verbatim
/// replacement.
const IMPORT_PATTERN: &str =
    r#"(?i)@import\s+(?:url\(\s*['"]?([^'")]+?)['"]?\s*\)|"([^"]+)"|'([^']+)')[^;]*;?"#;

/// Matches optionally-quoted `url(...)` targets, case-insensitive on the
/// `url` token.
const URL_PATTERN: &str = r#"(?i)url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#;

/// One `@import` statement as it appears in the stylesheet text.
#[derive(Debug, Clone, PartialEq)]
pub struct CssImport {
    /// The full statement, verbatim, for textual replacement.
    pub statement: String,
    /// The import target with quotes and surrounding whitespace removed.
    pub target: String,
}

/// Extracts every `@import` statement, both syntactic forms.
pub fn extract_imports(css: &str) -> Vec<CssImport> {
    let mut imports = Vec::new();
    if let Ok(pattern) = Regex::new(IMPORT_PATTERN) {
        for caps in pattern.captures_iter(css) {
            let target = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3));
            if let (Some(statement), Some(target)) = (caps.get(0), target) {
                imports.push(CssImport {
                    statement: statement.as_str().to_string(),
                    target: target.as_str().trim().to_string(),
                });
            }
        }
    }
    imports
}

/// Extracts the raw target of every `url(...)` reference. Data URIs are
/// returned too; the rewriter is the one that skips them.
pub fn extract_urls(css: &str) -> Vec<String> {
    let mut urls = Vec::new();
    if let Ok(pattern) = Regex::new(URL_PATTERN) {
        for caps in pattern.captures_iter(css) {
            if let Some(target) = caps.get(1) {
                urls.push(target.as_str().trim().to_string());
            }
        }
    }
    urls
}

/// Rewrites a saved stylesheet in place.
///
/// Imports go first, depth-first: each one is downloaded, its statement
/// replaced with a normalized `@import "<relative>";`, and the imported
/// file fully rewritten before this one continues. The `url()` pass then
/// runs over the same buffer so the replacements compose. `processed`
/// stops revisits, which is what terminates import cycles and diamonds.
///
/// `css_relative` is the stylesheet's own location relative to the mirror
/// root (for example `css/site.css`); rewritten references inside it are
/// relative to that directory, because that is how the browser resolves
/// them. Failed subresources keep their original text.
pub fn rewrite_stylesheet<'a>(
    store: &'a AssetStore,
    session: &'a FetchSession,
    processed: &'a ClaimSet,
    css_relative: String,
    css_url: Url,
) -> BoxFuture<'a, ()> {
    async move {
        let mut identity = css_url.clone();
        identity.set_fragment(None);
        if !processed.claim(identity.as_str()) {
            return;
        }

        let disk_path = store.mirror_root().join(&css_relative);
        let mut content = match fs::read_to_string(&disk_path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!(
                    "{} failed to read stylesheet {:?}: {}",
                    "error:".red().bold(),
                    disk_path,
                    e
                );
                return;
            }
        };

        for import in extract_imports(&content) {
            let resolved = match url_resolver::resolve(&css_url, &import.target) {
                Some(resolved) => resolved,
                None => continue,
            };

            match store
                .fetch_and_place(&resolved, ResourceBucket::Stylesheet, session)
                .await
            {
                Ok(Some(saved)) => {
                    let relative = url_resolver::relative_path(&css_relative, &saved);
                    content = content.replace(&import.statement, &format!("@import \"{}\";", relative));
                    // Nested dependencies must exist on disk before this
                    // stylesheet is finalized.
                    rewrite_stylesheet(store, session, processed, saved, resolved).await;
                }
                Ok(None) => {}
                Err(e) => e.report(),
            }
        }

        let mut seen = HashSet::new();
        for raw in extract_urls(&content) {
            if !seen.insert(raw.clone()) {
                continue;
            }

            let resolved = match url_resolver::resolve(&css_url, &raw) {
                Some(resolved) => resolved,
                None => continue,
            };

            let bucket = if url_resolver::has_font_extension(resolved.path()) {
                ResourceBucket::Font
            } else {
                ResourceBucket::Image
            };

            match store.fetch_and_place(&resolved, bucket, session).await {
                Ok(Some(saved)) => {
                    let relative = url_resolver::relative_path(&css_relative, &saved);
                    // Plain substring replacement: every occurrence of the
                    // raw URL text is rewritten uniformly.
                    content = content.replace(&raw, &relative);
                }
                Ok(None) => {}
                Err(e) => e.report(),
            }
        }

        if let Err(e) = fs::write(&disk_path, content) {
            eprintln!(
                "{} failed to write stylesheet {:?}: {}",
                "error:".red().bold(),
                disk_path,
                e
            );
        }
    }
    .boxed()
}
