use std::sync::Arc;

use indicatif::ProgressBar;
use select::document::Document;
use select::predicate::Name;
use tokio::sync::Semaphore;
use url::Url;

use crate::asset_store::{AssetStore, ClaimSet, FetchSession};
use crate::css_rewriter;
use crate::url_resolver::{self, ResourceBucket};

/// The fixed set of tag/attribute pairs the document scan covers.
pub const SCANNED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("img", &["src", "srcset"]),
    ("link", &["href"]),
    ("script", &["src"]),
    ("video", &["src"]),
    ("source", &["src", "srcset"]),
];

/// One tag/attribute reference lifted out of the document. Consumed once
/// per rewrite pass.
#[derive(Debug, Clone)]
pub struct AssetReference {
    pub tag: &'static str,
    pub attribute: &'static str,
    pub raw: String,
    pub rel: Option<String>,
}

/// Counts for the run summary.
#[derive(Debug, Default)]
pub struct DocumentStats {
    pub rewritten: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Rewritten { reference: AssetReference, local: String },
    Skipped,
    Failed,
}

/// Lifts every scanned tag/attribute pair with a non-empty value.
pub fn extract_references(html: &str) -> Vec<AssetReference> {
    let document = Document::from(html);
    let mut references = Vec::new();

    for &(tag, attributes) in SCANNED_ATTRIBUTES {
        for node in document.find(Name(tag)) {
            for &attribute in attributes {
                if let Some(value) = node.attr(attribute) {
                    if value.trim().is_empty() {
                        continue;
                    }
                    references.push(AssetReference {
                        tag,
                        attribute,
                        raw: value.to_string(),
                        rel: node.attr("rel").map(|rel| rel.to_string()),
                    });
                }
            }
        }
    }

    references
}

/// Downloads every same-origin reference in `html` and rewrites the
/// matching attribute values to the local relative paths.
///
/// References fan out over a bounded worker pool; each one is an
/// independent unit of work. A stylesheet link additionally runs the
/// stylesheet rewriter synchronously inside its own unit, so one import
/// chain never splits across workers while two different stylesheets can
/// still proceed concurrently. The returned string is the document with
/// all successful rewrites applied; failed or cross-origin references keep
/// their original attribute values.
pub async fn rewrite_document(
    html: String,
    base_url: &Url,
    page_url: &Url,
    store: &AssetStore,
    session: &FetchSession,
    max_concurrent: usize,
    progress: &ProgressBar,
) -> (String, DocumentStats) {
    let references = extract_references(&html);
    let processed = ClaimSet::new();
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let units = references.into_iter().map(|reference| {
        let semaphore = semaphore.clone();
        let processed = &processed;
        async move {
            let _permit = semaphore.acquire().await.unwrap();
            progress.set_message(reference.raw.clone());
            process_reference(reference, base_url, page_url, store, session, processed).await
        }
    });

    let outcomes = futures::future::join_all(units).await;

    let mut rewritten_html = html;
    let mut stats = DocumentStats::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Rewritten { reference, local } => {
                stats.rewritten += 1;
                let original = format!("{}=\"{}\"", reference.attribute, reference.raw);
                let replacement = format!("{}=\"{}\"", reference.attribute, local);
                rewritten_html = rewritten_html.replace(&original, &replacement);
            }
            Outcome::Skipped => stats.skipped += 1,
            Outcome::Failed => stats.failed += 1,
        }
    }

    (rewritten_html, stats)
}

async fn process_reference(
    reference: AssetReference,
    base_url: &Url,
    page_url: &Url,
    store: &AssetStore,
    session: &FetchSession,
    processed: &ClaimSet,
) -> Outcome {
    let resolved = match url_resolver::resolve(page_url, &reference.raw) {
        Some(resolved) => resolved,
        None => return Outcome::Skipped,
    };

    // Cross-origin assets are never mirrored; the attribute keeps pointing
    // at the live remote resource.
    if !url_resolver::same_origin(&resolved, base_url) {
        return Outcome::Skipped;
    }

    let bucket = url_resolver::classify(reference.tag, reference.rel.as_deref(), &resolved);

    match store.fetch_and_place(&resolved, bucket, session).await {
        Ok(Some(local)) => {
            if bucket == ResourceBucket::Stylesheet {
                css_rewriter::rewrite_stylesheet(store, session, processed, local.clone(), resolved)
                    .await;
            }
            Outcome::Rewritten { reference, local }
        }
        Ok(None) => Outcome::Skipped,
        Err(e) => {
            e.report();
            Outcome::Failed
        }
    }
}
