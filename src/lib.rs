pub mod asset_store;
pub mod cli;
pub mod css_rewriter;
pub mod html_rewriter;
pub mod mirror;
pub mod render;
pub mod url_resolver;

// Re-export main types for convenience
pub use asset_store::{AssetStore, ClaimSet, DownloadError, FetchSession};
pub use cli::MirrorCommand;
pub use html_rewriter::{AssetReference, DocumentStats};
pub use mirror::{PageMirror, SourcePage};
pub use url_resolver::ResourceBucket;
