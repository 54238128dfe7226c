use std::path::{Path, PathBuf};
use url::Url;

/// Extensions that route a `url()` reference or an unclassified tag into the
/// fonts directory.
pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// The category a downloaded asset is filed under. Each bucket owns one
/// fixed subdirectory of the mirror root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBucket {
    Image,
    Stylesheet,
    Script,
    Video,
    Font,
    Other,
}

impl ResourceBucket {
    pub const ALL: [ResourceBucket; 6] = [
        ResourceBucket::Image,
        ResourceBucket::Stylesheet,
        ResourceBucket::Script,
        ResourceBucket::Video,
        ResourceBucket::Font,
        ResourceBucket::Other,
    ];

    /// The subdirectory of the mirror root this bucket writes into.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ResourceBucket::Image => "img",
            ResourceBucket::Stylesheet => "css",
            ResourceBucket::Script => "js",
            ResourceBucket::Video => "videos",
            ResourceBucket::Font => "fonts",
            ResourceBucket::Other => "other",
        }
    }
}

/// Joins `raw` against `base` and strips any fragment from the result.
///
/// Handles relative, absolute and scheme-relative references, preserving
/// query strings. Returns `None` for data URIs (they are never fetched) and
/// for values that do not resolve to a URL at all; callers skip those
/// references.
pub fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    let mut resolved = base.join(raw).ok()?;
    resolved.set_fragment(None);
    Some(resolved)
}

/// Compares scheme + host (+ port, counting scheme defaults) of two URLs.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Derives the on-disk filename for a URL.
///
/// The last path segment (the query is not part of the path) is used as-is
/// when it carries an extension. Otherwise the content type, when one is
/// available, is mapped to a canonical extension and the file becomes
/// `unknown_file.<ext>`; with no usable content type it is `unknown_file`.
/// This is the single fallback-naming policy for the whole mirror.
pub fn derive_filename(url: &Url, content_type: Option<&str>) -> String {
    let candidate = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    if !candidate.is_empty() && has_extension(candidate) {
        return candidate.to_string();
    }

    match content_type.and_then(extension_for_content_type) {
        Some(ext) => format!("unknown_file.{}", ext),
        None => "unknown_file".to_string(),
    }
}

/// True when `name` ends in a non-empty extension.
pub fn has_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map_or(false, |ext| !ext.is_empty())
}

fn extension_for_content_type(content_type: &str) -> Option<String> {
    // "text/css; charset=utf-8" -> "text/css"
    let essence = content_type.split(';').next().unwrap_or("").trim();
    let mime: mime::Mime = essence.parse().ok()?;
    mime_guess::get_mime_extensions(&mime)
        .and_then(|extensions| extensions.last())
        .map(|ext| ext.to_string())
}

/// Computes the forward-slash path from `from_file`'s directory to
/// `to_file`. Both arguments are paths relative to the mirror root; the
/// result is what gets embedded in rewritten references, so the separator
/// is `/` regardless of the host filesystem.
pub fn relative_path(from_file: &str, to_file: &str) -> String {
    let from_dir = Path::new(from_file).parent().unwrap_or_else(|| Path::new(""));
    let diff = pathdiff::diff_paths(Path::new(to_file), from_dir)
        .unwrap_or_else(|| PathBuf::from(to_file));

    diff.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// True when the path ends in one of the web font extensions.
pub fn has_font_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    FONT_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Single classification point for document references: the tag kind
/// decides first, then the link relation, then extension sniffing on the
/// resolved URL.
pub fn classify(tag: &str, rel: Option<&str>, url: &Url) -> ResourceBucket {
    match tag {
        "img" => ResourceBucket::Image,
        "link" if rel.map_or(false, |r| r.contains("stylesheet")) => ResourceBucket::Stylesheet,
        "script" => ResourceBucket::Script,
        "video" | "source" => ResourceBucket::Video,
        _ if has_font_extension(url.path()) => ResourceBucket::Font,
        _ => ResourceBucket::Other,
    }
}
