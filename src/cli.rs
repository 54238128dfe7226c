use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "page-mirror",
    about = "Copy a single web page into a local, self-contained directory",
    version,
    long_about = "Downloads a web page, fetches its same-origin images, stylesheets, scripts, videos and fonts, rewrites every reference to the local copy, and writes the result as index.html plus per-type asset directories."
)]
pub struct MirrorCommand {
    /// The URL of the page to copy
    #[arg(required = true)]
    pub url: String,

    /// Output directory for the mirrored page
    #[arg(required = true)]
    pub output_dir: PathBuf,

    /// Maximum concurrent asset downloads
    #[arg(short = 'c', long, default_value = "5")]
    pub max_concurrent: usize,

    /// Timeout for each request in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// User agent string to use for requests
    #[arg(
        long,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3"
    )]
    pub user_agent: String,

    /// Capture with a real browser window, leaving time to interact with
    /// the page before the snapshot is taken
    #[arg(short = 'm', long)]
    pub manual: bool,

    /// Seconds to keep the browser open before capture (manual mode)
    #[arg(long, default_value = "20")]
    pub wait: u64,
}
