use anyhow::Result;
use clap::Parser;

use page_mirror::cli::MirrorCommand;
use page_mirror::mirror::PageMirror;

#[tokio::main]
async fn main() -> Result<()> {
    let args = MirrorCommand::parse();

    let mirror = PageMirror::new(&args)?;
    mirror.run().await?;

    println!("✅ Page mirroring completed successfully!");
    Ok(())
}
