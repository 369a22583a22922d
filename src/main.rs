mod batch;
mod engine;
mod errors;
mod interrupt;
mod links;

use std::path::PathBuf;

use crate::engine::YtDlp;

const DOWNLOAD_DIR: &str = "youtube_downloads";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    // Fail fast: nothing below works without the engine
    let downloader = YtDlp::locate()?;

    let links = links::collect().await;
    let dest_dir = PathBuf::from(DOWNLOAD_DIR);
    let report = batch::run(&downloader, &links, &dest_dir).await?;

    if report.interrupted {
        println!("\n🛑 Cancelled by the user.");
        return Ok(());
    }
    if report.attempted() > 0 {
        let shown = std::fs::canonicalize(&dest_dir).unwrap_or(dest_dir);
        println!("\n📂 Files saved in: {}", shown.display());
        if report.failed > 0 {
            println!(
                "⚠️  {} of {} downloads failed.",
                report.failed,
                report.attempted()
            );
        }
    }
    println!("🏁 Finished.");
    Ok(())
}
