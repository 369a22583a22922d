#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("yt-dlp was not found on PATH. Install it with: pip install yt-dlp")]
    EngineMissing,

    #[error("{0}")]
    Failed(String),
}
