pub mod ytdlp;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use ytdlp::YtDlp;

// Saved as: <title capped at 200 bytes> [<video id>].<container>
pub const OUTPUT_TEMPLATE: &str = "%(title).200B [%(id)s].%(ext)s";

pub const UNKNOWN_TITLE: &str = "(unknown)";

// ffmpeg is only needed to merge separate video and audio streams
pub fn merger_available() -> bool {
    which::which("ffmpeg").is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStrategy {
    // Best video plus best audio, merged into one container afterwards
    MergedStreams,
    // Best single stream that already carries both video and audio
    Progressive,
}

impl FormatStrategy {
    pub fn pick(merger_available: bool) -> Self {
        if merger_available {
            Self::MergedStreams
        } else {
            Self::Progressive
        }
    }

    pub fn selector(self) -> &'static str {
        match self {
            Self::MergedStreams => "bv*+ba/best",
            Self::Progressive => "best",
        }
    }

    pub fn merge_container(self) -> Option<&'static str> {
        match self {
            Self::MergedStreams => Some("mp4"),
            Self::Progressive => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub dest_dir: PathBuf,
    pub strategy: FormatStrategy,
}

impl DownloadPlan {
    pub fn new(dest_dir: &Path, merger_available: bool) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
            strategy: FormatStrategy::pick(merger_available),
        }
    }

    pub fn output_template(&self) -> String {
        self.dest_dir
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Downloading {
        percent: f32,
        speed: Option<String>,
        eta: Option<String>,
    },
    // Streams are on disk, merge or container fixup still running
    PostProcessing,
}

pub type ProgressFn = dyn Fn(Progress) + Send + Sync;

#[async_trait]
pub trait Downloader: Send + Sync {
    // Title without downloading anything, shown before the real download
    async fn fetch_title(&self, url: &str) -> anyhow::Result<String>;

    async fn download_video(
        &self,
        url: &str,
        plan: &DownloadPlan,
        on_progress: &ProgressFn,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_strategy_when_merger_present() {
        assert_eq!(FormatStrategy::pick(true), FormatStrategy::MergedStreams);
        assert_eq!(FormatStrategy::pick(true).selector(), "bv*+ba/best");
        assert_eq!(FormatStrategy::pick(true).merge_container(), Some("mp4"));
    }

    #[test]
    fn progressive_strategy_without_merger() {
        assert_eq!(FormatStrategy::pick(false), FormatStrategy::Progressive);
        assert_eq!(FormatStrategy::pick(false).selector(), "best");
        assert_eq!(FormatStrategy::pick(false).merge_container(), None);
    }

    #[test]
    fn template_lands_inside_destination() {
        let plan = DownloadPlan::new(Path::new("videos"), true);
        let template = plan.output_template();
        assert!(template.starts_with("videos"));
        assert!(template.ends_with("%(title).200B [%(id)s].%(ext)s"));
    }
}
