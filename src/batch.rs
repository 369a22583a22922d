use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::{self, DownloadPlan, Downloader, Progress, UNKNOWN_TITLE};
use crate::errors::DownloadError;
use crate::interrupt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn attempted(self) -> usize {
        self.completed + self.failed
    }
}

pub async fn run<D: Downloader>(
    downloader: &D,
    links: &[String],
    dest_dir: &Path,
) -> anyhow::Result<BatchReport> {
    let mut report = BatchReport::default();
    if links.is_empty() {
        println!("ℹ️  No links provided. Nothing to do.");
        return Ok(report);
    }

    // Create folder
    std::fs::create_dir_all(dest_dir)?;
    log::debug!("destination: {}", dest_dir.display());

    // Pick the strategy from whether ffmpeg can merge for us
    let merger = engine::merger_available();
    if !merger {
        println!("ℹ️  ffmpeg not detected. Using 'best' (progressive video+audio).");
        println!("    For the best quality (merging separate video and audio), install ffmpeg.");
    }
    let plan = DownloadPlan::new(dest_dir, merger);

    let total = links.len();
    for (idx, url) in links.iter().enumerate() {
        let ordinal = idx + 1;
        println!("\n[{ordinal}/{total}] Analyzing: {url}");
        // Biased polling: Ctrl-C also reaches the child, so the interrupt
        // must win over the failure it causes
        let title = tokio::select! {
            biased;
            () = interrupt::wait() => {
                report.interrupted = true;
                break;
            }
            title = downloader.fetch_title(url) => title.unwrap_or_else(|error| {
                log::debug!("metadata query failed: {error:#}");
                UNKNOWN_TITLE.to_owned()
            }),
        };
        println!("▶️  Downloading [{ordinal}/{total}]: {title}");

        let bar = progress_bar();
        // The callback must own its handle; clones share the same bar
        let on_progress = {
            let bar = bar.clone();
            move |progress: Progress| render(&bar, progress)
        };
        let outcome = tokio::select! {
            biased;
            () = interrupt::wait() => None,
            result = downloader.download_video(url, &plan, &on_progress) => Some(result),
        };
        bar.finish_and_clear();
        match outcome {
            None => {
                report.interrupted = true;
                break;
            }
            Some(Ok(())) => {
                println!("✅ Done.");
                report.completed += 1;
            }
            Some(Err(error)) => {
                report.failed += 1;
                match error.downcast_ref::<DownloadError>() {
                    Some(error) => println!("❌ Download error: {error}"),
                    None => println!("❌ Unexpected error: {error:#}"),
                }
            }
        }
    }
    Ok(report)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("   ↳ {bar:32} {percent:>3}% {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    bar
}

// The clamp keeps the cast within range
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn render(bar: &ProgressBar, progress: Progress) {
    match progress {
        Progress::Downloading { percent, speed, eta } => {
            bar.set_position(percent.clamp(0.0, 100.0).round() as u64);
            let speed = speed.unwrap_or_default();
            let eta = eta.map(|eta| format!("  ETA {eta}")).unwrap_or_default();
            bar.set_message(format!("{speed}{eta}"));
        }
        Progress::PostProcessing => {
            bar.set_position(100);
            bar.set_message("processing…".to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::engine::ProgressFn;

    #[derive(Default)]
    struct Scripted {
        fail_on: Vec<usize>,
        explode_on: Vec<usize>,
        no_title_for: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Downloader for Scripted {
        async fn fetch_title(&self, url: &str) -> anyhow::Result<String> {
            if self.no_title_for.iter().any(|bad| bad == url) {
                anyhow::bail!("no metadata");
            }
            Ok(format!("title of {url}"))
        }

        async fn download_video(
            &self,
            url: &str,
            _plan: &DownloadPlan,
            on_progress: &ProgressFn,
        ) -> anyhow::Result<()> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(url.to_owned());
                calls.len() - 1
            };
            if self.fail_on.contains(&attempt) {
                return Err(DownloadError::Failed("simulated failure".to_owned()).into());
            }
            if self.explode_on.contains(&attempt) {
                anyhow::bail!("simulated crash");
            }
            on_progress(Progress::Downloading {
                percent: 50.0,
                speed: Some("1.00MiB/s".to_owned()),
                eta: Some("00:10".to_owned()),
            });
            Ok(())
        }
    }

    fn three_links() -> Vec<String> {
        vec![
            "https://youtu.be/one".to_owned(),
            "https://youtu.be/two".to_owned(),
            "https://youtu.be/three".to_owned(),
        ]
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Scripted {
            fail_on: vec![0],
            ..Scripted::default()
        };
        let report = run(&downloader, &three_links(), dir.path()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 2);
        assert_eq!(downloader.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unexpected_errors_also_continue() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Scripted {
            explode_on: vec![1],
            ..Scripted::default()
        };
        let report = run(&downloader, &three_links(), dir.path()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 2);
        assert_eq!(downloader.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_metadata_query_still_downloads_the_video() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Scripted {
            no_title_for: vec!["https://youtu.be/two".to_owned()],
            ..Scripted::default()
        };
        let report = run(&downloader, &three_links(), dir.path()).await.unwrap();
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(downloader.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_batch_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("downloads");
        let downloader = Scripted::default();
        let report = run(&downloader, &[], &dest).await.unwrap();
        assert_eq!(report, BatchReport::default());
        assert!(!dest.exists());
        assert!(downloader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn creates_destination_for_a_real_batch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("downloads");
        let downloader = Scripted::default();
        let report = run(&downloader, &["https://youtu.be/one".to_owned()], &dest)
            .await
            .unwrap();
        assert!(dest.is_dir());
        assert_eq!(report.completed, 1);
        assert_eq!(report.attempted(), 1);
    }

    #[test]
    fn callback_renders_onto_the_callers_bar() {
        let bar = progress_bar();
        let on_progress = {
            let bar = bar.clone();
            move |progress: Progress| render(&bar, progress)
        };
        on_progress(Progress::Downloading {
            percent: 42.4,
            speed: Some("2.50MiB/s".to_owned()),
            eta: Some("00:09".to_owned()),
        });
        assert_eq!(bar.position(), 42);
        on_progress(Progress::PostProcessing);
        assert_eq!(bar.position(), 100);
        bar.finish_and_clear();
    }
}
