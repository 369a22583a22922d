use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::engine::{DownloadPlan, Downloader, Progress, ProgressFn, UNKNOWN_TITLE};
use crate::errors::DownloadError;

// Trailing stderr lines kept around for the failure report
const STDERR_TAIL: usize = 20;

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:.*?\bat\s+(?P<speed>\S+))?(?:.*?\bETA\s+(?P<eta>\S+))?",
    )
    .unwrap()
});

pub struct YtDlp {
    bin: PathBuf,
}

impl YtDlp {
    // The whole program is useless without the engine, so callers treat
    // an error here as fatal.
    pub fn locate() -> anyhow::Result<Self> {
        let bin = which::which("yt-dlp").map_err(|_| DownloadError::EngineMissing)?;
        log::debug!("using yt-dlp at {}", bin.display());
        Ok(Self { bin })
    }

    fn download_args(url: &str, plan: &DownloadPlan) -> Vec<String> {
        let mut args = vec![
            "--format".to_owned(),
            plan.strategy.selector().to_owned(),
            "--output".to_owned(),
            plan.output_template(),
            "--no-playlist".to_owned(),
            "--newline".to_owned(),
            "--no-warnings".to_owned(),
            "--retries".to_owned(),
            "3".to_owned(),
            "--fragment-retries".to_owned(),
            "5".to_owned(),
            "--concurrent-fragments".to_owned(),
            "5".to_owned(),
            "--windows-filenames".to_owned(),
        ];
        if let Some(container) = plan.strategy.merge_container() {
            args.push("--merge-output-format".to_owned());
            args.push(container.to_owned());
        }
        args.push(url.to_owned());
        args
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn fetch_title(&self, url: &str) -> anyhow::Result<String> {
        let output = Command::new(&self.bin)
            .args(["--dump-json", "--no-playlist", "--no-warnings"])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!("metadata query exited with {}", output.status);
        }
        let body = String::from_utf8_lossy(&output.stdout);
        let info = json::parse(body.trim())?;
        Ok(title_of(&info).unwrap_or_else(|| UNKNOWN_TITLE.to_owned()))
    }

    async fn download_video(
        &self,
        url: &str,
        plan: &DownloadPlan,
        on_progress: &ProgressFn,
    ) -> anyhow::Result<()> {
        let args = Self::download_args(url, plan);
        log::debug!("yt-dlp {}", args.join(" "));
        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An interrupted batch must not leave yt-dlp running
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp stderr was not captured"))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::new();
        let mut out_done = false;
        let mut err_done = false;

        // Progress arrives on stdout, errors on stderr; drain both so
        // neither pipe fills up and stalls the child
        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => {
                        if let Some(progress) = parse_progress(&line) {
                            on_progress(progress);
                        } else {
                            log::debug!("yt-dlp: {line}");
                        }
                    }
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => {
                        log::debug!("yt-dlp: {line}");
                        if tail.len() == STDERR_TAIL {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let detail = failure_detail(&tail)
                .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
            return Err(DownloadError::Failed(detail).into());
        }
        Ok(())
    }
}

fn parse_progress(line: &str) -> Option<Progress> {
    let line = line.trim();
    if line.starts_with("[Merger]") || line.starts_with("[VideoConvertor]") {
        return Some(Progress::PostProcessing);
    }
    let caps = PROGRESS_RE.captures(line)?;
    let percent = caps.name("percent")?.as_str().parse().ok()?;
    Some(Progress::Downloading {
        percent,
        speed: caps.name("speed").map(|m| m.as_str().to_owned()),
        eta: caps.name("eta").map(|m| m.as_str().to_owned()),
    })
}

fn title_of(info: &json::JsonValue) -> Option<String> {
    if let Some(title) = info["title"].as_str() {
        return Some(title.to_owned());
    }
    // Playlist-shaped payloads carry the title on the first entry
    info["entries"][0]["title"].as_str().map(str::to_owned)
}

fn failure_detail(tail: &VecDeque<String>) -> Option<String> {
    tail.iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| tail.iter().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim_start_matches("ERROR:").trim().to_owned())
}
