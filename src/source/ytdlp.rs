//! [`MediaSource`] backed by the `yt-dlp` and `ffmpeg` executables.
//!
//! Every invocation is bounded by the configured timeout. A call that runs out
//! of time is killed and reported the same way as a call that failed: the
//! listing comes back empty or the caption/info lookup yields `None`.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use tokio::process::Command;
use walkdir::WalkDir;

use super::{
    AttemptToken, CaptionKind, ListedItem, Listing, MAX_PLAYLIST_ITEMS, MediaSource, VideoInfo,
    parse_listing,
};
use crate::config::RuntimeSettings;

/// Process-backed source. Caption files are staged in `temp_dir` under names
/// derived from the attempt token.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    yt_dlp: PathBuf,
    ffmpeg: PathBuf,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl YtDlpSource {
    pub fn new(
        yt_dlp: impl Into<PathBuf>,
        ffmpeg: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
            ffmpeg: ffmpeg.into(),
            temp_dir: temp_dir.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::new(
            &settings.yt_dlp_bin,
            &settings.ffmpeg_bin,
            &settings.temp_dir,
            settings.tool_timeout,
        )
    }

    /// Fails early when either external tool is missing.
    pub fn ensure_available(&self) -> Result<()> {
        self.ensure_lister_available()?;
        ensure_program_available(&self.ffmpeg)
    }

    /// Listing and info calls only need yt-dlp.
    pub fn ensure_lister_available(&self) -> Result<()> {
        ensure_program_available(&self.yt_dlp)
    }

    /// Runs a flat listing and parses `title<TAB>url` lines. Any failure is
    /// logged and reported as an empty listing.
    async fn flat_listing(
        &self,
        url: &str,
        print_template: &str,
        extra: &[&str],
        item: ListedItem,
    ) -> Listing {
        let mut command = Command::new(&self.yt_dlp);
        command
            .arg("-i")
            .arg("--flat-playlist")
            .arg("--print")
            .arg(print_template)
            .args(extra)
            .arg(url);

        match run_bounded(command, "listing", self.timeout).await {
            Ok(Some(output)) if output.status.success() => {
                parse_listing(&String::from_utf8_lossy(&output.stdout), item)
            }
            Ok(Some(output)) => {
                warn!(
                    "Listing failed for {} (status {}): {}",
                    url,
                    output.status,
                    stderr_excerpt(&output)
                );
                Listing::default()
            }
            Ok(None) => {
                warn!("Timeout while listing {}", url);
                Listing::default()
            }
            Err(err) => {
                warn!("Could not list {}: {:#}", url, err);
                Listing::default()
            }
        }
    }

    fn attempt_base(&self, language: &str, token: &AttemptToken) -> PathBuf {
        self.temp_dir.join(attempt_stem(language, token))
    }

    /// Converts the downloaded WebVTT file to SRT next to it. The VTT file is
    /// removed whatever the outcome.
    async fn convert_to_srt(&self, vtt: &Path, srt: &Path) -> Result<bool> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(vtt)
            .arg(srt);

        let result = run_bounded(command, "ffmpeg", self.timeout).await;
        if let Err(err) = fs::remove_file(vtt) {
            debug!("could not remove {}: {}", vtt.display(), err);
        }

        match result? {
            Some(output) if output.status.success() => Ok(srt.exists()),
            Some(output) => {
                warn!(
                    "Error converting {} to SRT (status {}): {}",
                    vtt.display(),
                    output.status,
                    stderr_excerpt(&output)
                );
                Ok(false)
            }
            None => {
                warn!("Timeout while converting {}", vtt.display());
                Ok(false)
            }
        }
    }

    /// Deletes every staged file belonging to `token`.
    fn discard_attempt(&self, language: &str, token: &AttemptToken) {
        for path in attempt_files(&self.temp_dir, &attempt_stem(language, token)) {
            if let Err(err) = fs::remove_file(&path) {
                debug!("could not remove {}: {}", path.display(), err);
            }
        }
    }
}

impl MediaSource for YtDlpSource {
    async fn list_playlists(&self, channel_url: &str) -> Listing {
        self.flat_listing(
            channel_url,
            "%(title)s\t%(url)s",
            &[],
            ListedItem::Playlist,
        )
        .await
    }

    async fn list_videos(&self, list_url: &str) -> Listing {
        let items = format!("1-{MAX_PLAYLIST_ITEMS}");
        self.flat_listing(
            list_url,
            "%(title)s\t%(webpage_url)s",
            &["--playlist-items", items.as_str()],
            ListedItem::Video,
        )
        .await
    }

    async fn list_playlist_videos(&self, playlist_url: &str) -> Listing {
        self.flat_listing(
            playlist_url,
            "%(title)s\t%(webpage_url)s",
            &[],
            ListedItem::Video,
        )
        .await
    }

    async fn fetch_info(&self, video_url: &str) -> Result<Option<VideoInfo>> {
        let mut command = Command::new(&self.yt_dlp);
        command
            .arg("-J")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg(video_url);

        let Some(output) = run_bounded(command, "metadata", self.timeout)
            .await
            .with_context(|| format!("fetching info for {video_url}"))?
        else {
            warn!("Timeout while fetching info for {}", video_url);
            return Ok(None);
        };

        if !output.status.success() {
            warn!(
                "Metadata command failed for {} (status {}): {}",
                video_url,
                output.status,
                stderr_excerpt(&output)
            );
            return Ok(None);
        }

        match serde_json::from_slice::<VideoInfo>(&output.stdout) {
            Ok(info) => Ok(Some(info)),
            Err(err) => {
                warn!("Error decoding JSON for {}: {}", video_url, err);
                Ok(None)
            }
        }
    }

    async fn fetch_captions(
        &self,
        video_url: &str,
        kind: CaptionKind,
        language: &str,
        token: &AttemptToken,
    ) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.temp_dir)
            .with_context(|| format!("creating {}", self.temp_dir.display()))?;

        let base = self.attempt_base(language, token);
        let mut command = Command::new(&self.yt_dlp);
        command
            .arg("--skip-download")
            .arg(match kind {
                CaptionKind::Uploaded => "--write-sub",
                CaptionKind::Auto => "--write-auto-sub",
            })
            .arg("--sub-lang")
            .arg(language)
            .arg("--convert-subs")
            .arg("vtt")
            .arg("--no-warnings")
            .arg("-o")
            .arg(&base)
            .arg(video_url);

        let output = match run_bounded(command, "subtitles", self.timeout).await {
            Ok(Some(output)) => output,
            Ok(None) => {
                warn!(
                    "Timeout while fetching {} {} subtitles for {}",
                    kind, language, video_url
                );
                self.discard_attempt(language, token);
                return Ok(None);
            }
            Err(err) => {
                self.discard_attempt(language, token);
                return Err(err.context(format!("fetching subtitles for {video_url}")));
            }
        };

        if !output.status.success() {
            debug!(
                "{} {} subtitles unavailable for {} (status {})",
                kind, language, video_url, output.status
            );
            self.discard_attempt(language, token);
            return Ok(None);
        }

        let stem = attempt_stem(language, token);
        let Some(vtt) = attempt_files(&self.temp_dir, &stem)
            .into_iter()
            .find(|path| path.extension() == Some(OsStr::new("vtt")))
        else {
            debug!("no {} {} subtitles for {}", kind, language, video_url);
            self.discard_attempt(language, token);
            return Ok(None);
        };

        let srt = base.with_extension("srt");
        let converted = self.convert_to_srt(&vtt, &srt).await;
        match converted {
            Ok(true) => Ok(Some(srt)),
            Ok(false) => {
                self.discard_attempt(language, token);
                Ok(None)
            }
            Err(err) => {
                self.discard_attempt(language, token);
                Err(err.context(format!("converting subtitles for {video_url}")))
            }
        }
    }
}

/// File stem shared by every file of one caption attempt.
fn attempt_stem(language: &str, token: &AttemptToken) -> String {
    format!("subtitle_{language}_{token}")
}

/// Files directly inside `dir` named `<stem>.<anything>`.
fn attempt_files(dir: &Path, stem: &str) -> Vec<PathBuf> {
    let prefix = format!("{stem}.");
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.into_path())
        .collect()
}

/// Spawns `command` and waits for it at most `limit`. Returns `Ok(None)` when
/// the process ran out of time; the child is killed when its handle drops.
async fn run_bounded(mut command: Command, label: &str, limit: Duration) -> Result<Option<Output>> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("spawning {label} command"))?;

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => output
            .map(Some)
            .with_context(|| format!("waiting for {label} command")),
        Err(_) => Ok(None),
    }
}

fn stderr_excerpt(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.lines().last().unwrap_or_default().trim().to_owned()
}

/// Runs `<program> --version` to fail loudly when a dependency is missing.
/// ffmpeg only understands `-version`, which is tried second.
pub fn ensure_program_available(program: &Path) -> Result<()> {
    let probe = |flag: &str| {
        StdCommand::new(program)
            .arg(flag)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
    };

    match probe("--version") {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => match probe("-version") {
            Ok(status) if status.success() => Ok(()),
            _ => bail!(
                "{} is installed but returned a failure status",
                program.display()
            ),
        },
        Err(err) => bail!(
            "{} is not installed or not in PATH: {}",
            program.display(),
            err
        ),
    }
}
