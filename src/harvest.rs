//! The two harvesting pipelines.
//!
//! Both take a fully validated run configuration and a [`MediaSource`], so
//! they can run without any operator interaction. Prompting and retrying on
//! empty listings is left to the callers.

use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};

use crate::ledger::{PlaylistLedger, PlaylistVideoRow, VideoLedger, VideoRow};
use crate::source::{AttemptTokens, ListingEntry, MediaSource};
use crate::subtitles::SubtitlePolicy;

pub const NO_DESCRIPTION: &str = "No description available";
pub const DESCRIPTION_ERROR: &str = "Error fetching description";
pub const SUBTITLES_ERROR: &str = "Error fetching subtitles";

/// Input of [`harvest_videos`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHarvestConfig {
    /// Playlist or channel videos page.
    pub source_url: String,
    pub output_path: PathBuf,
    pub prefer_uploaded: bool,
}

/// Input of [`export_playlists`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistExportConfig {
    /// Channel `/playlists` page.
    pub channel_url: String,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub listed: usize,
    pub added: usize,
    pub skipped_existing: usize,
    /// Rows written with error sentinels.
    pub failed: usize,
    /// Listing lines dropped for lacking a tab separator.
    pub malformed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// The listing was empty; nothing was written.
    NoVideos,
    Completed(HarvestSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub playlists: usize,
    pub rows: usize,
    pub malformed: usize,
    pub empty_playlists: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The channel listed no playlists; nothing was written.
    NoPlaylists,
    Completed(ExportSummary),
}

/// Lists every playlist of a channel and writes one row per playlist video
/// into a freshly created ledger.
pub async fn export_playlists<S: MediaSource>(
    source: &S,
    config: &PlaylistExportConfig,
) -> Result<ExportOutcome> {
    let playlists = source.list_playlists(&config.channel_url).await;
    if playlists.is_empty() {
        return Ok(ExportOutcome::NoPlaylists);
    }

    let mut summary = ExportSummary {
        playlists: playlists.len(),
        malformed: playlists.skipped,
        ..ExportSummary::default()
    };
    let mut ledger = PlaylistLedger::create(&config.output_path)?;

    for playlist in &playlists.entries {
        info!("Processing playlist: {}", playlist.title);
        let videos = source.list_playlist_videos(&playlist.url).await;
        summary.malformed += videos.skipped;
        if videos.is_empty() {
            warn!("No videos listed for playlist {}", playlist.url);
            summary.empty_playlists += 1;
            continue;
        }

        for video in videos.entries {
            ledger.append(&PlaylistVideoRow {
                video_title: video.title,
                video_url: video.url,
                playlist_url: playlist.url.clone(),
                playlist_name: playlist.title.clone(),
            })?;
        }
    }

    summary.rows = ledger.rows();
    ledger.finish()?;
    Ok(ExportOutcome::Completed(summary))
}

/// Appends every video of a playlist/channel that the ledger does not know
/// yet, together with its description and normalized captions.
pub async fn harvest_videos<S: MediaSource>(
    source: &S,
    config: &VideoHarvestConfig,
    tokens: &AttemptTokens,
) -> Result<HarvestOutcome> {
    let listing = source.list_videos(&config.source_url).await;
    if listing.is_empty() {
        return Ok(HarvestOutcome::NoVideos);
    }

    let policy = SubtitlePolicy::new(config.prefer_uploaded);
    let mut ledger = VideoLedger::open(&config.output_path)?;
    let total = listing.len();
    let mut summary = HarvestSummary {
        listed: total,
        malformed: listing.skipped,
        ..HarvestSummary::default()
    };
    info!(
        "Found {} videos, {} already in {}",
        total,
        ledger.preexisting(),
        ledger.path().display()
    );

    for (index, entry) in listing.entries.iter().enumerate() {
        let position = index + 1;
        if ledger.contains(&entry.url) {
            info!(
                "Skipping video {}/{}: {} ({}) - Already exists in the CSV file.",
                position, total, entry.title, entry.url
            );
            summary.skipped_existing += 1;
            continue;
        }

        info!(
            "Processing video {}/{}: {} ({})",
            position, total, entry.title, entry.url
        );
        let row = match enrich(source, entry, &policy, tokens).await {
            Ok(row) => row,
            Err(err) => {
                warn!("Error processing video {}: {:#}", entry.url, err);
                summary.failed += 1;
                VideoRow {
                    title: entry.title.clone(),
                    url: entry.url.clone(),
                    description: DESCRIPTION_ERROR.to_owned(),
                    subtitles: SUBTITLES_ERROR.to_owned(),
                }
            }
        };
        ledger.append(&row)?;
        summary.added += 1;
    }

    Ok(HarvestOutcome::Completed(summary))
}

async fn enrich<S: MediaSource>(
    source: &S,
    entry: &ListingEntry,
    policy: &SubtitlePolicy,
    tokens: &AttemptTokens,
) -> Result<VideoRow> {
    let description = source
        .fetch_info(&entry.url)
        .await?
        .and_then(|info| info.description)
        .unwrap_or_else(|| NO_DESCRIPTION.to_owned());
    let subtitles = policy.resolve(source, &entry.url, tokens).await;

    Ok(VideoRow {
        title: entry.title.clone(),
        url: entry.url.clone(),
        description,
        subtitles,
    })
}
