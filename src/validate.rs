//! Shape checks for operator input: source URLs and ledger file names.

use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

pub const LEDGER_EXTENSION: &str = ".csv";

static CHANNEL_PLAYLISTS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://www\.youtube\.com/@[^/]+/playlists").expect("valid channel pattern")
});

static VIDEO_LISTING_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://www\.youtube\.com/(?:playlist|@[^/]+/videos|@[^/]+/playlists)")
        .expect("valid listing pattern")
});

/// Accepts `https://www.youtube.com/@<channel>/playlists` pages.
pub fn validate_channel_playlists_url(url: &str) -> Result<()> {
    if !CHANNEL_PLAYLISTS_URL.is_match(url) {
        bail!("Invalid YouTube URL. Please enter a valid channel playlists URL.");
    }
    Ok(())
}

/// Accepts playlist pages and channel `/videos` or `/playlists` pages.
pub fn validate_video_listing_url(url: &str) -> Result<()> {
    if !VIDEO_LISTING_URL.is_match(url) {
        bail!("Invalid YouTube URL. Please enter a valid playlist or channel video URL.");
    }
    Ok(())
}

/// Ledger names are plain file names ending in `.csv`; they always land in
/// the output directory.
pub fn validate_ledger_file_name(name: &str) -> Result<()> {
    let Some(stem) = name.strip_suffix(LEDGER_EXTENSION) else {
        bail!("Output file should end with .csv. Please enter a valid file name.");
    };
    if stem.trim().is_empty() {
        bail!("Output file name cannot be empty. Please enter a valid file name.");
    }
    if name.contains(['/', '\\']) || stem == "." || stem == ".." {
        bail!("Output file name must not contain directories. Please enter a plain file name.");
    }
    Ok(())
}
