//! Boundary between the harvesting logic and the external metadata tool.
//!
//! Everything that needs yt-dlp goes through [`MediaSource`]. The production
//! implementation lives in [`ytdlp`]; tests drive the pipelines with an
//! in-memory fake instead of spawning processes.

pub mod ytdlp;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use log::warn;
use serde::Deserialize;

pub use ytdlp::YtDlpSource;

/// Upper bound of entries requested from a single playlist/channel listing.
pub const MAX_PLAYLIST_ITEMS: usize = 1000;

/// A `(title, url)` pair printed by a flat listing, in listing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    pub url: String,
}

impl ListingEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Result of a listing call. `skipped` counts lines that lacked the
/// `title<TAB>url` separator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<ListingEntry>,
    pub skipped: usize,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// What a listing enumerates; only used to word the malformed-line warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListedItem {
    Video,
    Playlist,
}

impl ListedItem {
    fn malformed_label(self) -> &'static str {
        match self {
            ListedItem::Video => "line",
            ListedItem::Playlist => "playlist",
        }
    }
}

/// Parses the `--print "%(title)s\t%(url)s"` output of a flat listing.
/// Blank lines are ignored; lines without a tab are logged and skipped.
/// Titles are kept verbatim.
pub fn parse_listing(stdout: &str, item: ListedItem) -> Listing {
    let mut listing = Listing::default();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((title, url)) if !url.trim().is_empty() => {
                listing.entries.push(ListingEntry::new(title, url.trim()));
            }
            _ => {
                warn!("Skipping malformed {}: {line}", item.malformed_label());
                listing.skipped += 1;
            }
        }
    }
    listing
}

/// Subset of yt-dlp's `-J` payload the ledger needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub description: Option<String>,
}

/// Which caption track family to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptionKind {
    /// Creator-provided captions.
    Uploaded,
    /// Captions transcribed by the platform.
    Auto,
}

impl fmt::Display for CaptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptionKind::Uploaded => f.write_str("uploaded"),
            CaptionKind::Auto => f.write_str("auto-generated"),
        }
    }
}

/// Identifies the temporary files of one caption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptToken(String);

impl AttemptToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out `<prefix>-<sequence>` tokens. The sequence never repeats for a
/// given issuer, and the default prefix is the process id so separate runs
/// sharing a temp directory do not overlap either.
#[derive(Debug)]
pub struct AttemptTokens {
    prefix: String,
    next: AtomicU64,
}

impl AttemptTokens {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn for_process() -> Self {
        Self::new(std::process::id().to_string())
    }

    pub fn issue(&self) -> AttemptToken {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        AttemptToken(format!("{}-{}", self.prefix, sequence))
    }
}

/// Capability boundary for the metadata/caption tool.
///
/// Listing calls never fail: tool errors are logged by the implementation and
/// reported as an empty listing. `fetch_info` and `fetch_captions` return
/// `Ok(None)` when the tool ran but produced nothing usable (non-zero exit,
/// timeout, malformed payload); `Err` is reserved for failures to run the
/// tool at all.
#[allow(async_fn_in_trait)]
pub trait MediaSource {
    /// Playlists of a channel `/playlists` page as `(name, url)` pairs.
    async fn list_playlists(&self, channel_url: &str) -> Listing;

    /// Videos of a playlist or channel, capped at [`MAX_PLAYLIST_ITEMS`].
    async fn list_videos(&self, list_url: &str) -> Listing;

    /// Every video of one playlist, without the item cap.
    async fn list_playlist_videos(&self, playlist_url: &str) -> Listing;

    async fn fetch_info(&self, video_url: &str) -> Result<Option<VideoInfo>>;

    /// Downloads one caption track and returns the path of the converted SRT
    /// file. The caller owns the returned file and removes it when done.
    async fn fetch_captions(
        &self,
        video_url: &str,
        kind: CaptionKind,
        language: &str,
        token: &AttemptToken,
    ) -> Result<Option<PathBuf>>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted [`MediaSource`] used by the policy and pipeline tests.

    use super::*;
    use anyhow::bail;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::path::Path;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CaptionCall {
        pub url: String,
        pub kind: CaptionKind,
        pub language: String,
        pub token: String,
    }

    pub struct FakeSource {
        scratch: PathBuf,
        playlists: HashMap<String, Listing>,
        videos: HashMap<String, Listing>,
        descriptions: HashMap<String, String>,
        captions: HashMap<(String, CaptionKind, String), Vec<u8>>,
        broken_info: HashSet<String>,
        failing_captions: HashSet<(String, CaptionKind, String)>,
        pub caption_calls: Mutex<Vec<CaptionCall>>,
        pub info_calls: Mutex<Vec<String>>,
        pub capped_listings: Mutex<Vec<String>>,
        pub full_listings: Mutex<Vec<String>>,
    }

    impl FakeSource {
        pub fn new(scratch: &Path) -> Self {
            Self {
                scratch: scratch.to_path_buf(),
                playlists: HashMap::new(),
                videos: HashMap::new(),
                descriptions: HashMap::new(),
                captions: HashMap::new(),
                broken_info: HashSet::new(),
                failing_captions: HashSet::new(),
                caption_calls: Mutex::new(Vec::new()),
                info_calls: Mutex::new(Vec::new()),
                capped_listings: Mutex::new(Vec::new()),
                full_listings: Mutex::new(Vec::new()),
            }
        }

        pub fn with_playlists(mut self, channel: &str, listing: Listing) -> Self {
            self.playlists.insert(channel.to_owned(), listing);
            self
        }

        pub fn with_videos(mut self, list_url: &str, listing: Listing) -> Self {
            self.videos.insert(list_url.to_owned(), listing);
            self
        }

        pub fn with_description(mut self, url: &str, description: &str) -> Self {
            self.descriptions
                .insert(url.to_owned(), description.to_owned());
            self
        }

        pub fn with_captions(self, url: &str, kind: CaptionKind, lang: &str, srt: &str) -> Self {
            self.with_caption_bytes(url, kind, lang, srt.as_bytes())
        }

        pub fn with_caption_bytes(
            mut self,
            url: &str,
            kind: CaptionKind,
            lang: &str,
            bytes: &[u8],
        ) -> Self {
            self.captions
                .insert((url.to_owned(), kind, lang.to_owned()), bytes.to_vec());
            self
        }

        pub fn with_broken_info(mut self, url: &str) -> Self {
            self.broken_info.insert(url.to_owned());
            self
        }

        pub fn with_failing_captions(mut self, url: &str, kind: CaptionKind, lang: &str) -> Self {
            self.failing_captions
                .insert((url.to_owned(), kind, lang.to_owned()));
            self
        }

        pub fn attempted(&self) -> Vec<(CaptionKind, String)> {
            self.caption_calls
                .lock()
                .iter()
                .map(|call| (call.kind, call.language.clone()))
                .collect()
        }
    }

    impl MediaSource for FakeSource {
        async fn list_playlists(&self, channel_url: &str) -> Listing {
            self.playlists.get(channel_url).cloned().unwrap_or_default()
        }

        async fn list_videos(&self, list_url: &str) -> Listing {
            self.capped_listings.lock().push(list_url.to_owned());
            self.videos.get(list_url).cloned().unwrap_or_default()
        }

        async fn list_playlist_videos(&self, playlist_url: &str) -> Listing {
            self.full_listings.lock().push(playlist_url.to_owned());
            self.videos.get(playlist_url).cloned().unwrap_or_default()
        }

        async fn fetch_info(&self, video_url: &str) -> Result<Option<VideoInfo>> {
            self.info_calls.lock().push(video_url.to_owned());
            if self.broken_info.contains(video_url) {
                bail!("could not start metadata tool for {video_url}");
            }
            Ok(self.descriptions.get(video_url).map(|description| VideoInfo {
                description: Some(description.clone()),
            }))
        }

        async fn fetch_captions(
            &self,
            video_url: &str,
            kind: CaptionKind,
            language: &str,
            token: &AttemptToken,
        ) -> Result<Option<PathBuf>> {
            self.caption_calls.lock().push(CaptionCall {
                url: video_url.to_owned(),
                kind,
                language: language.to_owned(),
                token: token.to_string(),
            });
            let key = (video_url.to_owned(), kind, language.to_owned());
            if self.failing_captions.contains(&key) {
                bail!("caption tool crashed for {video_url}");
            }
            let Some(srt) = self.captions.get(&key) else {
                return Ok(None);
            };
            let path = self.scratch.join(format!("subtitle_{language}_{token}.srt"));
            fs::write(&path, srt)?;
            Ok(Some(path))
        }
    }
}
