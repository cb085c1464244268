//! CSV ledgers the harvesters write into.
//!
//! Two lifecycles exist. The playlist export is rebuilt from scratch on every
//! run ([`PlaylistLedger`]). The video/caption ledger is append-only
//! ([`VideoLedger`]): the url column is read once when the file is opened and
//! urls already present are never fetched or written again, so re-running a
//! harvest only fills in what is missing.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
#[cfg(test)]
use serde::de::DeserializeOwned;

pub const VIDEO_LEDGER_HEADER: [&str; 4] = ["title", "url", "description", "subtitles"];
pub const PLAYLIST_LEDGER_HEADER: [&str; 4] =
    ["Video Title", "Video URL", "Playlist URL", "Playlist Name"];

/// Position of the url column in both ledger layouts.
pub const URL_COLUMN: usize = 1;

/// One harvested video, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRow {
    pub title: String,
    pub url: String,
    pub description: String,
    pub subtitles: String,
}

/// One video of one playlist in the playlist export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistVideoRow {
    #[serde(rename = "Video Title")]
    pub video_title: String,
    #[serde(rename = "Video URL")]
    pub video_url: String,
    #[serde(rename = "Playlist URL")]
    pub playlist_url: String,
    #[serde(rename = "Playlist Name")]
    pub playlist_name: String,
}

/// Creates the directory holding `path` if needed.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Collects the values of `column` for every data row of an existing ledger.
/// A missing file has no keys.
pub fn load_existing_keys(path: &Path, column: usize) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut keys = HashSet::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        if let Some(key) = record.get(column)
            && !key.is_empty()
        {
            keys.insert(key.to_owned());
        }
    }
    Ok(keys)
}

/// Reads every data row of a ledger.
#[cfg(test)]
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .map(|row| row.with_context(|| format!("reading {}", path.display())))
        .collect()
}

/// Playlist export, truncated and rewritten on every run.
pub struct PlaylistLedger {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl PlaylistLedger {
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(PLAYLIST_LEDGER_HEADER)
            .with_context(|| format!("writing header to {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn append(&mut self, row: &PlaylistVideoRow) -> Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("writing row to {}", self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))
    }
}

/// Append-only video ledger with url deduplication.
pub struct VideoLedger {
    path: PathBuf,
    writer: Writer<File>,
    known: HashSet<String>,
    preexisting: usize,
}

impl VideoLedger {
    /// Opens (or creates) the ledger, reading the known urls once. The header
    /// is written only when the file is empty.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let known = load_existing_keys(path, URL_COLUMN)?;
        let preexisting = known.len();

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("inspecting {}", path.display()))?
            .len()
            == 0;
        if !is_empty {
            terminate_last_line(&mut file)
                .with_context(|| format!("preparing {} for append", path.display()))?;
        }

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_empty {
            writer
                .write_record(VIDEO_LEDGER_HEADER)
                .with_context(|| format!("writing header to {}", path.display()))?;
            writer
                .flush()
                .with_context(|| format!("flushing {}", path.display()))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            known,
            preexisting,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of urls that were already present when the ledger was opened.
    pub fn preexisting(&self) -> usize {
        self.preexisting
    }

    pub fn contains(&self, url: &str) -> bool {
        self.known.contains(url)
    }

    /// Appends one row and flushes it, so an interrupted run keeps every row
    /// written so far.
    pub fn append(&mut self, row: &VideoRow) -> Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("writing row to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        self.known.insert(row.url.clone());
        Ok(())
    }
}

/// Adds a trailing newline when the previous writer stopped mid-line.
fn terminate_last_line(file: &mut File) -> std::io::Result<()> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn video(url: &str) -> VideoRow {
        VideoRow {
            title: format!("Title {url}"),
            url: url.to_owned(),
            description: "desc".into(),
            subtitles: "00:00:01,000 hi".into(),
        }
    }

    #[test]
    fn open_creates_parent_and_header() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out").join("videos.csv");
        let ledger = VideoLedger::open(&path)?;
        assert_eq!(ledger.preexisting(), 0);
        drop(ledger);
        assert_eq!(
            fs::read_to_string(&path)?.trim_end(),
            "title,url,description,subtitles"
        );
        Ok(())
    }

    #[test]
    fn reopening_keeps_rows_and_single_header() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos.csv");
        {
            let mut ledger = VideoLedger::open(&path)?;
            ledger.append(&video("https://a"))?;
        }
        {
            let mut ledger = VideoLedger::open(&path)?;
            assert!(ledger.contains("https://a"));
            assert!(!ledger.contains("url"));
            assert_eq!(ledger.preexisting(), 1);
            ledger.append(&video("https://b"))?;
            assert!(ledger.contains("https://b"));
        }

        let rows: Vec<VideoRow> = read_rows(&path)?;
        assert_eq!(rows, vec![video("https://a"), video("https://b")]);
        let raw = fs::read_to_string(&path)?;
        assert_eq!(raw.matches("title,url,description,subtitles").count(), 1);
        Ok(())
    }

    #[test]
    fn quoted_values_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos.csv");
        let row = VideoRow {
            title: "Hello, \"World\"".into(),
            url: "https://www.youtube.com/watch?v=q".into(),
            description: "line one\nline two".into(),
            subtitles: "00:00:01,000 a, b".into(),
        };
        {
            let mut ledger = VideoLedger::open(&path)?;
            ledger.append(&row)?;
        }
        let rows: Vec<VideoRow> = read_rows(&path)?;
        assert_eq!(rows, vec![row]);
        assert!(fs::read_to_string(&path)?.contains("\"Hello, \"\"World\"\"\""));
        Ok(())
    }

    #[test]
    fn load_existing_keys_handles_missing_and_present_files() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos.csv");
        assert!(load_existing_keys(&path, URL_COLUMN)?.is_empty());
        fs::write(
            &path,
            "title,url,description,subtitles\nA,https://a,d,s\nB,https://b,Error fetching description,Error fetching subtitles\n",
        )?;
        let keys = load_existing_keys(&path, URL_COLUMN)?;
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("https://b"));
        Ok(())
    }

    #[test]
    fn append_after_truncated_line_starts_a_new_row() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos.csv");
        fs::write(&path, "title,url,description,subtitles\nA,https://a,d,s")?;
        {
            let mut ledger = VideoLedger::open(&path)?;
            ledger.append(&video("https://b"))?;
        }
        let rows: Vec<VideoRow> = read_rows(&path)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].url, "https://b");
        Ok(())
    }

    #[test]
    fn playlist_ledger_overwrites_previous_export() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("playlists.csv");
        ensure_parent(&path)?;
        fs::write(&path, "stale content\n")?;

        let mut ledger = PlaylistLedger::create(&path)?;
        ledger.append(&PlaylistVideoRow {
            video_title: "Video, One".into(),
            video_url: "https://v1".into(),
            playlist_url: "https://p".into(),
            playlist_name: "List".into(),
        })?;
        assert_eq!(ledger.rows(), 1);
        ledger.finish()?;

        let raw = fs::read_to_string(&path)?;
        assert!(raw.starts_with("Video Title,Video URL,Playlist URL,Playlist Name"));
        assert!(!raw.contains("stale"));
        let rows: Vec<PlaylistVideoRow> = read_rows(&path)?;
        assert_eq!(rows[0].video_title, "Video, One");
        Ok(())
    }
}
