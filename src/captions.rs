//! Turns SRT caption files into the compact one-line-per-cue text stored in
//! the ledger.
//!
//! Auto-generated captions reveal each sentence progressively, so a raw SRT
//! export repeats the same words over several cues ("abc", "abc def", ...).
//! [`normalize_srt`] flattens every cue onto a single line and drops the cues
//! whose text is fully contained in the cue that follows.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+:\d+:\d+,\d+)").expect("timestamp pattern is valid"));

/// One timestamped caption unit as found in the SRT source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// Start timestamp in its original `H:MM:SS,mmm` form.
    pub timestamp: String,
    pub text: Vec<String>,
}

impl Cue {
    fn new(timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_owned(),
            text: Vec::new(),
        }
    }

    /// Text lines joined with single spaces.
    pub fn joined_text(&self) -> String {
        self.text.join(" ")
    }

    fn render(&self) -> String {
        format!("{} {}", self.timestamp, self.joined_text())
    }
}

/// Splits SRT text into cues. Cue indexes, blank lines and text appearing
/// before the first timestamp are ignored; cues without any text are dropped.
pub fn parse_cues(input: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut current: Option<Cue> = None;

    for raw in input.lines() {
        let line = raw.trim();
        if let Some(found) = TIMESTAMP.captures(line).and_then(|caps| caps.get(1)) {
            if let Some(cue) = current.take()
                && !cue.text.is_empty()
            {
                cues.push(cue);
            }
            current = Some(Cue::new(found.as_str()));
            continue;
        }

        if line.is_empty() || is_cue_index(line) {
            continue;
        }

        if let Some(cue) = current.as_mut() {
            cue.text.push(line.to_owned());
        }
    }

    if let Some(cue) = current
        && !cue.text.is_empty()
    {
        cues.push(cue);
    }

    cues
}

fn is_cue_index(line: &str) -> bool {
    line.chars().all(|c| c.is_ascii_digit())
}

/// Drops every cue whose text is a substring of the next cue's text. Runs of
/// whitespace count as a single space in the comparison. The last cue has no
/// successor and is always kept.
pub fn collapse_progressive(cues: Vec<Cue>) -> Vec<Cue> {
    let texts: Vec<String> = cues.iter().map(comparable_text).collect();
    cues.into_iter()
        .enumerate()
        .filter(|(index, _)| match texts.get(index + 1) {
            Some(next) => !next.contains(texts[*index].as_str()),
            None => true,
        })
        .map(|(_, cue)| cue)
        .collect()
}

fn comparable_text(cue: &Cue) -> String {
    cue.joined_text()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Converts SRT text into the ledger caption document. Input without any
/// timestamp line yields an empty string rather than an error.
pub fn normalize_srt(input: &str) -> String {
    collapse_progressive(parse_cues(input))
        .iter()
        .map(Cue::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads an SRT file from disk and normalizes it.
pub fn normalize_srt_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(normalize_srt(&raw))
}
