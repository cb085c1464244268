//! Picks which caption track ends up in the ledger.
//!
//! The policy is an ordered list of `(kind, language)` steps walked by a
//! single loop; the first step producing a non-empty normalized document
//! wins and the remaining steps are never attempted.

use std::fs;

use log::{debug, info, warn};

use crate::captions::normalize_srt_file;
use crate::source::{AttemptTokens, CaptionKind, MediaSource};

/// Stored when every step of the chain came back empty.
pub const NO_SUBTITLES: &str = "No subtitles available";
/// Stored when a caption file was fetched but could not be read back.
pub const SUBTITLE_CONVERSION_ERROR: &str = "Error converting subtitles";

/// Preferred caption languages, most wanted first.
pub const LANGUAGE_PRIORITY: [&str; 2] = ["hi", "en"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackStep {
    pub kind: CaptionKind,
    pub language: &'static str,
}

impl FallbackStep {
    pub const fn new(kind: CaptionKind, language: &'static str) -> Self {
        Self { kind, language }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlePolicy {
    steps: Vec<FallbackStep>,
}

impl SubtitlePolicy {
    /// Uploaded tracks (when preferred) come first, then auto-generated
    /// tracks, each in [`LANGUAGE_PRIORITY`] order.
    pub fn new(prefer_uploaded: bool) -> Self {
        let mut steps = Vec::new();
        if prefer_uploaded {
            steps.extend(
                LANGUAGE_PRIORITY
                    .into_iter()
                    .map(|language| FallbackStep::new(CaptionKind::Uploaded, language)),
            );
        }
        steps.extend(
            LANGUAGE_PRIORITY
                .into_iter()
                .map(|language| FallbackStep::new(CaptionKind::Auto, language)),
        );
        Self { steps }
    }

    pub fn from_steps(steps: Vec<FallbackStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[FallbackStep] {
        &self.steps
    }

    /// Returns the normalized captions of `video_url`, or [`NO_SUBTITLES`].
    /// Tool failures only end the current step.
    pub async fn resolve<S: MediaSource>(
        &self,
        source: &S,
        video_url: &str,
        tokens: &AttemptTokens,
    ) -> String {
        for step in &self.steps {
            let token = tokens.issue();
            let fetched = source
                .fetch_captions(video_url, step.kind, step.language, &token)
                .await;

            let srt = match fetched {
                Ok(Some(path)) => path,
                Ok(None) => {
                    debug!(
                        "no {} {} subtitles for {}",
                        step.kind, step.language, video_url
                    );
                    continue;
                }
                Err(err) => {
                    warn!(
                        "Error fetching {} {} subtitles for {}: {:#}",
                        step.kind, step.language, video_url, err
                    );
                    continue;
                }
            };

            let normalized = normalize_srt_file(&srt);
            if let Err(err) = fs::remove_file(&srt) {
                debug!("could not remove {}: {}", srt.display(), err);
            }

            match normalized {
                Ok(document) if document.is_empty() => {
                    debug!(
                        "{} {} subtitles for {} contained no cues",
                        step.kind, step.language, video_url
                    );
                }
                Ok(document) => {
                    info!(
                        "  Using {} {} subtitles ({} lines)",
                        step.kind,
                        step.language,
                        document.lines().count()
                    );
                    return document;
                }
                Err(err) => {
                    warn!("Error converting subtitles for {}: {:#}", video_url, err);
                    return SUBTITLE_CONVERSION_ERROR.to_owned();
                }
            }
        }

        NO_SUBTITLES.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fake::FakeSource;
    use tempfile::tempdir;

    const URL: &str = "https://www.youtube.com/watch?v=abc";
    const SRT_HI: &str = "1\n00:00:01,000 --> 00:00:02,000\nनमस्ते\n";
    const SRT_EN: &str = "1\n00:00:01,000 --> 00:00:02,000\nhello\n\n2\n00:00:02,000 --> 00:00:03,000\nhello world\n";

    #[test]
    fn chain_without_uploaded_is_auto_only() {
        let policy = SubtitlePolicy::new(false);
        assert_eq!(
            policy.steps(),
            &[
                FallbackStep::new(CaptionKind::Auto, "hi"),
                FallbackStep::new(CaptionKind::Auto, "en"),
            ]
        );
    }

    #[test]
    fn chain_with_uploaded_tries_uploaded_first() {
        let policy = SubtitlePolicy::new(true);
        assert_eq!(
            policy.steps(),
            &[
                FallbackStep::new(CaptionKind::Uploaded, "hi"),
                FallbackStep::new(CaptionKind::Uploaded, "en"),
                FallbackStep::new(CaptionKind::Auto, "hi"),
                FallbackStep::new(CaptionKind::Auto, "en"),
            ]
        );
    }

    #[tokio::test]
    async fn uploaded_hindi_short_circuits_the_chain() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(dir.path())
            .with_captions(URL, CaptionKind::Uploaded, "hi", SRT_HI)
            .with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");

        let subtitles = SubtitlePolicy::new(true).resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, "00:00:01,000 नमस्ते");
        assert_eq!(
            source.attempted(),
            vec![(CaptionKind::Uploaded, "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn falls_through_to_auto_english() {
        let dir = tempdir().unwrap();
        let source =
            FakeSource::new(dir.path()).with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");

        let subtitles = SubtitlePolicy::new(true).resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, "00:00:02,000 hello world");
        assert_eq!(source.attempted().len(), 4);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_sentinel() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(dir.path());
        let tokens = AttemptTokens::new("run");

        let subtitles = SubtitlePolicy::new(true).resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, NO_SUBTITLES);
        assert_eq!(source.attempted().len(), 4);
    }

    #[tokio::test]
    async fn tool_errors_continue_the_chain() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(dir.path())
            .with_failing_captions(URL, CaptionKind::Auto, "hi")
            .with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");

        let subtitles = SubtitlePolicy::new(false).resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, "00:00:02,000 hello world");
    }

    #[tokio::test]
    async fn empty_documents_count_as_missing() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(dir.path())
            .with_captions(URL, CaptionKind::Auto, "hi", "WEBVTT\n\n")
            .with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");

        let subtitles = SubtitlePolicy::new(false).resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, "00:00:02,000 hello world");
    }

    #[tokio::test]
    async fn unreadable_caption_file_stops_the_chain() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(dir.path())
            .with_caption_bytes(URL, CaptionKind::Auto, "hi", &[0xff, 0xfe, 0x00, 0xc3])
            .with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");

        let subtitles = SubtitlePolicy::new(false).resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, SUBTITLE_CONVERSION_ERROR);
        assert_eq!(source.attempted(), vec![(CaptionKind::Auto, "hi".to_string())]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn every_attempt_gets_its_own_token_and_files_are_removed() {
        let dir = tempdir().unwrap();
        let source =
            FakeSource::new(dir.path()).with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");

        SubtitlePolicy::new(true).resolve(&source, URL, &tokens).await;

        let issued: Vec<String> = source
            .caption_calls
            .lock()
            .iter()
            .map(|call| call.token.clone())
            .collect();
        assert_eq!(issued, vec!["run-1", "run-2", "run-3", "run-4"]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn custom_chain_is_honoured() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(dir.path())
            .with_captions(URL, CaptionKind::Auto, "hi", SRT_HI)
            .with_captions(URL, CaptionKind::Auto, "en", SRT_EN);
        let tokens = AttemptTokens::new("run");
        let policy = SubtitlePolicy::from_steps(vec![FallbackStep::new(CaptionKind::Auto, "en")]);

        let subtitles = policy.resolve(&source, URL, &tokens).await;

        assert_eq!(subtitles, "00:00:02,000 hello world");
        assert_eq!(source.attempted(), vec![(CaptionKind::Auto, "en".to_string())]);
    }
}
