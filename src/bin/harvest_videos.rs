#![forbid(unsafe_code)]

//! Appends the description and captions of every video in a playlist or
//! channel to a CSV ledger. Videos already present in the ledger are skipped,
//! so the command can be re-run to resume or to pick up new uploads.

use anyhow::{Result, bail};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tubeharvest_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings};
use tubeharvest_tools::harvest::{HarvestOutcome, VideoHarvestConfig, harvest_videos};
use tubeharvest_tools::logging::{self, LogLevel};
use tubeharvest_tools::prompt::Prompter;
use tubeharvest_tools::source::{AttemptTokens, YtDlpSource};
use tubeharvest_tools::validate::{validate_ledger_file_name, validate_video_listing_url};

const URL_PROMPT: &str = "Enter the YouTube playlist or channel video URL: ";
const FILE_PROMPT: &str = "Enter the output CSV file name (should end with .csv): ";
const UPLOADED_PROMPT: &str = "Check for uploaded subtitles first? (yes/no, default: no): ";

/// Harvest video descriptions and captions into a CSV ledger.
///
/// Values not given as flags are asked for interactively.
#[derive(Debug, Parser)]
#[command(version)]
struct HarvestArgs {
    /// Playlist or channel videos URL.
    #[arg(long)]
    url: Option<String>,
    /// Ledger file name inside the output directory; must end with .csv.
    #[arg(long)]
    output: Option<String>,
    /// Try creator-uploaded captions before auto-generated ones.
    #[arg(long)]
    prefer_uploaded: bool,
    /// Directory ledgers are written to.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Directory for transient caption files.
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Per-call limit for yt-dlp and ffmpeg, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Settings file read before the process environment.
    #[arg(long)]
    env_file: Option<PathBuf>,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

impl HarvestArgs {
    fn interactive(&self) -> bool {
        self.url.is_none() || self.output.is_none()
    }

    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            out_dir: self.out_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            timeout_secs: self.timeout_secs,
            env_path: self.env_file.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = HarvestArgs::parse();
    logging::init(args.log_level);

    let settings = resolve_runtime_settings(args.overrides())?;
    let source = YtDlpSource::from_settings(&settings);
    source.ensure_available()?;

    let tokens = AttemptTokens::for_process();
    let mut prompter = Prompter::new(io::stdin().lock(), io::stdout());

    loop {
        let config = gather_config(&args, &settings, &mut prompter)?;
        match harvest_videos(&source, &config, &tokens).await? {
            HarvestOutcome::NoVideos if args.url.is_none() => {
                prompter.say(
                    "No videos found in the playlist or channel. Please check the URL and try again.",
                )?;
            }
            HarvestOutcome::NoVideos => {
                bail!("no videos found for {}", config.source_url);
            }
            HarvestOutcome::Completed(summary) => {
                println!();
                println!(
                    "CSV file '{}' updated with new entries.",
                    config.output_path.display()
                );
                println!(
                    "Listed: {}  Added: {}  Already present: {}  Failed: {}  Malformed lines: {}",
                    summary.listed,
                    summary.added,
                    summary.skipped_existing,
                    summary.failed,
                    summary.malformed
                );
                return Ok(());
            }
        }
    }
}

/// Builds the run configuration from flags, prompting for anything missing.
fn gather_config<R: BufRead, W: Write>(
    args: &HarvestArgs,
    settings: &RuntimeSettings,
    prompter: &mut Prompter<R, W>,
) -> Result<VideoHarvestConfig> {
    let source_url = match &args.url {
        Some(url) => {
            validate_video_listing_url(url)?;
            url.clone()
        }
        None => prompter.ask_valid(URL_PROMPT, validate_video_listing_url)?,
    };
    let file_name = match &args.output {
        Some(name) => {
            validate_ledger_file_name(name)?;
            name.clone()
        }
        None => prompter.ask_valid(FILE_PROMPT, validate_ledger_file_name)?,
    };
    let prefer_uploaded =
        args.prefer_uploaded || (args.interactive() && prompter.ask_yes_no(UPLOADED_PROMPT)?);

    Ok(VideoHarvestConfig {
        source_url,
        output_path: settings.ledger_path(&file_name),
        prefer_uploaded,
    })
}
