#![forbid(unsafe_code)]

//! Writes every video of every playlist of a channel to a CSV file. The file
//! is rebuilt from scratch on each run.

use anyhow::{Result, bail};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tubeharvest_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings};
use tubeharvest_tools::harvest::{ExportOutcome, PlaylistExportConfig, export_playlists};
use tubeharvest_tools::logging::{self, LogLevel};
use tubeharvest_tools::prompt::Prompter;
use tubeharvest_tools::source::YtDlpSource;
use tubeharvest_tools::validate::{validate_channel_playlists_url, validate_ledger_file_name};

const URL_PROMPT: &str = "Enter the YouTube channel playlists URL: ";
const FILE_PROMPT: &str = "Enter the output CSV file name (should end with .csv): ";

/// Export the playlists of a channel, one row per playlist video.
#[derive(Debug, Parser)]
#[command(version)]
struct ExportArgs {
    /// Channel playlists page, e.g. https://www.youtube.com/@name/playlists.
    #[arg(long)]
    url: Option<String>,
    /// File name inside the output directory; must end with .csv.
    #[arg(long)]
    output: Option<String>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Per-call limit for yt-dlp, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    env_file: Option<PathBuf>,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = ExportArgs::parse();
    logging::init(args.log_level);

    let settings = resolve_runtime_settings(RuntimeOverrides {
        out_dir: args.out_dir.clone(),
        timeout_secs: args.timeout_secs,
        env_path: args.env_file.clone(),
        ..RuntimeOverrides::default()
    })?;
    let source = YtDlpSource::from_settings(&settings);
    source.ensure_lister_available()?;

    let mut prompter = Prompter::new(io::stdin().lock(), io::stdout());

    loop {
        let config = gather_config(&args, &settings, &mut prompter)?;
        match export_playlists(&source, &config).await? {
            ExportOutcome::NoPlaylists if args.url.is_none() => {
                prompter.say(
                    "No playlists found in the channel. Please check the URL and try again.",
                )?;
            }
            ExportOutcome::NoPlaylists => {
                bail!("no playlists found for {}", config.channel_url);
            }
            ExportOutcome::Completed(summary) => {
                println!();
                println!("CSV file '{}' created.", config.output_path.display());
                println!(
                    "Playlists: {}  Rows: {}  Empty playlists: {}  Malformed lines: {}",
                    summary.playlists, summary.rows, summary.empty_playlists, summary.malformed
                );
                return Ok(());
            }
        }
    }
}

fn gather_config<R: BufRead, W: Write>(
    args: &ExportArgs,
    settings: &RuntimeSettings,
    prompter: &mut Prompter<R, W>,
) -> Result<PlaylistExportConfig> {
    let channel_url = match &args.url {
        Some(url) => {
            validate_channel_playlists_url(url)?;
            url.clone()
        }
        None => prompter.ask_valid(URL_PROMPT, validate_channel_playlists_url)?,
    };
    let file_name = match &args.output {
        Some(name) => {
            validate_ledger_file_name(name)?;
            name.clone()
        }
        None => prompter.ask_valid(FILE_PROMPT, validate_ledger_file_name)?,
    };

    Ok(PlaylistExportConfig {
        channel_url,
        output_path: settings.ledger_path(&file_name),
    })
}
