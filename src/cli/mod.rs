use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::{Backend, Config};
use crate::extractors::{extract_video_id, VideoId};
use crate::output::{format_as_json, format_invocation_error};
use crate::transcribe::{
    build_source, get_transcript, FetchFailure, TranscriptResult, TranscriptSource,
};
use crate::utils::{init_tracing, normalize_languages};
use crate::InvocationError;

const PROGRAM_NAME: &str = "yt-transcript";

#[derive(Parser, Debug)]
#[command(
    name = "yt-transcript",
    about = "Extract the transcript of a YouTube video as JSON",
    version,
    long_about = concat!(
        "Fetches the captions of a YouTube video, given a URL or an 11-character video ID, ",
        "and prints the full text and timestamped segments as a single JSON document."
    )
)]
pub struct Cli {
    /// YouTube URL (watch, youtu.be or embed) or bare video ID
    #[arg(value_name = "URL_OR_ID", allow_hyphen_values = true)]
    pub input: Option<String>,

    /// Comma-separated language preference, most preferred first
    #[arg(short, long, value_name = "LANGS", value_delimiter = ',')]
    pub languages: Option<Vec<String>>,

    /// Transcript source to use (defaults to the config file setting)
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Path to a YAML config file
    #[arg(short, long, value_name = "FILE", env = "YT_TRANSCRIPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Enable verbose logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long)]
    pub quiet: bool,
}

/// What the process should print to stdout and exit with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub output: String,
    pub exit_code: i32,
}

impl Outcome {
    fn success(output: String) -> Self {
        Self { output, exit_code: 0 }
    }

    fn invocation_error(err: InvocationError, pretty: bool) -> Self {
        Self {
            output: format_invocation_error(err, pretty),
            exit_code: 1,
        }
    }
}

/// Run the tool for one argument vector (program name first).
///
/// Usage problems and unparseable input exit 1 before any network activity.
/// Once a fetch has been attempted the exit code is 0, whether or not a
/// transcript came back.
pub async fn run<I, T>(args: I) -> Outcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Outcome::success(err.render().to_string().trim_end().to_string());
        }
        Err(err) => {
            let message = err.render().to_string().trim().to_string();
            return Outcome::invocation_error(InvocationError::Arguments(message), false);
        }
    };

    let Some(input) = cli.input.as_deref() else {
        let err = InvocationError::Usage(PROGRAM_NAME.to_string());
        return Outcome::invocation_error(err, cli.pretty);
    };

    let Some(video_id) = extract_video_id(input) else {
        let err = InvocationError::UnparseableInput(input.to_string());
        return Outcome::invocation_error(err, cli.pretty);
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            let err = InvocationError::Config(format!("{:#}", err));
            return Outcome::invocation_error(err, cli.pretty);
        }
    };

    init_tracing(cli.verbose, config.log_format);
    match &config.source {
        Some(path) => tracing::debug!("Loaded config from {}", path.display()),
        None => tracing::debug!("No config file found, using defaults"),
    }

    let languages = languages_for(&cli, &config);
    let backend = cli.backend.unwrap_or(config.backend);
    tracing::info!(video_id = %video_id, backend = %backend, "Fetching transcript");

    let result = match build_source(backend, &config) {
        Ok(source) => fetch_with_progress(source.as_ref(), &video_id, &languages, cli.quiet).await,
        Err(err) => TranscriptResult::Failure(FetchFailure {
            video_id: Some(video_id),
            error: err.to_string(),
        }),
    };

    render(&result, cli.pretty)
}

/// Languages from the command line, falling back to the config file
fn languages_for(cli: &Cli, config: &Config) -> Vec<String> {
    let from_cli = cli
        .languages
        .as_ref()
        .map(|languages| normalize_languages(languages))
        .filter(|languages| !languages.is_empty());

    from_cli.unwrap_or_else(|| normalize_languages(&config.languages))
}

async fn fetch_with_progress(
    source: &dyn TranscriptSource,
    video_id: &VideoId,
    languages: &[String],
    quiet: bool,
) -> TranscriptResult {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(format!("Fetching transcript for {} via {}...", video_id, source.name()));
    progress.tick();

    let result = get_transcript(source, video_id, languages).await;

    progress.finish_and_clear();
    result
}

fn render(result: &TranscriptResult, pretty: bool) -> Outcome {
    match format_as_json(result, pretty) {
        Ok(output) => Outcome::success(output),
        Err(err) => Outcome {
            output: format_invocation_error(InvocationError::Arguments(err.to_string()), pretty),
            exit_code: 1,
        },
    }
}
