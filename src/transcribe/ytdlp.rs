use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{processor, FetchedTranscript, TranscriptSource};
use crate::config::Config;
use crate::extractors::VideoId;
use crate::utils::check_command_available;
use crate::TranscriptError;

const SUBTITLE_EXTENSION: &str = "json3";

/// Transcript source backed by the yt-dlp executable
pub struct YtDlpSource {
    yt_dlp_path: String,
}

impl YtDlpSource {
    pub fn new(config: &Config) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
        }
    }

    /// Ask yt-dlp to write subtitles (manual or automatic) into `dir`
    async fn download_subtitles(
        &self,
        video_id: &VideoId,
        languages: &[String],
        dir: &Path,
    ) -> Result<(), TranscriptError> {
        tracing::debug!("Downloading subtitles with yt-dlp for: {}", video_id);

        let output_template = dir.join("%(id)s.%(ext)s");
        let output = Command::new(&self.yt_dlp_path)
            .args(["--skip-download", "--write-sub", "--write-auto-sub"])
            .arg("--sub-lang")
            .arg(languages.join(","))
            .args(["--sub-format", SUBTITLE_EXTENSION])
            .args(["--no-playlist", "--no-warnings"])
            .arg("--output")
            .arg(&output_template)
            .arg(video_id.watch_url())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptError::Collaborator(error.trim().to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl TranscriptSource for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn check_availability(&self) -> Result<(), TranscriptError> {
        if check_command_available(&self.yt_dlp_path).await {
            Ok(())
        } else {
            Err(TranscriptError::CollaboratorUnavailable(format!(
                "{} is not available. Please install it: https://github.com/yt-dlp/yt-dlp",
                self.yt_dlp_path
            )))
        }
    }

    async fn fetch(
        &self,
        video_id: &VideoId,
        languages: &[String],
    ) -> Result<FetchedTranscript, TranscriptError> {
        let temp_dir = tempfile::tempdir()?;
        self.download_subtitles(video_id, languages, temp_dir.path()).await?;
        read_subtitles(temp_dir.path(), video_id, languages)
    }
}

/// Load the subtitle file for the most preferred language found in `dir`
pub fn read_subtitles(
    dir: &Path,
    video_id: &VideoId,
    languages: &[String],
) -> Result<FetchedTranscript, TranscriptError> {
    let selected = languages.iter().find_map(|language| {
        let path = subtitle_path(dir, video_id, language);
        path.is_file().then_some((language, path))
    });

    let Some((language, path)) = selected else {
        return Err(TranscriptError::NoTranscriptFound {
            video_id: video_id.clone(),
            requested: languages.to_vec(),
            available: available_languages(dir, video_id),
        });
    };

    let content = fs_err::read_to_string(&path)?;
    let entries = processor::parse_json3(&content)?;

    Ok(FetchedTranscript {
        video_id: video_id.clone(),
        language_code: Some(language.clone()),
        language: None,
        is_generated: false,
        entries,
    })
}

fn subtitle_path(dir: &Path, video_id: &VideoId, language: &str) -> PathBuf {
    dir.join(format!("{}.{}.{}", video_id, language, SUBTITLE_EXTENSION))
}

/// Language codes of every subtitle file yt-dlp wrote for this video
fn available_languages(dir: &Path, video_id: &VideoId) -> Vec<String> {
    let prefix = format!("{}.", video_id);
    let suffix = format!(".{}", SUBTITLE_EXTENSION);

    let mut languages: Vec<String> = fs_err::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    name.strip_prefix(&prefix)
                        .and_then(|rest| rest.strip_suffix(&suffix))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    languages.sort();
    languages
}
