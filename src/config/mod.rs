use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Language preference used when neither the config file nor the CLI sets one
pub const DEFAULT_LANGUAGES: [&str; 6] = ["en", "es", "pt", "de", "fr", "it"];

const LOCAL_CONFIG_FILE: &str = "yt-transcript.yaml";

const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/124.0 Safari/537.36"
);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered language preference for transcript selection
    pub languages: Vec<String>,

    /// Which transcript source to use
    pub backend: Backend,

    /// Keep basic HTML formatting tags in caption text
    pub preserve_formatting: bool,

    /// Path or name of the yt-dlp executable
    pub yt_dlp_path: String,

    /// Log line format on stderr
    pub log_format: LogFormat,

    /// HTTP client settings for the innertube source
    pub http: HttpConfig,

    /// File this configuration was read from; `None` means built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,

    pub accept_language: String,

    /// Request timeout in seconds; no timeout when unset
    pub timeout_secs: Option<u64>,
}

/// Transcript source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// YouTube's innertube API over HTTP
    #[default]
    Innertube,
    /// The yt-dlp command line tool
    YtDlp,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Innertube => write!(f, "innertube"),
            Backend::YtDlp => write!(f, "yt-dlp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect(),
            backend: Backend::default(),
            preserve_formatting: false,
            yt_dlp_path: "yt-dlp".to_string(),
            log_format: LogFormat::default(),
            http: HttpConfig::default(),
            source: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US".to_string(),
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or from the first config file found.
    ///
    /// An explicit path must exist. Without one, a missing file means defaults.
    /// Loading happens before logging is set up, so callers report
    /// [`Config::source`] themselves.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn from_file(path: PathBuf) -> Result<Self> {
        let content = fs_err::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()?;
        config.source = Some(path);
        Ok(config)
    }

    /// Find a config file: current directory first, then the user config directory
    fn discover() -> Option<PathBuf> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir()
            .map(|dir| dir.join("yt-transcript").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.languages.iter().all(|lang| lang.trim().is_empty()) {
            anyhow::bail!("At least one transcript language must be configured");
        }

        if self.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("yt_dlp_path must not be empty");
        }

        Ok(())
    }
}
