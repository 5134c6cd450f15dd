use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Normalize a language preference list: trim entries, drop empties and repeats.
pub fn normalize_languages<I, S>(languages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for language in languages {
        let language = language.as_ref().trim();
        if !language.is_empty() && !normalized.iter().any(|seen| seen == language) {
            normalized.push(language.to_string());
        }
    }
    normalized
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `verbose`. A second call is a no-op.
pub fn init_tracing(verbose: bool, format: LogFormat) {
    let default_directive = if verbose { "yt_transcript=debug" } else { "yt_transcript=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    let json = format == LogFormat::Json;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_languages() {
        assert_eq!(
            normalize_languages([" en", "de ", "", "en", "pt-BR"]),
            vec!["en", "de", "pt-BR"]
        );
        assert!(normalize_languages(Vec::<String>::new()).is_empty());
    }

    #[tokio::test]
    async fn test_check_command_available_missing() {
        assert!(!check_command_available("definitely-not-a-real-command-3f9a").await);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(false, LogFormat::Text);
        init_tracing(true, LogFormat::Json);
    }
}
