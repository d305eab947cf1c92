//! Error types for the Voice Tide pipeline.
//!
//! Every variant that reaches the user carries its final display message —
//! callers show `to_string()` in the status line or on stderr and move on.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, VoiceTideError>;

/// Errors that can occur while capturing, recognizing, fetching, or speaking
#[derive(Error, Debug)]
pub enum VoiceTideError {
    /// No microphone to record from. Not retried; shown to the user as-is.
    #[error("No audio input device available")]
    Device,

    #[error("Audio error: {0}")]
    Audio(String),

    /// The speech service saw audio but produced no confident transcript.
    #[error("Could not understand audio")]
    Unintelligible,

    /// Network or service fault while transcribing.
    #[error("Speech recognition service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Command not recognized. Please say 'latest news of <country> in <category>'")]
    CommandNotRecognized,

    #[error("Country not found. Please enter a valid country name.")]
    CountryNotFound,

    /// Non-200 from the news endpoint. 4xx and 5xx are deliberately not
    /// distinguished; the literal status code is part of the message.
    #[error("Failed to fetch news, status code: {status}")]
    Http { status: u16 },

    #[error("No articles found.")]
    NoArticlesFound,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_contains_literal_status_code() {
        let err = VoiceTideError::Http { status: 404 };
        assert!(err.to_string().contains("404"));

        let err = VoiceTideError::Http { status: 500 };
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            VoiceTideError::NoArticlesFound.to_string(),
            "No articles found."
        );
        assert_eq!(
            VoiceTideError::CountryNotFound.to_string(),
            "Country not found. Please enter a valid country name."
        );
        assert!(
            VoiceTideError::CommandNotRecognized
                .to_string()
                .starts_with("Command not recognized")
        );
    }
}
