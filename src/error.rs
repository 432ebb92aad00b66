use std::path::PathBuf;

/// Central error type for rustdeck.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("host link error: {0}")]
    Host(String),

    #[error("event stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used to pick a button label for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transport,
    Decode,
    Command,
    Other,
}

impl DeckError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::ConfigNotFound(_) | Self::TomlParse(_) => ErrorKind::Config,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) | Self::Json(_) => ErrorKind::Decode,
            Self::Command(_) => ErrorKind::Command,
            Self::Host(_) | Self::Stream(_) | Self::Io(_) => ErrorKind::Other,
        }
    }
}

impl From<reqwest::Error> for DeckError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;
