use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the zap library.
///
/// [`ZapError::SilenceRequested`] and [`ZapError::UserCancelled`] are not
/// failures in the usual sense: callers branch on them to skip or abort.
#[derive(Error, Debug)]
pub enum ZapError {
    #[error("aborting on user request")]
    UserCancelled,

    #[error("could not find any releases")]
    NoReleaseFound,

    #[error("prompt is disabled because user has requested silence")]
    SilenceRequested,

    #[error("{0} has no update information. Please ask the AppImage author to embed update information")]
    NoUpdateInformation(String),

    #[error("invalid index manifest: {0}")]
    Manifest(String),

    #[error("invalid GitHub repository '{0}', expected owner/repo")]
    InvalidSlug(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("asset {url} is no longer available (HTTP {status})")]
    AssetUnavailable { url: String, status: u16 },

    #[error("{} already exists and points to {}, which is not managed by zap", .path.display(), .target.display())]
    BinaryConflict { path: PathBuf, target: PathBuf },

    #[error("required tool '{0}' was not found on PATH")]
    MissingTool(String),

    #[error("'{command}' exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Ini(#[from] ini::Error),

    #[error("could not parse bundle: {0}")]
    Object(#[from] object::read::Error),

    #[error(transparent)]
    Prompt(#[from] dialoguer::Error),
}

pub type Result<T> = std::result::Result<T, ZapError>;
