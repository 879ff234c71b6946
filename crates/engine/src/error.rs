use std::error::Error as StdError;
use std::fmt;

/// Closed set of failure classifications used for control flow and user
/// messaging alike. Every error surfaced by the engine carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidIdentifier,
    InvalidOrUntrustedUrl,
    NetworkError,
    ApiError,
    Timeout,
    FileTooLarge,
    DownloadFailed,
    CacheError,
    ConfigurationError,
    SystemApplyError,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidIdentifier => "invalid identifier",
            ErrorKind::InvalidOrUntrustedUrl => "invalid or untrusted URL",
            ErrorKind::NetworkError => "network error",
            ErrorKind::ApiError => "API error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::FileTooLarge => "file too large",
            ErrorKind::DownloadFailed => "download failed",
            ErrorKind::CacheError => "cache error",
            ErrorKind::ConfigurationError => "configuration error",
            ErrorKind::SystemApplyError => "system apply error",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// Classified engine error: one fixed [`ErrorKind`], a message, and an
/// ordered list of key/value diagnostic pairs attached along the way.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap an unexpected error as [`ErrorKind::Unknown`], preserving its message.
    pub fn unknown(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::with_source(ErrorKind::Unknown, source.to_string(), source)
    }

    /// Attach a diagnostic key/value pair. Pairs keep insertion order.
    pub fn with_context(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Fixed human-readable message for the error's kind.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::InvalidIdentifier => {
                "The wallpaper ID is invalid. Please check it and try again.".into()
            }
            ErrorKind::InvalidOrUntrustedUrl => {
                "The wallpaper points to an untrusted address and was rejected.".into()
            }
            ErrorKind::NetworkError => {
                "Unable to connect to the internet. Please check your connection and try again."
                    .into()
            }
            ErrorKind::ApiError => {
                "The wallpaper service is currently unavailable. Please try again later.".into()
            }
            ErrorKind::Timeout => {
                "The operation timed out. Please check your internet connection and try again."
                    .into()
            }
            ErrorKind::FileTooLarge => "The wallpaper file is too large.".into(),
            ErrorKind::DownloadFailed => "Failed to download the wallpaper. Please try again.".into(),
            ErrorKind::CacheError => {
                "Failed to save the wallpaper to cache. Please check available disk space.".into()
            }
            ErrorKind::ConfigurationError => {
                "Configuration error. Please check application settings.".into()
            }
            ErrorKind::SystemApplyError => {
                "Failed to set the desktop background. This may be a permissions issue.".into()
            }
            ErrorKind::Unknown => format!("An unexpected error occurred: {}", self.message),
        }
    }

    /// Optional recovery hint to display alongside [`Self::user_message`].
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::NetworkError => {
                Some("Check your internet connection and firewall settings.")
            }
            ErrorKind::ApiError => Some(
                "Wait a few minutes and try again. If the problem persists, the service may be down.",
            ),
            ErrorKind::DownloadFailed => {
                Some("Try a different wallpaper or check your internet connection.")
            }
            ErrorKind::FileTooLarge => Some("Contact the wallpaper provider about file size limits."),
            ErrorKind::Timeout => {
                Some("Try again with a faster internet connection or a smaller image.")
            }
            ErrorKind::CacheError => {
                Some("Free up disk space or change the cache location in settings.")
            }
            ErrorKind::SystemApplyError => Some("Check that your session allows changing the background."),
            _ => None,
        }
    }

    /// `user_message` plus the recovery suggestion when one exists.
    pub fn detailed_message(&self) -> String {
        match self.recovery_suggestion() {
            Some(suggestion) => format!("{}\n\nSuggestion: {}", self.user_message(), suggestion),
            None => self.user_message(),
        }
    }

    /// True for classifications worth another attempt under a retry policy.
    /// Validation, size and cancellation failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NetworkError | ErrorKind::ApiError | ErrorKind::Timeout
        )
    }
}

/// Classify a reqwest transport failure. A failure observed after the caller
/// requested cancellation reports as a cancelled download rather than as a
/// timeout or network error.
pub(crate) fn classify_transport(
    err: reqwest::Error,
    what: &str,
    cancel_requested: bool,
) -> EngineError {
    if cancel_requested {
        EngineError::with_source(
            ErrorKind::DownloadFailed,
            format!("{what} was cancelled"),
            err,
        )
    } else if err.is_timeout() {
        EngineError::with_source(ErrorKind::Timeout, format!("{what} timed out"), err)
    } else {
        EngineError::with_source(
            ErrorKind::NetworkError,
            format!("network error during {what}"),
            err,
        )
    }
}

pub(crate) fn cancelled(what: &str) -> EngineError {
    EngineError::new(ErrorKind::DownloadFailed, format!("{what} was cancelled"))
}
