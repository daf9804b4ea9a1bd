use std::{error::Error as StdError, fmt};

use crate::{pipeline::RelayPhase, status::text::format_bytes};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised by a [`Fetcher`](crate::fetch::Fetcher).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}")]
    Status { status: u16, url: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FetchError {
    #[must_use]
    pub fn status(status: u16, url: impl fmt::Display) -> Self {
        Self::Status {
            status,
            url: url.to_string(),
        }
    }
}

/// Errors raised by a [`StatusChannel`](crate::status::StatusChannel).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("chat gateway unavailable: {message}")]
    Unavailable { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl GatewayError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Errors raised by a [`DocumentSink`](crate::status::DocumentSink).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The platform refused the document because of its size.
    #[error("document rejected as too large: {message}")]
    TooLarge { message: String },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl UploadError {
    #[must_use]
    pub fn too_large(message: impl Into<String>) -> Self {
        Self::TooLarge {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Where in the download a transfer failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Creating the staged file.
    Staging,
    /// Opening the body request.
    Request,
    /// Reading the body stream.
    Read,
    /// Writing or rewinding the staged file.
    Write,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Staging => "staging",
            Self::Request => "request",
            Self::Read => "read",
            Self::Write => "write",
        };
        f.write_str(stage)
    }
}

/// Terminal failure of one relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The initial status message could not be posted.
    #[error("could not post the status message")]
    GatewayUnavailable(#[source] GatewayError),

    #[error("metadata probe failed for {url}")]
    ProbeFailed {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("declared size {declared} exceeds the {ceiling} byte ceiling")]
    TooLarge { declared: u64, ceiling: u64 },

    #[error("transfer failed during {stage} after {bytes} bytes")]
    TransferFailed {
        stage: TransferStage,
        bytes: u64,
        #[source]
        source: BoxError,
    },

    #[error("upload failed")]
    UploadFailed(#[source] UploadError),
}

impl RelayError {
    #[must_use]
    pub fn transfer(stage: TransferStage, bytes: u64, source: impl Into<BoxError>) -> Self {
        Self::TransferFailed {
            stage,
            bytes,
            source: source.into(),
        }
    }

    /// The terminal state a relay ends in when it fails with this error.
    #[must_use]
    pub fn terminal_phase(&self) -> RelayPhase {
        match self {
            Self::ProbeFailed { .. } | Self::TooLarge { .. } => RelayPhase::Gated,
            Self::GatewayUnavailable(_) | Self::TransferFailed { .. } | Self::UploadFailed(_) => {
                RelayPhase::Failed
            },
        }
    }

    /// The text shown to the user in the status message.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::GatewayUnavailable(_) => "❌ Chat is unavailable".to_string(),
            Self::ProbeFailed { .. } => "❌ Failed to get file info".to_string(),
            Self::TooLarge { declared, ceiling } => format!(
                "❌ File is too large ({}). The upload limit is {}.\n\nPlease use a direct download link instead.",
                format_bytes(*declared),
                format_bytes(*ceiling),
            ),
            Self::TransferFailed { stage, .. } => match stage {
                TransferStage::Staging => "❌ Failed to create temporary file".to_string(),
                TransferStage::Request | TransferStage::Read => {
                    "❌ Failed to download the file".to_string()
                },
                TransferStage::Write => "❌ Failed to save the file".to_string(),
            },
            Self::UploadFailed(UploadError::TooLarge { .. }) => {
                "❌ The chat rejected the file as too large.\n\nPlease use a direct download link instead."
                    .to_string()
            },
            Self::UploadFailed(UploadError::Transport { .. }) => {
                "❌ Failed to send the file".to_string()
            },
        }
    }
}
