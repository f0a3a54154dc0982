use derive_more::{Display, From};

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("Missing OpenAI key: looked in {}", searched.join(", "))]
    CredentialMissing { searched: Vec<String> },

    #[display("Transcript unavailable for `{video}`: {reason}")]
    TranscriptUnavailable { video: String, reason: String },

    #[display("Transport error: {_0}")]
    Transport(String),

    #[display("Authentication failed: {_0}")]
    Authentication(String),

    #[display("Request rejected by the model provider: {_0}")]
    RequestRejected(String),

    #[display("The model returned an empty article")]
    EmptyGeneration,

    #[display("I/O error: {_0}")]
    #[from]
    Io(std::io::Error),

    #[display("JSON error: {_0}")]
    #[from]
    Json(serde_json::Error),

    #[display("Cancelled")]
    Cancelled,

    #[display("{_0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    pub fn unavailable(video: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::TranscriptUnavailable {
            video: video.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry could plausibly succeed. Only transport-level failures
    /// (timeouts, rate limits, 5xx, broken connections) qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CredentialMissing { .. } => ErrorKind::CredentialMissing,
            Error::TranscriptUnavailable { .. } => ErrorKind::TranscriptUnavailable,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::RequestRejected(_) => ErrorKind::RequestRejected,
            Error::EmptyGeneration => ErrorKind::EmptyGeneration,
            Error::Io(_) => ErrorKind::Io,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Json(_) | Error::Custom(_) => ErrorKind::Other,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    #[display("credential missing")]
    CredentialMissing,
    #[display("transcript unavailable")]
    TranscriptUnavailable,
    #[display("transport error")]
    Transport,
    #[display("authentication error")]
    Authentication,
    #[display("request rejected")]
    RequestRejected,
    #[display("empty generation")]
    EmptyGeneration,
    #[display("I/O failure")]
    Io,
    #[display("cancelled")]
    Cancelled,
    #[display("error")]
    Other,
}

impl ErrorKind {
    /// Process exit status reported for this kind of failure.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Other => 1,
            ErrorKind::TranscriptUnavailable => 3,
            ErrorKind::CredentialMissing => 4,
            ErrorKind::Authentication => 5,
            ErrorKind::RequestRejected => 6,
            ErrorKind::Transport => 7,
            ErrorKind::EmptyGeneration => 8,
            ErrorKind::Io => 9,
            ErrorKind::Cancelled => 130,
        }
    }
}
