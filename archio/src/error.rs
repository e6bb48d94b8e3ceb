use std::fmt;

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Coarse classification of an [`ArchiveError`].
///
/// Callers should branch on this rather than on message text: `IoFailure` is
/// environmental, `Protocol` and `InvalidArgument` are programming errors,
/// and `SizeLimitExceeded` is a data limit of the target format.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Protocol,
    IoFailure,
    SizeLimitExceeded,
    UnsupportedFormat,
    Corrupt,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::SizeLimitExceeded => "size limit exceeded",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::Corrupt => "corrupt archive",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Protocol(String),

    #[error("unable to write all data")]
    IncompleteWrite,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{name}'s size exceeds the limit of {limit}.")]
    SizeLimitExceeded { name: String, limit: &'static str },

    #[error("unsupported archive format `{0}`")]
    UnsupportedFormat(String),

    #[error("corrupt archive: {0}")]
    Corrupt(String),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ArchiveError::Protocol(_) => ErrorKind::Protocol,
            ArchiveError::IncompleteWrite | ArchiveError::Io(_) => ErrorKind::IoFailure,
            ArchiveError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            ArchiveError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ArchiveError::Corrupt(_) => ErrorKind::Corrupt,
        }
    }

    pub(crate) fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        ArchiveError::InvalidArgument(msg.into())
    }

    pub(crate) fn protocol<S: Into<String>>(msg: S) -> Self {
        ArchiveError::Protocol(msg.into())
    }

    pub(crate) fn corrupt<S: Into<String>>(msg: S) -> Self {
        ArchiveError::Corrupt(msg.into())
    }
}

impl From<ArchiveError> for std::io::Error {
    fn from(err: ArchiveError) -> Self {
        use std::io::{Error, ErrorKind as IoKind};

        match err {
            ArchiveError::Io(e) => e,
            ArchiveError::IncompleteWrite => Error::new(IoKind::WriteZero, err.to_string()),
            ArchiveError::InvalidArgument(_) | ArchiveError::Protocol(_) => {
                Error::new(IoKind::InvalidInput, err)
            }
            ArchiveError::SizeLimitExceeded { .. } | ArchiveError::Corrupt(_) => {
                Error::new(IoKind::InvalidData, err)
            }
            ArchiveError::UnsupportedFormat(_) => Error::new(IoKind::Unsupported, err),
        }
    }
}
