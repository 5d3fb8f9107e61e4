use std::io;

use tokio::task::JoinError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The object store rejected or failed the request.
    #[error("object store request failed: {0}")]
    Transport(#[source] io::Error),

    /// Feeding the source into the gzip encoder, or finalizing it, failed.
    #[error("compression failed: {context}")]
    Compression {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The fetched object is not a gzip stream.
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("compression task did not complete: {0}")]
    Task(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn compression(context: &'static str, source: io::Error) -> Self {
        Self::Compression { context, source }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedStream(_))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport(e) => e,
            Error::Compression { context, source } => {
                io::Error::new(source.kind(), format!("{context}: {source}"))
            }
            Error::MalformedStream(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            Error::Cancelled => io::Error::new(io::ErrorKind::Interrupted, "operation cancelled"),
            e @ (Error::InvalidRequest(_) | Error::Config(_)) => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            e @ Error::Task(_) => io::Error::other(e),
        }
    }
}
