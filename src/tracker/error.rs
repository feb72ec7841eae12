use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("unsupported tracker url: {0}")]
    InvalidUrl(String),

    /// A response that doesn't parse as a tracker reply.
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),

    /// An error the tracker itself reported.
    #[error("tracker failure: {0}")]
    Failure(String),

    #[error("timeout")]
    Timeout,
}
