use kicad_doc::error::{DocError, NotFoundError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}: not found")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url}: server returned {status}: {body}")]
    Api {
        url: String,
        status: u16,
        body: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Doc(#[from] DocError),

    #[error("cannot use URL {0}")]
    Url(String),

    #[error("load task failed: {0}")]
    Task(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

impl From<FetchError> for NotFoundError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound(name) => NotFoundError::new(name),
            other => NotFoundError::new(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
