use std::{error, fmt, io};

#[derive(Debug)]
pub enum Error {
    InvalidPlayable(String),
    BackendError(Box<dyn error::Error + Send>),
    JsonError(Box<dyn error::Error + Send>),
    UrlError(Box<dyn error::Error + Send>),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPlayable(reason) => write!(f, "Invalid playable: {reason}"),
            Self::BackendError(err) | Self::JsonError(err) | Self::UrlError(err) => err.fmt(f),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::JsonError(Box::new(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlError(Box::new(err))
    }
}
