use std::{fmt, io, result::Result as StdResult};

pub type Result<T> = StdResult<T, Error>;

/// Failures of the reactor itself.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The token is not (or no longer) registered.
    UnknownToken(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO Error: {}", e),
            Error::UnknownToken(token) => write!(f, "Unknown token: {}", token),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::UnknownToken(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
