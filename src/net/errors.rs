use std::fmt;
use std::io;
use std::net::SocketAddr;

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Conditions that stop a pool operation from starting at all.
///
/// Failures of an already running link are never reported through this type;
/// they end in [`Conn::terminate`](crate::net::tcp::Conn::terminate) and the
/// application hears about them through its teardown hook.
#[derive(Debug)]
pub enum NetworkError {
    /// Creating or configuring the socket failed.
    Socket(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(SocketAddr, io::Error),
    /// The socket could not be registered with the event loop.
    Register(crate::error::Error),
    AlreadyListening(SocketAddr),
    Io(io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Socket(e) => write!(f, "Socket Error: {}", e),
            NetworkError::Bind(addr, e) => write!(f, "Bind Error on {}: {}", addr, e),
            NetworkError::Listen(addr, e) => write!(f, "Listen Error on {}: {}", addr, e),
            NetworkError::Register(e) => write!(f, "Register Error: {}", e),
            NetworkError::AlreadyListening(addr) => {
                write!(f, "Pool is already listening on {}", addr)
            }
            NetworkError::Io(e) => write!(f, "IO Error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Socket(e)
            | NetworkError::Bind(_, e)
            | NetworkError::Listen(_, e)
            | NetworkError::Io(e) => Some(e),
            NetworkError::Register(e) => Some(e),
            NetworkError::AlreadyListening(_) => None,
        }
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        NetworkError::Io(err)
    }
}

impl From<crate::error::Error> for NetworkError {
    fn from(err: crate::error::Error) -> Self {
        NetworkError::Register(err)
    }
}
