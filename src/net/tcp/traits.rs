use std::fmt;
use std::net::SocketAddr;

use super::Conn;

/// Stable identifier of a pooled connection.
///
/// Unlike the OS socket handle, the id survives reconnect attempts of an
/// active connection, which replace the underlying socket each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a connection came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnMode {
    /// Established by an outbound connect.
    Active,
    /// Established by accepting on the pool's listener.
    Passive,
}

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Outbound connect issued (or waiting for the next retry).
    Connecting,
    /// Accepted, waiting for the setup phase to finish.
    Accepting,
    Established,
    Closed,
}

/// Payload hooks of a connection.
///
/// One implementation per application protocol; the pool picks it through its
/// [`ConnFactory`]. Hooks run on the reactor thread and may call back into the
/// connection (`write`, `read`, `terminate`) without restriction.
pub trait ConnHandler: 'static {
    /// The connection became usable: the outbound connect succeeded, or the
    /// accepted socket finished its setup phase.
    fn on_setup(&self, conn: &Conn) {
        let _ = conn;
    }

    /// New bytes were appended to `conn.read()`.
    fn on_read(&self, conn: &Conn);

    /// Runs exactly once, right before the connection releases its resources.
    fn on_teardown(&self, conn: &Conn) {
        let _ = conn;
    }
}

/// Produces the hook implementation for every connection a pool creates.
pub trait ConnFactory: 'static {
    type Handler: ConnHandler;

    fn create_conn(&self, mode: ConnMode, addr: SocketAddr) -> Self::Handler;
}

impl<F, H> ConnFactory for F
where
    F: Fn(ConnMode, SocketAddr) -> H + 'static,
    H: ConnHandler,
{
    type Handler = H;

    fn create_conn(&self, mode: ConnMode, addr: SocketAddr) -> H {
        self(mode, addr)
    }
}
