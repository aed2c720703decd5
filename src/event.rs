use mio::Token;
use std::fmt;

use crate::timer::TimerId;

/// What woke a handler up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Io(Token),
    Timer(TimerId),
}

/// Unified event handed to every [`EventHandler`](crate::EventHandler).
///
/// Readiness events are flattened out of `mio::event::Event` so that timers
/// and sockets can share one handler signature.
#[derive(Clone, Copy)]
pub struct Event {
    source: Source,
    is_readable: bool,
    is_writable: bool,
    is_error: bool,
    is_closed: bool,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("source", &self.source)
            .field("is_readable", &self.is_readable)
            .field("is_writable", &self.is_writable)
            .field("is_error", &self.is_error)
            .field("is_closed", &self.is_closed)
            .finish()
    }
}

impl Event {
    pub(crate) fn timeout(id: TimerId) -> Self {
        Self {
            source: Source::Timer(id),
            is_readable: false,
            is_writable: false,
            is_error: false,
            is_closed: false,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn token(&self) -> Option<Token> {
        match self.source {
            Source::Io(token) => Some(token),
            Source::Timer(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.source, Source::Timer(_))
    }

    pub fn is_readable(&self) -> bool {
        self.is_readable
    }

    pub fn is_writable(&self) -> bool {
        self.is_writable
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Either half of the stream was closed by the peer.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }
}

impl From<&mio::event::Event> for Event {
    fn from(event: &mio::event::Event) -> Self {
        Self {
            source: Source::Io(event.token()),
            is_readable: event.is_readable(),
            is_writable: event.is_writable(),
            is_error: event.is_error(),
            is_closed: event.is_read_closed() || event.is_write_closed(),
        }
    }
}
