//! # Mill-Pool
//! Connection pooling for byte-stream links on a single-threaded, reactor-based event loop built
//! on top of [`mio`].
//!
//! A [`ConnPool`](net::tcp::ConnPool) manages many bi-directional TCP links at once: links it
//! dials out to (active) and links a listener accepted (passive). Every link owns a segmented
//! receive and send buffer, reconnects with jittered backoff when dialing fails, and reports its
//! lifecycle to a user handler through `on_setup`, `on_read` and `on_teardown`.
//!
//! ## Core Philosophy
//! - **One thread**: every callback runs on the thread that drives the [`EventLoop`], so handlers
//!   never lock anything
//! - **No async runtime**: plain callbacks on top of mio's readiness model
//! - **Handles, not owners**: a link keeps itself alive until it is terminated
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌─────────────┐
//! │ EventLoop   │───▶│   Reactor    │───▶│ PollHandle  │
//! └─────────────┘    └──────────────┘    └─────────────┘
//!        ▲                   │
//!        │                   ▼
//! ┌─────────────┐    ┌──────────────┐
//! │  ConnPool   │    │  TimerQueue  │
//! └─────────────┘    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mill_pool::{EventLoop, EventHandler, Event};
//! use mio::{net::TcpListener, Interest};
//! use std::net::SocketAddr;
//!
//! struct LogHandler;
//!
//! impl EventHandler for LogHandler {
//!     fn handle_event(&self, event: &Event) {
//!         println!("Received event: {:?}", event);
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let event_loop = EventLoop::default();
//!
//!     let addr: SocketAddr = "127.0.0.1:8080".parse()?;
//!     let mut listener = TcpListener::bind(addr)?;
//!
//!     let _token = event_loop.register(&mut listener, Interest::READABLE, LogHandler)?;
//!
//!     event_loop.run()?;
//!     Ok(())
//! }
//! ```
//!
//! - [`EventLoop`]: entry point for registering I/O sources, arming timers and running the loop
//! - [`EventHandler`]: trait for custom event handling logic
//! - [`net::tcp`]: the connection pool
//! - [`buffer`]: the segmented byte buffer behind every link
//! - [`reactor`]: the poll/dispatch cycle
//! - [`error`]: error types and result handling

use std::{rc::Rc, time::Duration};

use mio::{Interest, Token};

pub mod buffer;
pub mod error;
pub mod event;
pub mod handler;
pub mod net;
pub mod poll;
pub mod reactor;
pub mod timer;

pub use buffer::SegBuffer;
pub use event::Event;
pub use handler::EventHandler;
pub use reactor::StopHandle;
pub use timer::TimerId;

use crate::{
    error::Result,
    reactor::{Reactor, DEFAULT_EVENTS_CAPACITY, DEFAULT_POLL_TIMEOUT_MS},
};

/// Re-exports of the most commonly used items.
///
/// ```rust
/// use mill_pool::prelude::*;
/// ```
pub mod prelude {
    pub use crate::buffer::SegBuffer;
    pub use crate::event::Event;
    pub use crate::handler::EventHandler;
    pub use crate::net::tcp::{
        Conn, ConnFactory, ConnHandler, ConnMode, ConnPool, ConnPoolConfig, ConnState,
        ConnectionId,
    };
    pub use crate::reactor::{self, Reactor, StopHandle};
    pub use crate::EventLoop;
}

/// Handle to a single-threaded event loop.
///
/// Cloning the handle shares the same reactor, which is how connections and
/// pools reach it. The handle is not `Send`: the loop and every callback stay
/// on the thread that created it. Use [`EventLoop::stop_handle`] to stop it
/// from elsewhere.
///
/// ```rust,no_run
/// use mill_pool::EventLoop;
///
/// // small batches, short wake-ups
/// let event_loop = EventLoop::new(256, 10)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct EventLoop {
    reactor: Rc<Reactor>,
}

impl Default for EventLoop {
    /// Creates an `EventLoop` with [`DEFAULT_EVENTS_CAPACITY`] and
    /// [`DEFAULT_POLL_TIMEOUT_MS`].
    ///
    /// # Panics
    ///
    /// Panics if the OS poller cannot be created.
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS_CAPACITY, DEFAULT_POLL_TIMEOUT_MS)
            .expect("failed to create the OS poller")
    }
}

impl EventLoop {
    /// Creates an `EventLoop`.
    ///
    /// ## Arguments
    /// * `events_capacity` - maximum number of events handled per poll
    /// * `poll_timeout_ms` - upper bound on one wait inside [`run`](Self::run)
    pub fn new(events_capacity: usize, poll_timeout_ms: u64) -> Result<Self> {
        let reactor = Reactor::new(events_capacity, poll_timeout_ms)?;
        Ok(Self {
            reactor: Rc::new(reactor),
        })
    }

    /// Registers an I/O source and returns the token allocated for it.
    ///
    /// Tokens are never reused, so an event delivered after a deregistration
    /// can not reach a newer handler.
    pub fn register<H, S>(&self, source: &mut S, interest: Interest, handler: H) -> Result<Token>
    where
        H: EventHandler + 'static,
        S: mio::event::Source + ?Sized,
    {
        self.reactor.register(source, interest, handler)
    }

    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        self.reactor.poll_handle.reregister(source, token, interest)
    }

    /// Deregisters an I/O source. No event is delivered for `token` afterwards,
    /// even one already returned by the current poll.
    pub fn deregister<S>(&self, source: &mut S, token: Token) -> Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        self.reactor.poll_handle.deregister(source, token)
    }

    /// Arms a one-shot timer that calls `handler` once `delay` has passed.
    pub fn add_timer<H>(&self, delay: Duration, handler: H) -> TimerId
    where
        H: EventHandler + 'static,
    {
        self.reactor.add_timer(delay, handler)
    }

    /// Disarms a timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.reactor.cancel_timer(id)
    }

    pub fn is_timer_pending(&self, id: TimerId) -> bool {
        self.reactor.is_timer_pending(id)
    }

    /// Polls once, waiting at most `timeout`, and dispatches what is ready.
    ///
    /// Returns the number of handlers that ran.
    pub fn turn(&self, timeout: Option<Duration>) -> Result<usize> {
        self.reactor.turn(timeout)
    }

    /// Runs the loop on the current thread until it is stopped.
    pub fn run(&self) -> Result<()> {
        self.reactor.run()
    }

    /// Asks a running loop to return after the current iteration.
    pub fn stop(&self) {
        self.reactor.get_shutdown_handle().stop();
    }

    /// A `Send` handle for stopping the loop from another thread.
    ///
    /// ```rust,no_run
    /// use mill_pool::EventLoop;
    /// use std::{thread, time::Duration};
    ///
    /// let event_loop = EventLoop::default();
    /// let stop = event_loop.stop_handle();
    ///
    /// thread::spawn(move || {
    ///     thread::sleep(Duration::from_secs(1));
    ///     stop.stop();
    /// });
    ///
    /// event_loop.run()?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn stop_handle(&self) -> StopHandle {
        self.reactor.get_shutdown_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_clones_share_the_reactor() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let other = event_loop.clone();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();

        let id = other.add_timer(Duration::from_millis(1), move |_: &Event| f.set(true));
        assert!(event_loop.is_timer_pending(id));

        std::thread::sleep(Duration::from_millis(5));
        event_loop.turn(Some(Duration::from_millis(5))).unwrap();
        assert!(fired.get());
        assert!(!other.is_timer_pending(id));
    }

    #[test]
    fn test_stop_before_run_returns() {
        let event_loop = EventLoop::new(64, 1000).unwrap();
        event_loop.stop();
        event_loop.run().unwrap();
    }

    #[test]
    fn test_deregister_unknown_token_fails() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let mut listener = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let token = event_loop
            .register(&mut listener, Interest::READABLE, |_: &Event| {})
            .unwrap();

        event_loop.deregister(&mut listener, token).unwrap();
        assert!(event_loop.deregister(&mut listener, token).is_err());
    }
}
