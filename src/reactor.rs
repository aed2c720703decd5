use std::{
    cell::RefCell,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{
    error::Result,
    event::Event,
    handler::{wants, EventHandler},
    poll::{PollHandle, WAKER_TOKEN},
    timer::{TimerId, TimerQueue},
};
use mio::{Events, Interest, Token};
use tracing::trace;

pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;

/// Single-threaded reactor: waits for readiness, then runs handlers serially.
///
/// Every callback executes on the thread that calls [`Reactor::turn`] or
/// [`Reactor::run`]. Nothing in here is `Send`; the only way in from another
/// thread is a [`StopHandle`].
pub struct Reactor {
    pub(crate) poll_handle: PollHandle,
    timers: RefCell<TimerQueue>,
    events: RefCell<Events>,
    stop_requested: Arc<AtomicBool>,
    poll_timeout: Duration,
}

impl Reactor {
    pub fn new(events_capacity: usize, poll_timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            poll_handle: PollHandle::new()?,
            timers: RefCell::new(TimerQueue::new()),
            events: RefCell::new(Events::with_capacity(events_capacity)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            poll_timeout: Duration::from_millis(poll_timeout_ms),
        })
    }

    /// Turns the reactor until a [`StopHandle`] asks it to stop.
    ///
    /// A stop requested before `run` is entered makes it return right away.
    pub fn run(&self) -> Result<()> {
        while !self.stop_requested.swap(false, Ordering::SeqCst) {
            self.turn(Some(self.poll_timeout))?;
        }
        Ok(())
    }

    /// Runs a single poll iteration and returns how many handlers were invoked.
    ///
    /// I/O handlers are dispatched first, then every timer whose deadline has
    /// passed. The wait never outlasts the earliest pending timer.
    pub fn turn(&self, timeout: Option<Duration>) -> Result<usize> {
        let next_timer = self.timers.borrow_mut().next_timeout(Instant::now());
        let wait = match (timeout, next_timer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let ready: Vec<Event> = {
            let mut events = self.events.borrow_mut();
            self.poll_handle.poll(&mut events, wait)?;
            events
                .iter()
                .filter(|event| event.token() != WAKER_TOKEN)
                .map(Event::from)
                .collect()
        };

        let mut dispatched = 0;
        for event in &ready {
            if self.dispatch_event(event) {
                dispatched += 1;
            }
        }
        dispatched += self.fire_timers(Instant::now());
        Ok(dispatched)
    }

    pub fn dispatch_event(&self, event: &Event) -> bool {
        let Some(token) = event.token() else {
            return false;
        };
        // the handler may have been removed by an earlier callback in this batch
        let Some((handler, interest)) = self.poll_handle.handler(token) else {
            trace!(token = token.0, "dropping event for deregistered token");
            return false;
        };
        let wanted = wants(interest, event);
        if wanted {
            handler.handle_event(event);
        }
        wanted
    }

    fn fire_timers(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let expired = self.timers.borrow_mut().pop_expired(now);
            let Some((id, handler)) = expired else {
                break;
            };
            handler.handle_event(&Event::timeout(id));
            fired += 1;
        }
        fired
    }

    pub fn add_timer<H>(&self, delay: Duration, handler: H) -> TimerId
    where
        H: EventHandler + 'static,
    {
        self.timers
            .borrow_mut()
            .insert(Instant::now() + delay, Rc::new(handler))
    }

    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().cancel(id)
    }

    pub fn is_timer_pending(&self, id: TimerId) -> bool {
        self.timers.borrow().is_pending(id)
    }

    pub fn register<H, S>(&self, src: &mut S, interest: Interest, handler: H) -> Result<Token>
    where
        H: EventHandler + 'static,
        S: mio::event::Source + ?Sized,
    {
        self.poll_handle.register(src, interest, handler)
    }

    pub fn get_shutdown_handle(&self) -> StopHandle {
        StopHandle {
            stop_requested: self.stop_requested.clone(),
            waker: self.poll_handle.waker(),
        }
    }
}

/// Thread-safe handle that stops a running [`Reactor`].
#[derive(Clone)]
pub struct StopHandle {
    stop_requested: Arc<AtomicBool>,
    waker: Arc<mio::Waker>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use std::rc::Rc;

    #[test]
    fn test_reactor_creation() {
        let reactor = Reactor::new(DEFAULT_EVENTS_CAPACITY, DEFAULT_POLL_TIMEOUT_MS);
        assert!(reactor.is_ok());
    }

    #[test]
    fn test_timer_fires_once() {
        let reactor = Reactor::new(64, 10).unwrap();
        let counter = Rc::new(Cell::new(0));
        let c = counter.clone();
        reactor.add_timer(Duration::from_millis(5), move |event: &Event| {
            assert!(event.is_timeout());
            c.set(c.get() + 1);
        });

        let deadline = Instant::now() + Duration::from_secs(1);
        while counter.get() == 0 && Instant::now() < deadline {
            reactor.turn(Some(Duration::from_millis(10))).unwrap();
        }
        reactor.turn(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let reactor = Reactor::new(64, 10).unwrap();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let id = reactor.add_timer(Duration::from_millis(1), move |_: &Event| f.set(true));

        assert!(reactor.is_timer_pending(id));
        assert!(reactor.cancel_timer(id));
        std::thread::sleep(Duration::from_millis(5));
        reactor.turn(Some(Duration::from_millis(5))).unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn test_event_dispatch() {
        let reactor = Reactor::new(64, 10).unwrap();
        let mut listener = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let counter = Rc::new(Cell::new(0));
        let c = counter.clone();

        reactor
            .register(&mut listener, Interest::READABLE, move |event: &Event| {
                assert!(event.is_readable());
                c.set(c.get() + 1);
            })
            .unwrap();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while counter.get() == 0 && Instant::now() < deadline {
            reactor.turn(Some(Duration::from_millis(20))).unwrap();
        }
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_stop_handle_from_other_thread() {
        let reactor = Reactor::new(64, 1000).unwrap();
        let stop = reactor.get_shutdown_handle();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.stop();
        });

        let started = Instant::now();
        reactor.run().unwrap();
        handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
