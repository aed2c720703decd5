use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
    sync::Arc,
    time::Duration,
};

use mio::{Events, Interest, Poll, Token};

use crate::{
    error::{Error, Result},
    handler::{EventHandler, HandlerEntry},
};

/// Reserved for the cross-thread waker; never handed out by `register`.
pub const WAKER_TOKEN: Token = Token(0);

/// Owns the OS poller and the token → handler table.
///
/// The `Poll` itself is only borrowed for the duration of a `poll` call. All
/// (de)registration goes through a cloned `Registry`, so handlers can arm new
/// sources while the reactor is dispatching.
pub struct PollHandle {
    poller: RefCell<Poll>,
    registry: mio::Registry,
    handlers: RefCell<HashMap<Token, HandlerEntry>>,
    waker: Arc<mio::Waker>,
    next_token: Cell<usize>,
}

impl PollHandle {
    pub fn new() -> Result<Self> {
        let poller = Poll::new()?;
        let registry = poller.registry().try_clone()?;
        let waker = mio::Waker::new(poller.registry(), WAKER_TOKEN)?;
        Ok(PollHandle {
            poller: RefCell::new(poller),
            registry,
            handlers: RefCell::new(HashMap::new()),
            waker: Arc::new(waker),
            next_token: Cell::new(WAKER_TOKEN.0 + 1),
        })
    }

    /// Registers `src` under a fresh token. Tokens are never reused.
    pub fn register<H, S>(&self, src: &mut S, interest: Interest, handler: H) -> Result<Token>
    where
        H: EventHandler + 'static,
        S: mio::event::Source + ?Sized,
    {
        let token = Token(self.next_token.get());
        self.next_token.set(token.0 + 1);

        self.registry.register(src, token, interest)?;
        self.handlers
            .borrow_mut()
            .insert(token, HandlerEntry::new(handler, interest));
        Ok(token)
    }

    pub fn reregister<S>(&self, src: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        let mut handlers = self.handlers.borrow_mut();
        let entry = handlers
            .get_mut(&token)
            .ok_or(Error::UnknownToken(token.0))?;
        self.registry.reregister(src, token, interest)?;
        entry.interest = interest;
        Ok(())
    }

    /// Removes the handler for `token` and detaches `src` from the poller.
    ///
    /// The handler is dropped even when the OS-level deregistration fails, so
    /// no further callback can fire for this token.
    pub fn deregister<S>(&self, src: &mut S, token: Token) -> Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        let entry = self.handlers.borrow_mut().remove(&token);
        self.registry.deregister(src)?;
        match entry {
            Some(_) => Ok(()),
            None => Err(Error::UnknownToken(token.0)),
        }
    }

    pub fn handler(&self, token: Token) -> Option<(Rc<dyn EventHandler>, Interest)> {
        self.handlers
            .borrow()
            .get(&token)
            .map(|entry| (entry.handler.clone(), entry.interest))
    }

    pub fn is_registered(&self, token: Token) -> bool {
        self.handlers.borrow().contains_key(&token)
    }

    pub fn registered_len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn poll(&self, events: &mut Events, timeout: Option<Duration>) -> Result<usize> {
        match self.poller.borrow_mut().poll(events, timeout) {
            Ok(()) => Ok(events.iter().count()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn waker(&self) -> Arc<mio::Waker> {
        self.waker.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use mio::net::TcpListener;

    #[test]
    fn test_poll() {
        let poller = PollHandle::new().unwrap();
        let mut events = Events::with_capacity(1024);
        poller
            .poll(&mut events, Some(Duration::from_millis(10)))
            .unwrap();
    }

    #[test]
    fn test_tokens_are_not_reused() {
        let poller = PollHandle::new().unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let first = poller
            .register(&mut listener, Interest::READABLE, |_: &Event| {})
            .unwrap();
        assert_ne!(first, WAKER_TOKEN);
        assert!(poller.is_registered(first));

        poller.deregister(&mut listener, first).unwrap();
        assert!(!poller.is_registered(first));

        let second = poller
            .register(&mut listener, Interest::READABLE, |_: &Event| {})
            .unwrap();
        assert!(second.0 > first.0);
        assert_eq!(poller.registered_len(), 1);
    }

    #[test]
    fn test_reregister_unknown_token() {
        let poller = PollHandle::new().unwrap();
        let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = poller
            .reregister(&mut listener, Token(42), Interest::READABLE)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownToken(42)));
    }
}
