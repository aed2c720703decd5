use crate::event::Event;
use mio::Interest;
use std::rc::Rc;

/// Callback invoked by the reactor on readiness or timer expiry.
///
/// Handlers run on the reactor thread, one at a time, and may freely call back
/// into the [`EventLoop`](crate::EventLoop) to register, cancel or arm timers.
pub trait EventHandler {
    fn handle_event(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event),
{
    fn handle_event(&self, event: &Event) {
        self(event)
    }
}

pub struct HandlerEntry {
    pub handler: Rc<dyn EventHandler>,
    pub interest: Interest,
}

impl HandlerEntry {
    pub fn new<H>(handler: H, interest: Interest) -> Self
    where
        H: EventHandler + 'static,
    {
        HandlerEntry {
            handler: Rc::new(handler),
            interest,
        }
    }

    pub fn wants(&self, event: &Event) -> bool {
        wants(self.interest, event)
    }
}

/// Whether `event` is something a registration with `interest` asked to hear
/// about. Errors are always delivered.
pub fn wants(interest: Interest, event: &Event) -> bool {
    (interest.is_readable() && (event.is_readable() || event.is_closed()))
        || (interest.is_writable() && event.is_writable())
        || event.is_error()
}
