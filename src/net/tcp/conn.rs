//! One pooled bi-directional link and its lifecycle state machine.
//!
//! ```text
//!  ACTIVE:   Connecting ──connect ok──▶ Established ──▶ Closed
//!              │  ▲
//!   fail/timeout  │ retry timer (jittered)
//!              ▼  │
//!            (no socket)
//!
//!  PASSIVE:  Accepting ──first readiness──▶ Established ──▶ Closed
//!              │
//!              └── conn_server_timeout ──▶ Closed
//! ```
//!
//! A connection owns a strong reference to itself from construction until
//! [`Conn::terminate`] (or a forced close by its pool). Reactor callbacks only
//! hold weak references, so the self-reference is what keeps the connection
//! alive while events for it may still arrive.

use std::{
    cell::{RefCell, RefMut},
    fmt,
    io::{self, ErrorKind, Read, Write},
    net::SocketAddr,
    rc::{Rc, Weak},
};

use mio::{net::TcpStream, Interest, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, trace, warn};

use super::{
    config::ConnPoolConfig,
    traits::{ConnHandler, ConnMode, ConnState, ConnectionId},
    PoolShared,
};
use crate::{
    buffer::SegBuffer,
    event::Event,
    net::errors::{NetworkError, Result},
    timer::TimerId,
    EventLoop,
};

/// Handle to a pooled connection. Cloning the handle does not clone the link.
#[derive(Clone)]
pub struct Conn(Rc<ConnInner>);

/// Non-owning handle to a connection.
#[derive(Clone)]
pub struct WeakConn(Weak<ConnInner>);

impl WeakConn {
    pub fn upgrade(&self) -> Option<Conn> {
        self.0.upgrade().map(Conn)
    }
}

struct ConnInner {
    id: ConnectionId,
    mode: ConnMode,
    addr: SocketAddr,
    event_loop: EventLoop,
    config: Rc<ConnPoolConfig>,
    pool: Weak<PoolShared>,
    handler: Rc<dyn ConnHandler>,
    core: RefCell<ConnCore>,
    recv_buffer: RefCell<SegBuffer>,
    self_ref: RefCell<Option<Conn>>,
}

struct ConnCore {
    state: ConnState,
    stream: Option<TcpStream>,
    token: Option<Token>,
    timer: Option<TimerId>,
    send_buffer: SegBuffer,
    /// the last write edge was drained; a write may flush right away
    ready_send: bool,
    seg_buff_size: usize,
    attempts: u32,
}

enum Flush {
    Drained,
    Blocked,
    Failed(io::Error),
}

impl Conn {
    pub(crate) fn new(
        id: ConnectionId,
        mode: ConnMode,
        addr: SocketAddr,
        event_loop: EventLoop,
        config: Rc<ConnPoolConfig>,
        pool: Weak<PoolShared>,
        handler: Rc<dyn ConnHandler>,
    ) -> Conn {
        let state = match mode {
            ConnMode::Active => ConnState::Connecting,
            ConnMode::Passive => ConnState::Accepting,
        };
        let conn = Conn(Rc::new(ConnInner {
            id,
            mode,
            addr,
            event_loop,
            core: RefCell::new(ConnCore {
                state,
                stream: None,
                token: None,
                timer: None,
                send_buffer: SegBuffer::new(),
                ready_send: false,
                seg_buff_size: config.seg_buff_size,
                attempts: 0,
            }),
            config,
            pool,
            handler,
            recv_buffer: RefCell::new(SegBuffer::new()),
            self_ref: RefCell::new(None),
        }));
        *conn.0.self_ref.borrow_mut() = Some(conn.clone());
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    pub fn mode(&self) -> ConnMode {
        self.0.mode
    }

    /// Remote address of the link.
    pub fn addr(&self) -> SocketAddr {
        self.0.addr
    }

    pub fn state(&self) -> ConnState {
        self.0.core.borrow().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnState::Closed
    }

    /// Number of outbound connect attempts started so far.
    pub fn connect_attempts(&self) -> u32 {
        self.0.core.borrow().attempts
    }

    /// Raw OS handle of the current socket, while one is open.
    #[cfg(unix)]
    pub fn fd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.0.core.borrow().stream.as_ref().map(|s| s.as_raw_fd())
    }

    pub fn set_seg_buff_size(&self, size: usize) {
        self.0.core.borrow_mut().seg_buff_size = size.max(1);
    }

    /// Bytes queued for sending but not yet accepted by the socket.
    pub fn pending_send(&self) -> usize {
        self.0.core.borrow().send_buffer.size()
    }

    pub fn downgrade(&self) -> WeakConn {
        WeakConn(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Conn) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The receive buffer. New bytes are announced through `on_read`.
    pub fn read(&self) -> RefMut<'_, SegBuffer> {
        self.0.recv_buffer.borrow_mut()
    }

    /// Queues `data` for sending.
    ///
    /// When the socket is writable with nothing queued ahead, the flush is
    /// attempted right away; otherwise the bytes go out on the next write
    /// readiness. Writes before the link is established are held until it is.
    pub fn write(&self, data: impl Into<Vec<u8>>) {
        let flush_now = {
            let mut core = self.0.core.borrow_mut();
            if core.state == ConnState::Closed {
                debug!(id = self.0.id.0, "dropping write to closed connection");
                return;
            }
            core.send_buffer.push(data.into());
            core.ready_send && core.state == ConnState::Established
        };
        if flush_now {
            self.send_data();
        }
    }

    /// Takes over whatever `other` still had queued for sending.
    pub fn move_send_buffer(&self, other: &Conn) {
        let moved = std::mem::take(&mut other.0.core.borrow_mut().send_buffer);
        let flush_now = {
            let mut core = self.0.core.borrow_mut();
            core.send_buffer = moved;
            core.ready_send && core.state == ConnState::Established
        };
        if flush_now {
            self.send_data();
        }
    }

    /// Tears the connection down. Only the first call has any effect.
    ///
    /// Cancels every pending registration, closes the socket, runs
    /// `on_teardown`, leaves the pool registry and finally drops the
    /// self-reference.
    pub fn terminate(&self) {
        if !self.mark_closed() {
            return;
        }
        self.release_io();
        info!(
            id = self.0.id.0,
            addr = %self.0.addr,
            mode = ?self.0.mode,
            "connection terminated"
        );

        self.0.handler.on_teardown(self);

        if let Some(pool) = self.0.pool.upgrade() {
            let removed = pool.remove(self.0.id);
            drop(removed);
        }
        self.release_self_ref();
    }

    /// Closes without running `on_teardown`; used when the pool shuts down.
    pub(crate) fn close(&self) {
        if !self.mark_closed() {
            return;
        }
        self.release_io();
        debug!(id = self.0.id.0, addr = %self.0.addr, "connection closed by pool");
        self.release_self_ref();
    }

    #[cfg(test)]
    pub(crate) fn holds_self_ref(&self) -> bool {
        self.0.self_ref.borrow().is_some()
    }

    #[cfg(test)]
    pub(crate) fn has_pending_timer(&self) -> bool {
        self.0.core.borrow().timer.is_some()
    }

    fn mark_closed(&self) -> bool {
        let mut core = self.0.core.borrow_mut();
        if core.state == ConnState::Closed {
            return false;
        }
        core.state = ConnState::Closed;
        true
    }

    fn release_self_ref(&self) {
        self.0.core.borrow_mut().send_buffer.clear();
        // a read hook may still hold the buffer; it is freed with the last handle then
        if let Ok(mut recv_buffer) = self.0.recv_buffer.try_borrow_mut() {
            recv_buffer.clear();
        }
        let released = self.0.self_ref.borrow_mut().take();
        drop(released);
    }

    /// Drops the socket together with its registration and any armed timer.
    fn release_io(&self) {
        let (stream, token, timer) = {
            let mut core = self.0.core.borrow_mut();
            core.ready_send = false;
            (core.stream.take(), core.token.take(), core.timer.take())
        };
        if let Some(timer) = timer {
            self.0.event_loop.cancel_timer(timer);
        }
        if let (Some(mut stream), Some(token)) = (stream, token) {
            if let Err(e) = self.0.event_loop.deregister(&mut stream, token) {
                debug!(id = self.0.id.0, ?e, "failed to deregister socket");
            }
        }
    }

    fn io_handler(&self) -> impl Fn(&Event) + 'static {
        let weak = self.downgrade();
        move |event: &Event| {
            if let Some(conn) = weak.upgrade() {
                conn.handle_io(event);
            }
        }
    }

    fn arm_timer(&self, delay: std::time::Duration) {
        let weak = self.downgrade();
        let id = self.0.event_loop.add_timer(delay, move |_: &Event| {
            if let Some(conn) = weak.upgrade() {
                conn.on_timer();
            }
        });
        let previous = self.0.core.borrow_mut().timer.replace(id);
        if let Some(previous) = previous {
            self.0.event_loop.cancel_timer(previous);
        }
    }

    fn cancel_timer(&self) {
        let timer = self.0.core.borrow_mut().timer.take();
        if let Some(timer) = timer {
            self.0.event_loop.cancel_timer(timer);
        }
    }

    // ------------------------------------------------------------------
    // active side
    // ------------------------------------------------------------------

    /// Starts the first connect attempt.
    ///
    /// Only a failure to create the socket is reported; a refused or failed
    /// connect goes through the retry policy.
    pub(crate) fn start_connect(&self) -> Result<()> {
        let socket = new_socket(self.0.addr).map_err(NetworkError::Socket)?;
        self.connect_with(socket);
        Ok(())
    }

    fn try_conn(&self) {
        match new_socket(self.0.addr) {
            Ok(socket) => self.connect_with(socket),
            Err(e) => {
                error!(id = self.0.id.0, addr = %self.0.addr, ?e, "failed to create socket");
                self.retry_or_give_up();
            }
        }
    }

    fn connect_with(&self, socket: Socket) {
        let attempt = {
            let mut core = self.0.core.borrow_mut();
            core.attempts = core.attempts.saturating_add(1);
            core.attempts
        };
        debug!(id = self.0.id.0, addr = %self.0.addr, attempt, "connecting");

        let mut stream = match connect_nonblocking(socket, self.0.addr) {
            Ok(stream) => stream,
            Err(e) => {
                info!(id = self.0.id.0, addr = %self.0.addr, ?e, "connect failed");
                self.retry_or_give_up();
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(self.0.config.no_delay) {
            trace!(id = self.0.id.0, ?e, "failed to set TCP_NODELAY");
        }

        let token = match self.0.event_loop.register(
            &mut stream,
            Interest::READABLE | Interest::WRITABLE,
            self.io_handler(),
        ) {
            Ok(token) => token,
            Err(e) => {
                error!(id = self.0.id.0, ?e, "failed to register connecting socket");
                self.retry_or_give_up();
                return;
            }
        };
        {
            let mut core = self.0.core.borrow_mut();
            core.stream = Some(stream);
            core.token = Some(token);
        }
        self.arm_timer(self.0.config.connect_timeout);
    }

    /// Checks whether the pending connect finished, and how.
    fn check_connect(&self) {
        let outcome = {
            let core = self.0.core.borrow();
            let Some(stream) = core.stream.as_ref() else {
                return;
            };
            match stream.take_error() {
                Ok(Some(e)) | Err(e) => Err(e),
                Ok(None) => match stream.peer_addr() {
                    Ok(_) => Ok(true),
                    Err(e) if e.kind() == ErrorKind::NotConnected => Ok(false),
                    Err(e) => Err(e),
                },
            }
        };

        match outcome {
            Ok(true) => self.on_connected(),
            Ok(false) => trace!(id = self.0.id.0, "connect still in progress"),
            Err(e) => {
                info!(id = self.0.id.0, addr = %self.0.addr, ?e, "connect failed");
                self.connect_failed();
            }
        }
    }

    fn on_connected(&self) {
        self.cancel_timer();
        self.0.core.borrow_mut().state = ConnState::Established;
        info!(id = self.0.id.0, addr = %self.0.addr, "connection established");

        self.0.handler.on_setup(self);
        if self.state() == ConnState::Established {
            self.send_data();
        }
    }

    fn connect_failed(&self) {
        self.release_io();
        self.retry_or_give_up();
    }

    fn retry_or_give_up(&self) {
        let attempts = self.connect_attempts();
        if let Some(max) = self.0.config.max_connect_attempts {
            if attempts >= max {
                warn!(id = self.0.id.0, addr = %self.0.addr, attempts, "giving up on connection");
                self.terminate();
                return;
            }
        }
        let delay = self.0.config.gen_retry_delay();
        debug!(id = self.0.id.0, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        self.arm_timer(delay);
    }

    // ------------------------------------------------------------------
    // passive side
    // ------------------------------------------------------------------

    /// Adopts an accepted socket and opens the setup window.
    pub(crate) fn start_accept(&self, mut stream: TcpStream) -> Result<()> {
        let token = self.0.event_loop.register(
            &mut stream,
            Interest::READABLE | Interest::WRITABLE,
            self.io_handler(),
        )?;
        {
            let mut core = self.0.core.borrow_mut();
            core.stream = Some(stream);
            core.token = Some(token);
        }
        self.arm_timer(self.0.config.conn_server_timeout);
        Ok(())
    }

    fn finish_accept(&self) {
        self.cancel_timer();
        self.0.core.borrow_mut().state = ConnState::Established;
        info!(id = self.0.id.0, addr = %self.0.addr, "connection accepted");
        self.0.handler.on_setup(self);
    }

    // ------------------------------------------------------------------
    // event handling
    // ------------------------------------------------------------------

    pub(crate) fn on_timer(&self) {
        let (state, has_stream) = {
            let mut core = self.0.core.borrow_mut();
            core.timer = None;
            (core.state, core.stream.is_some())
        };
        match state {
            ConnState::Connecting if has_stream => {
                info!(id = self.0.id.0, addr = %self.0.addr, "connect attempt timed out");
                self.connect_failed();
            }
            ConnState::Connecting => self.try_conn(),
            ConnState::Accepting => {
                warn!(id = self.0.id.0, addr = %self.0.addr, "connection setup timed out");
                self.terminate();
            }
            ConnState::Established | ConnState::Closed => {}
        }
    }

    fn handle_io(&self, event: &Event) {
        match self.state() {
            ConnState::Connecting => {
                self.check_connect();
                if self.state() != ConnState::Established {
                    return;
                }
            }
            ConnState::Accepting => self.finish_accept(),
            ConnState::Established => {}
            ConnState::Closed => return,
        }

        if event.is_readable() || event.is_closed() || event.is_error() {
            self.recv_data();
        }
        if event.is_writable() && self.state() == ConnState::Established {
            self.send_data();
        }
    }

    fn recv_data(&self) {
        let mut received = false;
        let mut peer_gone = false;
        let mut scratch = vec![0u8; self.0.core.borrow().seg_buff_size];
        loop {
            let res = {
                let mut core = self.0.core.borrow_mut();
                match core.stream.as_mut() {
                    Some(stream) => stream.read(&mut scratch),
                    None => return,
                }
            };
            match res {
                Ok(0) => {
                    info!(id = self.0.id.0, addr = %self.0.addr, "connection closed by peer");
                    peer_gone = true;
                    break;
                }
                Ok(n) => {
                    trace!(id = self.0.id.0, len = n, "read from socket");
                    self.0.recv_buffer.borrow_mut().push(scratch[..n].to_vec());
                    received = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log_link_error(self.0.id, self.0.addr, &e, "error reading from socket");
                    peer_gone = true;
                    break;
                }
            }
        }

        if received {
            self.0.handler.on_read(self);
        }
        if peer_gone {
            self.terminate();
        }
    }

    fn send_data(&self) {
        let outcome = {
            let mut core = self.0.core.borrow_mut();
            let core = &mut *core;
            let Some(stream) = core.stream.as_mut() else {
                return;
            };
            loop {
                let chunk = core.send_buffer.chunk();
                if chunk.is_empty() {
                    core.ready_send = true;
                    break Flush::Drained;
                }
                match stream.write(chunk) {
                    Ok(0) => break Flush::Failed(ErrorKind::WriteZero.into()),
                    Ok(n) => {
                        core.send_buffer.advance(n);
                        trace!(
                            id = self.0.id.0,
                            len = n,
                            remaining = core.send_buffer.size(),
                            "wrote to socket"
                        );
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        core.ready_send = false;
                        break Flush::Blocked;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => break Flush::Failed(e),
                }
            }
        };

        match outcome {
            Flush::Drained | Flush::Blocked => {}
            Flush::Failed(e) => {
                log_link_error(self.0.id, self.0.addr, &e, "error writing to socket");
                self.terminate();
            }
        }
    }
}

impl fmt::Display for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.0.mode {
            ConnMode::Active => "active",
            ConnMode::Passive => "passive",
        };
        #[cfg(unix)]
        let fd = self.fd().unwrap_or(-1);
        #[cfg(not(unix))]
        let fd = -1;
        write!(
            f,
            "<Conn id={} fd={} addr={} mode={}>",
            self.0.id, fd, self.0.addr, mode
        )
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.0.id)
            .field("mode", &self.0.mode)
            .field("addr", &self.0.addr)
            .field("state", &self.state())
            .finish()
    }
}

/// A non-blocking TCP socket of the right family for `addr`.
pub(super) fn new_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Issues the connect and hands the socket over to mio, even while the
/// handshake is still in flight.
fn connect_nonblocking(socket: Socket, addr: SocketAddr) -> io::Result<TcpStream> {
    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if connect_in_progress(&e) => {}
        Err(e) => return Err(e),
    }
    Ok(TcpStream::from_std(socket.into()))
}

fn connect_in_progress(e: &io::Error) -> bool {
    #[cfg(unix)]
    let in_progress = e.raw_os_error() == Some(libc::EINPROGRESS);
    #[cfg(not(unix))]
    let in_progress = false;
    in_progress || e.kind() == ErrorKind::WouldBlock
}

fn log_link_error(id: ConnectionId, addr: SocketAddr, e: &io::Error, what: &str) {
    match e.kind() {
        ErrorKind::BrokenPipe => warn!(id = id.0, %addr, "broken pipe"),
        ErrorKind::ConnectionReset => warn!(id = id.0, %addr, "connection reset"),
        _ => error!(id = id.0, %addr, ?e, "{}", what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Counters {
        setup: Cell<usize>,
        read: Cell<usize>,
        teardown: Cell<usize>,
    }

    struct CountingHandler(Rc<Counters>);

    impl ConnHandler for CountingHandler {
        fn on_setup(&self, _conn: &Conn) {
            self.0.setup.set(self.0.setup.get() + 1);
        }

        fn on_read(&self, _conn: &Conn) {
            self.0.read.set(self.0.read.get() + 1);
        }

        fn on_teardown(&self, _conn: &Conn) {
            self.0.teardown.set(self.0.teardown.get() + 1);
        }
    }

    fn standalone(
        event_loop: &EventLoop,
        mode: ConnMode,
        addr: SocketAddr,
        config: ConnPoolConfig,
    ) -> (Conn, Rc<Counters>) {
        let counters = Rc::new(Counters::default());
        let conn = Conn::new(
            ConnectionId(1),
            mode,
            addr,
            event_loop.clone(),
            Rc::new(config),
            Weak::new(),
            Rc::new(CountingHandler(counters.clone())),
        );
        (conn, counters)
    }

    fn accepted_stream() -> (TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(server), client)
    }

    #[test]
    fn test_self_ref_keeps_connection_alive() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let (conn, counters) = standalone(
            &event_loop,
            ConnMode::Active,
            listener.local_addr().unwrap(),
            ConnPoolConfig::default(),
        );
        conn.start_connect().unwrap();

        let weak = conn.downgrade();
        drop(conn);
        let conn = weak.upgrade().expect("self-reference must keep the connection alive");
        assert!(conn.holds_self_ref());

        conn.terminate();
        assert!(!conn.holds_self_ref());
        assert_eq!(counters.teardown.get(), 1);

        drop(conn);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let (stream, _client) = accepted_stream();
        let peer = stream.peer_addr().unwrap();
        let (conn, counters) = standalone(
            &event_loop,
            ConnMode::Passive,
            peer,
            ConnPoolConfig::default(),
        );
        conn.start_accept(stream).unwrap();
        assert!(conn.fd().is_some());

        conn.terminate();
        conn.terminate();

        assert_eq!(counters.teardown.get(), 1);
        assert!(conn.is_closed());
        assert!(conn.fd().is_none());
        assert!(!conn.has_pending_timer());
    }

    #[test]
    fn test_passive_setup_timeout_tears_down() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let (stream, _client) = accepted_stream();
        let peer = stream.peer_addr().unwrap();
        let (conn, counters) = standalone(
            &event_loop,
            ConnMode::Passive,
            peer,
            ConnPoolConfig::default(),
        );
        conn.start_accept(stream).unwrap();
        assert_eq!(conn.state(), ConnState::Accepting);
        assert!(conn.has_pending_timer());

        // the setup window expires before any readiness is processed
        conn.on_timer();

        assert!(conn.is_closed());
        assert_eq!(counters.setup.get(), 0);
        assert_eq!(counters.teardown.get(), 1);
    }

    #[test]
    fn test_passive_setup_cancels_timeout() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let (stream, _client) = accepted_stream();
        let peer = stream.peer_addr().unwrap();
        let (conn, counters) = standalone(
            &event_loop,
            ConnMode::Passive,
            peer,
            ConnPoolConfig::default(),
        );
        conn.start_accept(stream).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while counters.setup.get() == 0 && Instant::now() < deadline {
            event_loop.turn(Some(Duration::from_millis(10))).unwrap();
        }

        assert_eq!(counters.setup.get(), 1);
        assert_eq!(conn.state(), ConnState::Established);
        assert!(!conn.has_pending_timer());
        conn.terminate();
    }

    #[test]
    fn test_write_after_close_is_dropped() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let (stream, _client) = accepted_stream();
        let peer = stream.peer_addr().unwrap();
        let (conn, _) = standalone(
            &event_loop,
            ConnMode::Passive,
            peer,
            ConnPoolConfig::default(),
        );
        conn.start_accept(stream).unwrap();
        conn.terminate();

        conn.write(b"late".to_vec());
        assert_eq!(conn.pending_send(), 0);
    }

    #[test]
    fn test_peer_close_routes_to_teardown() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let (stream, client) = accepted_stream();
        let peer = stream.peer_addr().unwrap();
        let (conn, counters) = standalone(
            &event_loop,
            ConnMode::Passive,
            peer,
            ConnPoolConfig::default(),
        );
        conn.start_accept(stream).unwrap();
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(2);
        while counters.teardown.get() == 0 && Instant::now() < deadline {
            event_loop.turn(Some(Duration::from_millis(10))).unwrap();
        }
        assert_eq!(counters.teardown.get(), 1);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_move_send_buffer() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let (old, _) = standalone(&event_loop, ConnMode::Active, addr, ConnPoolConfig::default());
        let (new, _) = standalone(&event_loop, ConnMode::Active, addr, ConnPoolConfig::default());

        old.write(b"queued".to_vec());
        new.move_send_buffer(&old);

        assert_eq!(old.pending_send(), 0);
        assert_eq!(new.pending_send(), 6);
        old.terminate();
        new.terminate();
    }

    #[test]
    fn test_reads_split_into_bounded_segments() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let (stream, mut client) = accepted_stream();
        let peer = stream.peer_addr().unwrap();
        let (conn, counters) = standalone(
            &event_loop,
            ConnMode::Passive,
            peer,
            ConnPoolConfig::builder().seg_buff_size(4).build(),
        );
        conn.start_accept(stream).unwrap();
        client.write_all(b"0123456789").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while conn.read().size() < 10 && Instant::now() < deadline {
            event_loop.turn(Some(Duration::from_millis(10))).unwrap();
        }

        assert!(counters.read.get() >= 1);
        let mut buf = conn.read();
        assert_eq!(buf.segments(), 3);
        assert_eq!(buf.pop(10), b"0123456789".to_vec());
        drop(buf);
        conn.terminate();
    }

    #[test]
    fn test_attempt_counter_saturates() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let (conn, _) = standalone(&event_loop, ConnMode::Active, addr, ConnPoolConfig::default());
        conn.0.core.borrow_mut().attempts = u32::MAX;

        conn.try_conn();

        assert_eq!(conn.connect_attempts(), u32::MAX);
        assert_eq!(conn.state(), ConnState::Connecting);
        conn.terminate();
    }

    #[test]
    fn test_display() {
        let event_loop = EventLoop::new(64, 10).unwrap();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let (conn, _) = standalone(&event_loop, ConnMode::Active, addr, ConnPoolConfig::default());
        assert_eq!(
            conn.to_string(),
            "<Conn id=1 fd=-1 addr=127.0.0.1:9 mode=active>"
        );
        conn.terminate();
    }
}
