//! TCP connection pool built on the single-threaded event loop.
//!
//! The pool owns an optional listening socket and a registry of every live
//! connection, keyed by [`ConnectionId`]:
//!
//! ```text
//! Connection Registry:
//!   HashMap<ConnectionId, Conn>
//!        │
//!        ├──> ConnId(1) ──> Conn { mode: Active,  state: Connecting, .. }
//!        ├──> ConnId(2) ──> Conn { mode: Passive, state: Established, .. }
//!        └──> ConnId(N) ──> Conn { .. }
//! ```
//!
//! ## Event Handling Pipeline
//!
//! ```text
//! 1. Listener readiness:
//!    accept() until WouldBlock
//!        - factory.create_conn(Passive, peer)
//!        - Conn registers READABLE | WRITABLE, arms the setup timeout
//!        - insert into registry
//!
//! 2. create_conn(addr):
//!        - factory.create_conn(Active, addr)
//!        - insert into registry, start non-blocking connect
//!        - failure ──> jittered retry timer ──> connect again
//!
//! 3. Connection readiness:
//!    Readable ──> drain socket into recv buffer ──> on_read()
//!    Writable ──> flush send buffer until WouldBlock
//!    EOF/error ──> terminate()
//!
//! 4. terminate():
//!        - cancel registrations, close socket, on_teardown()
//!        - remove from registry, drop the self-reference
//! ```
//!
//! Only the connection removes itself from the registry. Dropping the pool
//! force-closes every remaining connection without running teardown hooks.
//!
//! ## Handler Implementation
//!
//! ```rust,no_run
//! use mill_pool::net::tcp::{Conn, ConnHandler, ConnMode, ConnPool, ConnPoolConfig};
//! use mill_pool::EventLoop;
//! use std::net::SocketAddr;
//!
//! struct Echo;
//!
//! impl ConnHandler for Echo {
//!     fn on_read(&self, conn: &Conn) {
//!         let data = {
//!             let mut buf = conn.read();
//!             let len = buf.size();
//!             buf.pop(len)
//!         };
//!         conn.write(data);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let event_loop = EventLoop::default();
//! let pool = ConnPool::new(&event_loop, ConnPoolConfig::default(), |_: ConnMode, _: SocketAddr| Echo);
//! pool.listen("127.0.0.1:12345".parse()?)?;
//! event_loop.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod conn;
pub mod traits;

pub use config::{ConnPoolConfig, ConnPoolConfigBuilder};
pub use conn::{Conn, WeakConn};
pub use traits::{ConnFactory, ConnHandler, ConnMode, ConnState, ConnectionId};

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    rc::Rc,
};

use mio::{net::TcpListener, Interest, Token};
use tracing::{error, info, warn};

use crate::{
    event::Event,
    net::errors::{NetworkError, Result},
    EventLoop,
};

struct Listener {
    socket: TcpListener,
    token: Token,
    local_addr: SocketAddr,
}

/// State shared between the pool, its accept handler and its connections.
pub(crate) struct PoolShared {
    event_loop: EventLoop,
    config: Rc<ConnPoolConfig>,
    registry: RefCell<HashMap<ConnectionId, Conn>>,
    listener: RefCell<Option<Listener>>,
    next_conn_id: Cell<u64>,
}

impl PoolShared {
    fn next_id(&self) -> ConnectionId {
        let id = self.next_conn_id.get();
        self.next_conn_id.set(id + 1);
        ConnectionId(id)
    }

    fn insert(&self, conn: Conn) {
        self.registry.borrow_mut().insert(conn.id(), conn);
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Conn> {
        self.registry.borrow_mut().remove(&id)
    }
}

/// Pool of active and passive connections sharing one event loop.
///
/// The pool is deliberately not `Clone`: it is the only owner of its listener
/// registration. Its state lives behind an `Rc`, so moving a `ConnPool` value
/// never relocates anything the reactor refers to.
pub struct ConnPool<F: ConnFactory> {
    shared: Rc<PoolShared>,
    factory: Rc<F>,
}

impl<F: ConnFactory> ConnPool<F> {
    pub fn new(event_loop: &EventLoop, config: ConnPoolConfig, factory: F) -> Self {
        Self {
            shared: Rc::new(PoolShared {
                event_loop: event_loop.clone(),
                config: Rc::new(config),
                registry: RefCell::new(HashMap::new()),
                listener: RefCell::new(None),
                next_conn_id: Cell::new(1),
            }),
            factory: Rc::new(factory),
        }
    }

    /// Binds `addr`, starts listening and begins accepting on the event loop.
    ///
    /// Returns the bound local address, which differs from `addr` when port 0
    /// was requested.
    pub fn listen(&self, addr: SocketAddr) -> Result<SocketAddr> {
        if let Some(listener) = self.shared.listener.borrow().as_ref() {
            return Err(NetworkError::AlreadyListening(listener.local_addr));
        }

        let socket = conn::new_socket(addr).map_err(NetworkError::Socket)?;
        socket
            .set_reuse_address(true)
            .map_err(NetworkError::Socket)?;
        socket
            .bind(&addr.into())
            .map_err(|e| NetworkError::Bind(addr, e))?;
        let backlog = i32::try_from(self.shared.config.max_listen_backlog).unwrap_or(i32::MAX);
        socket
            .listen(backlog)
            .map_err(|e| NetworkError::Listen(addr, e))?;
        let mut socket = TcpListener::from_std(socket.into());
        let local_addr = socket.local_addr()?;

        let weak = Rc::downgrade(&self.shared);
        let factory = self.factory.clone();
        let token = self.shared.event_loop.register(
            &mut socket,
            Interest::READABLE,
            move |_: &Event| {
                if let Some(shared) = weak.upgrade() {
                    accept_clients(&shared, &*factory);
                }
            },
        )?;

        *self.shared.listener.borrow_mut() = Some(Listener {
            socket,
            token,
            local_addr,
        });
        info!(
            %local_addr,
            backlog = self.shared.config.max_listen_backlog,
            "listening for connections"
        );
        Ok(local_addr)
    }

    /// Creates an active connection to `addr`.
    ///
    /// The handle is registered and returned immediately, while the connect
    /// is still in flight; writes issued before it completes are buffered.
    /// Refused or failed connects are retried per the pool's retry policy and
    /// never reported here.
    pub fn create_conn(&self, addr: SocketAddr) -> Result<Conn> {
        let handler = self.factory.create_conn(ConnMode::Active, addr);
        let conn = Conn::new(
            self.shared.next_id(),
            ConnMode::Active,
            addr,
            self.shared.event_loop.clone(),
            self.shared.config.clone(),
            Rc::downgrade(&self.shared),
            Rc::new(handler),
        );
        self.shared.insert(conn.clone());

        if let Err(e) = conn.start_connect() {
            self.shared.remove(conn.id());
            conn.close();
            return Err(e);
        }
        info!(id = conn.id().0, %addr, "created active connection");
        Ok(conn)
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.borrow().len()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Conn> {
        self.shared.registry.borrow().get(&id).cloned()
    }

    /// Snapshot of every live connection.
    pub fn connections(&self) -> Vec<Conn> {
        self.shared.registry.borrow().values().cloned().collect()
    }

    /// Address of the listening socket, once `listen` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared
            .listener
            .borrow()
            .as_ref()
            .map(|listener| listener.local_addr)
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.shared.event_loop
    }

    pub fn config(&self) -> &ConnPoolConfig {
        &self.shared.config
    }
}

impl<F: ConnFactory> Drop for ConnPool<F> {
    fn drop(&mut self) {
        let listener = self.shared.listener.borrow_mut().take();
        if let Some(mut listener) = listener {
            let _ = self
                .shared
                .event_loop
                .deregister(&mut listener.socket, listener.token);
        }

        let conns: Vec<Conn> = self
            .shared
            .registry
            .borrow_mut()
            .drain()
            .map(|(_, conn)| conn)
            .collect();
        for conn in conns {
            conn.close();
        }
    }
}

/// Accepts every pending connection on the pool's listener.
fn accept_clients<F: ConnFactory>(shared: &Rc<PoolShared>, factory: &F) {
    loop {
        let accepted = {
            let listener = shared.listener.borrow();
            let Some(listener) = listener.as_ref() else {
                return;
            };
            listener.socket.accept()
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                if let Some(max) = shared.config.max_connections {
                    if shared.registry.borrow().len() >= max {
                        warn!(%peer_addr, "Max connections reached, rejecting");
                        continue;
                    }
                }
                if let Err(e) = stream.set_nodelay(shared.config.no_delay) {
                    warn!(%peer_addr, ?e, "Failed to set TCP_NODELAY");
                }

                let handler = factory.create_conn(ConnMode::Passive, peer_addr);
                let conn = Conn::new(
                    shared.next_id(),
                    ConnMode::Passive,
                    peer_addr,
                    shared.event_loop.clone(),
                    shared.config.clone(),
                    Rc::downgrade(shared),
                    Rc::new(handler),
                );
                if let Err(e) = conn.start_accept(stream) {
                    error!(%peer_addr, ?e, "Failed to register connection");
                    conn.close();
                    continue;
                }
                info!(id = conn.id().0, %peer_addr, "accepted connection");
                shared.insert(conn);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
                ) =>
            {
                warn!(?e, "Transient accept error");
                continue;
            }
            Err(e) => {
                error!(?e, "Error accepting connection");
                break;
            }
        }
    }
}
