//! Networking on top of the Mill-Pool event loop.
//!
//! No async/await: the reactor calls back into a connection when its socket is
//! ready, and the connection calls back into your [`ConnHandler`](tcp::ConnHandler).
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Application                       │
//! │  ┌──────────────┐          ┌─────────────────┐              │
//! │  │  ConnPool    │────────▶│ Your Handler    │              │
//! │  │ (+ factory)  │          │ (ConnHandler)   │              │
//! │  └──────────────┘          └─────────────────┘              │
//! └────────────┬──────────────────────┬─────────────────────────┘
//!              │                      │ Callbacks
//!              │ Register             │ (on_setup, on_read, on_teardown)
//!              ▼                      │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Mill-Pool EventLoop                     │
//! │  ┌──────────┐       ┌──────────┐       ┌──────────────┐     │
//! │  │ Reactor  │─────▶│ Handlers │       │ Timer queue  │     │
//! │  │ (Poll)   │       │ Registry │       │              │     │
//! │  └──────────┘       └──────────┘       └──────────────┘     │
//! └────────────┬────────────────────────────────────────────────┘
//!              │ OS Events
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Operating System (epoll/kqueue/IOCP)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mill_pool::net::tcp::{Conn, ConnHandler, ConnMode, ConnPool, ConnPoolConfig};
//! use mill_pool::EventLoop;
//! use std::net::SocketAddr;
//! use std::time::Duration;
//!
//! struct Printer;
//!
//! impl ConnHandler for Printer {
//!     fn on_setup(&self, conn: &Conn) {
//!         conn.write(b"hello".to_vec());
//!     }
//!
//!     fn on_read(&self, conn: &Conn) {
//!         let mut buf = conn.read();
//!         let len = buf.size();
//!         println!("{} sent {:?}", conn, buf.pop(len));
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnPoolConfig::builder()
//!     .retry_delay(Duration::from_millis(500))
//!     .seg_buff_size(8192)
//!     .build();
//!
//! let event_loop = EventLoop::default();
//! let pool = ConnPool::new(&event_loop, config, |_: ConnMode, _: SocketAddr| Printer);
//! pool.create_conn("127.0.0.1:8080".parse()?)?;
//! event_loop.run()?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod tcp;
