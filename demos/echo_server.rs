use std::net::SocketAddr;

use anyhow::Context;
use mill_pool::net::tcp::{Conn, ConnHandler, ConnMode, ConnPool, ConnPoolConfig};
use mill_pool::EventLoop;
use tracing::info;

/// echoes every byte back to whoever sent it.
struct EchoHandler;

impl ConnHandler for EchoHandler {
    fn on_setup(&self, conn: &Conn) {
        info!("client connected: {}", conn);
    }

    fn on_read(&self, conn: &Conn) {
        let data = {
            let mut buf = conn.read();
            let len = buf.size();
            buf.pop(len)
        };
        info!(
            "received {} bytes from {}: {}",
            data.len(),
            conn.addr(),
            String::from_utf8_lossy(&data).trim_end()
        );
        conn.write(data);
    }

    fn on_teardown(&self, conn: &Conn) {
        info!("client disconnected: {}", conn);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .context("invalid listen address")?;

    let event_loop = EventLoop::default();
    let config = ConnPoolConfig::builder()
        .max_listen_backlog(128)
        .max_connections(1024)
        .build();

    let pool = ConnPool::new(&event_loop, config, |_: ConnMode, _: SocketAddr| EchoHandler);
    let bound = pool.listen(addr)?;
    info!("echo server listening on {}", bound);

    // blocks until the process is killed
    event_loop.run()?;
    Ok(())
}
