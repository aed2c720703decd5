use std::{cell::Cell, net::SocketAddr, rc::Rc, time::Duration};

use anyhow::Context;
use mill_pool::net::tcp::{Conn, ConnHandler, ConnMode, ConnPool, ConnPoolConfig};
use mill_pool::{Event, EventLoop, StopHandle};
use tracing::{info, warn};

const ROUNDS: usize = 5;

/// Sends a greeting once connected and counts the echoes that come back.
struct Greeter {
    echoes: Rc<Cell<usize>>,
    stop: StopHandle,
}

impl ConnHandler for Greeter {
    fn on_setup(&self, conn: &Conn) {
        info!("connected: {}", conn);
        conn.write(b"hello from mill-pool\n".to_vec());
    }

    fn on_read(&self, conn: &Conn) {
        let reply = {
            let mut buf = conn.read();
            let len = buf.size();
            buf.pop(len)
        };
        let n = self.echoes.get() + 1;
        self.echoes.set(n);
        info!("echo #{}: {}", n, String::from_utf8_lossy(&reply).trim_end());

        if n >= ROUNDS {
            conn.terminate();
            self.stop.stop();
        }
    }

    fn on_teardown(&self, conn: &Conn) {
        warn!("link down: {} after {} attempts", conn, conn.connect_attempts());
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .context("invalid server address")?;

    let event_loop = EventLoop::default();
    let config = ConnPoolConfig::builder()
        .retry_delay(Duration::from_millis(500))
        .retry_jitter(0.5)
        .connect_timeout(Duration::from_secs(1))
        .build();

    let echoes = Rc::new(Cell::new(0));
    let stop = event_loop.stop_handle();
    let counter = echoes.clone();
    let pool = ConnPool::new(&event_loop, config, move |_: ConnMode, _: SocketAddr| Greeter {
        echoes: counter.clone(),
        stop: stop.clone(),
    });

    // keeps retrying with backoff until the server shows up
    let conn = pool.create_conn(addr)?;
    info!("dialing {}", conn);

    schedule_ping(&event_loop, conn.downgrade(), 1);

    event_loop.run()?;
    info!("done after {} echoes", echoes.get());
    Ok(())
}

/// Sends one more line every second over the same link.
fn schedule_ping(event_loop: &EventLoop, conn: mill_pool::net::tcp::WeakConn, seq: usize) {
    let next_loop = event_loop.clone();
    event_loop.add_timer(Duration::from_secs(1), move |_: &Event| {
        let Some(link) = conn.upgrade() else {
            return;
        };
        if link.is_closed() {
            return;
        }
        link.write(format!("ping {}\n", seq).into_bytes());
        schedule_ping(&next_loop, conn.clone(), seq + 1);
    });
}
