//! Multiplexed echo server: one event loop serves every client.
//!
//! Run with:
//!   cargo run -p sockprims --example mux-echo
//!
//! In another terminal:
//!   nc 127.0.0.1 7070

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use sockprims::mux::{MuxConfig, MuxContext, MuxHandler, Multiplexer};
use sockprims::transport::{ConnectionId, ThreadRunner};

struct Echo {
    bytes: AtomicUsize,
    done: mpsc::Sender<()>,
}

impl MuxHandler for Echo {
    fn on_accept(&self, ctx: &MuxContext, id: ConnectionId) {
        eprintln!("{id} connected from {:?}", ctx.peer_addr(id));
    }

    fn on_receive(&self, ctx: &MuxContext, id: ConnectionId, data: &[u8]) {
        self.bytes.fetch_add(data.len(), Ordering::Relaxed);
        if data.starts_with(b"quit") {
            ctx.stop();
            let _ = self.done.send(());
            return;
        }
        ctx.send(id, data);
    }

    fn on_close(&self, _ctx: &MuxContext, id: ConnectionId) {
        eprintln!(
            "{id} closed, {} bytes echoed so far",
            self.bytes.load(Ordering::Relaxed)
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (done, finished) = mpsc::channel();
    let handler = Echo {
        bytes: AtomicUsize::new(0),
        done,
    };

    let runner = ThreadRunner::new("mux-echo");
    let mux = Multiplexer::server(
        "127.0.0.1:7070".parse()?,
        handler,
        &runner,
        MuxConfig::default(),
    )?;
    eprintln!("Listening on {} (send \"quit\" to stop)", mux.local_addr());

    finished.recv()?;
    Ok(())
}
