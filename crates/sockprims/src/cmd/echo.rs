use std::thread;

use sockprims_mux::{MuxConfig, MuxContext, MuxHandler, Multiplexer};
use sockprims_transport::{ConnectionId, StopSignal, ThreadRunner};
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, EchoArgs, POLL_INTERVAL};
use crate::exit::{mux_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_listening, OutputFormat};

struct EchoHandler;

impl MuxHandler for EchoHandler {
    fn on_accept(&self, ctx: &MuxContext, id: ConnectionId) {
        match ctx.peer_addr(id) {
            Some(peer) => info!(%id, %peer, "client connected"),
            None => info!(%id, "client connected"),
        }
    }

    fn on_receive(&self, ctx: &MuxContext, id: ConnectionId, data: &[u8]) {
        debug!(%id, size = data.len(), "echoing");
        ctx.send(id, data);
    }

    fn on_close(&self, _ctx: &MuxContext, id: ConnectionId) {
        info!(%id, "client disconnected");
    }
}

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let stop = StopSignal::new();
    install_ctrlc_handler(stop.clone())?;

    let config = MuxConfig {
        chunk_size: args.chunk_size,
        ..MuxConfig::default()
    };
    let runner = ThreadRunner::new("echo");
    let mux = Multiplexer::server(args.addr, EchoHandler, &runner, config)
        .map_err(|err| mux_error("bind failed", err))?;
    print_listening("echo", mux.local_addr(), format);

    while !stop.is_stopped() && mux.is_running() {
        thread::sleep(POLL_INTERVAL);
    }

    if !mux.is_running() {
        return Err(CliError::new(TRANSPORT_ERROR, "event loop exited unexpectedly"));
    }
    mux.stop();
    Ok(SUCCESS)
}
