use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use sockprims_peer::FramedServer;
use sockprims_transport::{StopSignal, ThreadRunner};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, ListenArgs, POLL_INTERVAL};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_listening, print_received, OutputFormat, Received};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let stop = StopSignal::new();
    install_ctrlc_handler(stop.clone())?;

    let server = Arc::new(
        FramedServer::bind(args.addr, Arc::new(ThreadRunner::new("listen")))
            .map_err(|err| peer_error("bind failed", err))?,
    );

    let (tx, rx) = mpsc::channel();
    let handle = Arc::downgrade(&server);
    server
        .accept(move |id| {
            let Some(server) = handle.upgrade() else {
                return;
            };
            let tx = tx.clone();
            let installed = server.set_receiver(id, move |payload| {
                let _ = tx.send((id, payload));
            });
            match installed {
                Ok(()) => info!(%id, "client connected"),
                Err(err) => warn!(%id, error = %err, "client gone before receiver was set"),
            }
        })
        .map_err(|err| peer_error("accept failed", err))?;
    print_listening("listen", server.local_addr(), format);

    let mut printed = 0usize;
    while !stop.is_stopped() {
        let (id, payload) = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let peer = server
            .peer_addr(id)
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| id.to_string());
        print_received(
            &Received {
                kind: "frame",
                peer: Some(&peer),
                message_id: None,
                payload: &payload,
            },
            format,
        );
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    server.stop();
    Ok(SUCCESS)
}
