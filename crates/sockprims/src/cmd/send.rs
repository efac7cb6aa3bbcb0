use std::sync::mpsc::{self, RecvTimeoutError};

use sockprims_peer::FramedClient;
use sockprims_transport::ThreadRunner;

use crate::cmd::{parse_duration, resolve_payload, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_received, print_sent, OutputFormat, Received};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(args.data.as_deref(), args.file.as_deref())?;

    let client =
        FramedClient::connect(args.addr).map_err(|err| peer_error("connect failed", err))?;

    let (tx, rx) = mpsc::channel();
    if args.wait {
        client
            .receive(&ThreadRunner::new("send"), move |reply| {
                let _ = tx.send(reply);
            })
            .map_err(|err| peer_error("receive failed", err))?;
    }

    client
        .send(&payload)
        .map_err(|err| peer_error("send failed", err))?;

    if !args.wait {
        print_sent("frame", args.addr, payload.len(), None, format);
        client.close();
        return Ok(SUCCESS);
    }

    let reply = rx.recv_timeout(wait_timeout).map_err(|err| match err {
        RecvTimeoutError::Timeout => CliError::new(
            TIMEOUT,
            format!("no response within {}", args.wait_timeout),
        ),
        RecvTimeoutError::Disconnected => {
            CliError::new(FAILURE, "connection closed before a response arrived")
        }
    })?;
    let peer = args.addr.to_string();
    print_received(
        &Received {
            kind: "frame",
            peer: Some(&peer),
            message_id: None,
            payload: &reply,
        },
        format,
    );
    client.close();
    Ok(SUCCESS)
}
