use sockprims_datagram::{fragment_count, DatagramEndpoint};
use sockprims_transport::bind_udp;

use crate::cmd::{resolve_payload, DgramSendArgs};
use crate::exit::{datagram_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: DgramSendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(args.data.as_deref(), args.file.as_deref())?;

    let socket = bind_udp(args.bind).map_err(|err| transport_error("bind failed", err))?;
    let endpoint = DatagramEndpoint::sender(socket, args.target)
        .map_err(|err| datagram_error("endpoint setup failed", err))?;
    let id = endpoint
        .send(&payload)
        .map_err(|err| datagram_error("send failed", err))?;

    let id = id.to_string();
    print_sent(
        "datagram",
        args.target,
        payload.len(),
        Some((&id, fragment_count(payload.len()))),
        format,
    );
    Ok(SUCCESS)
}
