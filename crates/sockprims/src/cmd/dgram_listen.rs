use sockprims_datagram::{DatagramConfig, DatagramEndpoint, ReassemblyConfig};
use sockprims_transport::{bind_udp, StopSignal};

use crate::cmd::{install_ctrlc_handler, parse_duration, DgramListenArgs, POLL_INTERVAL};
use crate::exit::{datagram_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_listening, print_received, OutputFormat, Received};

pub fn run(args: DgramListenArgs, format: OutputFormat) -> CliResult<i32> {
    let message_ttl = args.message_ttl.as_deref().map(parse_duration).transpose()?;

    let stop = StopSignal::new();
    install_ctrlc_handler(stop.clone())?;

    let config = DatagramConfig {
        read_timeout: Some(POLL_INTERVAL),
        reassembly: ReassemblyConfig {
            max_pending_messages: args.max_pending,
            message_ttl,
            ..ReassemblyConfig::default()
        },
    };
    let socket = bind_udp(args.addr).map_err(|err| transport_error("bind failed", err))?;
    let mut endpoint = DatagramEndpoint::receiver(socket, config)
        .map_err(|err| datagram_error("endpoint setup failed", err))?;
    let local = endpoint
        .local_addr()
        .map_err(|err| datagram_error("endpoint setup failed", err))?;
    print_listening("dgram-listen", local, format);

    let mut printed = 0usize;
    endpoint
        .receive(&stop, |id, payload| {
            let id = id.to_string();
            print_received(
                &Received {
                    kind: "datagram",
                    peer: None,
                    message_id: Some(&id),
                    payload: &payload,
                },
                format,
            );
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                stop.stop();
            }
        })
        .map_err(|err| datagram_error("receive failed", err))?;

    Ok(SUCCESS)
}
