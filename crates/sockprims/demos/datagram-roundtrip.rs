//! Send a message larger than one UDP packet and reassemble it.
//!
//! Run with:
//!   cargo run -p sockprims --example datagram-roundtrip

use std::thread;
use std::time::Duration;

use sockprims::datagram::{fragment_count, DatagramConfig, DatagramEndpoint};
use sockprims::transport::{bind_udp, StopSignal};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut receiver =
        DatagramEndpoint::receiver(bind_udp("127.0.0.1:0".parse()?)?, DatagramConfig::default())?;
    let target = receiver.local_addr()?;

    let stop = StopSignal::new();
    let stopper = receiver.stopper(&stop)?;
    let loop_stop = stop.clone();
    let handle = thread::spawn(move || {
        receiver.receive(&loop_stop, |id, payload| {
            eprintln!("reassembled {id}: {} bytes", payload.len());
            loop_stop.stop();
        })
    });

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();
    let sender = DatagramEndpoint::sender(bind_udp("127.0.0.1:0".parse()?)?, target)?;
    let id = sender.send(&payload)?;
    eprintln!(
        "sent {id}: {} bytes in {} fragments",
        payload.len(),
        fragment_count(payload.len())
    );

    thread::sleep(Duration::from_secs(2));
    stopper.stop();
    handle.join().map_err(|_| "receive thread panicked")??;
    Ok(())
}
