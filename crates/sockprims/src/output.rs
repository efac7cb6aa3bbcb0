use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One delivered message, from any strategy.
pub struct Received<'a> {
    /// `frame` for stream messages, `datagram` for reassembled ones.
    pub kind: &'static str,
    /// Remote address for stream messages. Reassembled datagrams have none.
    pub peer: Option<&'a str>,
    /// Datagram message id.
    pub message_id: Option<&'a str>,
    pub payload: &'a [u8],
}

#[derive(Serialize)]
struct ReceivedOutput<'a> {
    event: &'static str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    mode: &'a str,
    addr: String,
}

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'static str,
    kind: &'static str,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    payload_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fragments: Option<usize>,
}

pub fn print_received(msg: &Received<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReceivedOutput {
                event: "received",
                kind: msg.kind,
                peer: msg.peer,
                message_id: msg.message_id,
                payload_size: msg.payload.len(),
                payload: payload_preview(msg.payload),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "PEER", "ID", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    msg.kind.to_string(),
                    msg.peer.unwrap_or("-").to_string(),
                    msg.message_id.unwrap_or("-").to_string(),
                    msg.payload.len().to_string(),
                    payload_preview(msg.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = msg.kind.to_string();
            if let Some(peer) = msg.peer {
                line.push_str(&format!(" peer={peer}"));
            }
            if let Some(id) = msg.message_id {
                line.push_str(&format!(" id={id}"));
            }
            println!(
                "{line} size={} payload={}",
                msg.payload.len(),
                payload_preview(msg.payload)
            );
        }
        OutputFormat::Raw => print_raw(msg.payload),
    }
}

/// Announce the bound address. Always a single line so scripts can read
/// the port picked for `:0`.
pub fn print_listening(mode: &str, addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            mode,
            addr: addr.to_string(),
        }),
        OutputFormat::Raw => {}
        OutputFormat::Table | OutputFormat::Pretty => println!("{mode} listening on {addr}"),
    }
}

pub fn print_sent(
    kind: &'static str,
    target: SocketAddr,
    payload_size: usize,
    datagram: Option<(&str, usize)>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&SentOutput {
            event: "sent",
            kind,
            target: target.to_string(),
            message_id: datagram.map(|(id, _)| id),
            payload_size,
            fragments: datagram.map(|(_, n)| n),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "TARGET", "ID", "SIZE", "FRAGMENTS"])
                .add_row(vec![
                    kind.to_string(),
                    target.to_string(),
                    datagram.map_or("-".to_string(), |(id, _)| id.to_string()),
                    payload_size.to_string(),
                    datagram.map_or("-".to_string(), |(_, n)| n.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{kind} sent to {target} size={payload_size}"),
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
