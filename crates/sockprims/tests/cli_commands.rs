#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use std::time::Duration;

fn sockprims() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sockprims"));
    cmd.arg("--log-level").arg("error").arg("--format").arg("json");
    cmd
}

/// Spawn a long-running subcommand and return it with the address from its
/// `listening` line.
fn spawn_listening(args: &[&str]) -> (Child, BufReader<ChildStdout>, SocketAddr) {
    let mut child = sockprims()
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("command should start");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout should be piped"));

    let mut line = String::new();
    stdout
        .read_line(&mut line)
        .expect("listening line should be readable");
    let event: serde_json::Value =
        serde_json::from_str(&line).expect("listening line should be json");
    assert_eq!(event["event"], "listening");
    let addr = event["addr"]
        .as_str()
        .expect("addr should be a string")
        .parse()
        .expect("addr should parse");
    (child, stdout, addr)
}

fn next_event(stdout: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    stdout.read_line(&mut line).expect("event line should be readable");
    serde_json::from_str(&line).expect("event line should be json")
}

fn run(args: &[&str]) -> Output {
    sockprims().args(args).output().expect("command should run")
}

#[test]
fn version_prints_package_version() {
    let output = run(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("sockprims {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn echo_server_returns_bytes() {
    let (mut child, _stdout, addr) = spawn_listening(&["echo", "127.0.0.1:0"]);

    let mut stream = TcpStream::connect(addr).expect("client should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout should apply");
    stream.write_all(b"ping").expect("write should succeed");
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).expect("echo should arrive");
    assert_eq!(&reply, b"ping");

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn send_delivers_frame_to_listen() {
    let (mut child, mut stdout, addr) =
        spawn_listening(&["listen", "127.0.0.1:0", "--count", "1"]);

    let output = run(&["send", &addr.to_string(), "--data", "hello"]);
    assert!(output.status.success(), "send failed: {output:?}");

    let event = next_event(&mut stdout);
    assert_eq!(event["event"], "received");
    assert_eq!(event["kind"], "frame");
    assert_eq!(event["payload"], "hello");
    assert_eq!(event["payload_size"], 5);

    let status = child.wait().expect("listen should exit after --count");
    assert!(status.success());
}

// Other platforms cap UDP datagrams below one packet by default.
#[test]
#[cfg(target_os = "linux")]
fn dgram_send_delivers_large_message() {
    let (mut child, mut stdout, addr) =
        spawn_listening(&["dgram-listen", "127.0.0.1:0", "--count", "1"]);

    let payload = "x".repeat(70_000);
    let output = run(&[
        "dgram-send",
        &addr.to_string(),
        "--bind",
        "127.0.0.1:0",
        "--data",
        &payload,
    ]);
    assert!(output.status.success(), "dgram-send failed: {output:?}");
    let sent: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("sent line should be json");
    assert_eq!(sent["fragments"], 3);

    let event = next_event(&mut stdout);
    assert_eq!(event["kind"], "datagram");
    assert_eq!(event["payload_size"], 70_000);
    assert_eq!(event["message_id"], sent["message_id"]);

    let status = child.wait().expect("dgram-listen should exit after --count");
    assert!(status.success());
}

#[test]
fn send_to_closed_port_fails() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        listener.local_addr().expect("listener has addr")
    };
    let output = run(&["send", &addr.to_string(), "--data", "x"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn invalid_wait_timeout_is_usage_error() {
    let output = run(&["send", "127.0.0.1:1", "--wait-timeout", "0s"]);
    assert_eq!(output.status.code(), Some(64));
}
