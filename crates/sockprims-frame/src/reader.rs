use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use sockprims_transport::StopSignal;
use tracing::debug;

use crate::codec::{decode_length, FrameConfig, HEADER_SIZE, READ_CHUNK_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Payloads land in one reusable buffer that grows to the largest frame seen
/// and never shrinks, so a payload borrow is only valid until the next read.
pub struct FrameReader<T> {
    inner: T,
    buf: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a
    /// frame boundary.
    pub fn read_frame(&mut self) -> Result<&[u8]> {
        match self.next_frame()? {
            Some(len) => Ok(&self.buf[..len]),
            None => Err(FrameError::ConnectionClosed),
        }
    }

    /// Deliver frames to `callback` until `stop` is signalled or the stream
    /// closes cleanly.
    ///
    /// The callback runs synchronously on this thread and receives the
    /// payload together with its length. The stop signal is checked between
    /// frames only.
    pub fn receive<F>(&mut self, stop: &StopSignal, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], usize),
    {
        while !stop.is_stopped() {
            match self.next_frame()? {
                Some(len) => callback(&self.buf[..len], len),
                None => {
                    debug!("stream closed on frame boundary");
                    return Ok(());
                }
            }
        }
        debug!("frame receive loop stopped");
        Ok(())
    }

    /// Read one frame into the buffer, returning its length, or `None` on a
    /// clean EOF before the first prefix byte.
    fn next_frame(&mut self) -> Result<Option<usize>> {
        let mut prefix = [0u8; HEADER_SIZE];
        let got = read_full(&mut self.inner, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: got,
            });
        }

        let len = decode_length(prefix) as usize;
        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }

        let mut filled = 0usize;
        while filled < len {
            let end = (filled + READ_CHUNK_SIZE).min(len);
            let got = read_full(&mut self.inner, &mut self.buf[filled..end])?;
            filled += got;
            if filled < end {
                return Err(FrameError::Truncated {
                    expected: len,
                    received: filled,
                });
            }
        }

        Ok(Some(len))
    }

    /// Size of the reusable payload buffer.
    pub fn buffer_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<TcpStream> {
    /// Create a frame reader for a `TcpStream` and apply read timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

/// Fill `dst` from `src`, stopping early only at EOF. Returns bytes read.
fn read_full<R: Read>(src: &mut R, dst: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < dst.len() {
        match src.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};
    use proptest::prelude::*;

    use super::*;
    use crate::codec::encode_frame;
    use crate::writer::FrameWriter;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        assert_eq!(reader.read_frame().unwrap(), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(reader.read_frame().unwrap(), b"one");
        assert_eq!(reader.read_frame().unwrap(), b"two");
        assert_eq!(reader.read_frame().unwrap(), b"three");
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024 + 17];
        let mut reader = FrameReader::new(Cursor::new(wire(&[&payload])));
        assert_eq!(reader.read_frame().unwrap(), payload.as_slice());
    }

    #[test]
    fn receive_invokes_callback_with_length() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        let mut calls = Vec::new();
        reader
            .receive(&StopSignal::new(), |payload, len| {
                calls.push((payload.to_vec(), len));
            })
            .unwrap();

        assert_eq!(calls, vec![(b"hello".to_vec(), 5)]);
    }

    #[test]
    fn receive_delivers_empty_payload() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"", b"x"])));
        let mut lens = Vec::new();
        reader
            .receive(&StopSignal::new(), |_, len| lens.push(len))
            .unwrap();
        assert_eq!(lens, vec![0, 1]);
    }

    #[test]
    fn receive_honours_stop_between_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"a", b"b", b"c"])));
        let stop = StopSignal::new();
        let mut seen = 0;
        reader
            .receive(&stop, |_, _| {
                seen += 1;
                stop.stop();
            })
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn buffer_grows_but_never_shrinks() {
        let big = vec![1u8; 4096];
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"tiny", &big, b"small"])));

        reader.read_frame().unwrap();
        assert_eq!(reader.buffer_len(), 4);
        reader.read_frame().unwrap();
        assert_eq!(reader.buffer_len(), 4096);
        assert_eq!(reader.read_frame().unwrap(), b"small");
        assert_eq!(reader.buffer_len(), 4096);
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[b"slow", &[7u8; 2000]]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_frame().unwrap(), b"slow");
        assert_eq!(reader.read_frame().unwrap(), &[7u8; 2000][..]);
    }

    #[test]
    fn payload_reads_are_bounded_by_chunk_size() {
        let payload = vec![3u8; 5000];
        let mut reader = FrameReader::new(RecordingReader {
            bytes: wire(&[&payload]),
            pos: 0,
            requests: Vec::new(),
        });
        reader.read_frame().unwrap();

        let requests = &reader.get_ref().requests;
        assert_eq!(requests[0], HEADER_SIZE);
        assert!(requests[1..].iter().all(|&n| n <= READ_CHUNK_SIZE));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_prefix() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x00, 0x00]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 4,
                received: 2
            }
        ));
    }

    #[test]
    fn connection_closed_mid_payload() {
        let mut partial = BytesMut::new();
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 16,
                received: 9
            }
        ));
    }

    #[test]
    fn receive_reports_truncation() {
        let mut partial = BytesMut::new();
        partial.put_u32(8);
        partial.put_slice(b"abc");
        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));

        let result = reader.receive(&StopSignal::new(), |_, _| panic!("no frame expected"));
        assert!(matches!(result, Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_u32(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 1024, max: 16 }));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&[b"ok"]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap(), b"ok");
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::with_config_tcp(stream, FrameConfig::default()).unwrap();
            let mut frames = Vec::new();
            reader
                .receive(&StopSignal::new(), |payload, _| frames.push(payload.to_vec()))
                .unwrap();
            frames
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut writer = FrameWriter::new(stream);
        writer.send(b"ping").unwrap();
        writer.send(&vec![9u8; 3000]).unwrap();
        drop(writer);

        let frames = server.join().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"ping");
        assert_eq!(frames[1], vec![9u8; 3000]);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct RecordingReader {
        bytes: Vec<u8>,
        pos: usize,
        requests: Vec<usize>,
    }

    impl Read for RecordingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.requests.push(buf.len());
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    proptest! {
        #[test]
        fn framing_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..5000)) {
            let mut writer = FrameWriter::new(Vec::new());
            writer.send(&payload).unwrap();
            let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
            prop_assert_eq!(reader.read_frame().unwrap(), payload.as_slice());
        }
    }
}
