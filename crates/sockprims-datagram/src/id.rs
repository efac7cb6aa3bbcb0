use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of the message id field on the wire.
pub const ID_LENGTH: usize = 32;

/// 32-byte ASCII message identifier shared by all fragments of one message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; ID_LENGTH]);

impl MessageId {
    /// Wrap raw id bytes as read from the wire.
    pub const fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Render `token` into the fixed field: left-padded with `'0'` when
    /// short, keeping only the rightmost 32 characters when long.
    pub fn from_token(token: &str) -> Self {
        let src = token.as_bytes();
        let mut bytes = [b'0'; ID_LENGTH];
        if src.len() >= ID_LENGTH {
            bytes.copy_from_slice(&src[src.len() - ID_LENGTH..]);
        } else {
            bytes[ID_LENGTH - src.len()..].copy_from_slice(src);
        }
        Self(bytes)
    }

    /// Decimal rendering of `value`, left-padded to the field width.
    pub fn from_value(value: u64) -> Self {
        Self::from_token(&value.to_string())
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

/// Strictly monotonic id source seeded from the wall clock.
///
/// Each id is `max(now_ms, previous + 1)`, so ids stay close to the send
/// time in milliseconds but two messages never share one, even when sent
/// within the same millisecond. Share one generator (via `Arc`) between
/// endpoints that talk to the same receiver.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: AtomicU64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> MessageId {
        let now = now_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return MessageId::from_value(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
