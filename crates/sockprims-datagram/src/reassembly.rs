use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{DatagramError, Result};
use crate::id::MessageId;
use crate::packet::{parse_packet, FragmentHeader};
use crate::pool::{FragmentBuf, FragmentPool};

/// Limits on how long incomplete messages are kept.
///
/// The protocol never retransmits, so a message that lost a fragment never
/// completes. With the defaults (no limits) it is kept forever.
#[derive(Debug, Clone, Default)]
pub struct ReassemblyConfig {
    /// Evict the oldest incomplete message once this many are pending.
    pub max_pending_messages: Option<usize>,
    /// Evict incomplete messages older than this, checked on each arrival.
    pub message_ttl: Option<Duration>,
    /// Keep at most this many released fragment buffers for reuse.
    pub max_idle_buffers: Option<usize>,
}

struct PendingMessage {
    count: u32,
    content_length: u32,
    slots: Vec<Option<FragmentBuf>>,
    received: u32,
    first_seen: Instant,
}

/// Collects fragments per message id and emits whole messages.
pub struct Reassembler {
    pending: HashMap<MessageId, PendingMessage>,
    /// Arrival order of pending ids, oldest first.
    order: VecDeque<MessageId>,
    pool: FragmentPool,
    config: ReassemblyConfig,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_config(ReassemblyConfig::default())
    }

    pub fn with_config(config: ReassemblyConfig) -> Self {
        let pool = match config.max_idle_buffers {
            Some(max) => FragmentPool::with_max_idle(max),
            None => FragmentPool::new(),
        };
        Self {
            pending: HashMap::new(),
            order: VecDeque::new(),
            pool,
            config,
        }
    }

    /// Parse one raw datagram and add it.
    pub fn push_packet(&mut self, packet: &[u8]) -> Result<Option<(MessageId, Vec<u8>)>> {
        let (header, data) = parse_packet(packet)?;
        self.push(header, data)
    }

    /// Add one fragment. Returns the message it belongs to once every index
    /// has arrived.
    ///
    /// A repeated index replaces the earlier copy. Fragments whose count or
    /// content length disagree with earlier fragments of the same id are
    /// rejected.
    pub fn push(
        &mut self,
        header: FragmentHeader,
        data: &[u8],
    ) -> Result<Option<(MessageId, Vec<u8>)>> {
        header.validate()?;
        if data.len() != header.valid_length as usize {
            return Err(DatagramError::InvalidFragment(format!(
                "{} data bytes for valid length {}",
                data.len(),
                header.valid_length
            )));
        }

        self.evict_expired(Instant::now());

        if !self.pending.contains_key(&header.id) {
            self.make_room();
            self.pending.insert(
                header.id,
                PendingMessage {
                    count: header.count,
                    content_length: header.content_length,
                    slots: (0..header.count).map(|_| None).collect(),
                    received: 0,
                    first_seen: Instant::now(),
                },
            );
            self.order.push_back(header.id);
        }

        let Some(msg) = self.pending.get_mut(&header.id) else {
            return Ok(None);
        };
        if msg.count != header.count || msg.content_length != header.content_length {
            return Err(DatagramError::InvalidFragment(format!(
                "message {} declared {} fragments / {} bytes, fragment says {} / {}",
                header.id, msg.count, msg.content_length, header.count, header.content_length
            )));
        }

        let mut buf = self.pool.acquire();
        buf.fill(data);
        match msg.slots[header.index as usize - 1].replace(buf) {
            Some(previous) => {
                debug!(id = %header.id, index = header.index, "duplicate fragment replaced");
                self.pool.release(previous);
            }
            None => msg.received += 1,
        }

        if msg.received < msg.count {
            return Ok(None);
        }

        let Some(msg) = self.pending.remove(&header.id) else {
            return Ok(None);
        };
        self.order.retain(|id| *id != header.id);
        self.assemble(header.id, msg).map(Some)
    }

    fn assemble(&mut self, id: MessageId, msg: PendingMessage) -> Result<(MessageId, Vec<u8>)> {
        let expected = msg.content_length as usize;
        let mut out = Vec::with_capacity(expected);
        for buf in msg.slots.into_iter().flatten() {
            out.extend_from_slice(buf.as_slice());
            self.pool.release(buf);
        }

        if out.len() != expected {
            return Err(DatagramError::LengthMismatch {
                id,
                expected,
                actual: out.len(),
            });
        }

        debug!(%id, len = out.len(), fragments = msg.count, "message reassembled");
        Ok((id, out))
    }

    /// Drop incomplete messages older than the configured TTL. Returns how
    /// many were evicted.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.config.message_ttl else {
            return 0;
        };

        let mut evicted = 0;
        while let Some(id) = self.order.front().copied() {
            let expired = self
                .pending
                .get(&id)
                .is_none_or(|msg| now.saturating_duration_since(msg.first_seen) > ttl);
            if !expired {
                break;
            }
            self.order.pop_front();
            if self.discard(id) {
                evicted += 1;
            }
        }
        evicted
    }

    fn make_room(&mut self) {
        let Some(max) = self.config.max_pending_messages else {
            return;
        };
        while self.pending.len() >= max.max(1) {
            let Some(oldest) = self.order.pop_front() else {
                return;
            };
            self.discard(oldest);
        }
    }

    fn discard(&mut self, id: MessageId) -> bool {
        let Some(msg) = self.pending.remove(&id) else {
            return false;
        };
        warn!(
            %id,
            received = msg.received,
            count = msg.count,
            "evicting incomplete message"
        );
        for buf in msg.slots.into_iter().flatten() {
            self.pool.release(buf);
        }
        true
    }

    /// Number of incomplete messages held.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &MessageId) -> bool {
        self.pending.contains_key(id)
    }

    /// The fragment buffer pool backing this reassembler.
    pub fn pool(&self) -> &FragmentPool {
        &self.pool
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;
    use crate::fragment::fragment_message;
    use crate::packet::DATA_LENGTH;

    fn feed(r: &mut Reassembler, packets: &[Bytes]) -> Vec<(MessageId, Vec<u8>)> {
        packets
            .iter()
            .filter_map(|p| r.push_packet(p).unwrap())
            .collect()
    }

    /// Content length that takes exactly two fragments.
    const TWO: u32 = DATA_LENGTH as u32 + 3;

    fn header(id: u64, count: u32, index: u32, valid: u32, content: u32) -> FragmentHeader {
        FragmentHeader {
            id: MessageId::from_value(id),
            count,
            index,
            valid_length: valid,
            content_length: content,
        }
    }

    #[test]
    fn reassembles_in_order() {
        let payload: Vec<u8> = (0..70_000u32).map(|i| i as u8).collect();
        let id = MessageId::from_value(1);
        let packets = fragment_message(id, &payload).unwrap();

        let mut r = Reassembler::new();
        let done = feed(&mut r, &packets);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, id);
        assert_eq!(done[0].1.len(), 70_000);
        assert_eq!(done[0].1, payload);
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn reassembles_reversed_order() {
        let payload = vec![7u8; 3 * DATA_LENGTH + 5];
        let mut packets = fragment_message(MessageId::from_value(2), &payload).unwrap();
        packets.reverse();

        let mut r = Reassembler::new();
        let done = feed(&mut r, &packets);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].1, payload);
    }

    #[test]
    fn interleaved_messages_complete_independently() {
        let a = vec![1u8; 2 * DATA_LENGTH + 1];
        let b = vec![2u8; DATA_LENGTH + 100];
        let pa = fragment_message(MessageId::from_value(10), &a).unwrap();
        let pb = fragment_message(MessageId::from_value(11), &b).unwrap();

        let order = [&pb[1], &pa[2], &pa[0], &pb[0], &pa[1]];
        let mut r = Reassembler::new();
        let mut done = Vec::new();
        for packet in order {
            if let Some(msg) = r.push_packet(packet).unwrap() {
                done.push(msg);
            }
        }

        assert_eq!(done.len(), 2);
        assert_eq!(done[0], (MessageId::from_value(11), b));
        assert_eq!(done[1], (MessageId::from_value(10), a));
    }

    #[test]
    fn lost_fragment_stalls_only_its_message() {
        let lossy = fragment_message(MessageId::from_value(20), &vec![3u8; 2 * DATA_LENGTH]).unwrap();
        let whole = fragment_message(MessageId::from_value(21), b"intact").unwrap();

        let mut r = Reassembler::new();
        assert!(r.push_packet(&lossy[0]).unwrap().is_none());
        let done = r.push_packet(&whole[0]).unwrap().unwrap();

        assert_eq!(done.1, b"intact");
        assert!(r.is_pending(&MessageId::from_value(20)));
        assert_eq!(r.pending_count(), 1);
    }

    #[test]
    fn duplicate_index_overwrites() {
        let full = DATA_LENGTH as u32;
        let old = vec![b'o'; DATA_LENGTH];
        let new = vec![b'n'; DATA_LENGTH];

        let mut r = Reassembler::new();
        assert!(r.push(header(30, 2, 1, full, TWO), &old).unwrap().is_none());
        assert!(r.push(header(30, 2, 1, full, TWO), &new).unwrap().is_none());
        let (_, payload) = r.push(header(30, 2, 2, 3, TWO), b"end").unwrap().unwrap();

        let mut expected = new;
        expected.extend_from_slice(b"end");
        assert_eq!(payload, expected);
    }

    #[test]
    fn inconsistent_header_is_rejected() {
        let mut r = Reassembler::new();
        r.push(header(40, 2, 1, 3, TWO), b"abc").unwrap();
        let err = r
            .push(header(40, 3, 2, 3, 2 * DATA_LENGTH as u32 + 3), b"def")
            .unwrap_err();
        assert!(matches!(err, DatagramError::InvalidFragment(_)));
        assert!(r.is_pending(&MessageId::from_value(40)));
    }

    #[test]
    fn length_mismatch_is_reported() {
        let mut r = Reassembler::new();
        r.push(header(50, 2, 1, 3, TWO), b"abc").unwrap();
        let err = r.push(header(50, 2, 2, 3, TWO), b"def").unwrap_err();
        assert!(matches!(
            err,
            DatagramError::LengthMismatch {
                expected,
                actual: 6,
                ..
            } if expected == TWO as usize
        ));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn inflated_count_is_rejected_before_allocating() {
        let mut r = Reassembler::new();
        let err = r.push(header(55, 1 << 24, 1, 0, 0), b"").unwrap_err();
        assert!(matches!(err, DatagramError::InvalidFragment(_)));
        assert_eq!(r.pending_count(), 0);

        let err = r.push(header(56, u32::MAX, 1, 0, 0), b"").unwrap_err();
        assert!(matches!(err, DatagramError::InvalidFragment(_)));
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn buffers_return_to_pool() {
        let packets = fragment_message(MessageId::from_value(60), &vec![0u8; 3 * DATA_LENGTH]).unwrap();
        let mut r = Reassembler::new();
        feed(&mut r, &packets);
        assert_eq!(r.pool().idle(), 3);

        feed(&mut r, &packets);
        assert_eq!(r.pool().allocated(), 3);
    }

    #[test]
    fn ttl_evicts_stale_messages() {
        let mut r = Reassembler::with_config(ReassemblyConfig {
            message_ttl: Some(Duration::from_secs(1)),
            ..ReassemblyConfig::default()
        });
        r.push(header(70, 2, 1, 1, TWO), b"a").unwrap();
        assert_eq!(r.evict_expired(Instant::now()), 0);
        assert_eq!(r.evict_expired(Instant::now() + Duration::from_secs(5)), 1);
        assert_eq!(r.pending_count(), 0);
        assert_eq!(r.pool().idle(), 1);
    }

    #[test]
    fn max_pending_evicts_oldest() {
        let mut r = Reassembler::with_config(ReassemblyConfig {
            max_pending_messages: Some(1),
            ..ReassemblyConfig::default()
        });
        r.push(header(80, 2, 1, 1, TWO), b"a").unwrap();
        r.push(header(81, 2, 1, 1, TWO), b"b").unwrap();

        assert!(!r.is_pending(&MessageId::from_value(80)));
        assert!(r.is_pending(&MessageId::from_value(81)));
    }

    #[test]
    fn no_limits_keeps_incomplete_messages() {
        let mut r = Reassembler::new();
        r.push(header(90, 2, 1, 1, TWO), b"a").unwrap();
        assert_eq!(r.evict_expired(Instant::now() + Duration::from_secs(3600)), 0);
        assert!(r.is_pending(&MessageId::from_value(90)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn permuted_fragments_reassemble(
            (payload, order) in (1usize..=5 * DATA_LENGTH)
                .prop_flat_map(|len| {
                    let count = len.div_ceil(DATA_LENGTH);
                    (
                        proptest::collection::vec(any::<u8>(), len),
                        Just((0..count).collect::<Vec<_>>()).prop_shuffle(),
                    )
                })
        ) {
            let id = MessageId::from_value(100);
            let packets = fragment_message(id, &payload).unwrap();
            let mut r = Reassembler::new();
            let mut done = Vec::new();
            for i in order {
                if let Some(msg) = r.push_packet(&packets[i]).unwrap() {
                    done.push(msg);
                }
            }
            prop_assert_eq!(done.len(), 1);
            prop_assert_eq!(&done[0].1, &payload);
        }
    }
}
