use bytes::{Bytes, BytesMut};

use crate::error::{DatagramError, Result};
use crate::id::MessageId;
use crate::packet::{encode_packet, FragmentHeader, DATA_LENGTH};

/// Number of fragments needed for a payload of `len` bytes.
///
/// An empty payload still travels as one fragment with no valid bytes, so
/// the receiver sees the message.
pub fn fragment_count(len: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(DATA_LENGTH)
    }
}

/// Split `payload` into serialized datagrams in index order, all tagged
/// with `id`.
pub fn fragment_message(id: MessageId, payload: &[u8]) -> Result<Vec<Bytes>> {
    let content_length = u32::try_from(payload.len()).map_err(|_| DatagramError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    let count = fragment_count(payload.len());

    let mut packets = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * DATA_LENGTH;
        let end = (start + DATA_LENGTH).min(payload.len());
        let data = &payload[start..end];

        let header = FragmentHeader {
            id,
            count: count as u32,
            index: i as u32 + 1,
            valid_length: data.len() as u32,
            content_length,
        };
        let mut buf = BytesMut::new();
        encode_packet(&header, data, &mut buf)?;
        packets.push(buf.freeze());
    }
    Ok(packets)
}
