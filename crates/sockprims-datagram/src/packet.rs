use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DatagramError, Result};
use crate::fragment::fragment_count;
use crate::id::{MessageId, ID_LENGTH};

/// Payload bytes carried by one fragment.
pub const DATA_LENGTH: usize = 32 * 1024;

/// Header bytes: id (32) + count (4) + index (4) + valid length (4) + content length (4).
pub const HEADER_LENGTH: usize = ID_LENGTH + 4 * 4;

/// Size of every datagram on the wire.
pub const PACKET_LENGTH: usize = HEADER_LENGTH + DATA_LENGTH;

/// Per-fragment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub id: MessageId,
    /// Total fragments in the message.
    pub count: u32,
    /// 1-based position of this fragment.
    pub index: u32,
    /// Meaningful bytes in this fragment's data region.
    pub valid_length: u32,
    /// Byte length of the whole message.
    pub content_length: u32,
}

impl FragmentHeader {
    /// Check the fields are self-consistent. The fragment count must be the
    /// one a sender derives from the content length.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(invalid("fragment count is zero"));
        }
        if self.index == 0 || self.index > self.count {
            return Err(invalid(format!(
                "index {} outside 1..={}",
                self.index, self.count
            )));
        }
        if (self.valid_length as usize) > DATA_LENGTH {
            return Err(invalid(format!(
                "valid length {} exceeds {DATA_LENGTH}",
                self.valid_length
            )));
        }
        let expected = fragment_count(self.content_length as usize);
        if self.count as usize != expected {
            return Err(invalid(format!(
                "{} fragments declared for {} bytes, expected {expected}",
                self.count, self.content_length
            )));
        }
        Ok(())
    }
}

/// Serialize one fragment. `data` holds the valid bytes; the rest of the
/// data region is zero-filled.
pub fn encode_packet(header: &FragmentHeader, data: &[u8], dst: &mut BytesMut) -> Result<()> {
    if data.len() > DATA_LENGTH || data.len() != header.valid_length as usize {
        return Err(invalid(format!(
            "data of {} bytes does not match valid length {}",
            data.len(),
            header.valid_length
        )));
    }
    dst.reserve(PACKET_LENGTH);
    dst.put_slice(header.id.as_bytes());
    dst.put_u32(header.count);
    dst.put_u32(header.index);
    dst.put_u32(header.valid_length);
    dst.put_u32(header.content_length);
    dst.put_slice(data);
    dst.put_bytes(0, DATA_LENGTH - data.len());
    Ok(())
}

/// Parse and validate one datagram. Returns the header and the valid part
/// of the data region.
pub fn parse_packet(packet: &[u8]) -> Result<(FragmentHeader, &[u8])> {
    if packet.len() != PACKET_LENGTH {
        return Err(invalid(format!(
            "datagram of {} bytes, expected {PACKET_LENGTH}",
            packet.len()
        )));
    }

    let mut id = [0u8; ID_LENGTH];
    id.copy_from_slice(&packet[..ID_LENGTH]);

    let mut fields = &packet[ID_LENGTH..HEADER_LENGTH];
    let header = FragmentHeader {
        id: MessageId::from_bytes(id),
        count: fields.get_u32(),
        index: fields.get_u32(),
        valid_length: fields.get_u32(),
        content_length: fields.get_u32(),
    };
    header.validate()?;

    let data = &packet[HEADER_LENGTH..HEADER_LENGTH + header.valid_length as usize];
    Ok((header, data))
}

fn invalid(reason: impl Into<String>) -> DatagramError {
    DatagramError::InvalidFragment(reason.into())
}
