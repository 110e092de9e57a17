//! Zero-copy view of a STUN datagram: the fixed header and the TLV
//! attribute area, before any attribute value is interpreted.

use crate::common::{check_buffer_boundaries, padding};
use crate::error::{StunError, StunErrorType};
use crate::types::{MAGIC_COOKIE, TRANSACTION_ID_SIZE};
use crate::Decode;
use byteorder::{BigEndian, ByteOrder};
use fallible_iterator::FallibleIterator;
use std::convert::TryFrom;

/// STUN message header size
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub(crate) const ATTRIBUTE_HEADER_SIZE: usize = 4;

/// Header of a STUN message, borrowed from the input buffer.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |0 0|     STUN Message Type     |         Message Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Magic Cookie                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     Transaction ID (96 bits)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Decoding fails unless the two leading bits are zero, the magic cookie
/// matches and the length is a multiple of four.
#[derive(Debug)]
pub struct MessageHeader<'a> {
    /// The 14-bit message type
    pub msg_type: u16,
    /// Length of the attribute area
    pub msg_length: u16,
    /// Transaction Id
    pub transaction_id: &'a [u8; TRANSACTION_ID_SIZE],
}

impl<'a> Decode<'a> for MessageHeader<'a> {
    fn decode(buffer: &'a [u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, MESSAGE_HEADER_SIZE)?;

        let msg_type = BigEndian::read_u16(&buffer[..2]);
        if msg_type & 0xC000 != 0 {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Leading bits of message type {:#06x} are not zero", msg_type),
            ));
        }
        if BigEndian::read_u32(&buffer[4..8]) != MAGIC_COOKIE {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                "Invalid magic cookie",
            ));
        }
        let msg_length = BigEndian::read_u16(&buffer[2..4]);
        if msg_length % 4 != 0 {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Message length {} is not a multiple of 4", msg_length),
            ));
        }

        let header = Self {
            msg_type,
            msg_length,
            transaction_id: <&[u8; TRANSACTION_ID_SIZE]>::try_from(&buffer[8..20])?,
        };
        Ok((header, MESSAGE_HEADER_SIZE))
    }
}

/// A header and the attribute area it announces.
#[derive(Debug)]
pub(crate) struct RawMessage<'a> {
    pub header: MessageHeader<'a>,
    pub attributes: &'a [u8],
}

impl<'a> Decode<'a> for RawMessage<'a> {
    fn decode(buffer: &'a [u8]) -> Result<(Self, usize), StunError> {
        let (header, _) = MessageHeader::decode(buffer)?;
        let end = MESSAGE_HEADER_SIZE + usize::from(header.msg_length);
        check_buffer_boundaries(buffer, end)?;
        let attributes = &buffer[MESSAGE_HEADER_SIZE..end];
        Ok((Self { header, attributes }, end))
    }
}

/// Attribute type and value, without the padding.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RawAttribute<'a> {
    pub attr_type: u16,
    pub value: &'a [u8],
}

impl<'a> Decode<'a> for RawAttribute<'a> {
    fn decode(buffer: &'a [u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, ATTRIBUTE_HEADER_SIZE)?;
        let attr_type = BigEndian::read_u16(&buffer[..2]);
        let end = ATTRIBUTE_HEADER_SIZE + usize::from(BigEndian::read_u16(&buffer[2..4]));
        check_buffer_boundaries(buffer, end)?;
        let value = &buffer[ATTRIBUTE_HEADER_SIZE..end];
        Ok((Self { attr_type, value }, end))
    }
}

/// Walks the attribute area of a message. Every attribute, including its
/// padding, must fit in the area.
#[derive(Debug)]
pub(crate) struct RawAttributes<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> RawAttributes<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    /// Offset of the next attribute from the start of the area
    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl<'a> FallibleIterator for RawAttributes<'a> {
    type Item = RawAttribute<'a>;
    type Error = StunError;

    fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        let rest = &self.buffer[self.pos..];
        if rest.is_empty() {
            return Ok(None);
        }
        let (attr, size) = RawAttribute::decode(rest)?;
        let size = size + padding(size);
        check_buffer_boundaries(rest, size)?;
        self.pos += size;
        Ok(Some(attr))
    }
}

/// Copies the first `end` bytes of `buffer` and rewrites the header length
/// so that it covers `length` bytes of attributes.
pub(crate) fn input_text(buffer: &[u8], end: usize, length: usize) -> Result<Vec<u8>, StunError> {
    check_buffer_boundaries(buffer, end.max(MESSAGE_HEADER_SIZE))?;
    let mut out = buffer[..end].to_vec();
    BigEndian::write_u16(&mut out[2..4], u16::try_from(length)?);
    Ok(out)
}

/// Input of a hash computed over the message up to the attribute of type
/// `attr_type`, with the length rewritten to include that attribute.
pub(crate) fn get_input_text(buffer: &[u8], attr_type: u16) -> Result<Vec<u8>, StunError> {
    let (raw_msg, _) = RawMessage::decode(buffer)?;
    let mut attributes = RawAttributes::new(raw_msg.attributes);
    let mut start = 0;
    while let Some(attr) = attributes.next()? {
        if attr.attr_type == attr_type {
            return input_text(buffer, MESSAGE_HEADER_SIZE + start, attributes.pos());
        }
        start = attributes.pos();
    }
    Err(StunError::new(
        StunErrorType::InvalidParam,
        format!("No attribute of type {:#06x}", attr_type),
    ))
}
