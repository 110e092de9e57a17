use crate::common::{check_buffer_boundaries, padding};
use crate::error::{StunError, StunErrorType};
use byteorder::{BigEndian, ByteOrder};
use std::ops::RangeInclusive;

/// Size of the `ChannelData` header: channel number and length.
pub const CHANNEL_DATA_HEADER_SIZE: usize = 4;
/// Lowest channel number a client may bind.
pub const MIN_CHANNEL_NUMBER: u16 = 0x4000;
/// Highest channel number a client may bind.
pub const MAX_CHANNEL_NUMBER: u16 = 0x7FFF;

const CHANNEL_RANGE: RangeInclusive<u16> = MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER;

// Format of ChannelData message
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         Channel Number        |            Length             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               |
// /                       Application Data                        /
// /                                                               /
// |                                                               |
// |                               +-------------------------------+
// |                               |
// +-------------------------------+

/// Returns true if the first two bits of `buffer` are `0b01`, which is how
/// `ChannelData` messages are told apart from STUN messages on the same
/// socket.
pub fn is_channel_data(buffer: &[u8]) -> bool {
    buffer.first().is_some_and(|b| b & 0xC0 == 0x40)
}

/// Returns true if the first two bits of `buffer` are zero, as required for
/// every STUN message.
pub fn is_stun_message(buffer: &[u8]) -> bool {
    buffer.first().is_some_and(|b| b & 0xC0 == 0x00)
}

/// A `ChannelData` message: application data sent to or received from the
/// peer bound to a channel, with a 4-byte header instead of a STUN one.
///
/// # Examples
///```rust
/// # use stun_proto::ChannelData;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let msg = ChannelData::new(0x4001, vec![0x01, 0x02, 0x03])?;
/// let buffer = msg.encode_to_vec()?;
/// assert_eq!(buffer, [0x40, 0x01, 0x00, 0x03, 0x01, 0x02, 0x03]);
///
/// let (decoded, size) = ChannelData::decode(&buffer)?;
/// assert_eq!(size, 7);
/// assert_eq!(decoded, msg);
/// #
/// #   Ok(())
/// # }
///```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    channel: u16,
    data: Vec<u8>,
}

fn check_channel(channel: u16) -> Result<(), StunError> {
    CHANNEL_RANGE.contains(&channel).then_some(()).ok_or_else(|| {
        StunError::new(
            StunErrorType::InvalidParam,
            format!(
                "Channel number {:#06x} is not in the range ({:#06x}..={:#06x})",
                channel, MIN_CHANNEL_NUMBER, MAX_CHANNEL_NUMBER
            ),
        )
    })
}

impl ChannelData {
    /// Creates a new message.
    /// # Returns
    /// The message or a [`StunError`] if the channel number is out of
    /// range or the data does not fit in the length field.
    pub fn new(channel: u16, data: Vec<u8>) -> Result<Self, StunError> {
        check_channel(channel)?;
        if data.len() > u16::MAX as usize {
            return Err(StunError::new(
                StunErrorType::ValueTooLong,
                format!("Data length {} does not fit in 16 bits", data.len()),
            ));
        }
        Ok(Self { channel, data })
    }

    /// Returns the channel number
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Returns the application data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the message returning its application data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Decodes a `ChannelData` message.
    /// # Returns
    /// The message and the number of bytes consumed, including any
    /// padding present in the buffer.
    pub fn decode(buffer: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, CHANNEL_DATA_HEADER_SIZE)?;
        let channel = BigEndian::read_u16(&buffer[..2]);
        check_channel(channel)?;

        let length = BigEndian::read_u16(&buffer[2..4]) as usize;
        let end = CHANNEL_DATA_HEADER_SIZE + length;
        check_buffer_boundaries(buffer, end)?;

        // Padding is optional over UDP
        let consumed = buffer.len().min(end + padding(length));
        let data = buffer[CHANNEL_DATA_HEADER_SIZE..end].to_vec();
        Ok((Self { channel, data }, consumed))
    }

    /// Size of the encoded message, without padding.
    pub fn encoded_size(&self) -> usize {
        CHANNEL_DATA_HEADER_SIZE + self.data.len()
    }

    /// Encodes the message into `buffer` without padding.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError> {
        let size = self.encoded_size();
        check_buffer_boundaries(buffer, size)?;
        BigEndian::write_u16(&mut buffer[..2], self.channel);
        BigEndian::write_u16(&mut buffer[2..4], self.data.len() as u16);
        buffer[CHANNEL_DATA_HEADER_SIZE..size].copy_from_slice(&self.data);
        Ok(size)
    }

    /// Encodes the message into a new vector.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, StunError> {
        let mut buffer = vec![0u8; self.encoded_size()];
        self.encode(&mut buffer)?;
        Ok(buffer)
    }
}
