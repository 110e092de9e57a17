//! IANA protocol numbers a TURN client may ask for in
//! `REQUESTED-TRANSPORT`.

use crate::common::check_buffer_boundaries;
use crate::{Encode, StunError};

const SIZE: usize = 1;

/// An entry of the
/// [IANA protocol number registry](https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml).
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Hash)]
pub struct ProtocolNumber(u8);

impl ProtocolNumber {
    /// Creates a protocol number from its assigned value
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Assigned value
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// User Datagram Protocol
pub const UDP: ProtocolNumber = ProtocolNumber(17);

/// Transmission Control Protocol
pub const TCP: ProtocolNumber = ProtocolNumber(6);

impl Encode for ProtocolNumber {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        check_buffer_boundaries(raw_value, SIZE)?;
        raw_value[0] = self.0;
        Ok(SIZE)
    }
}

impl<'a> crate::Decode<'a> for ProtocolNumber {
    fn decode(raw_value: &'a [u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(raw_value, SIZE)?;
        Ok((Self(raw_value[0]), SIZE))
    }
}
