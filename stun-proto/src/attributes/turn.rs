//! TURN attributes defined in [`RFC8656`](https://datatracker.ietf.org/doc/html/rfc8656).

use crate::attributes::address::xor_socket_addr_attribute;
use crate::attributes::{attribute_type, DecodeAttributeValue, EncodeAttributeValue};
use crate::common::{check_buffer_boundaries, empty_attribute, integer_attribute};
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;
use crate::protocols::{ProtocolNumber, UDP};
use crate::registry::DecoderRegistry;
use crate::types::AddressFamily;
use crate::{Decode, Encode};
use std::ops::Deref;

/// `CHANNEL-NUMBER` attribute type
pub const CHANNEL_NUMBER: u16 = 0x000C;
/// `LIFETIME` attribute type
pub const LIFETIME: u16 = 0x000D;
/// `XOR-PEER-ADDRESS` attribute type
pub const XOR_PEER_ADDRESS: u16 = 0x0012;
/// `DATA` attribute type
pub const DATA: u16 = 0x0013;
/// `XOR-RELAYED-ADDRESS` attribute type
pub const XOR_RELAYED_ADDRESS: u16 = 0x0016;
/// `REQUESTED-ADDRESS-FAMILY` attribute type
pub const REQUESTED_ADDRESS_FAMILY: u16 = 0x0017;
/// `EVEN-PORT` attribute type
pub const EVEN_PORT: u16 = 0x0018;
/// `REQUESTED-TRANSPORT` attribute type
pub const REQUESTED_TRANSPORT: u16 = 0x0019;
/// `DONT-FRAGMENT` attribute type
pub const DONT_FRAGMENT: u16 = 0x001A;
/// `RESERVATION-TOKEN` attribute type
pub const RESERVATION_TOKEN: u16 = 0x0022;

const CHANNEL_NUMBER_SIZE: usize = 4;
const EVEN_PORT_SIZE: usize = 1;
const RESERVE_BIT: u8 = 0x80;
const FAMILY_SIZE: usize = 4;
const REQUESTED_TRANSPORT_SIZE: usize = 4;
const RESERVATION_TOKEN_SIZE: usize = 8;

/// `CHANNEL-NUMBER`: a 16-bit channel followed by two zero bytes.
/// Any value is decoded; whether it lies in the channel range is checked
/// by whoever binds the channel.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::turn::ChannelNumber;
/// let attr = ChannelNumber::new(0x4001);
/// assert_eq!(attr.number(), 0x4001);
///```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelNumber(u16);

impl ChannelNumber {
    /// Wraps `number`
    pub fn new(number: u16) -> Self {
        Self(number)
    }

    /// Channel carried by the attribute
    pub fn number(&self) -> u16 {
        self.0
    }
}

impl DecodeAttributeValue for ChannelNumber {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        check_buffer_boundaries(raw_value, CHANNEL_NUMBER_SIZE)?;
        let (number, _) = u16::decode(raw_value)?;
        Ok((Self(number), CHANNEL_NUMBER_SIZE))
    }
}

impl EncodeAttributeValue for ChannelNumber {
    fn encoded_size(&self) -> usize {
        CHANNEL_NUMBER_SIZE
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, CHANNEL_NUMBER_SIZE)?;
        self.0.encode(raw_value)?;
        // RFFU
        raw_value[2..CHANNEL_NUMBER_SIZE].fill(0);
        Ok(CHANNEL_NUMBER_SIZE)
    }
}

attribute_type!(ChannelNumber, CHANNEL_NUMBER);

integer_attribute!(
    /// `LIFETIME`: seconds an allocation survives without a refresh.
    ///
    /// # Examples
    ///```rust
    /// # use stun_proto::attributes::turn::LifeTime;
    /// let attr = LifeTime::new(600);
    /// assert_eq!(attr, 600);
    ///```
    LifeTime,
    LIFETIME,
    u32,
);

xor_socket_addr_attribute!(
    /// `XOR-PEER-ADDRESS`: a peer transport address, as the relay sees it.
    XorPeerAddress,
    XOR_PEER_ADDRESS,
);

xor_socket_addr_attribute!(
    /// `XOR-RELAYED-ADDRESS`: the relayed transport address handed out in
    /// Allocate responses.
    XorRelayedAddress,
    XOR_RELAYED_ADDRESS,
);

/// `DATA`: the UDP payload exchanged with a peer through Send and Data
/// indications.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::turn::Data;
/// let attr = Data::new([0x01, 0x02, 0x03]);
/// assert_eq!(attr.as_bytes(), &[0x01, 0x02, 0x03]);
///```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Data(Vec<u8>);

impl Data {
    /// Copies `buffer` into the attribute
    pub fn new<T>(buffer: T) -> Self
    where
        T: AsRef<[u8]>,
    {
        Self(buffer.as_ref().to_vec())
    }

    /// Payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Data {
    fn from(buffer: Vec<u8>) -> Self {
        Self(buffer)
    }
}

impl DecodeAttributeValue for Data {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        Ok((Data::new(raw_value), raw_value.len()))
    }
}

impl EncodeAttributeValue for Data {
    fn encoded_size(&self) -> usize {
        self.0.len()
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let len = self.0.len();
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, len)?;
        raw_value[..len].copy_from_slice(&self.0);
        Ok(len)
    }
}

attribute_type!(Data, DATA);

/// `REQUESTED-ADDRESS-FAMILY`: one family byte and three reserved bytes.
/// Selects the family of the relayed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedAddressFamily(AddressFamily);

impl RequestedAddressFamily {
    /// Asks for a relayed address of `family`
    pub fn new(family: AddressFamily) -> Self {
        Self(family)
    }

    /// Requested family
    pub fn family(&self) -> AddressFamily {
        self.0
    }
}

impl DecodeAttributeValue for RequestedAddressFamily {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        check_buffer_boundaries(raw_value, FAMILY_SIZE)?;
        let (family, _) = AddressFamily::decode(raw_value)?;
        Ok((Self(family), FAMILY_SIZE))
    }
}

impl EncodeAttributeValue for RequestedAddressFamily {
    fn encoded_size(&self) -> usize {
        FAMILY_SIZE
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, FAMILY_SIZE)?;
        let size = self.0.encode(raw_value)?;
        raw_value[size..FAMILY_SIZE].fill(0);
        Ok(FAMILY_SIZE)
    }
}

attribute_type!(RequestedAddressFamily, REQUESTED_ADDRESS_FAMILY);

/// `EVEN-PORT`: asks for an even relay port. The high bit of its single
/// byte asks to hold the following odd port as well.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::turn::EvenPort;
/// assert!(EvenPort::new(true).reserve());
/// assert!(!EvenPort::default().reserve());
///```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvenPort(bool);

impl EvenPort {
    /// `reserve` sets the R bit
    pub fn new(reserve: bool) -> Self {
        Self(reserve)
    }

    /// Whether the R bit is set
    pub fn reserve(&self) -> bool {
        self.0
    }
}

impl DecodeAttributeValue for EvenPort {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        check_buffer_boundaries(raw_value, EVEN_PORT_SIZE)?;
        Ok((Self(raw_value[0] & RESERVE_BIT != 0), EVEN_PORT_SIZE))
    }
}

impl EncodeAttributeValue for EvenPort {
    fn encoded_size(&self) -> usize {
        EVEN_PORT_SIZE
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, EVEN_PORT_SIZE)?;
        raw_value[0] = if self.0 { RESERVE_BIT } else { 0 };
        Ok(EVEN_PORT_SIZE)
    }
}

attribute_type!(EvenPort, EVEN_PORT);

/// `REQUESTED-TRANSPORT`: IANA protocol number of the relayed transport,
/// padded with three zero bytes. Defaults to UDP, the only one relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedTransport(ProtocolNumber);

impl RequestedTransport {
    /// Asks for `protocol`
    pub fn new(protocol: ProtocolNumber) -> Self {
        Self(protocol)
    }

    /// Requested protocol
    pub fn protocol(&self) -> ProtocolNumber {
        self.0
    }
}

impl Default for RequestedTransport {
    fn default() -> Self {
        RequestedTransport(UDP)
    }
}

impl DecodeAttributeValue for RequestedTransport {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        check_buffer_boundaries(raw_value, REQUESTED_TRANSPORT_SIZE)?;
        let (protocol, _) = ProtocolNumber::decode(raw_value)?;
        Ok((Self(protocol), REQUESTED_TRANSPORT_SIZE))
    }
}

impl EncodeAttributeValue for RequestedTransport {
    fn encoded_size(&self) -> usize {
        REQUESTED_TRANSPORT_SIZE
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, REQUESTED_TRANSPORT_SIZE)?;
        let size = self.0.encode(raw_value)?;
        raw_value[size..REQUESTED_TRANSPORT_SIZE].fill(0);
        Ok(REQUESTED_TRANSPORT_SIZE)
    }
}

attribute_type!(RequestedTransport, REQUESTED_TRANSPORT);

empty_attribute!(
    /// `DONT-FRAGMENT`: asks for the DF bit on datagrams relayed to peers.
    DontFragment,
    DONT_FRAGMENT,
);

/// `RESERVATION-TOKEN`: eight opaque bytes naming a relay port held in
/// reserve.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::turn::ReservationToken;
/// let attr = ReservationToken::from(*b"reserved");
/// assert_eq!(attr.token(), b"reserved");
///```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationToken([u8; RESERVATION_TOKEN_SIZE]);

impl ReservationToken {
    /// The token bytes
    pub fn token(&self) -> &[u8; RESERVATION_TOKEN_SIZE] {
        &self.0
    }
}

impl From<[u8; RESERVATION_TOKEN_SIZE]> for ReservationToken {
    fn from(token: [u8; RESERVATION_TOKEN_SIZE]) -> Self {
        Self(token)
    }
}

impl DecodeAttributeValue for ReservationToken {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        check_buffer_boundaries(raw_value, RESERVATION_TOKEN_SIZE)?;
        let token = <[u8; RESERVATION_TOKEN_SIZE]>::try_from(&raw_value[..RESERVATION_TOKEN_SIZE])?;
        Ok((Self(token), RESERVATION_TOKEN_SIZE))
    }
}

impl EncodeAttributeValue for ReservationToken {
    fn encoded_size(&self) -> usize {
        RESERVATION_TOKEN_SIZE
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, RESERVATION_TOKEN_SIZE)?;
        raw_value[..RESERVATION_TOKEN_SIZE].copy_from_slice(&self.0);
        Ok(RESERVATION_TOKEN_SIZE)
    }
}

attribute_type!(ReservationToken, RESERVATION_TOKEN);

pub(crate) fn register(registry: &mut DecoderRegistry) {
    registry
        .add::<ChannelNumber>()
        .add::<LifeTime>()
        .add::<XorPeerAddress>()
        .add::<Data>()
        .add::<XorRelayedAddress>()
        .add::<RequestedAddressFamily>()
        .add::<EvenPort>()
        .add::<RequestedTransport>()
        .add::<DontFragment>()
        .add::<ReservationToken>();
}
