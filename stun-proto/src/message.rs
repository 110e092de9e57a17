use crate::attributes::integrity::MessageIntegrity;
use crate::attributes::{AttributeType, StunAttribute, StunAttributeType};
use crate::common::check_buffer_boundaries;
use crate::error::{StunError, StunErrorType};
use crate::{Encode, TransactionId};
use byteorder::{BigEndian, ByteOrder};
use std::convert::TryFrom;
use std::fmt;

// Layout of the 14-bit message type, M for method and C for class bits:
//
//  13 12 11 10 9  8  7  6  5  4  3  2  1  0
// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+
// |M |M |M |M |M |C |M |M |M |C |M |M |M |M |
// |11|10|9 |8 |7 |1 |6 |5 |4 |0 |3 |2 |1 |0 |
// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+
const METHOD_HIGH: u16 = 0x3E00;
const METHOD_MIDDLE: u16 = 0x00E0;
const METHOD_LOW: u16 = 0x000F;
const CLASS_HIGH: u16 = 0x0100;
const CLASS_LOW: u16 = 0x0010;

/// Method and class of a message, as interleaved in the first two bytes of
/// its header.
/// # Examples
///```rust
/// # use stun_proto::{MessageClass, MessageType};
/// # use stun_proto::methods::{ALLOCATE, BINDING};
/// let msg_type = MessageType::new(BINDING, MessageClass::SuccessResponse);
/// assert_eq!(msg_type.as_u16(), 0x0101);
///
/// let msg_type = MessageType::from(0x0113);
/// assert_eq!(msg_type.method(), ALLOCATE);
/// assert_eq!(msg_type.class(), MessageClass::ErrorResponse);
///```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    method: MessageMethod,
    class: MessageClass,
}

impl MessageType {
    /// Combines a method and a class
    pub fn new(method: MessageMethod, class: MessageClass) -> Self {
        Self { method, class }
    }

    /// Class
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// Method
    pub fn method(&self) -> MessageMethod {
        self.method
    }

    /// Wire value of the type
    pub fn as_u16(&self) -> u16 {
        let method = self.method.0;
        let class = self.class.bits();
        (method << 2 & METHOD_HIGH)
            | (method << 1 & METHOD_MIDDLE)
            | (method & METHOD_LOW)
            | (class << 7 & CLASS_HIGH)
            | (class << 4 & CLASS_LOW)
    }
}

impl From<u16> for MessageType {
    /// Bits above the 14-bit type are ignored.
    fn from(value: u16) -> Self {
        let method = (value & METHOD_HIGH) >> 2 | (value & METHOD_MIDDLE) >> 1 | value & METHOD_LOW;
        let class = (value & CLASS_HIGH) >> 7 | (value & CLASS_LOW) >> 4;
        Self::new(MessageMethod(method), MessageClass::from_bits(class))
    }
}

impl Encode for MessageType {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError> {
        check_buffer_boundaries(buffer, 2)?;
        BigEndian::write_u16(&mut buffer[..2], self.as_u16());
        Ok(2)
    }
}

/// 12-bit STUN method. The methods a relay handles are in
/// [`methods`](crate::methods).
///
/// # Examples
///```rust
/// # use stun_proto::{MessageMethod, StunErrorType};
/// # use stun_proto::methods::REFRESH;
/// # use std::convert::TryFrom;
/// let refresh = MessageMethod::try_from(0x004).unwrap();
/// assert_eq!(refresh, REFRESH);
///
/// assert_eq!(
///     MessageMethod::try_from(0x1000).expect_err("Error expected"),
///     StunErrorType::InvalidParam
/// );
///```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageMethod(pub(crate) u16);

impl MessageMethod {
    /// Numeric value
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for MessageMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self.0 {
            0x0001 => "Binding",
            0x0003 => "Allocate",
            0x0004 => "Refresh",
            0x0006 => "Send",
            0x0007 => "Data",
            0x0008 => "CreatePermission",
            0x0009 => "ChannelBind",
            _ => return write!(f, "method ({:#05x})", self.0),
        };
        f.write_str(name)
    }
}

impl TryFrom<u16> for MessageMethod {
    type Error = StunError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value > 0x0FFF {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Method {:#06x} does not fit in 12 bits", value),
            ));
        }
        Ok(MessageMethod(value))
    }
}

/// Whether a message is a request, a response to one, or an indication,
/// which gets no response at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Request
    Request,
    /// Indication
    Indication,
    /// Success response
    SuccessResponse,
    /// Error response
    ErrorResponse,
}

impl MessageClass {
    const ALL: [MessageClass; 4] = [
        MessageClass::Request,
        MessageClass::Indication,
        MessageClass::SuccessResponse,
        MessageClass::ErrorResponse,
    ];

    // C1 C0
    fn bits(&self) -> u16 {
        *self as u16
    }

    fn from_bits(bits: u16) -> Self {
        Self::ALL[usize::from(bits & 0b11)]
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            MessageClass::Request => "request",
            MessageClass::Indication => "indication",
            MessageClass::SuccessResponse => "success response",
            MessageClass::ErrorResponse => "error response",
        })
    }
}

/// Builds a [`StunMessage`] attribute by attribute. The transaction ID is
/// random unless one is given.
///
/// # Examples
///```rust
/// # use stun_proto::{MessageClass, StunMessageBuilder};
/// # use stun_proto::attributes::stun::{Nonce, Software};
/// # use stun_proto::methods::BINDING;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let message = StunMessageBuilder::new(BINDING, MessageClass::Request)
///     .with_attribute(Software::new("relay")?)
///     .build();
///
/// let software = message
///     .get::<Software>()
///     .and_then(|attr| attr.as_software())
///     .ok_or("No SOFTWARE")?;
/// assert_eq!(software, "relay");
/// assert!(message.get::<Nonce>().is_none());
/// #
/// #   Ok(())
/// # }
///```
#[derive(Debug)]
pub struct StunMessageBuilder {
    method: MessageMethod,
    class: MessageClass,
    transaction_id: Option<TransactionId>,
    attributes: Vec<StunAttribute>,
}

impl StunMessageBuilder {
    /// Starts a message without attributes
    pub fn new(method: MessageMethod, class: MessageClass) -> Self {
        Self {
            method,
            class,
            transaction_id: None,
            attributes: Vec::new(),
        }
    }

    /// Uses `transaction_id` instead of a random one
    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Appends an attribute
    pub fn with_attribute<T>(mut self, attribute: T) -> Self
    where
        T: Into<StunAttribute>,
    {
        self.attributes.push(attribute.into());
        self
    }

    /// Finishes the message
    pub fn build(self) -> StunMessage {
        StunMessage {
            method: self.method,
            class: self.class,
            transaction_id: self.transaction_id.unwrap_or_default(),
            attributes: self.attributes,
            integrity: None,
            fingerprint: false,
        }
    }
}

/// A decoded or locally built STUN message.
///
/// The attribute list never contains `MESSAGE-INTEGRITY` or `FINGERPRINT`:
/// those trailers are added by the [`MessageEncoder`](crate::MessageEncoder)
/// and reported by [`StunMessage::integrity`] and
/// [`StunMessage::has_fingerprint`] after decoding. Equality only looks
/// at the method, class, transaction ID and attributes.
#[derive(Debug, Clone)]
pub struct StunMessage {
    method: MessageMethod,
    class: MessageClass,
    transaction_id: TransactionId,
    attributes: Vec<StunAttribute>,
    integrity: Option<MessageIntegrity>,
    fingerprint: bool,
}

impl PartialEq for StunMessage {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.class == other.class
            && self.transaction_id == other.transaction_id
            && self.attributes == other.attributes
    }
}

impl Eq for StunMessage {}

impl StunMessage {
    pub(crate) fn decoded(
        msg_type: MessageType,
        transaction_id: TransactionId,
        attributes: Vec<StunAttribute>,
        integrity: Option<MessageIntegrity>,
        fingerprint: bool,
    ) -> Self {
        Self {
            method: msg_type.method(),
            class: msg_type.class(),
            transaction_id,
            attributes,
            integrity,
            fingerprint,
        }
    }

    /// Method
    pub fn method(&self) -> MessageMethod {
        self.method
    }

    /// Returns the message class
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// Returns the message type
    pub fn message_type(&self) -> MessageType {
        MessageType::new(self.method, self.class)
    }

    /// Returns the transaction-id
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Attributes in wire order
    pub fn attributes(&self) -> &[StunAttribute] {
        &self.attributes
    }

    /// First attribute of type `A`, if any
    pub fn get<A>(&self) -> Option<&StunAttribute>
    where
        A: StunAttributeType,
    {
        self.attributes
            .iter()
            .find(|&attr| attr.attribute_type() == A::get_type())
    }

    /// Returns all the attributes of type `A` in the order they appear.
    ///
    /// # Examples
    ///```rust
    /// # use stun_proto::{MessageClass, StunMessageBuilder};
    /// # use stun_proto::attributes::turn::XorPeerAddress;
    /// # use stun_proto::methods::CREATE_PERMISSION;
    /// # use std::net::SocketAddr;
    /// let peer1: SocketAddr = "192.0.2.1:5000".parse().unwrap();
    /// let peer2: SocketAddr = "192.0.2.2:6000".parse().unwrap();
    /// let msg = StunMessageBuilder::new(CREATE_PERMISSION, MessageClass::Request)
    ///     .with_attribute(XorPeerAddress::from(peer1))
    ///     .with_attribute(XorPeerAddress::from(peer2))
    ///     .build();
    /// let peers: Vec<SocketAddr> = msg
    ///     .get_all::<XorPeerAddress>()
    ///     .filter_map(|attr| attr.as_xor_peer_address())
    ///     .map(|attr| *attr.socket_address())
    ///     .collect();
    /// assert_eq!(peers, vec![peer1, peer2]);
    ///```
    pub fn get_all<A>(&self) -> impl Iterator<Item = &StunAttribute>
    where
        A: StunAttributeType,
    {
        self.attributes
            .iter()
            .filter(|&attr| attr.attribute_type() == A::get_type())
    }

    /// Returns the types of the unknown attributes whose type lies in the
    /// comprehension-required range (0x0000-0x7FFF).
    pub fn unknown_comprehension_required(&self) -> Vec<AttributeType> {
        self.attributes
            .iter()
            .filter(|attr| attr.is_unknown())
            .map(|attr| attr.attribute_type())
            .filter(|attr_type| attr_type.is_comprehension_required())
            .collect()
    }

    /// Returns the `MESSAGE-INTEGRITY` found when this message was decoded.
    pub fn integrity(&self) -> Option<&MessageIntegrity> {
        self.integrity.as_ref()
    }

    /// Returns true if the decoded message carried a valid `FINGERPRINT`.
    pub fn has_fingerprint(&self) -> bool {
        self.fingerprint
    }
}
