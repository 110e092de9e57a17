//! STUN attributes defined in [`RFC5389`](https://datatracker.ietf.org/doc/html/rfc5389).

use crate::attributes::address::xor_socket_addr_attribute;
use crate::attributes::{
    attribute_type, AttributeType, DecodeAttributeValue, EncodeAttributeValue,
};
use crate::common::check_buffer_boundaries;
use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::{StunError, StunErrorType};
use crate::registry::DecoderRegistry;
use crate::strings::{check_text_limits, opaque_string_enforce, opaque_string_prepare};
use crate::{Decode, Encode};
use byteorder::{BigEndian, ByteOrder};
use std::convert::TryFrom;

/// `USERNAME` attribute type
pub const USERNAME: u16 = 0x0006;
/// `ERROR-CODE` attribute type
pub const ERROR_CODE: u16 = 0x0009;
/// `UNKNOWN-ATTRIBUTES` attribute type
pub const UNKNOWN_ATTRIBUTES: u16 = 0x000A;
/// `REALM` attribute type
pub const REALM: u16 = 0x0014;
/// `NONCE` attribute type
pub const NONCE: u16 = 0x0015;
/// `XOR-MAPPED-ADDRESS` attribute type
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;
/// `SOFTWARE` attribute type
pub const SOFTWARE: u16 = 0x8022;

const MAX_USERNAME_SIZE: usize = 512;
const MAX_TEXT_DECODED_SIZE: usize = 763;
const MAX_TEXT_CHARS: usize = 127;

// Text attributes compare by value and can be checked against plain strings.
macro_rules! text_attribute_common {
    ($class_name:ident) => {
        impl $class_name {
            /// Returns a slice representation of the value
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl AsRef<str> for $class_name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl PartialEq<str> for $class_name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $class_name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$class_name> for &str {
            fn eq(&self, other: &$class_name) -> bool {
                *self == other.0
            }
        }

        impl TryFrom<&str> for $class_name {
            type Error = StunError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                $class_name::new(value)
            }
        }

        impl EncodeAttributeValue for $class_name {
            fn encoded_size(&self) -> usize {
                self.0.len()
            }

            fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
                self.0.as_str().encode(ctx.raw_value_mut())
            }
        }
    };
}

fn decode_text(raw_value: &[u8], max_size: usize) -> Result<(&str, usize), StunError> {
    let (value, size) = <&str>::decode(raw_value)?;
    if size > max_size {
        return Err(StunError::new(
            StunErrorType::ValueTooLong,
            format!("Value length {} > max. decoded size {}", size, max_size),
        ));
    }
    Ok((value, size))
}

/// The `USERNAME` attribute identifies the username and password
/// combination used in the message-integrity check. The value is processed
/// with the `OpaqueString` profile [`RFC8265`](https://datatracker.ietf.org/doc/html/rfc8265)
/// and must be shorter than 513 bytes.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::stun::UserName;
/// # use stun_proto::StunErrorType;
/// let user_name = UserName::new("username").unwrap();
/// assert_eq!(user_name, "username");
///
/// // Control characters are disallowed by the OpaqueString profile
/// let result = UserName::new("user\u{0009}name");
/// assert_eq!(result.expect_err("Error expected"), StunErrorType::InvalidParam);
///```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserName(String);

impl UserName {
    /// Creates a [`UserName`] if the value can be processed with the
    /// `OpaqueString` profile and fits in the attribute.
    pub fn new<S>(value: S) -> Result<Self, StunError>
    where
        S: AsRef<str>,
    {
        let name = opaque_string_prepare(value.as_ref())?;
        check_text_limits(&name, MAX_USERNAME_SIZE, None)?;
        Ok(UserName(String::from(name.as_ref())))
    }
}

text_attribute_common!(UserName);

impl DecodeAttributeValue for UserName {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (value, size) = decode_text(ctx.raw_value(), MAX_TEXT_DECODED_SIZE)?;
        let name = opaque_string_enforce(value)?;
        Ok((UserName(String::from(name.as_ref())), size))
    }
}

attribute_type!(UserName, USERNAME);

/// The `REALM` attribute. Its presence in a request indicates that
/// long-term credentials are being used for authentication. The value is
/// fewer than 128 characters and processed with `OpaqueString`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Realm(String);

impl Realm {
    /// Creates a new [`Realm`] attribute
    pub fn new<S>(value: S) -> Result<Self, StunError>
    where
        S: AsRef<str>,
    {
        let realm = opaque_string_prepare(value.as_ref())?;
        check_text_limits(&realm, MAX_TEXT_DECODED_SIZE, Some(MAX_TEXT_CHARS))?;
        Ok(Realm(String::from(realm.as_ref())))
    }
}

text_attribute_common!(Realm);

impl DecodeAttributeValue for Realm {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (value, size) = decode_text(ctx.raw_value(), MAX_TEXT_DECODED_SIZE)?;
        check_text_limits(value, MAX_TEXT_DECODED_SIZE, Some(MAX_TEXT_CHARS))?;
        let realm = opaque_string_enforce(value)?;
        Ok((Realm(String::from(realm.as_ref())), size))
    }
}

attribute_type!(Realm, REALM);

/// The `NONCE` attribute. An opaque value chosen by the server, fewer
/// than 128 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    /// Creates a new [`Nonce`] attribute
    pub fn new<S>(value: S) -> Result<Self, StunError>
    where
        S: AsRef<str>,
    {
        let value = value.as_ref();
        check_text_limits(value, MAX_TEXT_DECODED_SIZE, Some(MAX_TEXT_CHARS))?;
        Ok(Nonce(String::from(value)))
    }
}

text_attribute_common!(Nonce);

impl DecodeAttributeValue for Nonce {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (value, size) = decode_text(ctx.raw_value(), MAX_TEXT_DECODED_SIZE)?;
        check_text_limits(value, MAX_TEXT_DECODED_SIZE, Some(MAX_TEXT_CHARS))?;
        Ok((Nonce(String::from(value)), size))
    }
}

attribute_type!(Nonce, NONCE);

/// The `SOFTWARE` attribute contains a textual description of the software
/// being used by the agent sending the message.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::stun::Software;
/// let software = Software::new("test-software").unwrap();
/// assert_eq!(software, "test-software");
///```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Software(String);

impl Software {
    /// Creates a new [`Software`] attribute
    pub fn new<S>(value: S) -> Result<Self, StunError>
    where
        S: AsRef<str>,
    {
        let value = value.as_ref();
        check_text_limits(value, MAX_TEXT_DECODED_SIZE, Some(MAX_TEXT_CHARS))?;
        Ok(Software(String::from(value)))
    }
}

text_attribute_common!(Software);

impl DecodeAttributeValue for Software {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (value, size) = decode_text(ctx.raw_value(), MAX_TEXT_DECODED_SIZE)?;
        check_text_limits(value, MAX_TEXT_DECODED_SIZE, Some(MAX_TEXT_CHARS))?;
        Ok((Software(String::from(value)), size))
    }
}

attribute_type!(Software, SOFTWARE);

/// The `ERROR-CODE` attribute is used in error response messages.
///
/// # Examples
///```rust
/// # use stun_proto::attributes::stun::ErrorCode;
/// let attr = ErrorCode::from(stun_proto::ErrorCode::from_code(437).unwrap());
/// assert_eq!(attr.error_code().error_code(), 437);
///```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode(crate::types::ErrorCode);

impl ErrorCode {
    /// Creates a new attribute
    pub fn new(error_code: crate::types::ErrorCode) -> Self {
        Self(error_code)
    }

    /// Returns the error code carried by this attribute
    pub fn error_code(&self) -> &crate::types::ErrorCode {
        &self.0
    }
}

impl From<crate::types::ErrorCode> for ErrorCode {
    fn from(value: crate::types::ErrorCode) -> Self {
        ErrorCode::new(value)
    }
}

impl DecodeAttributeValue for ErrorCode {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let (error_code, size) = crate::types::ErrorCode::decode(ctx.raw_value())?;
        Ok((ErrorCode(error_code), size))
    }
}

impl EncodeAttributeValue for ErrorCode {
    fn encoded_size(&self) -> usize {
        self.0.encoded_size()
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        self.0.encode(ctx.raw_value_mut())
    }
}

attribute_type!(ErrorCode, ERROR_CODE);

/// The `UNKNOWN-ATTRIBUTES` attribute is present only in an error
/// response when the response code in the `ERROR-CODE` attribute is 420.
/// It lists the comprehension-required attributes that were not understood.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownAttributes(Vec<AttributeType>);

impl UnknownAttributes {
    /// Adds an attribute type to the list, ignoring duplicates.
    pub fn add(&mut self, attr_type: AttributeType) {
        if !self.0.contains(&attr_type) {
            self.0.push(attr_type);
        }
    }

    /// Returns the list of attribute types
    pub fn attributes(&self) -> &[AttributeType] {
        &self.0
    }
}

impl From<&[AttributeType]> for UnknownAttributes {
    fn from(values: &[AttributeType]) -> Self {
        let mut attr = UnknownAttributes::default();
        values.iter().for_each(|t| attr.add(*t));
        attr
    }
}

impl DecodeAttributeValue for UnknownAttributes {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError> {
        let raw_value = ctx.raw_value();
        if raw_value.len() % 2 != 0 {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Odd UNKNOWN-ATTRIBUTES size {}", raw_value.len()),
            ));
        }
        let mut attr = UnknownAttributes::default();
        raw_value
            .chunks_exact(2)
            .for_each(|chunk| attr.add(AttributeType::new(BigEndian::read_u16(chunk))));
        Ok((attr, raw_value.len()))
    }
}

impl EncodeAttributeValue for UnknownAttributes {
    fn encoded_size(&self) -> usize {
        self.0.len() * 2
    }

    fn encode(&self, mut ctx: AttributeEncoderContext) -> Result<usize, StunError> {
        let size = self.encoded_size();
        let raw_value = ctx.raw_value_mut();
        check_buffer_boundaries(raw_value, size)?;
        for (chunk, attr_type) in raw_value[..size].chunks_exact_mut(2).zip(self.0.iter()) {
            BigEndian::write_u16(chunk, attr_type.as_u16());
        }
        Ok(size)
    }
}

attribute_type!(UnknownAttributes, UNKNOWN_ATTRIBUTES);

xor_socket_addr_attribute!(
    /// The `XOR-MAPPED-ADDRESS` attribute carries the reflexive transport
    /// address of the client, obfuscated through the XOR function.
    ///
    /// # Examples
    ///```rust
    /// # use std::net::SocketAddr;
    /// # use stun_proto::attributes::stun::XorMappedAddress;
    /// let addr: SocketAddr = "192.0.2.1:32853".parse().unwrap();
    /// let attr = XorMappedAddress::from(addr);
    /// assert_eq!(attr.socket_address(), &addr);
    ///```
    XorMappedAddress,
    XOR_MAPPED_ADDRESS,
);

pub(crate) fn register(registry: &mut DecoderRegistry) {
    registry
        .add::<UserName>()
        .add::<ErrorCode>()
        .add::<UnknownAttributes>()
        .add::<Realm>()
        .add::<Nonce>()
        .add::<XorMappedAddress>()
        .add::<Software>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::StunAttributeType;
    use crate::TransactionId;
    use std::net::SocketAddr;

    fn decode_value<A: DecodeAttributeValue>(raw_value: &[u8]) -> Result<(A, usize), StunError> {
        let transaction_id = [0u8; 12];
        A::decode(AttributeDecoderContext::new(&transaction_id, raw_value))
    }

    fn encode_value<A: EncodeAttributeValue>(attr: &A, buffer: &mut [u8]) -> Result<usize, StunError> {
        let transaction_id = TransactionId::from([0u8; 12]);
        attr.encode(AttributeEncoderContext::new(&transaction_id, buffer))
    }

    #[test]
    fn user_name() {
        let attr = UserName::new("user").expect("Can not create USERNAME");
        assert_eq!(attr, "user");
        assert_eq!("user", attr);
        assert_eq!(attr.attribute_type(), AttributeType::new(USERNAME));

        assert!(UserName::new("x".repeat(MAX_USERNAME_SIZE)).is_ok());
        assert_eq!(
            UserName::new("x".repeat(MAX_USERNAME_SIZE + 1)).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );

        let (attr, size) = decode_value::<UserName>(b"user").expect("Can not decode USERNAME");
        assert_eq!(size, 4);
        assert_eq!(attr.as_str(), "user");

        assert_eq!(
            decode_value::<UserName>(&[0xff, 0xfe]).expect_err("Error expected"),
            StunErrorType::InvalidParam
        );
    }

    #[test]
    fn realm_and_nonce_limits() {
        assert!(Realm::new("example.org").is_ok());
        assert!(Realm::new("x".repeat(MAX_TEXT_CHARS)).is_ok());
        assert_eq!(
            Realm::new("x".repeat(MAX_TEXT_CHARS + 1)).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );
        assert_eq!(
            Nonce::new("n".repeat(MAX_TEXT_CHARS + 1)).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );

        let raw = "n".repeat(MAX_TEXT_CHARS + 1);
        assert_eq!(
            decode_value::<Nonce>(raw.as_bytes()).expect_err("Error expected"),
            StunErrorType::ValueTooLong
        );
    }

    #[test]
    fn software() {
        let attr = Software::new("test").expect("Can not create SOFTWARE");
        assert_eq!(attr.encoded_size(), 4);
        let mut buffer = [0u8; 4];
        assert_eq!(encode_value(&attr, &mut buffer), Ok(4));
        assert_eq!(&buffer, b"test");

        let mut buffer = [0u8; 3];
        assert_eq!(
            encode_value(&attr, &mut buffer).expect_err("Error expected"),
            StunErrorType::SmallBuffer
        );
    }

    #[test]
    fn error_code() {
        let attr = ErrorCode::from(
            crate::types::ErrorCode::from_code(420).expect("Can not create error code"),
        );
        assert_eq!(attr.encoded_size(), 4 + "Unknown Attribute".len());
        let mut buffer = [0u8; 32];
        let size = encode_value(&attr, &mut buffer).expect("Can not encode ERROR-CODE");
        assert_eq!(&buffer[..4], &[0x00, 0x00, 0x04, 0x14]);

        let (decoded, _) = decode_value::<ErrorCode>(&buffer[..size]).expect("Can not decode");
        assert_eq!(decoded, attr);
    }

    #[test]
    fn unknown_attributes() {
        let types = [
            AttributeType::new(0x0031),
            AttributeType::new(0x0032),
            AttributeType::new(0x0031),
        ];
        let attr = UnknownAttributes::from(&types[..]);
        assert_eq!(attr.attributes().len(), 2);
        assert_eq!(attr.encoded_size(), 4);

        let mut buffer = [0u8; 4];
        assert_eq!(encode_value(&attr, &mut buffer), Ok(4));
        assert_eq!(buffer, [0x00, 0x31, 0x00, 0x32]);

        let (decoded, size) = decode_value::<UnknownAttributes>(&buffer).expect("Can not decode");
        assert_eq!(size, 4);
        assert_eq!(decoded, attr);

        assert_eq!(
            decode_value::<UnknownAttributes>(&buffer[..3]).expect_err("Error expected"),
            StunErrorType::InvalidParam
        );
    }

    #[test]
    fn xor_mapped_address() {
        let addr: SocketAddr = "192.0.2.1:32853".parse().expect("Invalid address");
        let attr = XorMappedAddress::from(addr);
        assert_eq!(attr.encoded_size(), 8);
        assert_eq!(attr.attribute_type(), XorMappedAddress::get_type());

        let mut buffer = [0u8; 8];
        assert_eq!(encode_value(&attr, &mut buffer), Ok(8));
        let (decoded, _) = decode_value::<XorMappedAddress>(&buffer).expect("Can not decode");
        assert_eq!(decoded.socket_address(), &addr);
    }
}
