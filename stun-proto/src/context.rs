use crate::attributes::integrity::{
    compute_fingerprint, compute_hmac, decode_fingerprint, MessageIntegrity, FINGERPRINT,
    FINGERPRINT_SIZE, MESSAGE_INTEGRITY, MESSAGE_INTEGRITY_SIZE,
};
use crate::attributes::{EncodeAttributeValue, Unknown};
use crate::common::{check_buffer_boundaries, padding, zero_padding};
use crate::error::{StunDecodeError, StunEncodeError, StunError, StunErrorLevel, StunErrorType};
use crate::raw::{input_text, RawAttributes, RawMessage, ATTRIBUTE_HEADER_SIZE, MESSAGE_HEADER_SIZE};
use crate::registry::get_handler;
use crate::types::{MAGIC_COOKIE, TRANSACTION_ID_SIZE};
use crate::{AttributeType, Decode, Encode, MessageType, TransactionId};
use crate::{HMACKey, StunMessage};
use byteorder::{BigEndian, ByteOrder};
use fallible_iterator::FallibleIterator;
use std::convert::TryFrom;

/// Sets up a [`DecoderContext`].
#[derive(Debug, Default)]
pub struct DecoderContextBuilder(DecoderContext);

impl DecoderContextBuilder {
    /// Key checked against `MESSAGE-INTEGRITY`
    pub fn with_key(mut self, key: HMACKey) -> Self {
        self.0.key = Some(key);
        self
    }

    /// Whether the decoder must verify `MESSAGE-INTEGRITY`. A message
    /// without it, or with an integrity that does not match the key,
    /// fails with [`StunErrorType::ValidationFailed`].
    pub fn with_validation(mut self) -> Self {
        self.0.validation = true;
        self
    }

    /// Finishes the [`DecoderContext`]
    pub fn build(self) -> DecoderContext {
        self.0
    }
}

/// Integrity settings of a [`MessageDecoder`]
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct DecoderContext {
    key: Option<HMACKey>,
    validation: bool,
}

impl DecoderContext {
    /// Long or short term key, if any
    pub fn key(&self) -> Option<&HMACKey> {
        self.key.as_ref()
    }

    /// Whether messages must carry a matching `MESSAGE-INTEGRITY`
    pub fn validate(&self) -> bool {
        self.validation
    }
}

#[derive(Debug)]
pub(crate) struct AttributeDecoderContext<'a> {
    transaction_id: &'a [u8; TRANSACTION_ID_SIZE],
    raw_value: &'a [u8],
}

impl<'a> AttributeDecoderContext<'a> {
    pub(crate) fn new(
        transaction_id: &'a [u8; TRANSACTION_ID_SIZE],
        raw_value: &'a [u8],
    ) -> Self {
        Self {
            transaction_id,
            raw_value,
        }
    }

    pub fn transaction_id(&self) -> &[u8; TRANSACTION_ID_SIZE] {
        self.transaction_id
    }

    pub fn raw_value(&self) -> &'a [u8] {
        self.raw_value
    }
}

/// Sets up a [`MessageDecoder`].
#[derive(Debug, Default)]
pub struct MessageDecoderBuilder(MessageDecoder);

impl MessageDecoderBuilder {
    /// Integrity settings to decode with
    pub fn with_context(mut self, ctx: DecoderContext) -> Self {
        self.0.ctx = Some(ctx);
        self
    }

    /// Finishes the [`MessageDecoder`]
    pub fn build(self) -> MessageDecoder {
        self.0
    }
}

/// Turns datagrams into [`StunMessage`]s.
#[derive(Debug, Default, Clone)]
pub struct MessageDecoder {
    ctx: Option<DecoderContext>,
}

fn message_error(error: StunError) -> StunDecodeError {
    StunDecodeError(StunErrorLevel::Message(error))
}

fn attribute_error(
    attr_type: Option<AttributeType>,
    position: usize,
) -> impl Fn(StunError) -> StunDecodeError {
    move |error| {
        StunDecodeError(StunErrorLevel::Attribute {
            attr_type,
            position,
            error,
        })
    }
}

impl MessageDecoder {
    /// Decodes the message at the start of `buffer` and returns it along
    /// with the number of bytes it took.
    ///
    /// Attributes that follow `MESSAGE-INTEGRITY` are ignored, except
    /// `FINGERPRINT`. A `FINGERPRINT` must be the last attribute and match
    /// the CRC-32 of the message.
    pub fn decode(&self, buffer: &[u8]) -> Result<(StunMessage, usize), StunDecodeError> {
        let (raw_msg, size) = RawMessage::decode(buffer).map_err(message_error)?;

        let msg_type = MessageType::from(raw_msg.header.msg_type);
        let transaction_id = raw_msg.header.transaction_id;

        let mut iter = RawAttributes::new(raw_msg.attributes);
        let mut attributes = Vec::new();
        let mut integrity: Option<MessageIntegrity> = None;
        let mut fingerprint = false;
        let mut offset = 0;
        let mut position = 0;

        while let Some(raw_attr) = iter.next().map_err(attribute_error(None, position))? {
            let attr_type = AttributeType::new(raw_attr.attr_type);
            let to_error = attribute_error(Some(attr_type), position);

            if fingerprint {
                return Err(to_error(StunError::new(
                    StunErrorType::ValidationFailed,
                    "FINGERPRINT is not the last attribute",
                )));
            }

            let start = MESSAGE_HEADER_SIZE + offset;
            if raw_attr.attr_type == FINGERPRINT {
                let crc = decode_fingerprint(raw_attr.value).map_err(&to_error)?;
                let input = input_text(buffer, start, iter.pos()).map_err(&to_error)?;
                if compute_fingerprint(&input) != crc {
                    return Err(to_error(StunError::new(
                        StunErrorType::ValidationFailed,
                        "FINGERPRINT mismatch",
                    )));
                }
                fingerprint = true;
            } else if integrity.is_some() {
                // Ignored: follows MESSAGE-INTEGRITY
            } else if raw_attr.attr_type == MESSAGE_INTEGRITY {
                let input = input_text(buffer, start, iter.pos()).map_err(&to_error)?;
                integrity =
                    Some(MessageIntegrity::from_raw(raw_attr.value, input).map_err(&to_error)?);
            } else {
                let ctx = AttributeDecoderContext::new(transaction_id, raw_attr.value);
                let attr = match get_handler(attr_type) {
                    Some(handler) => handler(ctx).map_err(&to_error)?.0,
                    None => Unknown::new(raw_attr.attr_type, raw_attr.value).into(),
                };
                attributes.push(attr);
            }

            offset = iter.pos();
            position += 1;
        }

        if let Some(ctx) = self.ctx.as_ref().filter(|ctx| ctx.validate()) {
            let verified = match (ctx.key(), integrity.as_ref()) {
                (Some(key), Some(integrity)) => integrity.verify(key),
                _ => false,
            };
            if !verified {
                return Err(message_error(StunError::new(
                    StunErrorType::ValidationFailed,
                    "MESSAGE-INTEGRITY validation failed",
                )));
            }
        }

        let msg = StunMessage::decoded(
            msg_type,
            TransactionId::from(transaction_id),
            attributes,
            integrity,
            fingerprint,
        );
        Ok((msg, size))
    }

    /// Integrity settings, if any were given
    pub fn get_context(&self) -> Option<&DecoderContext> {
        self.ctx.as_ref()
    }
}

#[derive(Debug)]
pub(crate) struct AttributeEncoderContext<'a> {
    transaction_id: &'a TransactionId,
    raw_value: &'a mut [u8],
}

impl<'a> AttributeEncoderContext<'a> {
    pub(crate) fn new(transaction_id: &'a TransactionId, raw_value: &'a mut [u8]) -> Self {
        Self {
            transaction_id,
            raw_value,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        self.transaction_id
    }

    pub fn raw_value_mut(&mut self) -> &mut [u8] {
        self.raw_value
    }
}

/// Sets up a [`MessageEncoder`].
///
/// # Examples
///```rust
/// # use stun_proto::{HMACKey, MessageClass, MessageEncoderBuilder, StunMessageBuilder};
/// # use stun_proto::methods::BINDING;
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let msg = StunMessageBuilder::new(BINDING, MessageClass::Request).build();
///
/// let encoder = MessageEncoderBuilder::default().with_fingerprint().build();
/// let buffer = encoder.encode_to_vec(&msg)?;
/// // Header plus FINGERPRINT
/// assert_eq!(buffer.len(), 28);
///
/// let key = HMACKey::new_short_term("secret")?;
/// let encoder = MessageEncoderBuilder::default()
///     .with_integrity(key)
///     .with_fingerprint()
///     .build();
/// let buffer = encoder.encode_to_vec(&msg)?;
/// // Header, MESSAGE-INTEGRITY and FINGERPRINT
/// assert_eq!(buffer.len(), 52);
/// #
/// #   Ok(())
/// # }
///```
#[derive(Debug, Default)]
pub struct MessageEncoderBuilder(MessageEncoder);

impl MessageEncoderBuilder {
    /// Appends a `MESSAGE-INTEGRITY` computed with `key` to every message.
    pub fn with_integrity(mut self, key: HMACKey) -> Self {
        self.0.integrity = Some(key);
        self
    }

    /// Appends a `FINGERPRINT` to every message, after `MESSAGE-INTEGRITY`
    /// if any.
    pub fn with_fingerprint(mut self) -> Self {
        self.0.fingerprint = true;
        self
    }

    /// Finishes the [`MessageEncoder`]
    pub fn build(self) -> MessageEncoder {
        self.0
    }
}

/// Serializes [`StunMessage`]s, appending the configured trailers.
#[derive(Debug, Default, Clone)]
pub struct MessageEncoder {
    integrity: Option<HMACKey>,
    fingerprint: bool,
}

fn encode_message_error(error: StunError) -> StunEncodeError {
    StunEncodeError(StunErrorLevel::Message(error))
}

fn write_length(buffer: &mut [u8], index: usize) -> Result<(), StunEncodeError> {
    let length = u16::try_from(index - MESSAGE_HEADER_SIZE).map_err(|_| {
        encode_message_error(StunError::new(
            StunErrorType::ValueTooLong,
            format!(
                "Message length {} does not fit in 16 bits",
                index - MESSAGE_HEADER_SIZE
            ),
        ))
    })?;
    BigEndian::write_u16(&mut buffer[2..4], length);
    Ok(())
}

impl MessageEncoder {
    /// Returns the number of bytes `msg` takes once encoded with this encoder.
    pub fn encoded_size(&self, msg: &StunMessage) -> usize {
        let attributes: usize = msg
            .attributes()
            .iter()
            .map(|attr| {
                let value_size = attr.encoded_size();
                ATTRIBUTE_HEADER_SIZE + value_size + padding(value_size)
            })
            .sum();
        let integrity = if self.integrity.is_some() {
            ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE
        } else {
            0
        };
        let fingerprint = if self.fingerprint {
            ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE
        } else {
            0
        };
        MESSAGE_HEADER_SIZE + attributes + integrity + fingerprint
    }

    /// Writes `msg` at the start of `buffer` and returns its size.
    ///
    /// Fails with [`StunErrorType::SmallBuffer`] when `buffer` is shorter
    /// than [`encoded_size`](Self::encoded_size).
    pub fn encode(&self, buffer: &mut [u8], msg: &StunMessage) -> Result<usize, StunEncodeError> {
        check_buffer_boundaries(buffer, MESSAGE_HEADER_SIZE).map_err(encode_message_error)?;

        msg.message_type()
            .encode(buffer)
            .map_err(encode_message_error)?;
        BigEndian::write_u16(&mut buffer[2..4], 0);
        BigEndian::write_u32(&mut buffer[4..8], MAGIC_COOKIE);
        buffer[8..MESSAGE_HEADER_SIZE].copy_from_slice(msg.transaction_id().as_bytes());

        let mut index = MESSAGE_HEADER_SIZE;
        for (position, attr) in (0..).zip(msg.attributes()) {
            let attr_type = attr.attribute_type();
            let to_error = |error| {
                StunEncodeError(StunErrorLevel::Attribute {
                    attr_type: Some(attr_type),
                    position,
                    error,
                })
            };

            let attributes = &mut buffer[index..];
            check_buffer_boundaries(attributes, ATTRIBUTE_HEADER_SIZE).map_err(to_error)?;

            let ctx = AttributeEncoderContext::new(
                msg.transaction_id(),
                &mut attributes[ATTRIBUTE_HEADER_SIZE..],
            );
            let value_size = attr.encode(ctx).map_err(to_error)?;
            let length = u16::try_from(value_size).map_err(|_| {
                to_error(StunError::new(
                    StunErrorType::ValueTooLong,
                    format!("Attribute value size {} does not fit in 16 bits", value_size),
                ))
            })?;

            BigEndian::write_u16(&mut attributes[..2], attr_type.as_u16());
            BigEndian::write_u16(&mut attributes[2..4], length);

            let value_end = ATTRIBUTE_HEADER_SIZE + value_size;
            let padded = padding(value_size);
            zero_padding(&mut attributes[value_end..], padded).map_err(to_error)?;

            index += value_end + padded;
        }

        if let Some(key) = &self.integrity {
            let end = index + ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE;
            check_buffer_boundaries(buffer, end).map_err(encode_message_error)?;
            // The length covers MESSAGE-INTEGRITY before computing the HMAC
            write_length(buffer, end)?;
            let hmac = compute_hmac(key, &buffer[..index]);
            BigEndian::write_u16(&mut buffer[index..index + 2], MESSAGE_INTEGRITY);
            BigEndian::write_u16(&mut buffer[index + 2..index + 4], MESSAGE_INTEGRITY_SIZE as u16);
            buffer[index + ATTRIBUTE_HEADER_SIZE..end].copy_from_slice(&hmac);
            index = end;
        }

        if self.fingerprint {
            let end = index + ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE;
            check_buffer_boundaries(buffer, end).map_err(encode_message_error)?;
            write_length(buffer, end)?;
            let crc = compute_fingerprint(&buffer[..index]);
            BigEndian::write_u16(&mut buffer[index..index + 2], FINGERPRINT);
            BigEndian::write_u16(&mut buffer[index + 2..index + 4], FINGERPRINT_SIZE as u16);
            BigEndian::write_u32(&mut buffer[index + ATTRIBUTE_HEADER_SIZE..end], crc);
            index = end;
        }

        write_length(buffer, index)?;
        Ok(index)
    }

    /// Encodes a STUN message into a new buffer of the exact size.
    pub fn encode_to_vec(&self, msg: &StunMessage) -> Result<Vec<u8>, StunEncodeError> {
        let mut buffer = vec![0u8; self.encoded_size(msg)];
        let size = self.encode(&mut buffer, msg)?;
        buffer.truncate(size);
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::stun::{Software, UserName};
    use crate::attributes::turn::{LifeTime, XorPeerAddress};
    use crate::methods::{BINDING, CREATE_PERMISSION};
    use crate::{MessageClass, StunAttributeType, StunMessageBuilder};

    fn sample_message() -> StunMessage {
        StunMessageBuilder::new(BINDING, MessageClass::Request)
            .with_transaction_id(TransactionId::from([0x01; TRANSACTION_ID_SIZE]))
            .with_attribute(Software::new("test").expect("Can not create Software"))
            .with_attribute(LifeTime::new(600))
            .build()
    }

    #[test]
    fn encode_decode() {
        let msg = sample_message();
        let encoder = MessageEncoder::default();
        let buffer = encoder.encode_to_vec(&msg).expect("Can not encode");
        assert_eq!(buffer.len(), 36);
        assert_eq!(&buffer[..4], &[0x00, 0x01, 0x00, 0x10]);

        let (decoded, size) = MessageDecoder::default()
            .decode(&buffer)
            .expect("Can not decode");
        assert_eq!(size, 36);
        assert_eq!(decoded, msg);
        assert!(decoded.integrity().is_none());
        assert!(!decoded.has_fingerprint());
    }

    #[test]
    fn encode_small_buffer() {
        let msg = sample_message();
        let mut buffer = [0u8; 19];
        assert_eq!(
            MessageEncoder::default()
                .encode(&mut buffer, &msg)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::SmallBuffer
        );

        let mut buffer = [0u8; 30];
        let error = MessageEncoder::default()
            .encode(&mut buffer, &msg)
            .expect_err("Error expected");
        match error.0 {
            StunErrorLevel::Attribute {
                attr_type,
                position,
                ..
            } => {
                assert_eq!(attr_type, Some(LifeTime::get_type()));
                assert_eq!(position, 1);
            }
            _ => panic!("Attribute error expected"),
        }
    }

    #[test]
    fn integrity_and_fingerprint() {
        let key = HMACKey::new_long_term("user", "realm", "pass").expect("Can not create key");
        let msg = sample_message();
        let encoder = MessageEncoderBuilder::default()
            .with_integrity(key.clone())
            .with_fingerprint()
            .build();
        let buffer = encoder.encode_to_vec(&msg).expect("Can not encode");
        assert_eq!(buffer.len(), 36 + 24 + 8);
        assert_eq!(BigEndian::read_u16(&buffer[36..38]), MESSAGE_INTEGRITY);
        assert_eq!(BigEndian::read_u16(&buffer[60..62]), FINGERPRINT);

        let (decoded, _) = MessageDecoder::default()
            .decode(&buffer)
            .expect("Can not decode");
        assert_eq!(decoded, msg);
        assert!(decoded.has_fingerprint());
        let integrity = decoded.integrity().expect("MESSAGE-INTEGRITY expected");
        assert!(integrity.verify(&key));
        let other = HMACKey::new_long_term("user", "realm", "other").expect("Can not create key");
        assert!(!integrity.verify(&other));

        // Decoder with validation
        let ctx = DecoderContextBuilder::default()
            .with_key(key.clone())
            .with_validation()
            .build();
        let decoder = MessageDecoderBuilder::default().with_context(ctx).build();
        assert!(decoder.decode(&buffer).is_ok());

        let ctx = DecoderContextBuilder::default()
            .with_key(other)
            .with_validation()
            .build();
        let decoder = MessageDecoderBuilder::default().with_context(ctx).build();
        assert_eq!(
            decoder
                .decode(&buffer)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::ValidationFailed
        );

        // Validation requires MESSAGE-INTEGRITY
        let plain = MessageEncoder::default()
            .encode_to_vec(&msg)
            .expect("Can not encode");
        let ctx = DecoderContextBuilder::default()
            .with_key(key)
            .with_validation()
            .build();
        let decoder = MessageDecoderBuilder::default().with_context(ctx).build();
        assert_eq!(
            decoder
                .decode(&plain)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::ValidationFailed
        );
        assert!(UserName::get_type().is_comprehension_required());
    }

    #[test]
    fn fingerprint_mismatch() {
        let msg = sample_message();
        let encoder = MessageEncoderBuilder::default().with_fingerprint().build();
        let mut buffer = encoder.encode_to_vec(&msg).expect("Can not encode");
        let last = buffer.len() - 1;
        buffer[last] ^= 0x01;
        assert_eq!(
            MessageDecoder::default()
                .decode(&buffer)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::ValidationFailed
        );
    }

    #[test]
    fn fingerprint_not_last() {
        let buffer = [
            0x00, 0x01, 0x00, 0x10, // Binding request, length 16
            0x21, 0x12, 0xa4, 0x42, // Magic cookie
            0x01, 0x01, 0x01, 0x01, // }
            0x01, 0x01, 0x01, 0x01, // } Transaction ID
            0x01, 0x01, 0x01, 0x01, // }
            0x80, 0x28, 0x00, 0x04, // FINGERPRINT header
            0x00, 0x00, 0x00, 0x00, // CRC (wrong and not last)
            0x00, 0x0d, 0x00, 0x04, // LIFETIME header
            0x00, 0x00, 0x02, 0x58, // 600 seconds
        ];
        assert_eq!(
            MessageDecoder::default()
                .decode(&buffer)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::ValidationFailed
        );
    }

    #[test]
    fn attributes_after_integrity_are_ignored() {
        let key = HMACKey::new_short_term("secret").expect("Can not create key");
        let msg = sample_message();
        let encoder = MessageEncoderBuilder::default()
            .with_integrity(key.clone())
            .build();
        let mut buffer = encoder.encode_to_vec(&msg).expect("Can not encode");
        // Append a LIFETIME after MESSAGE-INTEGRITY and fix up the length
        buffer.extend_from_slice(&[0x00, 0x0d, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]);
        let length = (buffer.len() - MESSAGE_HEADER_SIZE) as u16;
        BigEndian::write_u16(&mut buffer[2..4], length);

        let (decoded, _) = MessageDecoder::default()
            .decode(&buffer)
            .expect("Can not decode");
        assert_eq!(decoded.attributes().len(), 2);
        let integrity = decoded.integrity().expect("MESSAGE-INTEGRITY expected");
        assert!(integrity.verify(&key));
    }

    #[test]
    fn invalid_headers() {
        let mut buffer = MessageEncoder::default()
            .encode_to_vec(&sample_message())
            .expect("Can not encode");

        let mut wrong_bits = buffer.clone();
        wrong_bits[0] |= 0x80;
        assert_eq!(
            MessageDecoder::default()
                .decode(&wrong_bits)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::InvalidParam
        );

        buffer[4] = 0x00;
        assert_eq!(
            MessageDecoder::default()
                .decode(&buffer)
                .expect_err("Error expected")
                .error_type(),
            StunErrorType::InvalidParam
        );
    }

    #[test]
    fn unknown_attributes_keep_their_value() {
        let buffer = [
            0x00, 0x01, 0x00, 0x08, // Binding request, length 8
            0x21, 0x12, 0xa4, 0x42, // Magic cookie
            0x01, 0x01, 0x01, 0x01, // }
            0x01, 0x01, 0x01, 0x01, // } Transaction ID
            0x01, 0x01, 0x01, 0x01, // }
            0x7f, 0xf0, 0x00, 0x03, // Unknown attribute
            0x01, 0x02, 0x03, 0x00, // Value and padding
        ];
        let (msg, _) = MessageDecoder::default()
            .decode(&buffer)
            .expect("Can not decode");
        let unknown = msg.attributes()[0]
            .as_unknown()
            .expect("Unknown attribute expected");
        assert_eq!(unknown.value(), &[0x01, 0x02, 0x03]);
        assert_eq!(
            msg.unknown_comprehension_required(),
            vec![AttributeType::new(0x7ff0)]
        );

        let encoded = MessageEncoder::default()
            .encode_to_vec(&msg)
            .expect("Can not encode");
        assert_eq!(&encoded[..], &buffer[..]);
    }

    #[test]
    fn malformed_attribute_reports_position() {
        let peer: std::net::SocketAddr = "192.0.2.1:5000".parse().expect("Invalid address");
        let msg = StunMessageBuilder::new(CREATE_PERMISSION, MessageClass::Request)
            .with_attribute(XorPeerAddress::from(peer))
            .build();
        let mut buffer = MessageEncoder::default()
            .encode_to_vec(&msg)
            .expect("Can not encode");
        // Invalid address family
        buffer[25] = 0x05;
        let error = MessageDecoder::default()
            .decode(&buffer)
            .expect_err("Error expected");
        match error.0 {
            StunErrorLevel::Attribute {
                attr_type,
                position,
                ..
            } => {
                assert_eq!(attr_type, Some(XorPeerAddress::get_type()));
                assert_eq!(position, 0);
            }
            _ => panic!("Attribute error expected"),
        }
    }
}
