//! STUN/TURN wire codec.
//!
//! This crate encodes and decodes the messages a TURN relay exchanges with
//! its clients. The implementation is based on:
//! * [`RFC5389`](https://datatracker.ietf.org/doc/html/rfc5389). Session Traversal Utilities for NAT (STUN).
//! * [`RFC8656`](https://datatracker.ietf.org/doc/html/rfc8656). Traversal Using Relays around NAT (TURN).
//! * [`RFC5769`](https://datatracker.ietf.org/doc/html/rfc5769). Test Vectors for STUN.
//!
//! # Usage
//! Encode an authenticated Allocate request:
//!```rust
//! # use stun_proto::attributes::stun::{Nonce, Realm, UserName};
//! # use stun_proto::attributes::turn::RequestedTransport;
//! # use stun_proto::{HMACKey, MessageClass, MessageEncoderBuilder, StunMessageBuilder};
//! # use stun_proto::methods::ALLOCATE;
//! # use stun_proto::protocols::UDP;
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let key = HMACKey::new_long_term("user", "example.org", "secret")?;
//! let msg = StunMessageBuilder::new(ALLOCATE, MessageClass::Request)
//!     .with_attribute(RequestedTransport::new(UDP))
//!     .with_attribute(UserName::new("user")?)
//!     .with_attribute(Realm::new("example.org")?)
//!     .with_attribute(Nonce::new("f//499k954d6OL34oL9FSTvy64sA")?)
//!     .build();
//!
//! let encoder = MessageEncoderBuilder::default()
//!     .with_integrity(key)
//!     .with_fingerprint()
//!     .build();
//! let buffer = encoder.encode_to_vec(&msg)?;
//! assert_eq!(buffer.len() % 4, 0);
//! #
//! #   Ok(())
//! # }
//!```
//!
//! Decode it back and check its integrity once the key is known:
//!```rust
//! # use stun_proto::attributes::stun::UserName;
//! # use stun_proto::{HMACKey, MessageClass, MessageDecoder, MessageEncoderBuilder, StunMessageBuilder};
//! # use stun_proto::methods::REFRESH;
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! # let key = HMACKey::new_long_term("user", "example.org", "secret")?;
//! # let msg = StunMessageBuilder::new(REFRESH, MessageClass::Request)
//! #     .with_attribute(UserName::new("user")?)
//! #     .build();
//! # let buffer = MessageEncoderBuilder::default().with_integrity(key.clone()).build().encode_to_vec(&msg)?;
//! let (decoded, size) = MessageDecoder::default().decode(&buffer)?;
//! assert_eq!(size, buffer.len());
//! assert_eq!(decoded, msg);
//!
//! let integrity = decoded.integrity().ok_or("MESSAGE-INTEGRITY not found")?;
//! assert!(integrity.verify(&key));
//! #
//! #   Ok(())
//! # }
//!```

#![deny(missing_docs)]

mod channel_data;
mod common;
mod context;
mod message;
mod raw;
mod registry;
mod strings;
mod types;

pub mod attributes;
pub mod error;
pub mod methods;
pub mod protocols;

pub use crate::attributes::{AttributeType, StunAttribute, StunAttributeType};
pub use crate::channel_data::{
    is_channel_data, is_stun_message, ChannelData, CHANNEL_DATA_HEADER_SIZE, MAX_CHANNEL_NUMBER,
    MIN_CHANNEL_NUMBER,
};
pub use crate::context::{
    DecoderContext, DecoderContextBuilder, MessageDecoder, MessageDecoderBuilder,
};
pub use crate::context::{MessageEncoder, MessageEncoderBuilder};
pub use crate::error::{StunDecodeError, StunEncodeError, StunError, StunErrorType};
pub use crate::message::{
    MessageClass, MessageMethod, MessageType, StunMessage, StunMessageBuilder,
};
pub use crate::raw::{MessageHeader, MESSAGE_HEADER_SIZE};
pub use crate::types::{
    AddressFamily, ErrorCode, HMACKey, TransactionId, MAGIC_COOKIE,
};

/// Wire encoding of a value, in network byte order.
pub(crate) trait Encode {
    /// Writes the value at the start of `buffer` and returns how many bytes
    /// it took.
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError>;
}

/// Wire decoding of a value, possibly borrowing from the input.
pub(crate) trait Decode<'a> {
    /// Reads a value from the start of `buffer` and returns it with the
    /// number of bytes consumed.
    fn decode(buffer: &'a [u8]) -> Result<(Self, usize), StunError>
    where
        Self: Sized;
}

/// Bytes an `HMAC` or CRC trailer of type `attr_type` is computed over:
/// the message before that attribute, with the header length rewritten to
/// end where the attribute ends. `None` when `buffer` does not decode or
/// has no such attribute.
///
/// # Examples
///```rust
/// # use stun_proto::get_input_text;
/// # use stun_proto::attributes::stun::UserName;
/// # use stun_proto::StunAttributeType;
/// let buffer = [
///     0x00, 0x01, 0x00, 0x20, // Binding request and message length
///     0x21, 0x12, 0xa4, 0x42, // Magic cookie
///     0x01, 0x02, 0x03, 0x04, // }
///     0x05, 0x06, 0x07, 0x08, // }  Transaction ID
///     0x09, 0x0a, 0x0b, 0x0c, // }
///     0x00, 0x06, 0x00, 0x02, // USERNAME attribute header
///     0x61, 0x62, 0x00, 0x00, // "ab" and padding
///     0x00, 0x08, 0x00, 0x14, // MESSAGE-INTEGRITY attribute header
///     0x00, 0x00, 0x00, 0x00, // }
///     0x00, 0x00, 0x00, 0x00, // }
///     0x00, 0x00, 0x00, 0x00, // } HMAC-SHA1 value
///     0x00, 0x00, 0x00, 0x00, // }
///     0x00, 0x00, 0x00, 0x00, // }
/// ];
/// // USERNAME is the first attribute, so no attribute precedes it
/// let input = get_input_text(&buffer, UserName::get_type().as_u16()).unwrap();
/// assert_eq!(input.len(), 20);
///
/// let input = get_input_text(&buffer, 0x0008).unwrap();
/// assert_eq!(input.len(), 28);
/// // Length now covers USERNAME plus the 24 bytes of MESSAGE-INTEGRITY
/// assert_eq!(input[3], 0x20);
///```
pub fn get_input_text(buffer: &[u8], attr_type: u16) -> Option<Vec<u8>> {
    raw::get_input_text(buffer, attr_type).ok()
}
