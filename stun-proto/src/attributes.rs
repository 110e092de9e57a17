//! STUN and TURN attributes.
//!
//! [`StunAttribute`] holds the attributes a UDP relay exchanges with its
//! clients. Anything the decoder does not know about becomes an
//! [`Unknown`] attribute. `MESSAGE-INTEGRITY` and `FINGERPRINT` are message
//! trailers handled by the encoder and the decoder, see [`integrity`].

use crate::context::{AttributeDecoderContext, AttributeEncoderContext};
use crate::error::StunError;
use std::fmt;

mod address;
mod unknown;
pub use unknown::Unknown;

pub mod integrity;
pub mod stun;
pub mod turn;

pub(crate) trait EncodeAttributeValue {
    /// Size of the value once encoded, without padding.
    fn encoded_size(&self) -> usize;
    fn encode(&self, ctx: AttributeEncoderContext) -> Result<usize, StunError>;
}

pub(crate) trait DecodeAttributeValue {
    fn decode(ctx: AttributeDecoderContext) -> Result<(Self, usize), StunError>
    where
        Self: Sized;
}

/// 16-bit attribute type. Types below 0x8000 are comprehension-required:
/// a receiver that does not understand them must reject the message.
///
/// # Examples
///```rust
/// # use stun_proto::AttributeType;
/// let attr_type = AttributeType::from(0x0008);
/// assert_eq!(attr_type.as_u16(), 0x0008);
/// assert!(attr_type.is_comprehension_required());
/// assert!(!AttributeType::from(0x8022).is_comprehension_required());
///```
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct AttributeType(u16);

impl AttributeType {
    /// Wraps a raw attribute type
    pub const fn new(attr_type: u16) -> Self {
        AttributeType(attr_type)
    }

    /// Raw value
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Whether the type lies in the comprehension-required range
    pub fn is_comprehension_required(&self) -> bool {
        self.0 & 0x8000 == 0
    }
}

impl From<u16> for AttributeType {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<AttributeType> for u16 {
    fn from(value: AttributeType) -> Self {
        value.0
    }
}

impl fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AttributeType({:#06x})", self.0)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "attribute type ({:#06x})", self.0)
    }
}

/// Implemented by every attribute that can go into a [`StunAttribute`].
pub trait StunAttributeType {
    /// Type of this attribute
    fn attribute_type(&self) -> AttributeType;

    /// Type of attributes of this kind
    fn get_type() -> AttributeType
    where
        Self: Sized;
}

// Ties an attribute struct to its wire type and to its StunAttribute variant.
macro_rules! attribute_type (
    ($name:ident, $code:ident) => {
        impl crate::attributes::StunAttributeType for $name {
            fn get_type() -> crate::attributes::AttributeType {
                crate::attributes::AttributeType::new($code)
            }

            fn attribute_type(&self) -> crate::attributes::AttributeType {
                Self::get_type()
            }
        }

        impl From<$name> for crate::attributes::StunAttribute {
            fn from(value: $name) -> Self {
                Self::$name(value)
            }
        }
    }
);
pub(crate) use attribute_type;

macro_rules! attribute_set (
    ($($name:ident in $module:ident),* $(,)?) => {
        paste::paste! {
            /// An attribute of a [`StunMessage`](crate::StunMessage)
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub enum StunAttribute {
                $(
                    #[doc = "`" $name "` attribute"]
                    $name($module::$name),
                )*
            }

            impl StunAttribute {
                /// Type of the wrapped attribute
                pub fn attribute_type(&self) -> AttributeType {
                    match self {
                        $(Self::$name(attr) => attr.attribute_type(),)*
                    }
                }

                $(
                    #[doc = "Whether this is a `" $name "` attribute"]
                    pub fn [<is_ $name:snake>](&self) -> bool {
                        matches!(self, Self::$name(_))
                    }

                    #[doc = "The `" $name "` value, or `None` for other attributes"]
                    pub fn [<as_ $name:snake>](&self) -> Option<&$module::$name> {
                        match self {
                            Self::$name(attr) => Some(attr),
                            _ => None,
                        }
                    }

                    #[doc = "The `" $name "` value."]
                    #[doc = "# Panics"]
                    #[doc = "If this is not a `" $name "` attribute"]
                    pub fn [<expect_ $name:snake>](&self) -> &$module::$name {
                        self.[<as_ $name:snake>]().unwrap_or_else(|| {
                            panic!("{:?} is not {}", self.attribute_type(), stringify!($name))
                        })
                    }
                )*
            }
        }

        impl EncodeAttributeValue for StunAttribute {
            fn encoded_size(&self) -> usize {
                match self {
                    $(Self::$name(attr) => attr.encoded_size(),)*
                }
            }

            fn encode(&self, ctx: AttributeEncoderContext) -> Result<usize, StunError> {
                match self {
                    $(Self::$name(attr) => attr.encode(ctx),)*
                }
            }
        }
    }
);

attribute_set!(
    Unknown in unknown,
    ErrorCode in stun,
    Nonce in stun,
    Realm in stun,
    Software in stun,
    UnknownAttributes in stun,
    UserName in stun,
    XorMappedAddress in stun,
    ChannelNumber in turn,
    LifeTime in turn,
    XorPeerAddress in turn,
    XorRelayedAddress in turn,
    Data in turn,
    RequestedAddressFamily in turn,
    EvenPort in turn,
    DontFragment in turn,
    RequestedTransport in turn,
    ReservationToken in turn,
);
