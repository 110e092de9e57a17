use crate::error::{StunError, StunErrorType};
use crate::{Decode, Encode};
use byteorder::{BigEndian, ByteOrder};

/// Fails with [`StunErrorType::SmallBuffer`] when `buffer` is shorter than
/// `limit` bytes.
pub fn check_buffer_boundaries(buffer: &[u8], limit: usize) -> Result<(), StunError> {
    if buffer.len() < limit {
        return Err(StunError::new(
            StunErrorType::SmallBuffer,
            format!("{} bytes needed, {} available", limit, buffer.len()),
        ));
    }
    Ok(())
}

/// Bytes needed to align `value_size` to a 32-bit boundary.
pub fn padding(value_size: usize) -> usize {
    (4 - value_size % 4) % 4
}

/// Zeroes the first `size` bytes of `buffer`.
pub fn zero_padding(buffer: &mut [u8], size: usize) -> Result<(), StunError> {
    check_buffer_boundaries(buffer, size)?;
    buffer[..size].fill(0);
    Ok(())
}

macro_rules! big_endian {
    ($integer:ty, $read:ident, $write:ident) => {
        impl<'a> Decode<'a> for $integer {
            fn decode(raw_value: &[u8]) -> Result<(Self, usize), StunError> {
                const SIZE: usize = std::mem::size_of::<$integer>();
                check_buffer_boundaries(raw_value, SIZE)?;
                Ok((BigEndian::$read(&raw_value[..SIZE]), SIZE))
            }
        }

        impl Encode for $integer {
            fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
                const SIZE: usize = std::mem::size_of::<$integer>();
                check_buffer_boundaries(raw_value, SIZE)?;
                BigEndian::$write(&mut raw_value[..SIZE], *self);
                Ok(SIZE)
            }
        }
    };
}

big_endian!(u16, read_u16, write_u16);
big_endian!(u32, read_u32, write_u32);

impl<'a> Decode<'a> for &'a str {
    fn decode(raw_value: &'a [u8]) -> Result<(Self, usize), StunError> {
        Ok((std::str::from_utf8(raw_value)?, raw_value.len()))
    }
}

impl Encode for &str {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        check_buffer_boundaries(raw_value, self.len())?;
        raw_value[..self.len()].copy_from_slice(self.as_bytes());
        Ok(self.len())
    }
}

// An attribute whose value is a single big-endian integer.
macro_rules! integer_attribute {
    (
        $(#[$meta:meta])*
        $name:ident,
        $code:ident,
        $integer:ident,
    ) => (
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($integer);

        impl $name {
            /// Creates the attribute
            pub fn new(value: $integer) -> Self {
                Self(value)
            }

            paste::paste! {
                #[doc = "Value of the attribute"]
                pub fn [<as_ $integer>](&self) -> $integer {
                    self.0
                }
            }
        }

        impl From<$integer> for $name {
            fn from(value: $integer) -> Self {
                Self(value)
            }
        }

        impl PartialEq<$integer> for $name {
            fn eq(&self, other: &$integer) -> bool {
                self.0 == *other
            }
        }

        impl crate::attributes::DecodeAttributeValue for $name {
            fn decode(
                ctx: crate::context::AttributeDecoderContext,
            ) -> Result<(Self, usize), crate::StunError> {
                <$integer as crate::Decode>::decode(ctx.raw_value())
                    .map(|(value, size)| (Self(value), size))
            }
        }

        impl crate::attributes::EncodeAttributeValue for $name {
            fn encoded_size(&self) -> usize {
                std::mem::size_of::<$integer>()
            }

            fn encode(
                &self,
                mut ctx: crate::context::AttributeEncoderContext,
            ) -> Result<usize, crate::StunError> {
                crate::Encode::encode(&self.0, ctx.raw_value_mut())
            }
        }

        crate::attributes::attribute_type!($name, $code);
    )
}
pub(crate) use integer_attribute;

// An attribute that carries no value: its presence is the information.
macro_rules! empty_attribute {
    (
        $(#[$meta:meta])*
        $name:ident,
        $code:ident,
    ) => (
        $(#[$meta])*
        #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
        pub struct $name;

        impl crate::attributes::DecodeAttributeValue for $name {
            fn decode(
                _ctx: crate::context::AttributeDecoderContext,
            ) -> Result<(Self, usize), crate::StunError> {
                Ok(($name, 0))
            }
        }

        impl crate::attributes::EncodeAttributeValue for $name {
            fn encoded_size(&self) -> usize {
                0
            }

            fn encode(
                &self,
                _ctx: crate::context::AttributeEncoderContext,
            ) -> Result<usize, crate::StunError> {
                Ok(0)
            }
        }

        crate::attributes::attribute_type!($name, $code);
    )
}
pub(crate) use empty_attribute;
