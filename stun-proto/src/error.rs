//! Errors of the STUN codec.
//!
//! Low level routines fail with a [`StunError`]. The message encoder and
//! decoder wrap it in a [`StunErrorLevel`] that tells whether the header and
//! overall layout were at fault or a specific attribute was.

use crate::AttributeType;
use std::error;
use std::fmt;

/// Kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunErrorType {
    /// A value is out of range or malformed
    InvalidParam,
    /// An integrity or fingerprint check did not pass
    ValidationFailed,
    /// A value exceeds the maximum size allowed for it
    ValueTooLong,
    /// The buffer is too short for the value
    SmallBuffer,
}

impl fmt::Display for StunErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            StunErrorType::InvalidParam => "invalid parameter",
            StunErrorType::ValidationFailed => "validation failed",
            StunErrorType::ValueTooLong => "value too long",
            StunErrorType::SmallBuffer => "buffer too small",
        })
    }
}

/// Codec error: a kind plus a human readable description.
///
/// Two errors compare equal when they are of the same kind, and an error
/// compares equal to its [`StunErrorType`].
#[derive(Debug, Clone)]
pub struct StunError {
    /// Kind of failure
    pub error_type: StunErrorType,
    /// What went wrong
    pub info: String,
}

impl StunError {
    pub(crate) fn new<S>(error_type: StunErrorType, info: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            error_type,
            info: info.into(),
        }
    }
}

impl fmt::Display for StunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.info)
    }
}

impl error::Error for StunError {}

impl PartialEq for StunError {
    fn eq(&self, other: &Self) -> bool {
        self.error_type == other.error_type
    }
}

impl Eq for StunError {}

impl PartialEq<StunErrorType> for StunError {
    fn eq(&self, other: &StunErrorType) -> bool {
        self.error_type == *other
    }
}

impl PartialEq<StunError> for StunErrorType {
    fn eq(&self, other: &StunError) -> bool {
        *self == other.error_type
    }
}

macro_rules! invalid_param_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for StunError {
                fn from(e: $source) -> Self {
                    StunError::new(StunErrorType::InvalidParam, e.to_string())
                }
            }
        )*
    };
}

invalid_param_from!(
    std::array::TryFromSliceError,
    std::str::Utf8Error,
    std::num::TryFromIntError,
    precis_core::Error
);

/// Where in a message an encoding or decoding failure happened
#[derive(Debug)]
pub enum StunErrorLevel {
    /// The header or the overall layout
    Message(StunError),
    /// One attribute
    Attribute {
        /// Type of the attribute, unless the TLV itself was unreadable
        attr_type: Option<AttributeType>,
        /// Index of the attribute in the message
        position: usize,
        /// The failure
        error: StunError,
    },
}

impl StunErrorLevel {
    /// The underlying [`StunError`]
    pub fn error(&self) -> &StunError {
        match self {
            StunErrorLevel::Message(error) | StunErrorLevel::Attribute { error, .. } => error,
        }
    }
}

impl fmt::Display for StunErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StunErrorLevel::Message(error) => write!(f, "message: {}", error),
            StunErrorLevel::Attribute {
                attr_type: Some(attr_type),
                position,
                error,
            } => write!(f, "{} at position {}: {}", attr_type, position, error),
            StunErrorLevel::Attribute {
                attr_type: None,
                position,
                error,
            } => write!(f, "attribute at position {}: {}", position, error),
        }
    }
}

macro_rules! level_error {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name(pub StunErrorLevel);

        impl $name {
            /// Kind of the failure
            pub fn error_type(&self) -> StunErrorType {
                self.0.error().error_type
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!($what, " error, {}"), self.0)
            }
        }

        impl error::Error for $name {
            fn source(&self) -> Option<&(dyn error::Error + 'static)> {
                Some(self.0.error())
            }
        }
    };
}

level_error!(
    /// Failure to decode a [`StunMessage`](crate::message::StunMessage)
    StunDecodeError,
    "decode"
);

level_error!(
    /// Failure to encode a [`StunMessage`](crate::message::StunMessage)
    StunEncodeError,
    "encode"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let error = StunDecodeError(StunErrorLevel::Message(StunError::new(
            StunErrorType::SmallBuffer,
            "20 bytes needed, 3 available",
        )));
        assert_eq!(error.error_type(), StunErrorType::SmallBuffer);
        assert_eq!(
            error.to_string(),
            "decode error, message: buffer too small: 20 bytes needed, 3 available"
        );

        let error = StunEncodeError(StunErrorLevel::Attribute {
            attr_type: Some(AttributeType::new(0x0006)),
            position: 2,
            error: StunError::new(StunErrorType::ValueTooLong, "514 bytes"),
        });
        assert_eq!(error.error_type(), StunErrorType::ValueTooLong);
        assert_eq!(
            error.to_string(),
            "encode error, attribute type (0x0006) at position 2: value too long: 514 bytes"
        );
    }

    #[test]
    fn equality_by_kind() {
        let e1 = StunError::new(StunErrorType::InvalidParam, "one");
        let e2 = StunError::new(StunErrorType::InvalidParam, "two");
        assert_eq!(e1, e2);
        assert_eq!(e1, StunErrorType::InvalidParam);
        assert_eq!(StunErrorType::InvalidParam, e2);
        assert_ne!(e1, StunError::new(StunErrorType::SmallBuffer, "one"));
    }

    #[test]
    fn conversions() {
        let error = StunError::from(u8::try_from(300u16).expect_err("Overflow expected"));
        assert_eq!(error, StunErrorType::InvalidParam);
        assert!(!error.info.is_empty());
    }
}
