use crate::common::check_buffer_boundaries;
use crate::error::{StunError, StunErrorType};
use crate::strings::opaque_string_enforce;
use crate::Encode;
use rand::distr::{Distribution, StandardUniform};
use rand::Rng;
use std::convert::TryFrom;
use std::fmt;
use std::net::SocketAddr;
use std::ops::{Deref, RangeInclusive};
use std::sync::Arc;

pub(crate) const TRANSACTION_ID_SIZE: usize = 12;

/// Fixed value carried by every STUN message right after the length field.
/// It tells STUN apart from other protocols multiplexed on the same port and
/// seeds the XOR of the address attributes.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// 96-bit identifier shared by a request and its response.
///
/// [`TransactionId::default`] draws a fresh identifier from the thread-local
/// cryptographically secure generator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Identifier bytes in network order
    pub fn as_bytes(&self) -> &[u8; TRANSACTION_ID_SIZE] {
        &self.0
    }

    fn write_hex(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{:02X}", b))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("TransactionId(0x")?;
        self.write_hex(f)?;
        f.write_str(")")
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("0x")?;
        self.write_hex(f)
    }
}

impl Deref for TransactionId {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for TransactionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; TRANSACTION_ID_SIZE]> for TransactionId {
    fn from(bytes: [u8; TRANSACTION_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<&[u8; TRANSACTION_ID_SIZE]> for TransactionId {
    fn from(bytes: &[u8; TRANSACTION_ID_SIZE]) -> Self {
        Self(*bytes)
    }
}

impl TryFrom<&[u8]> for TransactionId {
    type Error = StunError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(<[u8; TRANSACTION_ID_SIZE]>::try_from(value)?))
    }
}

impl Distribution<TransactionId> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TransactionId {
        TransactionId(rng.random())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        rand::rng().random()
    }
}

/// Key of the MESSAGE-INTEGRITY HMAC.
///
/// Clones share the same key material. Neither `Debug` nor any other
/// formatting shows the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct HMACKey(Arc<[u8]>);

impl HMACKey {
    /// Key of the short-term credential mechanism: the password prepared
    /// with the `OpaqueString` profile.
    pub fn new_short_term<S>(password: S) -> Result<Self, StunError>
    where
        S: AsRef<str>,
    {
        let password = opaque_string_enforce(password.as_ref())?;
        Ok(Self(Arc::from(password.as_bytes())))
    }

    /// Key of the long-term credential mechanism:
    /// `MD5(username ":" OpaqueString(realm) ":" OpaqueString(password))`
    /// # Examples
    ///```rust
    /// # use stun_proto::HMACKey;
    /// // RFC 5389, section 15.4
    /// let key = HMACKey::new_long_term("user", "realm", "pass").unwrap();
    /// assert_eq!(key.as_bytes(), [
    ///     0x84, 0x93, 0xFB, 0xC5, 0x3B, 0xA5, 0x82, 0xFB,
    ///     0x4C, 0x04, 0x4C, 0x45, 0x6B, 0xDC, 0x40, 0xEB,
    /// ]);
    ///```
    pub fn new_long_term<A, B, C>(username: A, realm: B, password: C) -> Result<Self, StunError>
    where
        A: AsRef<str>,
        B: AsRef<str>,
        C: AsRef<str>,
    {
        let realm = opaque_string_enforce(realm.as_ref())?;
        let password = opaque_string_enforce(password.as_ref())?;
        let digest = md5::compute(format!("{}:{}:{}", username.as_ref(), realm, password));
        Ok(Self(Arc::from(&digest.0[..])))
    }

    /// Key material
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HMACKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("HMACKey(<redacted>)")
    }
}

/// Address family of a transport address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IP version 4
    IPv4,
    /// IP version 6
    IPv6,
}

impl AddressFamily {
    /// Family of `addr`
    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() {
            AddressFamily::IPv4
        } else {
            AddressFamily::IPv6
        }
    }

    pub(crate) fn as_u8(&self) -> u8 {
        match self {
            AddressFamily::IPv4 => 0x01,
            AddressFamily::IPv6 => 0x02,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            AddressFamily::IPv4 => "IPv4",
            AddressFamily::IPv6 => "IPv6",
        })
    }
}

impl TryFrom<u8> for AddressFamily {
    type Error = StunError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        [AddressFamily::IPv4, AddressFamily::IPv6]
            .into_iter()
            .find(|family| family.as_u8() == value)
            .ok_or_else(|| {
                StunError::new(
                    StunErrorType::InvalidParam,
                    format!("Unknown address family {:#04x}", value),
                )
            })
    }
}

impl<'a> crate::Decode<'a> for AddressFamily {
    fn decode(raw_value: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(raw_value, 1)?;
        Ok((AddressFamily::try_from(raw_value[0])?, 1))
    }
}

impl Encode for AddressFamily {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        check_buffer_boundaries(raw_value, 1)?;
        raw_value[0] = self.as_u8();
        Ok(1)
    }
}

const ERROR_CODES: RangeInclusive<u16> = 300..=699;
// Reason phrases are limited to 128 characters: 509 bytes when encoding and
// up to 763 bytes accepted when decoding.
const MAX_REASON_ENCODED: usize = 509;
const MAX_REASON_DECODED: usize = 763;
const ERROR_CODE_HEADER: usize = 4;

/// Reason phrase registered for the STUN and TURN error codes.
fn registered_reason(code: u16) -> Option<&'static str> {
    let reason = match code {
        300 => "Try Alternate",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        420 => "Unknown Attribute",
        437 => "Allocation Mismatch",
        438 => "Stale Nonce",
        440 => "Address Family not Supported",
        441 => "Wrong Credentials",
        442 => "Unsupported Transport Protocol",
        443 => "Peer Address Family Mismatch",
        486 => "Allocation Quota Reached",
        500 => "Server Error",
        508 => "Insufficient Capacity",
        _ => return None,
    };
    Some(reason)
}

/// Error code in the range 300 to 699 with its reason phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode {
    code: u16,
    reason: String,
}

impl ErrorCode {
    /// Creates an error code with a custom reason phrase.
    /// # Returns
    /// The error code, or a [`StunError`] if `code` is outside 300..=699
    pub fn new(code: u16, reason: &str) -> Result<Self, StunError> {
        if !ERROR_CODES.contains(&code) {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Error code {} outside {:?}", code, ERROR_CODES),
            ));
        }
        Ok(Self {
            code,
            reason: reason.to_string(),
        })
    }

    /// Creates an error code with its registered reason phrase, or an empty
    /// one for unregistered codes.
    /// # Examples
    ///```rust
    /// # use stun_proto::ErrorCode;
    /// let error = ErrorCode::from_code(438).unwrap();
    /// assert_eq!(error.reason(), "Stale Nonce");
    ///```
    pub fn from_code(code: u16) -> Result<Self, StunError> {
        Self::new(code, registered_reason(code).unwrap_or_default())
    }

    /// Numeric value of the error code
    pub fn error_code(&self) -> u16 {
        self.code
    }

    /// Hundreds digit, from 3 to 6
    pub fn class(&self) -> u8 {
        (self.code / 100) as u8
    }

    /// Error code modulo 100
    pub fn number(&self) -> u8 {
        (self.code % 100) as u8
    }

    /// Reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub(crate) fn encoded_size(&self) -> usize {
        ERROR_CODE_HEADER + self.reason.len()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

impl<'a> crate::Decode<'a> for ErrorCode {
    fn decode(raw_value: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(raw_value, ERROR_CODE_HEADER)?;
        // The first 21 bits are reserved
        let class = u16::from(raw_value[2] & 0x07);
        let number = u16::from(raw_value[3]);
        if number > 99 {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!("Error number {} greater than 99", number),
            ));
        }

        let reason = &raw_value[ERROR_CODE_HEADER..];
        if reason.len() > MAX_REASON_DECODED {
            return Err(StunError::new(
                StunErrorType::ValueTooLong,
                format!(
                    "Reason phrase of {} bytes, at most {} allowed",
                    reason.len(),
                    MAX_REASON_DECODED
                ),
            ));
        }

        let error = ErrorCode::new(class * 100 + number, std::str::from_utf8(reason)?)?;
        Ok((error, raw_value.len()))
    }
}

impl Encode for ErrorCode {
    fn encode(&self, raw_value: &mut [u8]) -> Result<usize, StunError> {
        if self.reason.len() > MAX_REASON_ENCODED {
            return Err(StunError::new(
                StunErrorType::ValueTooLong,
                format!(
                    "Reason phrase of {} bytes, at most {} allowed",
                    self.reason.len(),
                    MAX_REASON_ENCODED
                ),
            ));
        }
        let size = self.encoded_size();
        check_buffer_boundaries(raw_value, size)?;
        raw_value[..ERROR_CODE_HEADER].copy_from_slice(&[0, 0, self.class(), self.number()]);
        raw_value[ERROR_CODE_HEADER..size].copy_from_slice(self.reason.as_bytes());
        Ok(size)
    }
}
