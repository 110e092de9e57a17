//! `MESSAGE-INTEGRITY` and `FINGERPRINT` trailers.
//!
//! These attributes are never part of a message's attribute list. The
//! [`MessageEncoder`](crate::MessageEncoder) appends them, in that order,
//! and the [`MessageDecoder`](crate::MessageDecoder) keeps what is needed
//! to verify them.

use crate::common::check_buffer_boundaries;
use crate::error::{StunError, StunErrorType};
use crate::HMACKey;
use byteorder::{BigEndian, ByteOrder};
use crc::{Crc, CRC_32_ISO_HDLC};
use std::fmt;

/// `MESSAGE-INTEGRITY` attribute type
pub const MESSAGE_INTEGRITY: u16 = 0x0008;
/// `FINGERPRINT` attribute type
pub const FINGERPRINT: u16 = 0x8028;

pub(crate) const MESSAGE_INTEGRITY_SIZE: usize = 20;
pub(crate) const FINGERPRINT_SIZE: usize = 4;

const FINGERPRINT_XOR_VALUE: u32 = 0x5354_554e;
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub(crate) fn compute_hmac(key: &HMACKey, input: &[u8]) -> [u8; MESSAGE_INTEGRITY_SIZE] {
    hmac_sha1::hmac_sha1(key.as_bytes(), input)
}

pub(crate) fn compute_fingerprint(input: &[u8]) -> u32 {
    CRC32.checksum(input) ^ FINGERPRINT_XOR_VALUE
}

pub(crate) fn decode_fingerprint(raw_value: &[u8]) -> Result<u32, StunError> {
    if raw_value.len() != FINGERPRINT_SIZE {
        return Err(StunError::new(
            StunErrorType::InvalidParam,
            format!("FINGERPRINT size {} != {}", raw_value.len(), FINGERPRINT_SIZE),
        ));
    }
    Ok(BigEndian::read_u32(raw_value))
}

/// A decoded `MESSAGE-INTEGRITY`: the HMAC-SHA1 carried by the message
/// and the exact text it was computed over. The key is usually unknown at
/// decoding time because it depends on the message's `USERNAME` and
/// `REALM`, so verification happens afterwards with [`MessageIntegrity::verify`].
#[derive(Clone, PartialEq, Eq)]
pub struct MessageIntegrity {
    hmac: [u8; MESSAGE_INTEGRITY_SIZE],
    input: Vec<u8>,
}

impl MessageIntegrity {
    pub(crate) fn from_raw(raw_value: &[u8], input: Vec<u8>) -> Result<Self, StunError> {
        check_buffer_boundaries(raw_value, MESSAGE_INTEGRITY_SIZE)?;
        if raw_value.len() != MESSAGE_INTEGRITY_SIZE {
            return Err(StunError::new(
                StunErrorType::InvalidParam,
                format!(
                    "MESSAGE-INTEGRITY size {} != {}",
                    raw_value.len(),
                    MESSAGE_INTEGRITY_SIZE
                ),
            ));
        }
        let mut hmac = [0u8; MESSAGE_INTEGRITY_SIZE];
        hmac.copy_from_slice(raw_value);
        Ok(Self { hmac, input })
    }

    /// Returns the HMAC carried by the message
    pub fn hmac(&self) -> &[u8; MESSAGE_INTEGRITY_SIZE] {
        &self.hmac
    }

    /// Returns true if the HMAC matches the one computed with `key`.
    pub fn verify(&self, key: &HMACKey) -> bool {
        let expected = compute_hmac(key, &self.input);
        // Compare every byte regardless of where the first mismatch is
        expected
            .iter()
            .zip(self.hmac.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for MessageIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MessageIntegrity(0x")?;
        for byte in self.hmac.iter() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
