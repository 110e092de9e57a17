//! Relay errors and their STUN error codes.

use std::error;
use std::fmt;

/// STUN error codes answered by the relay
pub mod codes {
    /// Bad Request
    pub const BAD_REQUEST: u16 = 400;
    /// Unauthorized
    pub const UNAUTHORIZED: u16 = 401;
    /// Unknown Attribute
    pub const UNKNOWN_ATTRIBUTE: u16 = 420;
    /// Allocation Mismatch
    pub const ALLOCATION_MISMATCH: u16 = 437;
    /// Stale Nonce
    pub const STALE_NONCE: u16 = 438;
    /// Address Family not Supported
    pub const ADDRESS_FAMILY_NOT_SUPPORTED: u16 = 440;
    /// Wrong Credentials
    pub const WRONG_CREDENTIALS: u16 = 441;
    /// Unsupported Transport Protocol
    pub const UNSUPPORTED_TRANSPORT_PROTOCOL: u16 = 442;
    /// Peer Address Family Mismatch
    pub const PEER_ADDRESS_FAMILY_MISMATCH: u16 = 443;
    /// Allocation Quota Reached
    pub const ALLOCATION_QUOTA_REACHED: u16 = 486;
    /// Insufficient Capacity
    pub const INSUFFICIENT_CAPACITY: u16 = 508;
}

/// Errors creating or looking up allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// The 5-tuple already owns an allocation
    AllocMismatch,
    /// The 5-tuple does not own an allocation
    NotFound,
    /// The total or per-user allocation quota is exhausted
    QuotaExceeded,
    /// No relay port could be reserved and bound
    NoPortsAvailable,
    /// The reservation token is unknown or expired
    InvalidReservationToken,
}

impl AllocationError {
    /// Returns the STUN error code answered for this error
    pub fn error_code(&self) -> u16 {
        match self {
            AllocationError::AllocMismatch | AllocationError::NotFound => {
                codes::ALLOCATION_MISMATCH
            }
            AllocationError::QuotaExceeded => codes::ALLOCATION_QUOTA_REACHED,
            AllocationError::NoPortsAvailable | AllocationError::InvalidReservationToken => {
                codes::INSUFFICIENT_CAPACITY
            }
        }
    }
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::AllocMismatch => write!(f, "allocation already exists"),
            AllocationError::NotFound => write!(f, "allocation not found"),
            AllocationError::QuotaExceeded => write!(f, "allocation quota reached"),
            AllocationError::NoPortsAvailable => write!(f, "no relay ports available"),
            AllocationError::InvalidReservationToken => {
                write!(f, "unknown or expired reservation token")
            }
        }
    }
}

impl error::Error for AllocationError {}

/// Errors binding a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel number is not in the range 0x4000-0x7FFF
    InvalidChannel(u16),
    /// The channel is bound to a different peer
    ChannelInUse(u16),
    /// The peer is bound to a different channel
    PeerAlreadyBound(u16),
}

impl ChannelError {
    /// Returns the STUN error code answered for this error
    pub fn error_code(&self) -> u16 {
        codes::BAD_REQUEST
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChannelError::InvalidChannel(n) => write!(f, "invalid channel number {:#06x}", n),
            ChannelError::ChannelInUse(n) => {
                write!(f, "channel {:#06x} is bound to another peer", n)
            }
            ChannelError::PeerAlreadyBound(n) => {
                write!(f, "peer is already bound to channel {:#06x}", n)
            }
        }
    }
}

impl error::Error for ChannelError {}
