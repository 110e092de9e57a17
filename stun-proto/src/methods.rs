//! STUN and TURN methods.
//!
//! Only the methods a UDP relay handles are defined here. Any other value
//! is still representable with [`MessageMethod::try_from`](crate::MessageMethod).

use crate::message::MessageMethod;

/// Binding
pub const BINDING: MessageMethod = MessageMethod(0x0001);

/// Allocate
pub const ALLOCATE: MessageMethod = MessageMethod(0x0003);

/// Refresh
pub const REFRESH: MessageMethod = MessageMethod(0x0004);

/// Send
pub const SEND: MessageMethod = MessageMethod(0x0006);

/// Data
pub const DATA: MessageMethod = MessageMethod(0x0007);

/// Create permission
pub const CREATE_PERMISSION: MessageMethod = MessageMethod(0x0008);

/// Channel bind
pub const CHANNEL_BIND: MessageMethod = MessageMethod(0x0009);
