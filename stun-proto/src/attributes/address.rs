use crate::common::check_buffer_boundaries;
use crate::error::StunError;
use crate::types::{AddressFamily, MAGIC_COOKIE, TRANSACTION_ID_SIZE};
use crate::{Decode, Encode};
use byteorder::{BigEndian, ByteOrder};
use std::convert::TryFrom;
use std::net::{IpAddr, SocketAddr};

const ADDRESS_HEADER: usize = 4;

/// Size of `addr` in the attribute layout:
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Reserved    |    Family     |             Port              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                Address (32 or 128 bits) ...                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub(crate) fn encoded_size(addr: &SocketAddr) -> usize {
    ADDRESS_HEADER + if addr.is_ipv4() { 4 } else { 16 }
}

impl Decode<'_> for SocketAddr {
    fn decode(buffer: &[u8]) -> Result<(Self, usize), StunError> {
        check_buffer_boundaries(buffer, ADDRESS_HEADER)?;
        let port = BigEndian::read_u16(&buffer[2..ADDRESS_HEADER]);
        let address = &buffer[ADDRESS_HEADER..];
        let ip = match AddressFamily::try_from(buffer[1])? {
            AddressFamily::IPv4 => {
                check_buffer_boundaries(address, 4)?;
                IpAddr::from(<[u8; 4]>::try_from(&address[..4])?)
            }
            AddressFamily::IPv6 => {
                check_buffer_boundaries(address, 16)?;
                IpAddr::from(<[u8; 16]>::try_from(&address[..16])?)
            }
        };
        let addr = SocketAddr::new(ip, port);
        Ok((addr, encoded_size(&addr)))
    }
}

impl Encode for SocketAddr {
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, StunError> {
        let size = encoded_size(self);
        check_buffer_boundaries(buffer, size)?;
        buffer[0] = 0;
        buffer[1] = AddressFamily::of(self).as_u8();
        BigEndian::write_u16(&mut buffer[2..ADDRESS_HEADER], self.port());
        let address = &mut buffer[ADDRESS_HEADER..size];
        match self.ip() {
            IpAddr::V4(ip) => address.copy_from_slice(&ip.octets()),
            IpAddr::V6(ip) => address.copy_from_slice(&ip.octets()),
        }
        Ok(size)
    }
}

// Port and address are masked with the magic cookie. IPv6 addresses use
// the cookie followed by the transaction ID as a 128-bit mask. XOR is its
// own inverse, so the same function encodes and decodes.
fn xor_mask(addr: &SocketAddr, transaction_id: &[u8; TRANSACTION_ID_SIZE]) -> SocketAddr {
    let mut mask = [0u8; 16];
    mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    mask[4..].copy_from_slice(transaction_id);

    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = match addr.ip() {
        IpAddr::V4(ip) => {
            let masked = u32::from(ip) ^ MAGIC_COOKIE;
            IpAddr::from(masked.to_be_bytes())
        }
        IpAddr::V6(ip) => {
            let mut octets = ip.octets();
            octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
            IpAddr::from(octets)
        }
    };
    SocketAddr::new(ip, port)
}

pub(crate) fn xor_encode(
    transaction_id: &[u8; TRANSACTION_ID_SIZE],
    addr: &SocketAddr,
    buffer: &mut [u8],
) -> Result<usize, StunError> {
    xor_mask(addr, transaction_id).encode(buffer)
}

pub(crate) fn xor_decode(
    transaction_id: &[u8; TRANSACTION_ID_SIZE],
    buffer: &[u8],
) -> Result<(SocketAddr, usize), StunError> {
    SocketAddr::decode(buffer).map(|(masked, size)| (xor_mask(&masked, transaction_id), size))
}

// An attribute carrying a transport address masked with the cookie.
macro_rules! xor_socket_addr_attribute {
    (
        $(#[$meta:meta])*
        $name:ident,
        $code:ident,
    ) => (
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(std::net::SocketAddr);

        impl $name {
            /// Unmasked transport address
            pub fn socket_address(&self) -> &std::net::SocketAddr {
                &self.0
            }
        }

        impl From<std::net::SocketAddr> for $name {
            fn from(addr: std::net::SocketAddr) -> Self {
                Self(addr)
            }
        }

        impl crate::attributes::DecodeAttributeValue for $name {
            fn decode(
                ctx: crate::context::AttributeDecoderContext,
            ) -> Result<(Self, usize), crate::StunError> {
                crate::attributes::address::xor_decode(ctx.transaction_id(), ctx.raw_value())
                    .map(|(addr, size)| (Self(addr), size))
            }
        }

        impl crate::attributes::EncodeAttributeValue for $name {
            fn encoded_size(&self) -> usize {
                crate::attributes::address::encoded_size(&self.0)
            }

            fn encode(
                &self,
                mut ctx: crate::context::AttributeEncoderContext,
            ) -> Result<usize, crate::StunError> {
                let transaction_id = *ctx.transaction_id().as_bytes();
                crate::attributes::address::xor_encode(&transaction_id, &self.0, ctx.raw_value_mut())
            }
        }

        crate::attributes::attribute_type!($name, $code);
    )
}
pub(crate) use xor_socket_addr_attribute;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StunErrorType;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn decode_socket_address() {
        let buffer = [0x00, 0x01, 0x11, 0x5C, 0xC0, 0x00, 0x02, 0x01];
        let (addr, size) = SocketAddr::decode(&buffer).expect("Can not decode address");
        assert_eq!(size, 8);
        assert_eq!(addr, "192.0.2.1:4444".parse().expect("Invalid address"));

        // Unknown family
        let buffer = [0x00, 0x03, 0x11, 0x5C, 0xC0, 0x00, 0x02, 0x01];
        assert_eq!(
            SocketAddr::decode(&buffer).expect_err("Error expected"),
            StunErrorType::InvalidParam
        );

        // IPv6 with only 4 address bytes
        let buffer = [0x00, 0x02, 0x11, 0x5C, 0xC0, 0x00, 0x02, 0x01];
        assert_eq!(
            SocketAddr::decode(&buffer).expect_err("Error expected"),
            StunErrorType::SmallBuffer
        );
    }

    #[test]
    fn encode_socket_address() {
        let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 8080);
        let mut buffer = [0xffu8; 20];
        assert_eq!(addr.encode(&mut buffer), Ok(20));
        assert_eq!(&buffer[..4], &[0x00, 0x02, 0x1f, 0x90]);
        assert_eq!(buffer[19], 0x01);

        let mut buffer = [0u8; 19];
        assert_eq!(
            addr.encode(&mut buffer).expect_err("Error expected"),
            StunErrorType::SmallBuffer
        );
    }

    #[test]
    fn xor_ipv4() {
        // Values from RFC 5769, section 2.2
        let transaction_id = [
            0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
        ];
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 32853);
        let mut buffer = [0u8; 8];
        assert_eq!(xor_encode(&transaction_id, &addr, &mut buffer), Ok(8));
        assert_eq!(buffer, [0x00, 0x01, 0xa1, 0x47, 0xe1, 0x12, 0xa6, 0x43]);

        let (decoded, size) = xor_decode(&transaction_id, &buffer).expect("Can not decode");
        assert_eq!(size, 8);
        assert_eq!(decoded, addr);
    }

    #[test]
    fn xor_ipv6() {
        // Values from RFC 5769, section 2.3
        let transaction_id = [
            0xb7, 0xe7, 0xa7, 0x01, 0xbc, 0x34, 0xd6, 0x86, 0xfa, 0x87, 0xdf, 0xae,
        ];
        let addr: SocketAddr = "[2001:db8:1234:5678:11:2233:4455:6677]:32853"
            .parse()
            .expect("Invalid address");
        let mut buffer = [0u8; 20];
        assert_eq!(xor_encode(&transaction_id, &addr, &mut buffer), Ok(20));
        assert_eq!(
            buffer,
            [
                0x00, 0x02, 0xa1, 0x47, 0x01, 0x13, 0xa9, 0xfa, 0xa5, 0xd3, 0xf1, 0x79, 0xbc,
                0x25, 0xf4, 0xb5, 0xbe, 0xd2, 0xb9, 0xd9
            ]
        );
        let (decoded, _) = xor_decode(&transaction_id, &buffer).expect("Can not decode");
        assert_eq!(decoded, addr);
    }
}
