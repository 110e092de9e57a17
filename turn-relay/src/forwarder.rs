//! Data plane.
//!
//! Client data arrives as Send indications or `ChannelData` and leaves
//! through the allocation's relay socket. Peer data arrives on the relay
//! socket and goes back to the client wrapped in a Data indication, or in
//! `ChannelData` when the peer is bound to a channel. Data is never
//! buffered, reordered or inspected, and data without a live permission is
//! dropped without any answer.

use crate::allocation::{Allocation, PeerRoute};
use crate::socket::DatagramSocket;
use log::{debug, trace};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stun_proto::attributes::turn::{Data, XorPeerAddress};
use stun_proto::methods::DATA;
use stun_proto::{
    AddressFamily, ChannelData, MessageClass, MessageEncoder, StunMessage, StunMessageBuilder,
};

/// Moves data between clients and peers.
#[derive(Debug)]
pub struct Forwarder {
    listener: Arc<dyn DatagramSocket>,
    encoder: MessageEncoder,
    permission_lifetime: Duration,
    channel_lifetime: Duration,
}

impl Forwarder {
    /// Creates a forwarder answering clients through `listener`
    pub fn new(
        listener: Arc<dyn DatagramSocket>,
        permission_lifetime: Duration,
        channel_lifetime: Duration,
    ) -> Self {
        Self {
            listener,
            encoder: MessageEncoder::default(),
            permission_lifetime,
            channel_lifetime,
        }
    }

    fn send_to_peer(&self, allocation: &Allocation, peer: SocketAddr, data: &[u8]) -> bool {
        match allocation.socket().send_to(data, peer) {
            Ok(_) => true,
            Err(e) => {
                debug!(
                    "Can not relay {} bytes from {}: {}",
                    data.len(),
                    allocation.relayed_addr(),
                    e
                );
                false
            }
        }
    }

    fn send_to_client(&self, allocation: &Allocation, buffer: &[u8]) -> bool {
        let client = allocation.five_tuple().client;
        match self.listener.send_to(buffer, client) {
            Ok(_) => true,
            Err(e) => {
                debug!("Can not send {} bytes to {}: {}", buffer.len(), client, e);
                false
            }
        }
    }

    /// Relays the `DATA` of a Send indication to its `XOR-PEER-ADDRESS`.
    /// Returns true if the data was sent.
    pub fn send_indication(&self, allocation: &Allocation, msg: &StunMessage, now: Instant) -> bool {
        let peer = msg
            .get::<XorPeerAddress>()
            .and_then(|attr| attr.as_xor_peer_address())
            .map(|attr| *attr.socket_address());
        let data = msg.get::<Data>().and_then(|attr| attr.as_data());
        let (Some(peer), Some(data)) = (peer, data) else {
            debug!(
                "[{}] Send indication without XOR-PEER-ADDRESS or DATA",
                msg.transaction_id()
            );
            return false;
        };

        if AddressFamily::of(&peer) != AddressFamily::of(&allocation.relayed_addr()) {
            debug!("[{}] Peer address family mismatch", msg.transaction_id());
            return false;
        }

        if !allocation.use_permission(&peer.ip(), self.permission_lifetime, now) {
            trace!("No permission on {} for {}", allocation.relayed_addr(), peer);
            return false;
        }

        self.send_to_peer(allocation, peer, data.as_bytes())
    }

    /// Relays `ChannelData` to the peer bound to its channel. Returns true
    /// if the data was sent.
    pub fn channel_data(&self, allocation: &Allocation, msg: &ChannelData, now: Instant) -> bool {
        let Some(peer) = allocation.use_channel(
            msg.channel(),
            self.channel_lifetime,
            self.permission_lifetime,
            now,
        ) else {
            trace!(
                "Channel {:#06x} not bound on {}",
                msg.channel(),
                allocation.relayed_addr()
            );
            return false;
        };

        self.send_to_peer(allocation, peer, msg.data())
    }

    /// Relays a datagram received from `peer` on the allocation's relay
    /// socket to the client. Returns true if the data was sent.
    pub fn peer_datagram(
        &self,
        allocation: &Allocation,
        peer: SocketAddr,
        data: &[u8],
        now: Instant,
    ) -> bool {
        let buffer = match allocation.route_from_peer(&peer, now) {
            PeerRoute::Denied => {
                trace!("No permission on {} for {}", allocation.relayed_addr(), peer);
                return false;
            }
            PeerRoute::Channel(number) => ChannelData::new(number, data.to_vec())
                .and_then(|msg| msg.encode_to_vec())
                .map_err(|e| debug!("Can not frame ChannelData: {}", e)),
            PeerRoute::Indication => {
                let msg = StunMessageBuilder::new(DATA, MessageClass::Indication)
                    .with_attribute(XorPeerAddress::from(peer))
                    .with_attribute(Data::new(data))
                    .build();
                self.encoder
                    .encode_to_vec(&msg)
                    .map_err(|e| debug!("Can not encode Data indication: {}", e))
            }
        };

        match buffer {
            Ok(buffer) => self.send_to_client(allocation, &buffer),
            Err(()) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationRequest, AllocationTable, FiveTuple, TableConfig};
    use crate::ports::PortRequest;
    use crate::socket::mock::{MockBinder, MockSocket};
    use stun_proto::methods::SEND;
    use stun_proto::{MessageDecoder, TransactionId};

    const PERMISSION: Duration = Duration::from_secs(300);
    const CHANNEL: Duration = Duration::from_secs(600);

    fn addr(s: &str) -> SocketAddr {
        s.parse().expect("Invalid address")
    }

    struct Fixture {
        listener: Arc<MockSocket>,
        binder: MockBinder,
        forwarder: Forwarder,
        allocation: Arc<Allocation>,
    }

    fn fixture(now: Instant) -> Fixture {
        let listener = MockSocket::new(addr("198.51.100.1:3478"));
        let binder = MockBinder::default();
        let table = AllocationTable::new(TableConfig {
            public_ip: "203.0.113.1".parse().expect("Invalid IP"),
            bind_ip: "0.0.0.0".parse().expect("Invalid IP"),
            ports: 40000..=40009,
            max_allocations: 10,
            user_quota: 10,
        });
        let allocation = table
            .create(
                AllocationRequest {
                    five_tuple: FiveTuple::udp(addr("192.0.2.10:1000"), listener.addr),
                    username: String::from("alice"),
                    transaction_id: TransactionId::default(),
                    lifetime: Duration::from_secs(600),
                    port: PortRequest::Any,
                    reservation_token: None,
                },
                &binder,
                now,
            )
            .expect("Can not allocate")
            .allocation;
        let forwarder = Forwarder::new(listener.clone(), PERMISSION, CHANNEL);
        Fixture {
            listener,
            binder,
            forwarder,
            allocation,
        }
    }

    fn send_indication(peer: SocketAddr, data: &[u8]) -> StunMessage {
        StunMessageBuilder::new(SEND, MessageClass::Indication)
            .with_attribute(XorPeerAddress::from(peer))
            .with_attribute(Data::new(data))
            .build()
    }

    #[test]
    fn send_requires_permission() {
        let now = Instant::now();
        let f = fixture(now);
        let relay = f.binder.socket(40000).expect("Socket not bound");
        let peer = addr("192.0.2.99:7000");

        assert!(!f
            .forwarder
            .send_indication(&f.allocation, &send_indication(peer, b"hello"), now));
        assert!(relay.take_sent().is_empty());

        f.allocation.grant_permission(peer.ip(), PERMISSION, now);
        assert!(f
            .forwarder
            .send_indication(&f.allocation, &send_indication(peer, b"hello"), now));
        assert_eq!(relay.take_sent(), vec![(peer, b"hello".to_vec())]);

        // Missing DATA
        let msg = StunMessageBuilder::new(SEND, MessageClass::Indication)
            .with_attribute(XorPeerAddress::from(peer))
            .build();
        assert!(!f.forwarder.send_indication(&f.allocation, &msg, now));

        // IPv6 peer on an IPv4 relay
        let msg = send_indication(addr("[2001:db8::1]:7000"), b"hello");
        assert!(!f.forwarder.send_indication(&f.allocation, &msg, now));
        assert!(relay.take_sent().is_empty());
    }

    #[test]
    fn send_refreshes_permission() {
        let now = Instant::now();
        let f = fixture(now);
        let peer = addr("192.0.2.99:7000");
        f.allocation.grant_permission(peer.ip(), PERMISSION, now);

        let t1 = now + Duration::from_secs(200);
        assert!(f
            .forwarder
            .send_indication(&f.allocation, &send_indication(peer, b"x"), t1));
        assert!(f
            .allocation
            .has_permission(&peer.ip(), now + Duration::from_secs(400)));
    }

    #[test]
    fn channel_data_to_peer() {
        let now = Instant::now();
        let f = fixture(now);
        let relay = f.binder.socket(40000).expect("Socket not bound");
        let peer = addr("192.0.2.99:7000");
        let msg = ChannelData::new(0x4000, b"payload".to_vec()).expect("Invalid message");

        assert!(!f.forwarder.channel_data(&f.allocation, &msg, now));
        f.allocation
            .bind_channel(0x4000, peer, CHANNEL, PERMISSION, now)
            .expect("Can not bind");
        assert!(f.forwarder.channel_data(&f.allocation, &msg, now));
        assert_eq!(relay.take_sent(), vec![(peer, b"payload".to_vec())]);
    }

    #[test]
    fn peer_data_to_client() {
        let now = Instant::now();
        let f = fixture(now);
        let client = f.allocation.five_tuple().client;
        let peer = addr("192.0.2.99:7000");

        // Unpermitted peers are dropped
        assert!(!f.forwarder.peer_datagram(&f.allocation, peer, b"data", now));
        assert!(f.listener.take_sent().is_empty());

        f.allocation.grant_permission(peer.ip(), PERMISSION, now);
        assert!(f.forwarder.peer_datagram(&f.allocation, peer, b"data", now));
        let sent = f.listener.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, client);
        let (msg, _) = MessageDecoder::default()
            .decode(&sent[0].1)
            .expect("Can not decode");
        assert_eq!(msg.method(), DATA);
        assert_eq!(msg.class(), MessageClass::Indication);
        let attr = msg.get::<XorPeerAddress>().expect("No XOR-PEER-ADDRESS");
        assert_eq!(attr.expect_xor_peer_address().socket_address(), &peer);
        let attr = msg.get::<Data>().expect("No DATA");
        assert_eq!(attr.expect_data().as_bytes(), b"data");

        f.allocation
            .bind_channel(0x4001, peer, CHANNEL, PERMISSION, now)
            .expect("Can not bind");
        assert!(f.forwarder.peer_datagram(&f.allocation, peer, b"data", now));
        let sent = f.listener.take_sent();
        assert_eq!(sent, vec![(client, vec![0x40, 0x01, 0x00, 0x04, b'd', b'a', b't', b'a'])]);

        // Expired permission
        let later = now + PERMISSION;
        assert!(!f.forwarder.peer_datagram(&f.allocation, peer, b"data", later));
        assert!(f.listener.take_sent().is_empty());
    }
}
