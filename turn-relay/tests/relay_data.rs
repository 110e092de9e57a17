mod common;

use common::*;
use std::net::SocketAddr;
use std::time::Instant;
use stun_proto::attributes::turn::{ChannelNumber, Data, XorPeerAddress};
use stun_proto::methods::{CHANNEL_BIND, CREATE_PERMISSION, DATA, REFRESH, SEND};
use stun_proto::{ChannelData, MessageClass, StunMessageBuilder};
use turn_relay::error::codes;

const PEER: &str = "192.0.2.99:7000";

fn permission_request(peers: &[SocketAddr]) -> StunMessageBuilder {
    peers.iter().fold(
        StunMessageBuilder::new(CREATE_PERMISSION, MessageClass::Request),
        |builder, peer| builder.with_attribute(XorPeerAddress::from(*peer)),
    )
}

fn channel_bind_request(number: u16, peer: SocketAddr) -> StunMessageBuilder {
    StunMessageBuilder::new(CHANNEL_BIND, MessageClass::Request)
        .with_attribute(ChannelNumber::new(number))
        .with_attribute(XorPeerAddress::from(peer))
}

fn send_indication(peer: SocketAddr, data: &[u8]) -> Vec<u8> {
    let msg = StunMessageBuilder::new(SEND, MessageClass::Indication)
        .with_attribute(XorPeerAddress::from(peer))
        .with_attribute(Data::new(data))
        .build();
    Client::encode_unsigned(&msg)
}

fn allocated(relay: &Relay, now: Instant) -> Client {
    let mut client = Client::new("192.0.2.10:1000", "alice", "alice-pass");
    let response = client.allocate(relay, now);
    assert_eq!(response.class(), MessageClass::SuccessResponse);
    client
}

#[test]
fn create_permission() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();
    let mut client = allocated(&relay, now);
    let socket = relay.binder.socket(40000);
    let peer = addr(PEER);

    // Without permission data is silently dropped
    client.send(&relay, &send_indication(peer, b"hello"), now);
    assert!(socket.take_sent().is_empty());
    assert!(relay.sent_to(client.addr).is_empty());

    let response = client.request(&relay, || permission_request(&[peer]), now);
    assert_eq!(response.class(), MessageClass::SuccessResponse);
    assert!(response
        .integrity()
        .expect("No MESSAGE-INTEGRITY")
        .verify(client.key()));

    client.send(&relay, &send_indication(peer, b"hello"), now);
    assert_eq!(socket.take_sent(), vec![(peer, b"hello".to_vec())]);

    // Permissions do not depend on the peer port
    let other_port = addr("192.0.2.99:9999");
    client.send(&relay, &send_indication(other_port, b"again"), now);
    assert_eq!(socket.take_sent(), vec![(other_port, b"again".to_vec())]);
}

#[test]
fn create_permission_errors() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();

    // No allocation
    let mut client = Client::new("192.0.2.10:1000", "alice", "alice-pass");
    let response = client.request(&relay, || permission_request(&[addr(PEER)]), now);
    assert_eq!(error_code(&response), codes::ALLOCATION_MISMATCH);

    let mut client = allocated(&relay, now);
    let response = client.request(&relay, || permission_request(&[]), now);
    assert_eq!(error_code(&response), codes::BAD_REQUEST);

    // One bad peer rejects the whole request
    let ipv4 = addr(PEER);
    let ipv6 = addr("[2001:db8::1]:7000");
    let response = client.request(&relay, || permission_request(&[ipv4, ipv6]), now);
    assert_eq!(error_code(&response), codes::PEER_ADDRESS_FAMILY_MISMATCH);

    let socket = relay.binder.socket(40000);
    client.send(&relay, &send_indication(ipv4, b"hello"), now);
    assert!(socket.take_sent().is_empty());
}

#[test]
fn requests_from_another_user() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();
    let alice = allocated(&relay, now);

    // Same 5-tuple, different credentials
    let mut mallory = Client::new(&alice.addr.to_string(), "bob", "bob-pass");
    let requests: [fn() -> StunMessageBuilder; 3] = [
        || permission_request(&[addr(PEER)]),
        || channel_bind_request(0x4000, addr(PEER)),
        || StunMessageBuilder::new(REFRESH, MessageClass::Request),
    ];
    for build in requests {
        let response = mallory.request(&relay, build, now);
        assert_eq!(error_code(&response), codes::WRONG_CREDENTIALS);
    }
    assert_eq!(relay.service.allocations().len(), 1);
}

#[test]
fn peer_data_as_indication() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();
    let mut client = allocated(&relay, now);
    let peer = addr(PEER);
    let relay_socket = relay.binder.socket(40000).addr();

    relay
        .service
        .handle_peer_datagram(relay_socket, peer, b"unsolicited", now);
    assert!(relay.sent_to(client.addr).is_empty());

    client.request(&relay, || permission_request(&[peer]), now);
    relay
        .service
        .handle_peer_datagram(relay_socket, peer, b"welcome", now);
    let sent = relay.sent_to(client.addr);
    assert_eq!(sent.len(), 1);
    let msg = decode(&sent[0]);
    assert_eq!(msg.method(), DATA);
    assert_eq!(msg.class(), MessageClass::Indication);
    let attr = msg.get::<XorPeerAddress>().expect("No XOR-PEER-ADDRESS");
    assert_eq!(attr.expect_xor_peer_address().socket_address(), &peer);
    let attr = msg.get::<Data>().expect("No DATA");
    assert_eq!(attr.expect_data().as_bytes(), b"welcome");
}

#[test]
fn channel_data_both_ways() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();
    let mut client = allocated(&relay, now);
    let peer = addr(PEER);
    let socket = relay.binder.socket(40000);

    let response = client.request(&relay, || channel_bind_request(0x4000, peer), now);
    assert_eq!(response.class(), MessageClass::SuccessResponse);

    let data = ChannelData::new(0x4000, b"over channel".to_vec())
        .expect("Invalid message")
        .encode_to_vec()
        .expect("Can not encode");
    client.send(&relay, &data, now);
    assert_eq!(socket.take_sent(), vec![(peer, b"over channel".to_vec())]);

    // Peers bound to a channel answer through it
    relay
        .service
        .handle_peer_datagram(socket.addr(), peer, b"reply", now);
    let sent = relay.sent_to(client.addr);
    assert_eq!(sent.len(), 1);
    let (msg, _) = ChannelData::decode(&sent[0]).expect("Can not decode");
    assert_eq!(msg.channel(), 0x4000);
    assert_eq!(msg.data(), b"reply");

    // Unbound channels are dropped
    let data = ChannelData::new(0x4001, b"lost".to_vec())
        .expect("Invalid message")
        .encode_to_vec()
        .expect("Can not encode");
    client.send(&relay, &data, now);
    assert!(socket.take_sent().is_empty());
    assert!(relay.sent_to(client.addr).is_empty());
}

#[test]
fn channel_bind_errors() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();
    let mut client = allocated(&relay, now);
    let peer = addr(PEER);
    let other = addr("192.0.2.100:7000");

    for number in [0x3FFF, 0x8000, 0xFFFF] {
        let response = client.request(&relay, || channel_bind_request(number, peer), now);
        assert_eq!(error_code(&response), codes::BAD_REQUEST);
    }

    let response = client.request(
        &relay,
        || {
            StunMessageBuilder::new(CHANNEL_BIND, MessageClass::Request)
                .with_attribute(ChannelNumber::new(0x4000))
        },
        now,
    );
    assert_eq!(error_code(&response), codes::BAD_REQUEST);

    let response = client.request(
        &relay,
        || channel_bind_request(0x4000, addr("[2001:db8::1]:7000")),
        now,
    );
    assert_eq!(error_code(&response), codes::PEER_ADDRESS_FAMILY_MISMATCH);

    let response = client.request(&relay, || channel_bind_request(0x4000, peer), now);
    assert_eq!(response.class(), MessageClass::SuccessResponse);

    // Rebinding the same pair refreshes it
    let response = client.request(&relay, || channel_bind_request(0x4000, peer), now);
    assert_eq!(response.class(), MessageClass::SuccessResponse);

    let response = client.request(&relay, || channel_bind_request(0x4000, other), now);
    assert_eq!(error_code(&response), codes::BAD_REQUEST);
    let response = client.request(&relay, || channel_bind_request(0x4001, peer), now);
    assert_eq!(error_code(&response), codes::BAD_REQUEST);
}

#[test]
fn channel_bind_installs_permission() {
    init_logging();
    let relay = Relay::with_defaults();
    let now = Instant::now();
    let mut client = allocated(&relay, now);
    let peer = addr(PEER);
    let socket = relay.binder.socket(40000);

    client.request(&relay, || channel_bind_request(0x5000, peer), now);
    client.send(&relay, &send_indication(peer, b"indication"), now);
    assert_eq!(socket.take_sent(), vec![(peer, b"indication".to_vec())]);
}
