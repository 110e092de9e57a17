#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use stun_proto::attributes::stun::{ErrorCode, Nonce, Realm, UserName};
use stun_proto::attributes::turn::{RequestedTransport, XorRelayedAddress};
use stun_proto::methods::ALLOCATE;
use stun_proto::protocols::UDP;
use stun_proto::{
    HMACKey, MessageClass, MessageDecoder, MessageEncoderBuilder, StunMessage,
    StunMessageBuilder,
};
use turn_relay::{
    DatagramSocket, RelayBinder, ServerConfig, ServerConfigBuilder, StaticCredentials, TurnService,
};

pub const REALM: &str = "echo-chamber";
pub const LISTEN_ADDR: &str = "198.51.100.1:3478";
pub const PUBLIC_IP: &str = "203.0.113.1";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().expect("Invalid address")
}

#[derive(Debug)]
pub struct RecordingSocket {
    addr: SocketAddr,
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    closed: AtomicBool,
}

impl RecordingSocket {
    pub fn new(addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            addr,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn take_sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DatagramSocket for RecordingSocket {
    fn send_to(&self, buffer: &[u8], target: SocketAddr) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        self.sent.lock().push((target, buffer.to_vec()));
        Ok(buffer.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct RecordingBinder {
    unavailable: Mutex<HashSet<u16>>,
    sockets: Mutex<Vec<Arc<RecordingSocket>>>,
}

impl RecordingBinder {
    pub fn make_unavailable(&self, port: u16) {
        self.unavailable.lock().insert(port);
    }

    /// Latest socket bound to `port`
    pub fn socket(&self, port: u16) -> Arc<RecordingSocket> {
        self.sockets
            .lock()
            .iter()
            .rev()
            .find(|s| s.addr().port() == port)
            .cloned()
            .expect("Port not bound")
    }

    pub fn bound(&self) -> usize {
        self.sockets.lock().len()
    }
}

impl RelayBinder for RecordingBinder {
    fn bind(&self, addr: SocketAddr) -> io::Result<Arc<dyn DatagramSocket>> {
        if self.unavailable.lock().contains(&addr.port()) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "in use"));
        }
        let socket = RecordingSocket::new(addr);
        self.sockets.lock().push(socket.clone());
        Ok(socket)
    }
}

pub fn config() -> ServerConfigBuilder {
    ServerConfigBuilder::default()
        .with_listen_addr(addr(LISTEN_ADDR))
        .with_relay_public_ip(PUBLIC_IP.parse().expect("Invalid IP"))
        .with_relay_ports(40000, 40009)
        .with_realm(REALM)
        .with_credential("alice", "alice-pass")
        .with_credential("bob", "bob-pass")
}

pub struct Relay {
    pub service: TurnService,
    pub listener: Arc<RecordingSocket>,
    pub binder: Arc<RecordingBinder>,
}

impl Relay {
    pub fn new(config: ServerConfig) -> Self {
        let auth = StaticCredentials::new(config.realm(), config.credentials())
            .expect("Invalid credentials");
        let listener = RecordingSocket::new(config.listen_addr());
        let binder = Arc::new(RecordingBinder::default());
        let service = TurnService::new(config, Arc::new(auth), listener.clone(), binder.clone());
        Self {
            service,
            listener,
            binder,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(config().build().expect("Invalid config"))
    }

    /// Datagrams sent to `client` through the listening socket
    pub fn sent_to(&self, client: SocketAddr) -> Vec<Vec<u8>> {
        self.listener
            .take_sent()
            .into_iter()
            .map(|(target, buffer)| {
                assert_eq!(target, client);
                buffer
            })
            .collect()
    }
}

pub fn decode(buffer: &[u8]) -> StunMessage {
    MessageDecoder::default()
        .decode(buffer)
        .expect("Can not decode")
        .0
}

pub fn error_code(msg: &StunMessage) -> u16 {
    assert_eq!(msg.class(), MessageClass::ErrorResponse);
    let attr = msg.get::<ErrorCode>().expect("No ERROR-CODE");
    attr.expect_error_code().error_code().error_code()
}

pub fn relayed_address(msg: &StunMessage) -> SocketAddr {
    let attr = msg.get::<XorRelayedAddress>().expect("No XOR-RELAYED-ADDRESS");
    *attr.expect_xor_relayed_address().socket_address()
}

/// A TURN client talking to a [`Relay`] from a fixed transport address.
pub struct Client {
    pub addr: SocketAddr,
    username: String,
    key: HMACKey,
    nonce: Option<String>,
}

impl Client {
    pub fn new(addr: &str, username: &str, password: &str) -> Self {
        Self {
            addr: self::addr(addr),
            username: username.to_string(),
            key: HMACKey::new_long_term(username, REALM, password).expect("Invalid key"),
            nonce: None,
        }
    }

    pub fn key(&self) -> &HMACKey {
        &self.key
    }

    pub fn set_nonce(&mut self, nonce: &str) {
        self.nonce = Some(nonce.to_string());
    }

    /// Sends `buffer` and returns the single answer
    pub fn exchange(&self, relay: &Relay, buffer: &[u8], now: Instant) -> StunMessage {
        relay.service.handle_client_datagram(self.addr, buffer, now);
        let mut sent = relay.sent_to(self.addr);
        assert_eq!(sent.len(), 1, "Exactly one answer expected");
        decode(&sent.remove(0))
    }

    pub fn send(&self, relay: &Relay, buffer: &[u8], now: Instant) {
        relay.service.handle_client_datagram(self.addr, buffer, now);
    }

    pub fn encode_unsigned(msg: &StunMessage) -> Vec<u8> {
        MessageEncoderBuilder::default()
            .build()
            .encode_to_vec(msg)
            .expect("Can not encode")
    }

    /// Encodes `builder` with the client credentials and the last nonce
    pub fn sign(&self, builder: StunMessageBuilder) -> Vec<u8> {
        let nonce = self.nonce.as_deref().expect("No nonce yet");
        let msg = builder
            .with_attribute(UserName::new(&self.username).expect("Invalid username"))
            .with_attribute(Realm::new(REALM).expect("Invalid realm"))
            .with_attribute(Nonce::new(nonce).expect("Invalid nonce"))
            .build();
        MessageEncoderBuilder::default()
            .with_integrity(self.key.clone())
            .build()
            .encode_to_vec(&msg)
            .expect("Can not encode")
    }

    /// Sends a signed request, picking up a new nonce and retrying once if
    /// the relay challenges it.
    pub fn request<F>(&mut self, relay: &Relay, build: F, now: Instant) -> StunMessage
    where
        F: Fn() -> StunMessageBuilder,
    {
        if self.nonce.is_none() {
            let msg = StunMessageBuilder::new(ALLOCATE, MessageClass::Request)
                .with_attribute(RequestedTransport::new(UDP))
                .build();
            let response = self.exchange(relay, &Self::encode_unsigned(&msg), now);
            self.learn_nonce(&response);
        }

        let response = self.exchange(relay, &self.sign(build()), now);
        if response.class() == MessageClass::ErrorResponse
            && matches!(error_code(&response), 401 | 438)
        {
            self.learn_nonce(&response);
            return self.exchange(relay, &self.sign(build()), now);
        }
        response
    }

    pub fn learn_nonce(&mut self, response: &StunMessage) {
        let attr = response.get::<Nonce>().expect("No NONCE");
        self.nonce = Some(attr.expect_nonce().as_str().to_string());
    }

    pub fn allocate(&mut self, relay: &Relay, now: Instant) -> StunMessage {
        self.request(
            relay,
            || {
                StunMessageBuilder::new(ALLOCATE, MessageClass::Request)
                    .with_attribute(RequestedTransport::new(UDP))
            },
            now,
        )
    }
}
