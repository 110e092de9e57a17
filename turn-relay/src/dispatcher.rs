//! Request dispatcher.
//!
//! [`TurnService`] owns the relay state and processes every datagram the
//! driver receives, on the client-facing socket or on a relay socket. It
//! never blocks: answers and relayed data are written through the
//! [`DatagramSocket`] handles it was given, and time is passed in by the
//! caller.

use crate::allocation::{Allocation, AllocationRequest, AllocationTable, FiveTuple, TableConfig};
use crate::auth::{AuthHandler, AuthOutcome, Authenticator, NonceManager};
use crate::config::ServerConfig;
use crate::error::codes;
use crate::forwarder::Forwarder;
use crate::ports::PortRequest;
use crate::response::{Response, ResponseEncoder};
use crate::socket::{DatagramSocket, RelayBinder};
use log::{debug, info, trace};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stun_proto::attributes::stun::{Nonce, UnknownAttributes, XorMappedAddress};
use stun_proto::attributes::turn::{
    ChannelNumber, EvenPort, LifeTime, RequestedAddressFamily, RequestedTransport,
    ReservationToken, XorPeerAddress, XorRelayedAddress,
};
use stun_proto::methods::{ALLOCATE, BINDING, CHANNEL_BIND, CREATE_PERMISSION, REFRESH, SEND};
use stun_proto::protocols::UDP;
use stun_proto::{
    is_channel_data, is_stun_message, AddressFamily, ChannelData, HMACKey, MessageClass,
    MessageDecoder, StunMessage, MAX_CHANNEL_NUMBER, MIN_CHANNEL_NUMBER,
};

enum Reply {
    Response(Response),
    Encoded(Vec<u8>),
}

type Handled = Result<Response, Response>;

fn reject(msg: &StunMessage, code: u16, key: &HMACKey) -> Response {
    Response::error(msg, code).with_integrity(key.clone())
}

fn lifetime_secs(lifetime: Duration) -> u32 {
    u32::try_from(lifetime.as_secs()).unwrap_or(u32::MAX)
}

/// A TURN relay serving one client-facing socket.
pub struct TurnService {
    config: ServerConfig,
    auth: Arc<dyn AuthHandler>,
    nonces: NonceManager,
    table: AllocationTable,
    forwarder: Forwarder,
    listener: Arc<dyn DatagramSocket>,
    binder: Arc<dyn RelayBinder>,
    decoder: MessageDecoder,
    encoder: ResponseEncoder,
}

impl fmt::Debug for TurnService {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TurnService")
            .field("config", &self.config)
            .field("listener", &self.listener)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl TurnService {
    /// Creates a relay answering clients through `listener`, verifying
    /// credentials with `auth` and creating relay sockets with `binder`.
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn AuthHandler>,
        listener: Arc<dyn DatagramSocket>,
        binder: Arc<dyn RelayBinder>,
    ) -> Self {
        let table = AllocationTable::new(TableConfig {
            public_ip: config.relay_public_ip(),
            bind_ip: config.relay_bind_ip(),
            ports: config.relay_ports(),
            max_allocations: config.max_allocations(),
            user_quota: config.user_quota(),
        });
        let forwarder = Forwarder::new(
            listener.clone(),
            config.permission_lifetime(),
            config.channel_lifetime(),
        );
        Self {
            nonces: NonceManager::new(config.nonce_lifetime()),
            encoder: ResponseEncoder::new(config.software_attribute().cloned()),
            decoder: MessageDecoder::default(),
            table,
            forwarder,
            listener,
            binder,
            auth,
            config,
        }
    }

    /// The configuration the relay runs with
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The allocations of the relay
    pub fn allocations(&self) -> &AllocationTable {
        &self.table
    }

    /// Removes expired allocations, permissions, channels and port
    /// reservations. Returns the number of allocations removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let removed = self.table.sweep(now);
        if removed > 0 {
            debug!("{} allocations expired, {} left", removed, self.table.len());
        }
        removed
    }

    /// Removes every allocation, closing their relay sockets.
    pub fn shutdown(&self) {
        info!("Releasing {} allocations", self.table.len());
        self.table.clear();
    }

    /// Processes a datagram received from `client` on the listening socket.
    /// Datagrams that are neither STUN messages nor `ChannelData` are dropped.
    pub fn handle_client_datagram(&self, client: SocketAddr, buffer: &[u8], now: Instant) {
        let five_tuple = FiveTuple::udp(client, self.config.listen_addr());
        if is_channel_data(buffer) {
            self.handle_channel_data(&five_tuple, buffer, now);
        } else if is_stun_message(buffer) {
            self.handle_stun(&five_tuple, buffer, now);
        } else {
            trace!("Dropping {} bytes from {}", buffer.len(), client);
        }
    }

    /// Processes a datagram `peer` sent to the relay socket bound to
    /// `relay`. Only the port of `relay` is taken into account, since
    /// relay sockets may be bound to a different address than the one
    /// advertised to clients.
    pub fn handle_peer_datagram(
        &self,
        relay: SocketAddr,
        peer: SocketAddr,
        buffer: &[u8],
        now: Instant,
    ) {
        let relayed = SocketAddr::new(self.config.relay_public_ip(), relay.port());
        let Some(allocation) = self.table.lookup_by_relay(&relayed, now) else {
            trace!("No allocation on {}, dropping data from {}", relayed, peer);
            return;
        };
        self.forwarder.peer_datagram(&allocation, peer, buffer, now);
    }

    fn handle_channel_data(&self, five_tuple: &FiveTuple, buffer: &[u8], now: Instant) {
        let msg = match ChannelData::decode(buffer) {
            Ok((msg, _)) => msg,
            Err(e) => {
                debug!("Invalid ChannelData from {}: {}", five_tuple.client, e);
                return;
            }
        };
        let Some(allocation) = self.table.lookup_by_client(five_tuple, now) else {
            trace!("ChannelData from {} without allocation", five_tuple.client);
            return;
        };
        self.forwarder.channel_data(&allocation, &msg, now);
    }

    fn handle_stun(&self, five_tuple: &FiveTuple, buffer: &[u8], now: Instant) {
        let msg = match self.decoder.decode(buffer) {
            Ok((msg, _)) => msg,
            Err(e) => {
                debug!("Invalid STUN message from {}: {}", five_tuple.client, e);
                return;
            }
        };

        match msg.class() {
            MessageClass::Request => self.handle_request(five_tuple, &msg, now),
            MessageClass::Indication => self.handle_indication(five_tuple, &msg, now),
            MessageClass::SuccessResponse | MessageClass::ErrorResponse => {
                debug!(
                    "[{}] Dropping response from {}",
                    msg.transaction_id(),
                    five_tuple.client
                );
            }
        }
    }

    fn handle_indication(&self, five_tuple: &FiveTuple, msg: &StunMessage, now: Instant) {
        if msg.method() != SEND {
            debug!(
                "[{}] Dropping indication {:?} from {}",
                msg.transaction_id(),
                msg.method(),
                five_tuple.client
            );
            return;
        }
        if !msg.unknown_comprehension_required().is_empty() {
            debug!(
                "[{}] Dropping indication with unknown attributes",
                msg.transaction_id()
            );
            return;
        }
        let Some(allocation) = self.table.lookup_by_client(five_tuple, now) else {
            trace!("Send indication from {} without allocation", five_tuple.client);
            return;
        };
        self.forwarder.send_indication(&allocation, msg, now);
    }

    fn handle_request(&self, five_tuple: &FiveTuple, msg: &StunMessage, now: Instant) {
        let unknown = msg.unknown_comprehension_required();
        let reply = if !unknown.is_empty() {
            debug!(
                "[{}] Unknown comprehension-required attributes {:?}",
                msg.transaction_id(),
                unknown
            );
            Reply::Response(
                Response::error(msg, codes::UNKNOWN_ATTRIBUTE)
                    .with_attribute(UnknownAttributes::from(&unknown[..])),
            )
        } else {
            let handled = match msg.method() {
                BINDING => Ok(self.binding(five_tuple, msg)),
                ALLOCATE => self.allocate(five_tuple, msg, now),
                REFRESH => self.refresh(five_tuple, msg, now).map(Reply::Response),
                CREATE_PERMISSION => self
                    .create_permission(five_tuple, msg, now)
                    .map(Reply::Response),
                CHANNEL_BIND => self.channel_bind(five_tuple, msg, now).map(Reply::Response),
                method => {
                    debug!(
                        "[{}] Unsupported request {:?}",
                        msg.transaction_id(),
                        method
                    );
                    Err(Response::error(msg, codes::BAD_REQUEST))
                }
            };
            handled.unwrap_or_else(Reply::Response)
        };

        let buffer = match reply {
            Reply::Encoded(buffer) => buffer,
            Reply::Response(response) => {
                if let Some(code) = response.error_code() {
                    debug!(
                        "[{}] {:?} from {} rejected with {}",
                        msg.transaction_id(),
                        msg.method(),
                        five_tuple.client,
                        code
                    );
                }
                match self.encoder.encode(response, msg.has_fingerprint()) {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        debug!("[{}] Can not answer: {}", msg.transaction_id(), e);
                        return;
                    }
                }
            }
        };
        self.send(five_tuple.client, &buffer);
    }

    fn send(&self, client: SocketAddr, buffer: &[u8]) {
        if let Err(e) = self.listener.send_to(buffer, client) {
            debug!("Can not send {} bytes to {}: {}", buffer.len(), client, e);
        }
    }

    fn authenticate(&self, msg: &StunMessage, now: Instant) -> Result<(String, HMACKey), Response> {
        let authenticator = Authenticator {
            realm: self.config.realm(),
            nonces: &self.nonces,
            handler: self.auth.as_ref(),
        };
        match authenticator.authenticate(msg, now) {
            AuthOutcome::Authenticated { username, key } => Ok((username, key)),
            AuthOutcome::Challenge => Err(self.challenge(msg, codes::UNAUTHORIZED, now)),
            AuthOutcome::StaleNonce => Err(self.challenge(msg, codes::STALE_NONCE, now)),
        }
    }

    fn challenge(&self, msg: &StunMessage, code: u16, now: Instant) -> Response {
        Response::error(msg, code)
            .with_attribute(self.config.realm_attribute().clone())
            .try_with_attribute(Nonce::new(self.nonces.issue(now)))
    }

    /// Finds the allocation of `five_tuple` and checks it belongs to `username`
    fn owned_allocation(
        &self,
        five_tuple: &FiveTuple,
        username: &str,
        msg: &StunMessage,
        key: &HMACKey,
        now: Instant,
    ) -> Result<Arc<Allocation>, Response> {
        let allocation = self
            .table
            .lookup_by_client(five_tuple, now)
            .ok_or_else(|| reject(msg, codes::ALLOCATION_MISMATCH, key))?;
        if allocation.username() != username {
            return Err(reject(msg, codes::WRONG_CREDENTIALS, key));
        }
        Ok(allocation)
    }

    fn peer_family_matches(&self, peer: &SocketAddr) -> bool {
        AddressFamily::of(peer) == self.config.relay_family()
    }

    fn requested_lifetime(msg: &StunMessage) -> Option<Duration> {
        msg.get::<LifeTime>()
            .and_then(|attr| attr.as_life_time())
            .map(|attr| Duration::from_secs(u64::from(attr.as_u32())))
    }

    fn binding(&self, five_tuple: &FiveTuple, msg: &StunMessage) -> Reply {
        Reply::Response(
            Response::success(msg).with_attribute(XorMappedAddress::from(five_tuple.client)),
        )
    }

    fn allocate(&self, five_tuple: &FiveTuple, msg: &StunMessage, now: Instant) -> Result<Reply, Response> {
        let (username, key) = self.authenticate(msg, now)?;

        if let Some(existing) = self.table.lookup_by_client(five_tuple, now) {
            if existing.transaction_id() == msg.transaction_id() {
                if let Some(buffer) = existing.response() {
                    debug!("[{}] Allocate retransmission", msg.transaction_id());
                    return Ok(Reply::Encoded(buffer));
                }
            }
            return Err(reject(msg, codes::ALLOCATION_MISMATCH, &key));
        }

        let transport = msg
            .get::<RequestedTransport>()
            .and_then(|attr| attr.as_requested_transport())
            .ok_or_else(|| reject(msg, codes::BAD_REQUEST, &key))?;
        if transport.protocol() != UDP {
            return Err(reject(msg, codes::UNSUPPORTED_TRANSPORT_PROTOCOL, &key));
        }

        let even_port = msg
            .get::<EvenPort>()
            .and_then(|attr| attr.as_even_port())
            .map(|attr| attr.reserve());
        let family = msg
            .get::<RequestedAddressFamily>()
            .and_then(|attr| attr.as_requested_address_family())
            .map(|attr| attr.family());
        let token = msg
            .get::<ReservationToken>()
            .and_then(|attr| attr.as_reservation_token())
            .map(|attr| *attr.token());

        if token.is_some() && (even_port.is_some() || family.is_some()) {
            return Err(reject(msg, codes::BAD_REQUEST, &key));
        }
        if family.is_some_and(|family| family != self.config.relay_family()) {
            return Err(reject(msg, codes::ADDRESS_FAMILY_NOT_SUPPORTED, &key));
        }

        let lifetime = self
            .config
            .negotiate_lifetime(Self::requested_lifetime(msg));
        let port = match even_port {
            None => PortRequest::Any,
            Some(false) => PortRequest::Even,
            Some(true) => PortRequest::EvenPair,
        };
        let created = self
            .table
            .create(
                AllocationRequest {
                    five_tuple: *five_tuple,
                    username,
                    transaction_id: *msg.transaction_id(),
                    lifetime,
                    port,
                    reservation_token: token,
                },
                self.binder.as_ref(),
                now,
            )
            .map_err(|e| {
                debug!("[{}] Can not allocate: {}", msg.transaction_id(), e);
                reject(msg, e.error_code(), &key)
            })?;

        let mut response = Response::success(msg)
            .with_attribute(XorRelayedAddress::from(created.allocation.relayed_addr()))
            .with_attribute(LifeTime::new(lifetime_secs(lifetime)));
        if let Some(token) = created.reservation_token {
            response = response.with_attribute(ReservationToken::from(token));
        }
        let response = response
            .with_attribute(XorMappedAddress::from(five_tuple.client))
            .with_integrity(key);

        match self.encoder.encode(response, msg.has_fingerprint()) {
            Ok(buffer) => {
                created.allocation.set_response(buffer.clone());
                Ok(Reply::Encoded(buffer))
            }
            Err(e) => {
                debug!("[{}] Can not answer Allocate: {}", msg.transaction_id(), e);
                let _ = self.table.remove(five_tuple);
                Err(Response::error(msg, codes::INSUFFICIENT_CAPACITY))
            }
        }
    }

    fn refresh(&self, five_tuple: &FiveTuple, msg: &StunMessage, now: Instant) -> Handled {
        let (username, key) = self.authenticate(msg, now)?;
        self.owned_allocation(five_tuple, &username, msg, &key, now)?;

        let family = msg
            .get::<RequestedAddressFamily>()
            .and_then(|attr| attr.as_requested_address_family())
            .map(|attr| attr.family());
        if family.is_some_and(|family| family != self.config.relay_family()) {
            return Err(reject(msg, codes::PEER_ADDRESS_FAMILY_MISMATCH, &key));
        }

        let lifetime = match Self::requested_lifetime(msg) {
            Some(requested) if requested.is_zero() => Duration::ZERO,
            requested => self.config.negotiate_lifetime(requested),
        };
        self.table
            .refresh(five_tuple, lifetime, now)
            .map_err(|e| reject(msg, e.error_code(), &key))?;

        Ok(Response::success(msg)
            .with_attribute(LifeTime::new(lifetime_secs(lifetime)))
            .with_integrity(key))
    }

    fn create_permission(&self, five_tuple: &FiveTuple, msg: &StunMessage, now: Instant) -> Handled {
        let (username, key) = self.authenticate(msg, now)?;
        let allocation = self.owned_allocation(five_tuple, &username, msg, &key, now)?;

        let peers: Vec<SocketAddr> = msg
            .get_all::<XorPeerAddress>()
            .filter_map(|attr| attr.as_xor_peer_address())
            .map(|attr| *attr.socket_address())
            .collect();
        if peers.is_empty() {
            return Err(reject(msg, codes::BAD_REQUEST, &key));
        }
        if !peers.iter().all(|peer| self.peer_family_matches(peer)) {
            return Err(reject(msg, codes::PEER_ADDRESS_FAMILY_MISMATCH, &key));
        }

        let ips: Vec<IpAddr> = peers.iter().map(SocketAddr::ip).collect();
        allocation.grant_permissions(&ips, self.config.permission_lifetime(), now);
        trace!("[{}] Permissions installed for {:?}", msg.transaction_id(), ips);

        Ok(Response::success(msg).with_integrity(key))
    }

    fn channel_bind(&self, five_tuple: &FiveTuple, msg: &StunMessage, now: Instant) -> Handled {
        let (username, key) = self.authenticate(msg, now)?;
        let allocation = self.owned_allocation(five_tuple, &username, msg, &key, now)?;

        let number = msg
            .get::<ChannelNumber>()
            .and_then(|attr| attr.as_channel_number())
            .map(|attr| attr.number());
        let peer = msg
            .get::<XorPeerAddress>()
            .and_then(|attr| attr.as_xor_peer_address())
            .map(|attr| *attr.socket_address());
        let (Some(number), Some(peer)) = (number, peer) else {
            return Err(reject(msg, codes::BAD_REQUEST, &key));
        };
        if !(MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER).contains(&number) {
            return Err(reject(msg, codes::BAD_REQUEST, &key));
        }
        if !self.peer_family_matches(&peer) {
            return Err(reject(msg, codes::PEER_ADDRESS_FAMILY_MISMATCH, &key));
        }

        allocation
            .bind_channel(
                number,
                peer,
                self.config.channel_lifetime(),
                self.config.permission_lifetime(),
                now,
            )
            .map_err(|e| {
                debug!("[{}] {}", msg.transaction_id(), e);
                reject(msg, e.error_code(), &key)
            })?;

        Ok(Response::success(msg).with_integrity(key))
    }
}
