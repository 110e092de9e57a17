//! Allocation table.
//!
//! The table owns every allocation, and through them every permission,
//! channel binding and relay socket. Structural changes (inserting or
//! removing an allocation) take the table-wide write lock; everything an
//! allocation owns is guarded by that allocation's own mutex, so requests
//! of unrelated clients never wait on each other. Locks are always taken
//! in the order table, then port pool, then allocation.

use crate::error::{AllocationError, ChannelError};
use crate::permissions::{Channels, Permissions};
use crate::ports::{Lease, PortPool, PortRequest, ReservationToken};
use crate::socket::{DatagramSocket, RelayBinder};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stun_proto::TransactionId;

/// Transport protocol of a 5-tuple. Only UDP is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// UDP
    Udp,
}

/// Client transport address, server transport address and transport
/// protocol identifying an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    /// Client address as seen by the server
    pub client: SocketAddr,
    /// Server address the client sends to
    pub server: SocketAddr,
    /// Transport protocol
    pub transport: Transport,
}

impl FiveTuple {
    /// Creates a UDP 5-tuple
    pub fn udp(client: SocketAddr, server: SocketAddr) -> Self {
        Self {
            client,
            server,
            transport: Transport::Udp,
        }
    }
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}/udp", self.client, self.server)
    }
}

/// How data received from a peer is delivered to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRoute {
    /// As `ChannelData` on the bound channel
    Channel(u16),
    /// As a Data indication
    Indication,
    /// Not at all: the peer has no permission
    Denied,
}

#[derive(Debug)]
struct AllocationState {
    expires_at: Instant,
    permissions: Permissions,
    channels: Channels,
    response: Option<Vec<u8>>,
}

/// A relayed transport address leased by one client.
#[derive(Debug)]
pub struct Allocation {
    five_tuple: FiveTuple,
    relayed_addr: SocketAddr,
    username: String,
    transaction_id: TransactionId,
    socket: Arc<dyn DatagramSocket>,
    state: Mutex<AllocationState>,
}

impl Allocation {
    /// 5-tuple owning the allocation
    pub fn five_tuple(&self) -> &FiveTuple {
        &self.five_tuple
    }

    /// Relayed transport address advertised to the client
    pub fn relayed_addr(&self) -> SocketAddr {
        self.relayed_addr
    }

    /// User that created the allocation
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Transaction ID of the Allocate request that created the allocation
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Socket bound to the relayed transport address
    pub fn socket(&self) -> &Arc<dyn DatagramSocket> {
        &self.socket
    }

    /// Returns true if the lifetime has elapsed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        self.state.lock().expires_at <= now
    }

    /// Time left before expiry
    pub fn remaining(&self, now: Instant) -> Duration {
        self.state.lock().expires_at.saturating_duration_since(now)
    }

    /// Sets the lifetime to `lifetime` from `now`
    pub fn refresh(&self, lifetime: Duration, now: Instant) {
        self.state.lock().expires_at = now + lifetime;
    }

    /// Installs or refreshes the permission for `peer`
    pub fn grant_permission(&self, peer: IpAddr, ttl: Duration, now: Instant) {
        self.state.lock().permissions.grant(peer, now + ttl);
    }

    /// Installs or refreshes the permissions for all `peers` at once
    pub fn grant_permissions(&self, peers: &[IpAddr], ttl: Duration, now: Instant) {
        let mut state = self.state.lock();
        for peer in peers {
            state.permissions.grant(*peer, now + ttl);
        }
    }

    /// Returns true if a live permission exists for `peer`
    pub fn has_permission(&self, peer: &IpAddr, now: Instant) -> bool {
        self.state.lock().permissions.contains(peer, now)
    }

    /// Binds `number` to `peer` and installs or refreshes the permission
    /// for the peer's IP address.
    pub fn bind_channel(
        &self,
        number: u16,
        peer: SocketAddr,
        channel_ttl: Duration,
        permission_ttl: Duration,
        now: Instant,
    ) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.channels.bind(number, peer, now + channel_ttl, now)?;
        state.permissions.grant(peer.ip(), now + permission_ttl);
        Ok(())
    }

    /// Returns the channel bound to `peer`
    pub fn channel_for(&self, peer: &SocketAddr, now: Instant) -> Option<u16> {
        self.state.lock().channels.channel_for(peer, now)
    }

    /// Returns the peer bound to `number`
    pub fn peer_for(&self, number: u16, now: Instant) -> Option<SocketAddr> {
        self.state.lock().channels.peer_for(number, now)
    }

    /// Looks up the peer bound to `number` and, if it is permitted,
    /// refreshes both the binding and the permission.
    pub fn use_channel(
        &self,
        number: u16,
        channel_ttl: Duration,
        permission_ttl: Duration,
        now: Instant,
    ) -> Option<SocketAddr> {
        let mut state = self.state.lock();
        let peer = state.channels.peer_for(number, now)?;
        if !state.permissions.contains(&peer.ip(), now) {
            return None;
        }
        state.channels.refresh(number, now + channel_ttl, now);
        state.permissions.grant(peer.ip(), now + permission_ttl);
        Some(peer)
    }

    /// Checks the permission for `peer` and refreshes it if it is live.
    pub fn use_permission(&self, peer: &IpAddr, ttl: Duration, now: Instant) -> bool {
        let mut state = self.state.lock();
        if !state.permissions.contains(peer, now) {
            return false;
        }
        state.permissions.grant(*peer, now + ttl);
        true
    }

    /// Decides how data coming from `peer` reaches the client.
    pub fn route_from_peer(&self, peer: &SocketAddr, now: Instant) -> PeerRoute {
        let mut state = self.state.lock();
        if !state.permissions.contains(&peer.ip(), now) {
            return PeerRoute::Denied;
        }
        match state.channels.channel_for(peer, now) {
            Some(number) => PeerRoute::Channel(number),
            None => PeerRoute::Indication,
        }
    }

    /// Stores the encoded success response of the creating Allocate, to
    /// answer retransmissions of it.
    pub fn set_response(&self, response: Vec<u8>) {
        self.state.lock().response = Some(response);
    }

    /// Returns the encoded success response of the creating Allocate
    pub fn response(&self) -> Option<Vec<u8>> {
        self.state.lock().response.clone()
    }

    fn sweep(&self, now: Instant) -> (usize, usize) {
        let mut state = self.state.lock();
        (state.permissions.sweep(now), state.channels.sweep(now))
    }
}

/// Parameters of a new allocation
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    /// 5-tuple requesting the allocation
    pub five_tuple: FiveTuple,
    /// Authenticated user
    pub username: String,
    /// Transaction ID of the Allocate request
    pub transaction_id: TransactionId,
    /// Granted lifetime
    pub lifetime: Duration,
    /// Kind of relay port
    pub port: PortRequest,
    /// Token of a port reserved by a previous allocation
    pub reservation_token: Option<ReservationToken>,
}

/// Quotas and addresses of an [`AllocationTable`]
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// IP address advertised in relayed transport addresses
    pub public_ip: IpAddr,
    /// IP address relay sockets are bound to
    pub bind_ip: IpAddr,
    /// Relay port range
    pub ports: RangeInclusive<u16>,
    /// Maximum number of allocations
    pub max_allocations: usize,
    /// Maximum number of allocations per username
    pub user_quota: usize,
}

#[derive(Debug, Default)]
struct TableInner {
    by_client: HashMap<FiveTuple, Arc<Allocation>>,
    by_relay: HashMap<SocketAddr, Arc<Allocation>>,
    per_user: HashMap<String, usize>,
}

impl TableInner {
    fn insert(&mut self, allocation: Arc<Allocation>) {
        *self
            .per_user
            .entry(allocation.username.clone())
            .or_default() += 1;
        self.by_relay
            .insert(allocation.relayed_addr, allocation.clone());
        self.by_client.insert(allocation.five_tuple, allocation);
    }

    fn remove(&mut self, five_tuple: &FiveTuple) -> Option<Arc<Allocation>> {
        let allocation = self.by_client.remove(five_tuple)?;
        self.by_relay.remove(&allocation.relayed_addr);
        if let Some(count) = self.per_user.get_mut(&allocation.username) {
            *count -= 1;
            if *count == 0 {
                self.per_user.remove(&allocation.username);
            }
        }
        Some(allocation)
    }
}

/// Outcome of [`AllocationTable::create`]
#[derive(Debug)]
pub struct Created {
    /// The new allocation
    pub allocation: Arc<Allocation>,
    /// Token of the reserved next-higher port, if one was requested
    pub reservation_token: Option<ReservationToken>,
}

/// Every allocation of the relay, indexed by 5-tuple and by relayed
/// transport address.
pub struct AllocationTable {
    config: TableConfig,
    inner: RwLock<TableInner>,
    ports: Mutex<PortPool>,
}

impl fmt::Debug for AllocationTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AllocationTable")
            .field("config", &self.config)
            .field("allocations", &self.len())
            .finish()
    }
}

impl AllocationTable {
    /// Creates an empty table
    pub fn new(config: TableConfig) -> Self {
        let ports = PortPool::new(config.ports.clone());
        Self {
            config,
            inner: RwLock::new(TableInner::default()),
            ports: Mutex::new(ports),
        }
    }

    /// Number of live allocations
    pub fn len(&self) -> usize {
        self.inner.read().by_client.len()
    }

    /// Returns true if there are no allocations
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of relay ports neither leased nor reserved
    pub fn available_ports(&self) -> usize {
        self.ports.lock().available()
    }

    /// Creates an allocation, leasing a relay port and binding its socket.
    pub fn create(
        &self,
        request: AllocationRequest,
        binder: &dyn RelayBinder,
        now: Instant,
    ) -> Result<Created, AllocationError> {
        let mut inner = self.inner.write();

        if let Some(existing) = inner.by_client.get(&request.five_tuple) {
            if !existing.is_expired(now) {
                return Err(AllocationError::AllocMismatch);
            }
            if let Some(expired) = inner.remove(&request.five_tuple) {
                self.teardown(&expired);
            }
        }

        if inner.by_client.len() >= self.config.max_allocations {
            debug!("Total allocation quota reached");
            return Err(AllocationError::QuotaExceeded);
        }
        let user_allocations = inner.per_user.get(&request.username).copied();
        if user_allocations.unwrap_or_default() >= self.config.user_quota {
            debug!("Allocation quota reached for {}", request.username);
            return Err(AllocationError::QuotaExceeded);
        }

        let bind_ip = self.config.bind_ip;
        let bind = |port: u16| binder.bind(SocketAddr::new(bind_ip, port));
        let lease: Lease<Arc<dyn DatagramSocket>> = {
            let mut ports = self.ports.lock();
            match &request.reservation_token {
                Some(token) => ports.redeem(token, now, bind)?,
                None => ports.acquire(request.port, now, bind)?,
            }
        };

        let allocation = Arc::new(Allocation {
            five_tuple: request.five_tuple,
            relayed_addr: SocketAddr::new(self.config.public_ip, lease.port),
            username: request.username,
            transaction_id: request.transaction_id,
            socket: lease.socket,
            state: Mutex::new(AllocationState {
                expires_at: now + request.lifetime,
                permissions: Permissions::default(),
                channels: Channels::default(),
                response: None,
            }),
        });
        inner.insert(allocation.clone());

        info!(
            "Allocation {} created for {} ({:?})",
            allocation.relayed_addr, allocation.five_tuple, request.lifetime
        );
        Ok(Created {
            allocation,
            reservation_token: lease.token,
        })
    }

    fn teardown(&self, allocation: &Allocation) {
        allocation.socket.close();
        self.ports.lock().release(allocation.relayed_addr.port());
        info!(
            "Allocation {} of {} released",
            allocation.relayed_addr, allocation.five_tuple
        );
    }

    fn live(allocation: Option<&Arc<Allocation>>, now: Instant) -> Option<Arc<Allocation>> {
        allocation
            .filter(|allocation| !allocation.is_expired(now))
            .cloned()
    }

    /// Returns the live allocation owned by `five_tuple`
    pub fn lookup_by_client(&self, five_tuple: &FiveTuple, now: Instant) -> Option<Arc<Allocation>> {
        Self::live(self.inner.read().by_client.get(five_tuple), now)
    }

    /// Returns the live allocation with relayed transport address `relayed`
    pub fn lookup_by_relay(&self, relayed: &SocketAddr, now: Instant) -> Option<Arc<Allocation>> {
        Self::live(self.inner.read().by_relay.get(relayed), now)
    }

    /// Sets the lifetime of the allocation owned by `five_tuple`. A zero
    /// lifetime deletes the allocation right away.
    pub fn refresh(
        &self,
        five_tuple: &FiveTuple,
        lifetime: Duration,
        now: Instant,
    ) -> Result<(), AllocationError> {
        if lifetime.is_zero() {
            return self.remove(five_tuple);
        }
        let allocation = self
            .lookup_by_client(five_tuple, now)
            .ok_or(AllocationError::NotFound)?;
        allocation.refresh(lifetime, now);
        debug!(
            "Allocation {} refreshed for {:?}",
            allocation.relayed_addr, lifetime
        );
        Ok(())
    }

    /// Deletes the allocation owned by `five_tuple`, closing its relay
    /// socket and returning its port to the pool.
    pub fn remove(&self, five_tuple: &FiveTuple) -> Result<(), AllocationError> {
        let allocation = self
            .inner
            .write()
            .remove(five_tuple)
            .ok_or(AllocationError::NotFound)?;
        self.teardown(&allocation);
        Ok(())
    }

    /// Deletes expired allocations, evicts expired permissions and channel
    /// bindings of the remaining ones, and drops expired port reservations.
    /// Returns the number of allocations deleted.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut inner = self.inner.write();
        let expired: Vec<FiveTuple> = inner
            .by_client
            .values()
            .filter(|allocation| allocation.is_expired(now))
            .map(|allocation| allocation.five_tuple)
            .collect();

        for five_tuple in &expired {
            if let Some(allocation) = inner.remove(five_tuple) {
                self.teardown(&allocation);
            }
        }

        let (permissions, channels) = inner
            .by_client
            .values()
            .map(|allocation| allocation.sweep(now))
            .fold((0, 0), |acc, n| (acc.0 + n.0, acc.1 + n.1));
        let reservations = self.ports.lock().sweep(now);

        if !expired.is_empty() || permissions > 0 || channels > 0 || reservations > 0 {
            debug!(
                "Swept {} allocations, {} permissions, {} channels, {} reservations",
                expired.len(),
                permissions,
                channels,
                reservations
            );
        }
        expired.len()
    }

    /// Deletes every allocation
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let five_tuples: Vec<FiveTuple> = inner.by_client.keys().copied().collect();
        for five_tuple in five_tuples {
            if let Some(allocation) = inner.remove(&five_tuple) {
                self.teardown(&allocation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::mock::MockBinder;

    fn addr(s: &str) -> SocketAddr {
        s.parse().expect("Invalid address")
    }

    fn table(ports: RangeInclusive<u16>, max_allocations: usize, user_quota: usize) -> AllocationTable {
        AllocationTable::new(TableConfig {
            public_ip: "203.0.113.1".parse().expect("Invalid IP"),
            bind_ip: "0.0.0.0".parse().expect("Invalid IP"),
            ports,
            max_allocations,
            user_quota,
        })
    }

    fn request(client: &str, username: &str) -> AllocationRequest {
        AllocationRequest {
            five_tuple: FiveTuple::udp(addr(client), addr("198.51.100.1:3478")),
            username: username.to_string(),
            transaction_id: TransactionId::default(),
            lifetime: Duration::from_secs(600),
            port: PortRequest::Any,
            reservation_token: None,
        }
    }

    #[test]
    fn create_and_lookup() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40009, 10, 10);

        let req = request("192.0.2.10:1000", "alice");
        let five_tuple = req.five_tuple;
        let created = table.create(req, &binder, now).expect("Can not allocate");
        let allocation = created.allocation;
        assert!(created.reservation_token.is_none());
        assert_eq!(allocation.relayed_addr(), addr("203.0.113.1:40000"));
        assert_eq!(allocation.username(), "alice");
        assert_eq!(allocation.remaining(now), Duration::from_secs(600));
        assert_eq!(table.len(), 1);

        // Bound on the bind address, advertised with the public one
        let socket = binder.socket(40000).expect("Socket not bound");
        assert_eq!(socket.addr, addr("0.0.0.0:40000"));

        let found = table.lookup_by_client(&five_tuple, now).expect("Not found");
        assert!(Arc::ptr_eq(&found, &allocation));
        let found = table
            .lookup_by_relay(&addr("203.0.113.1:40000"), now)
            .expect("Not found");
        assert!(Arc::ptr_eq(&found, &allocation));

        assert_eq!(
            table
                .create(request("192.0.2.10:1000", "alice"), &binder, now)
                .expect_err("Error expected"),
            AllocationError::AllocMismatch
        );

        // Same client address, different server address
        let mut other = request("192.0.2.10:1000", "alice");
        other.five_tuple.server = addr("198.51.100.2:3478");
        table.create(other, &binder, now).expect("Can not allocate");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn quotas() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40009, 3, 2);

        table
            .create(request("192.0.2.10:1000", "alice"), &binder, now)
            .expect("Can not allocate");
        table
            .create(request("192.0.2.10:1001", "alice"), &binder, now)
            .expect("Can not allocate");
        assert_eq!(
            table
                .create(request("192.0.2.10:1002", "alice"), &binder, now)
                .expect_err("Error expected"),
            AllocationError::QuotaExceeded
        );
        table
            .create(request("192.0.2.11:1000", "bob"), &binder, now)
            .expect("Can not allocate");
        assert_eq!(
            table
                .create(request("192.0.2.12:1000", "carol"), &binder, now)
                .expect_err("Error expected"),
            AllocationError::QuotaExceeded
        );

        // Deleting frees the quota of the user
        let five_tuple = request("192.0.2.10:1000", "alice").five_tuple;
        table.remove(&five_tuple).expect("Can not remove");
        table
            .create(request("192.0.2.10:1002", "alice"), &binder, now)
            .expect("Can not allocate");
    }

    #[test]
    fn port_exhaustion_and_bind_failures() {
        let now = Instant::now();
        let binder = MockBinder::default();
        binder.unavailable.lock().insert(40000);
        let table = table(40000..=40001, 10, 10);

        let created = table
            .create(request("192.0.2.10:1000", "alice"), &binder, now)
            .expect("Can not allocate");
        assert_eq!(created.allocation.relayed_addr().port(), 40001);
        assert_eq!(
            table
                .create(request("192.0.2.10:1001", "alice"), &binder, now)
                .expect_err("Error expected"),
            AllocationError::NoPortsAvailable
        );
    }

    #[test]
    fn zero_lifetime_refresh_releases_port() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40000, 10, 10);

        let req = request("192.0.2.10:1000", "alice");
        let five_tuple = req.five_tuple;
        table.create(req, &binder, now).expect("Can not allocate");
        assert_eq!(table.available_ports(), 0);

        table
            .refresh(&five_tuple, Duration::from_secs(1200), now)
            .expect("Can not refresh");
        let allocation = table.lookup_by_client(&five_tuple, now).expect("Not found");
        assert_eq!(allocation.remaining(now), Duration::from_secs(1200));

        table
            .refresh(&five_tuple, Duration::ZERO, now)
            .expect("Can not delete");
        assert!(binder.socket(40000).expect("Socket not bound").is_closed());
        assert_eq!(table.available_ports(), 1);
        assert!(table.lookup_by_client(&five_tuple, now).is_none());
        assert_eq!(
            table
                .refresh(&five_tuple, Duration::from_secs(600), now)
                .expect_err("Error expected"),
            AllocationError::NotFound
        );

        // Another client gets the same port
        let created = table
            .create(request("192.0.2.20:2000", "bob"), &binder, now)
            .expect("Can not allocate");
        assert_eq!(created.allocation.relayed_addr().port(), 40000);
    }

    #[test]
    fn sweep_expired() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40009, 10, 10);

        let mut short = request("192.0.2.10:1000", "alice");
        short.lifetime = Duration::from_secs(60);
        let five_tuple = short.five_tuple;
        let created = table.create(short, &binder, now).expect("Can not allocate");
        let peer = addr("192.0.2.99:7000");
        created
            .allocation
            .grant_permission(peer.ip(), Duration::from_secs(30), now);

        let created = table
            .create(request("192.0.2.11:1000", "bob"), &binder, now)
            .expect("Can not allocate");
        let long = created.allocation;
        long.bind_channel(
            0x4000,
            peer,
            Duration::from_secs(600),
            Duration::from_secs(300),
            now,
        )
        .expect("Can not bind");

        // Expired allocations are invisible before the sweep
        let later = now + Duration::from_secs(60);
        assert!(table.lookup_by_client(&five_tuple, later).is_none());
        assert_eq!(table.len(), 2);

        assert_eq!(table.sweep(later), 1);
        assert_eq!(table.len(), 1);
        assert!(binder.socket(40000).expect("Socket not bound").is_closed());
        assert_eq!(table.available_ports(), 9);

        assert!(long.has_permission(&peer.ip(), later));
        assert_eq!(table.sweep(now + Duration::from_secs(300)), 0);
        assert!(!long.has_permission(&peer.ip(), now + Duration::from_secs(300)));
        assert_eq!(long.peer_for(0x4000, now + Duration::from_secs(300)), Some(peer));
    }

    #[test]
    fn expired_allocation_replaced() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40009, 10, 10);

        table
            .create(request("192.0.2.10:1000", "alice"), &binder, now)
            .expect("Can not allocate");
        let later = now + Duration::from_secs(600);
        let created = table
            .create(request("192.0.2.10:1000", "alice"), &binder, later)
            .expect("Can not allocate");
        assert_eq!(created.allocation.relayed_addr().port(), 40001);
        assert!(binder.socket(40000).expect("Socket not bound").is_closed());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reservation_tokens() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40009, 10, 10);

        let mut even = request("192.0.2.10:1000", "alice");
        even.port = PortRequest::EvenPair;
        let created = table.create(even, &binder, now).expect("Can not allocate");
        assert_eq!(created.allocation.relayed_addr().port(), 40000);
        let token = created.reservation_token.expect("No token");

        let mut odd = request("192.0.2.10:1001", "alice");
        odd.reservation_token = Some(token);
        let created = table.create(odd, &binder, now).expect("Can not allocate");
        assert_eq!(created.allocation.relayed_addr().port(), 40001);

        let mut again = request("192.0.2.10:1002", "alice");
        again.reservation_token = Some(token);
        assert_eq!(
            table.create(again, &binder, now).expect_err("Error expected"),
            AllocationError::InvalidReservationToken
        );
    }

    #[test]
    fn channel_traffic_refreshes() {
        let now = Instant::now();
        let binder = MockBinder::default();
        let table = table(40000..=40009, 10, 10);
        let allocation = table
            .create(request("192.0.2.10:1000", "alice"), &binder, now)
            .expect("Can not allocate")
            .allocation;
        let peer = addr("192.0.2.99:7000");
        let permission = Duration::from_secs(300);
        let channel = Duration::from_secs(600);

        assert_eq!(allocation.use_channel(0x4000, channel, permission, now), None);
        allocation
            .bind_channel(0x4000, peer, channel, permission, now)
            .expect("Can not bind");
        assert_eq!(allocation.route_from_peer(&peer, now), PeerRoute::Channel(0x4000));

        let t1 = now + Duration::from_secs(250);
        assert_eq!(
            allocation.use_channel(0x4000, channel, permission, t1),
            Some(peer)
        );
        // The permission was refreshed by the channel traffic
        let t2 = now + Duration::from_secs(500);
        assert!(allocation.has_permission(&peer.ip(), t2));
        assert!(allocation.use_permission(&peer.ip(), permission, t2));
        assert!(!allocation.use_permission(&"192.0.2.98".parse().expect("Invalid IP"), permission, t2));
        assert_eq!(
            allocation.route_from_peer(&addr("192.0.2.98:7000"), t2),
            PeerRoute::Denied
        );
        // Other ports of a permitted peer use Data indications
        assert_eq!(
            allocation.route_from_peer(&addr("192.0.2.99:7001"), t2),
            PeerRoute::Indication
        );
    }
}
