//! Relay port pool.

use crate::error::AllocationError;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::io;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// How long a port reserved by `EVEN-PORT` stays reserved.
pub const RESERVATION_LIFETIME: Duration = Duration::from_secs(30);

/// Size of a reservation token
pub const RESERVATION_TOKEN_SIZE: usize = 8;

/// Token handed out for a reserved port
pub type ReservationToken = [u8; RESERVATION_TOKEN_SIZE];

/// Kind of port an allocation asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRequest {
    /// Any free port
    Any,
    /// An even port
    Even,
    /// An even port whose next-higher port is reserved for a later allocation
    EvenPair,
}

#[derive(Debug)]
struct Reservation {
    port: u16,
    expires_at: Instant,
}

/// A port taken from the pool together with the socket bound to it.
#[derive(Debug)]
pub struct Lease<T> {
    /// The port
    pub port: u16,
    /// Whatever the bind function returned for the port
    pub socket: T,
    /// Token for the reserved next-higher port, with [`PortRequest::EvenPair`]
    pub token: Option<ReservationToken>,
}

/// Hands out ports from a fixed range.
///
/// Free ports are probed in order starting after the last port handed
/// out, wrapping around at the end of the range. Ports the OS refuses to
/// bind are skipped.
#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    next: u16,
    in_use: HashSet<u16>,
    reservations: HashMap<ReservationToken, Reservation>,
}

impl PortPool {
    /// Creates a pool with all the ports in `range` free
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            next: *range.start(),
            range,
            in_use: HashSet::new(),
            reservations: HashMap::new(),
        }
    }

    /// Number of ports in the range
    pub fn capacity(&self) -> usize {
        self.range.len()
    }

    /// Number of ports neither leased nor reserved
    pub fn available(&self) -> usize {
        self.capacity() - self.in_use.len()
    }

    /// Returns true if `port` is leased or reserved
    pub fn is_in_use(&self, port: u16) -> bool {
        self.in_use.contains(&port)
    }

    fn candidates(&self) -> impl Iterator<Item = u16> {
        let start = u32::from(*self.range.start());
        let len = self.range.len() as u32;
        let offset = u32::from(self.next) - start;
        (0..len).map(move |i| (start + (offset + i) % len) as u16)
    }

    fn is_candidate(&self, port: u16, request: PortRequest) -> bool {
        if self.in_use.contains(&port) {
            return false;
        }
        match request {
            PortRequest::Any => true,
            PortRequest::Even => port % 2 == 0,
            PortRequest::EvenPair => {
                port % 2 == 0
                    && port < *self.range.end()
                    && !self.in_use.contains(&(port + 1))
            }
        }
    }

    /// Takes a free port matching `request` and binds it with `bind`.
    /// Ports for which `bind` fails are skipped.
    pub fn acquire<T, F>(
        &mut self,
        request: PortRequest,
        now: Instant,
        mut bind: F,
    ) -> Result<Lease<T>, AllocationError>
    where
        F: FnMut(u16) -> io::Result<T>,
    {
        let candidates: Vec<u16> = self
            .candidates()
            .filter(|port| self.is_candidate(*port, request))
            .collect();

        for port in candidates {
            let socket = match bind(port) {
                Ok(socket) => socket,
                Err(e) => {
                    debug!("Can not bind relay port {}: {}", port, e);
                    continue;
                }
            };

            self.in_use.insert(port);
            self.next = if port == *self.range.end() {
                *self.range.start()
            } else {
                port + 1
            };

            let token = (request == PortRequest::EvenPair).then(|| self.reserve(port + 1, now));
            return Ok(Lease {
                port,
                socket,
                token,
            });
        }

        debug!("No relay port available for {:?}", request);
        Err(AllocationError::NoPortsAvailable)
    }

    fn reserve(&mut self, port: u16, now: Instant) -> ReservationToken {
        let mut token: ReservationToken = rand::random();
        while self.reservations.contains_key(&token) {
            token = rand::random();
        }
        self.in_use.insert(port);
        self.reservations.insert(
            token,
            Reservation {
                port,
                expires_at: now + RESERVATION_LIFETIME,
            },
        );
        trace!("Port {} reserved", port);
        token
    }

    /// Takes the port reserved under `token` and binds it with `bind`.
    /// The reservation is consumed even if binding fails.
    pub fn redeem<T, F>(
        &mut self,
        token: &ReservationToken,
        now: Instant,
        bind: F,
    ) -> Result<Lease<T>, AllocationError>
    where
        F: FnOnce(u16) -> io::Result<T>,
    {
        let reservation = self
            .reservations
            .remove(token)
            .ok_or(AllocationError::InvalidReservationToken)?;
        if reservation.expires_at <= now {
            self.in_use.remove(&reservation.port);
            return Err(AllocationError::InvalidReservationToken);
        }

        match bind(reservation.port) {
            Ok(socket) => Ok(Lease {
                port: reservation.port,
                socket,
                token: None,
            }),
            Err(e) => {
                debug!("Can not bind reserved port {}: {}", reservation.port, e);
                self.in_use.remove(&reservation.port);
                Err(AllocationError::InvalidReservationToken)
            }
        }
    }

    /// Returns `port` to the pool
    pub fn release(&mut self, port: u16) {
        self.in_use.remove(&port);
    }

    /// Drops expired reservations, returning how many were dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.reservations.len();
        let in_use = &mut self.in_use;
        self.reservations.retain(|_, reservation| {
            let alive = reservation.expires_at > now;
            if !alive {
                in_use.remove(&reservation.port);
            }
            alive
        });
        before - self.reservations.len()
    }
}
