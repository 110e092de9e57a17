//! Permissions and channel bindings of one allocation.
//!
//! Entries carry their expiry time. Lookups ignore and evict expired
//! entries; [`Permissions::sweep`] and [`Channels::sweep`] evict the rest.

use crate::error::ChannelError;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use stun_proto::{MAX_CHANNEL_NUMBER, MIN_CHANNEL_NUMBER};

/// Peer IP addresses allowed to exchange data through an allocation.
/// Ports are not taken into account.
#[derive(Debug, Default)]
pub struct Permissions {
    entries: HashMap<IpAddr, Instant>,
}

impl Permissions {
    /// Installs or refreshes the permission for `peer`
    pub fn grant(&mut self, peer: IpAddr, expires_at: Instant) {
        let entry = self.entries.entry(peer).or_insert(expires_at);
        *entry = (*entry).max(expires_at);
    }

    /// Returns true if a live permission exists for `peer`
    pub fn contains(&mut self, peer: &IpAddr, now: Instant) -> bool {
        match self.entries.get(peer) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                self.entries.remove(peer);
                false
            }
            None => false,
        }
    }

    /// Number of entries, including expired ones not evicted yet
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts expired permissions, returning how many were evicted.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }
}

#[derive(Debug)]
struct Binding {
    peer: SocketAddr,
    expires_at: Instant,
}

/// One-to-one mapping between channel numbers and peer transport
/// addresses.
#[derive(Debug, Default)]
pub struct Channels {
    by_number: HashMap<u16, Binding>,
    by_peer: HashMap<SocketAddr, u16>,
}

impl Channels {
    /// Binds `number` to `peer`, or refreshes the binding if it already
    /// exists for the same pair.
    pub fn bind(
        &mut self,
        number: u16,
        peer: SocketAddr,
        expires_at: Instant,
        now: Instant,
    ) -> Result<(), ChannelError> {
        if !(MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER).contains(&number) {
            return Err(ChannelError::InvalidChannel(number));
        }

        // Expired bindings do not block new ones
        self.evict_number(number, now);
        if let Some(bound) = self.by_peer.get(&peer).copied() {
            self.evict_number(bound, now);
        }

        match (self.by_number.get_mut(&number), self.by_peer.get(&peer)) {
            (Some(binding), _) if binding.peer == peer => {
                binding.expires_at = binding.expires_at.max(expires_at);
                Ok(())
            }
            (Some(_), _) => Err(ChannelError::ChannelInUse(number)),
            (None, Some(bound)) => Err(ChannelError::PeerAlreadyBound(*bound)),
            (None, None) => {
                self.by_number.insert(number, Binding { peer, expires_at });
                self.by_peer.insert(peer, number);
                Ok(())
            }
        }
    }

    fn evict_number(&mut self, number: u16, now: Instant) {
        let expired = self
            .by_number
            .get(&number)
            .is_some_and(|binding| binding.expires_at <= now);
        if expired {
            if let Some(binding) = self.by_number.remove(&number) {
                self.by_peer.remove(&binding.peer);
            }
        }
    }

    /// Returns the peer bound to `number`
    pub fn peer_for(&mut self, number: u16, now: Instant) -> Option<SocketAddr> {
        self.evict_number(number, now);
        self.by_number.get(&number).map(|binding| binding.peer)
    }

    /// Returns the channel bound to `peer`
    pub fn channel_for(&mut self, peer: &SocketAddr, now: Instant) -> Option<u16> {
        let number = *self.by_peer.get(peer)?;
        self.evict_number(number, now);
        self.by_peer.get(peer).copied()
    }

    /// Extends the lifetime of the binding of `number`, if it is live.
    pub fn refresh(&mut self, number: u16, expires_at: Instant, now: Instant) {
        self.evict_number(number, now);
        if let Some(binding) = self.by_number.get_mut(&number) {
            binding.expires_at = binding.expires_at.max(expires_at);
        }
    }

    /// Number of bindings, including expired ones not evicted yet
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// Returns true if there are no bindings
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Evicts expired bindings, returning how many were evicted.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.by_number.len();
        let by_peer = &mut self.by_peer;
        self.by_number.retain(|_, binding| {
            let alive = binding.expires_at > now;
            if !alive {
                by_peer.remove(&binding.peer);
            }
            alive
        });
        before - self.by_number.len()
    }
}
