//! Socket collaborators.
//!
//! The engine never creates OS sockets. It writes through
//! [`DatagramSocket`] handles and asks a [`RelayBinder`] for new relay
//! sockets. Datagrams received on those sockets are handed back to the
//! engine by whoever drives it.

use std::fmt::Debug;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// A bound UDP socket.
pub trait DatagramSocket: Debug + Send + Sync {
    /// Sends `buffer` to `target` without blocking. Datagrams that can not
    /// be sent right away may be dropped.
    fn send_to(&self, buffer: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Returns the address the socket is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Stops receiving on the socket and releases it. Sending after
    /// closing fails.
    fn close(&self);
}

/// Creates relay sockets.
pub trait RelayBinder: Send + Sync {
    /// Binds a UDP socket to `addr`
    fn bind(&self, addr: SocketAddr) -> io::Result<Arc<dyn DatagramSocket>>;
}
