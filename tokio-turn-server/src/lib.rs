//! UDP TURN server on tokio.
//!
//! [`UdpTurnServer`] owns the client-facing socket and shares a
//! [`TurnService`] between tasks. Every datagram received from a client is
//! handled on a task of its own. Each relay socket gets a reader task that
//! hands what peers send straight to the service, so the datagrams of one
//! allocation are processed in arrival order. Readers stop when the
//! allocation closes its socket.

use bytes::Bytes;
use log::{debug, info, trace};
use parking_lot::RwLock;
use std::future::{poll_fn, Future};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::io::ReadBuf;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use turn_relay::{AuthHandler, DatagramSocket, RelayBinder, ServerConfig, TurnService};

const MAX_DATAGRAM_SIZE: usize = 65535;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket closed")
}

/// A tokio UDP socket the engine can write to and close.
///
/// The OS socket is dropped inside [`DatagramSocket::close`], so its port
/// can be bound again as soon as `close` returns.
#[derive(Debug)]
struct TokioSocket {
    socket: RwLock<Option<UdpSocket>>,
    local_addr: SocketAddr,
    on_close: Notify,
}

impl TokioSocket {
    fn new(socket: UdpSocket) -> io::Result<Arc<Self>> {
        let local_addr = socket.local_addr()?;
        Ok(Arc::new(Self {
            socket: RwLock::new(Some(socket)),
            local_addr,
            on_close: Notify::new(),
        }))
    }

    fn is_open(&self) -> bool {
        self.socket.read().is_some()
    }

    /// Waits for a datagram. The lock is only held while polling, never
    /// across a suspension point.
    async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut buf = ReadBuf::new(buffer);
        let peer = poll_fn(|cx| match self.socket.read().as_ref() {
            Some(socket) => socket.poll_recv_from(cx, &mut buf),
            None => std::task::Poll::Ready(Err(closed_error())),
        })
        .await?;
        Ok((buf.filled().len(), peer))
    }
}

impl DatagramSocket for TokioSocket {
    fn send_to(&self, buffer: &[u8], target: SocketAddr) -> io::Result<usize> {
        match self.socket.read().as_ref() {
            Some(socket) => socket.try_send_to(buffer, target),
            None => Err(closed_error()),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn close(&self) {
        // Waits for in-flight sends and polls, then drops the OS socket
        if self.socket.write().take().is_some() {
            self.on_close.notify_one();
        }
    }
}

async fn read_relay(socket: Arc<TokioSocket>, service: Weak<TurnService>) {
    let relay = socket.local_addr;
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let res = tokio::select! {
            _ = socket.on_close.notified() => break,
            res = socket.recv_from(&mut buffer) => res,
        };
        match res {
            Ok((size, peer)) => {
                let Some(service) = service.upgrade() else {
                    break;
                };
                // A newer allocation may already own this port
                if !socket.is_open() {
                    break;
                }
                service.handle_peer_datagram(relay, peer, &buffer[..size], Instant::now());
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => break,
            Err(e) => debug!("Receive error on relay socket {}: {}", relay, e),
        }
    }
    trace!("Reader of relay socket {} finished", relay);
}

/// Binds relay sockets and spawns their reader tasks on the runtime the
/// server was created on.
struct TokioRelayBinder {
    handle: Handle,
    service: Weak<TurnService>,
}

impl RelayBinder for TokioRelayBinder {
    fn bind(&self, addr: SocketAddr) -> io::Result<Arc<dyn DatagramSocket>> {
        let std_socket = std::net::UdpSocket::bind(addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = {
            let _guard = self.handle.enter();
            UdpSocket::from_std(std_socket)?
        };
        let socket = TokioSocket::new(socket)?;
        self.handle
            .spawn(read_relay(socket.clone(), self.service.clone()));
        Ok(socket)
    }
}

/// A TURN server listening on one UDP socket.
///
/// # Examples
///```rust,no_run
/// # use tokio_turn_server::UdpTurnServer;
/// # use turn_relay::{ServerConfigBuilder, StaticCredentials};
/// # use std::sync::Arc;
/// # use std::error::Error;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn Error>> {
/// let config = ServerConfigBuilder::default()
///     .with_relay_public_ip("203.0.113.1".parse()?)
///     .with_realm("echo-chamber")
///     .with_credential("user", "pass")
///     .build()?;
/// let auth = StaticCredentials::new(config.realm(), config.credentials())?;
/// let server = UdpTurnServer::bind(config, Arc::new(auth)).await?;
/// server.run_until(async {
///     let _ = tokio::signal::ctrl_c().await;
/// }).await?;
/// #   Ok(())
/// # }
///```
pub struct UdpTurnServer {
    service: Arc<TurnService>,
    listener: Arc<TokioSocket>,
}

impl UdpTurnServer {
    /// Binds the listening socket of `config`. Must be called from within
    /// a tokio runtime, which is also where relay sockets will be read.
    pub async fn bind(config: ServerConfig, auth: Arc<dyn AuthHandler>) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.listen_addr()).await?;
        let listener = TokioSocket::new(socket)?;
        let handle = Handle::current();
        let service = Arc::new_cyclic(|service| {
            let binder = TokioRelayBinder {
                handle,
                service: service.clone(),
            };
            TurnService::new(config, auth, listener.clone(), Arc::new(binder))
        });
        Ok(Self { service, listener })
    }

    /// Address of the listening socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The relay engine
    pub fn service(&self) -> &TurnService {
        &self.service
    }

    /// Serves clients until `shutdown` completes. All the allocations are
    /// released before returning.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut reaper = tokio::time::interval(self.service.config().reaper_interval());
        reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        info!(
            "TURN server listening on {}, realm '{}', relay ports {:?}",
            self.local_addr()?,
            self.service.config().realm(),
            self.service.config().relay_ports()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                res = self.listener.recv_from(&mut buffer) => match res {
                    Ok((size, client)) => {
                        let service = self.service.clone();
                        let data = Bytes::copy_from_slice(&buffer[..size]);
                        tokio::spawn(async move {
                            service.handle_client_datagram(client, &data, Instant::now());
                        });
                    }
                    Err(e) => debug!("Receive error on listening socket: {}", e),
                },
                _ = reaper.tick() => {
                    self.service.sweep(Instant::now());
                }
            }
        }

        info!("Shutting down");
        self.service.shutdown();
        self.listener.close();
        Ok(())
    }
}
