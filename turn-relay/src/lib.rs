//! Socket-agnostic TURN relay engine.
//!
//! [`TurnService`] implements the UDP relay of
//! [`RFC8656`](https://datatracker.ietf.org/doc/html/rfc8656): long-term
//! credential authentication with stateless nonces, allocations with
//! quotas and lifetimes, permissions, channel bindings and the forwarding
//! of data between clients and peers.
//!
//! The engine does no I/O on its own. The driver feeds it the datagrams
//! received on the listening socket and on relay sockets together with the
//! current time, calls [`TurnService::sweep`] periodically, and provides
//! the sockets through the [`DatagramSocket`] and [`RelayBinder`] traits.
//!
//! # Usage
//!```rust
//! # use turn_relay::config::ServerConfigBuilder;
//! # use turn_relay::{DatagramSocket, RelayBinder, StaticCredentials, TurnService};
//! # use std::io;
//! # use std::net::SocketAddr;
//! # use std::sync::Arc;
//! # use std::time::Instant;
//! # use std::error::Error;
//! #[derive(Debug)]
//! struct Discard(SocketAddr);
//!
//! impl DatagramSocket for Discard {
//!     fn send_to(&self, buffer: &[u8], _: SocketAddr) -> io::Result<usize> {
//!         Ok(buffer.len())
//!     }
//!     fn local_addr(&self) -> io::Result<SocketAddr> {
//!         Ok(self.0)
//!     }
//!     fn close(&self) {}
//! }
//!
//! struct Binder;
//!
//! impl RelayBinder for Binder {
//!     fn bind(&self, addr: SocketAddr) -> io::Result<Arc<dyn DatagramSocket>> {
//!         Ok(Arc::new(Discard(addr)))
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let config = ServerConfigBuilder::default()
//!     .with_relay_public_ip("203.0.113.1".parse()?)
//!     .with_realm("echo-chamber")
//!     .with_credential("user", "pass")
//!     .build()?;
//! let auth = StaticCredentials::new(config.realm(), config.credentials())?;
//! let listener = Arc::new(Discard(config.listen_addr()));
//! let service = TurnService::new(config, Arc::new(auth), listener, Arc::new(Binder));
//!
//! service.handle_client_datagram("192.0.2.1:5000".parse()?, &[0u8; 20], Instant::now());
//! assert_eq!(service.sweep(Instant::now()), 0);
//! #
//! #   Ok(())
//! # }
//!```

#![deny(missing_docs)]

mod dispatcher;
mod forwarder;
mod response;

pub mod allocation;
pub mod auth;
pub mod config;
pub mod error;
pub mod permissions;
pub mod ports;
pub mod socket;

pub use crate::allocation::{Allocation, AllocationTable, FiveTuple};
pub use crate::auth::{AuthHandler, AuthOutcome, NonceManager, StaticCredentials};
pub use crate::config::{ServerConfig, ServerConfigBuilder};
pub use crate::dispatcher::TurnService;
pub use crate::error::{AllocationError, ChannelError};
pub use crate::socket::{DatagramSocket, RelayBinder};
