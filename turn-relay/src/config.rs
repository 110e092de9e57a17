//! Relay configuration.
//!
//! A [`ServerConfig`] can only be obtained through [`ServerConfigBuilder::build`],
//! which checks that the values are consistent with each other.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;
use stun_proto::attributes::stun::{Realm, Software};
use stun_proto::AddressFamily;

/// Default UDP port for STUN and TURN.
pub const DEFAULT_LISTEN_PORT: u16 = 3478;
/// Lifetime granted to allocations that do not ask for a specific one.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(600);
/// Upper bound for the lifetime a client may request.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(3600);
/// Lifetime of permissions.
pub const DEFAULT_PERMISSION_LIFETIME: Duration = Duration::from_secs(300);
/// Lifetime of channel bindings.
pub const DEFAULT_CHANNEL_LIFETIME: Duration = Duration::from_secs(600);
/// Validity window of nonces.
pub const DEFAULT_NONCE_LIFETIME: Duration = Duration::from_secs(600);
/// Period of the expiry sweep.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5);
/// Maximum number of live allocations.
pub const DEFAULT_MAX_ALLOCATIONS: usize = 1024;
/// Maximum number of live allocations per username.
pub const DEFAULT_USER_QUOTA: usize = 16;

const DEFAULT_RELAY_PORTS: RangeInclusive<u16> = 49152..=65535;

/// Errors found when building a [`ServerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No public address was given for the relayed transport addresses
    MissingPublicIp,
    /// The realm is empty or can not be used in a `REALM` attribute
    InvalidRealm(String),
    /// The relay port range is empty or includes port 0
    InvalidPortRange(u16, u16),
    /// No username/password pair was configured
    NoCredentials,
    /// A credential has an empty username or password
    InvalidCredential(String),
    /// The reaper interval is zero
    ZeroReaperInterval,
    /// Lifetimes are zero, or the maximum lifetime is below the default one
    InvalidLifetime(String),
    /// The public and the bind address of the relay have different families
    AddressFamilyMismatch,
    /// The software description can not be used in a `SOFTWARE` attribute
    InvalidSoftware(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MissingPublicIp => write!(f, "relay public IP address is not set"),
            ConfigError::InvalidRealm(e) => write!(f, "invalid realm: {}", e),
            ConfigError::InvalidPortRange(min, max) => {
                write!(f, "invalid relay port range {}..={}", min, max)
            }
            ConfigError::NoCredentials => write!(f, "no credentials configured"),
            ConfigError::InvalidCredential(e) => write!(f, "invalid credential: {}", e),
            ConfigError::ZeroReaperInterval => write!(f, "reaper interval must not be zero"),
            ConfigError::InvalidLifetime(e) => write!(f, "invalid lifetime: {}", e),
            ConfigError::AddressFamilyMismatch => write!(
                f,
                "relay public and bind addresses belong to different families"
            ),
            ConfigError::InvalidSoftware(e) => write!(f, "invalid software description: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A username and its password. The password never shows up in `Debug`
/// output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    /// Creates a new credential
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated relay configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    listen_addr: SocketAddr,
    relay_public_ip: IpAddr,
    relay_bind_ip: IpAddr,
    relay_ports: RangeInclusive<u16>,
    realm: Realm,
    credentials: Vec<Credential>,
    default_lifetime: Duration,
    max_lifetime: Duration,
    permission_lifetime: Duration,
    channel_lifetime: Duration,
    nonce_lifetime: Duration,
    reaper_interval: Duration,
    max_allocations: usize,
    user_quota: usize,
    software: Option<Software>,
}

impl ServerConfig {
    /// Address the client-facing socket listens on
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// IP address advertised in `XOR-RELAYED-ADDRESS`
    pub fn relay_public_ip(&self) -> IpAddr {
        self.relay_public_ip
    }

    /// IP address relay sockets are bound to
    pub fn relay_bind_ip(&self) -> IpAddr {
        self.relay_bind_ip
    }

    /// Address family of the relayed transport addresses
    pub fn relay_family(&self) -> AddressFamily {
        match self.relay_public_ip {
            IpAddr::V4(_) => AddressFamily::IPv4,
            IpAddr::V6(_) => AddressFamily::IPv6,
        }
    }

    /// Ports relay sockets may be bound to
    pub fn relay_ports(&self) -> RangeInclusive<u16> {
        self.relay_ports.clone()
    }

    /// Realm used for the long-term credential mechanism
    pub fn realm(&self) -> &str {
        self.realm.as_str()
    }

    pub(crate) fn realm_attribute(&self) -> &Realm {
        &self.realm
    }

    /// Configured username/password pairs
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Lifetime granted when the client does not request one
    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }

    /// Upper bound for the lifetime of an allocation
    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Lifetime of a permission
    pub fn permission_lifetime(&self) -> Duration {
        self.permission_lifetime
    }

    /// Lifetime of a channel binding
    pub fn channel_lifetime(&self) -> Duration {
        self.channel_lifetime
    }

    /// Validity window of a nonce
    pub fn nonce_lifetime(&self) -> Duration {
        self.nonce_lifetime
    }

    /// Period of the expiry sweep
    pub fn reaper_interval(&self) -> Duration {
        self.reaper_interval
    }

    /// Maximum number of live allocations
    pub fn max_allocations(&self) -> usize {
        self.max_allocations
    }

    /// Maximum number of live allocations per username
    pub fn user_quota(&self) -> usize {
        self.user_quota
    }

    /// Value of the `SOFTWARE` attribute added to responses, if any
    pub fn software(&self) -> Option<&str> {
        self.software.as_ref().map(Software::as_str)
    }

    pub(crate) fn software_attribute(&self) -> Option<&Software> {
        self.software.as_ref()
    }

    /// Lifetime granted for a request asking for `requested`: capped at
    /// the maximum lifetime and never below the default one.
    pub fn negotiate_lifetime(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_lifetime)
            .min(self.max_lifetime)
            .max(self.default_lifetime)
    }
}

/// Builder for [`ServerConfig`].
///
/// # Examples
///```rust
/// # use turn_relay::config::ServerConfigBuilder;
/// # use std::time::Duration;
/// let config = ServerConfigBuilder::default()
///     .with_relay_public_ip("203.0.113.1".parse().unwrap())
///     .with_relay_ports(40000, 40099)
///     .with_realm("echo-chamber")
///     .with_credential("user", "pass")
///     .build()
///     .unwrap();
/// assert_eq!(config.listen_addr().port(), 3478);
/// assert_eq!(config.negotiate_lifetime(Some(Duration::from_secs(7200))), Duration::from_secs(3600));
///```
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    listen_addr: SocketAddr,
    relay_public_ip: Option<IpAddr>,
    relay_bind_ip: Option<IpAddr>,
    relay_ports: (u16, u16),
    realm: String,
    credentials: Vec<Credential>,
    default_lifetime: Duration,
    max_lifetime: Duration,
    permission_lifetime: Duration,
    channel_lifetime: Duration,
    nonce_lifetime: Duration,
    reaper_interval: Duration,
    max_allocations: usize,
    user_quota: usize,
    software: Option<String>,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT),
            relay_public_ip: None,
            relay_bind_ip: None,
            relay_ports: (*DEFAULT_RELAY_PORTS.start(), *DEFAULT_RELAY_PORTS.end()),
            realm: String::new(),
            credentials: Vec::new(),
            default_lifetime: DEFAULT_LIFETIME,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            permission_lifetime: DEFAULT_PERMISSION_LIFETIME,
            channel_lifetime: DEFAULT_CHANNEL_LIFETIME,
            nonce_lifetime: DEFAULT_NONCE_LIFETIME,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            max_allocations: DEFAULT_MAX_ALLOCATIONS,
            user_quota: DEFAULT_USER_QUOTA,
            software: None,
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the address the client-facing socket listens on
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the IP address advertised to clients as relayed address
    pub fn with_relay_public_ip(mut self, ip: IpAddr) -> Self {
        self.relay_public_ip = Some(ip);
        self
    }

    /// Sets the IP address relay sockets are bound to. Defaults to the
    /// unspecified address of the public IP's family.
    pub fn with_relay_bind_ip(mut self, ip: IpAddr) -> Self {
        self.relay_bind_ip = Some(ip);
        self
    }

    /// Sets the inclusive range of relay ports
    pub fn with_relay_ports(mut self, min: u16, max: u16) -> Self {
        self.relay_ports = (min, max);
        self
    }

    /// Sets the realm
    pub fn with_realm<S: Into<String>>(mut self, realm: S) -> Self {
        self.realm = realm.into();
        self
    }

    /// Adds a username/password pair
    pub fn with_credential<U, P>(mut self, username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        self.credentials.push(Credential::new(username, password));
        self
    }

    /// Sets the default allocation lifetime
    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    /// Sets the maximum allocation lifetime
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Sets the permission lifetime
    pub fn with_permission_lifetime(mut self, lifetime: Duration) -> Self {
        self.permission_lifetime = lifetime;
        self
    }

    /// Sets the channel binding lifetime
    pub fn with_channel_lifetime(mut self, lifetime: Duration) -> Self {
        self.channel_lifetime = lifetime;
        self
    }

    /// Sets the nonce validity window
    pub fn with_nonce_lifetime(mut self, lifetime: Duration) -> Self {
        self.nonce_lifetime = lifetime;
        self
    }

    /// Sets the period of the expiry sweep
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Sets the maximum number of live allocations
    pub fn with_max_allocations(mut self, max: usize) -> Self {
        self.max_allocations = max;
        self
    }

    /// Sets the maximum number of live allocations per username
    pub fn with_user_quota(mut self, quota: usize) -> Self {
        self.user_quota = quota;
        self
    }

    /// Sets the `SOFTWARE` attribute added to responses
    pub fn with_software<S: Into<String>>(mut self, software: S) -> Self {
        self.software = Some(software.into());
        self
    }

    /// Validates the parameters and builds the configuration.
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let relay_public_ip = self.relay_public_ip.ok_or(ConfigError::MissingPublicIp)?;
        let relay_bind_ip = match self.relay_bind_ip {
            Some(ip) if ip.is_ipv4() != relay_public_ip.is_ipv4() => {
                return Err(ConfigError::AddressFamilyMismatch)
            }
            Some(ip) => ip,
            None if relay_public_ip.is_ipv4() => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            None => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        if self.realm.is_empty() {
            return Err(ConfigError::InvalidRealm(String::from("empty realm")));
        }
        let realm =
            Realm::new(&self.realm).map_err(|e| ConfigError::InvalidRealm(e.to_string()))?;

        let (min, max) = self.relay_ports;
        if min == 0 || min > max {
            return Err(ConfigError::InvalidPortRange(min, max));
        }

        if self.credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        if let Some(credential) = self
            .credentials
            .iter()
            .find(|c| c.username.is_empty() || c.password.is_empty())
        {
            return Err(ConfigError::InvalidCredential(format!(
                "empty username or password for '{}'",
                credential.username
            )));
        }

        if self.reaper_interval.is_zero() {
            return Err(ConfigError::ZeroReaperInterval);
        }

        for (name, lifetime) in [
            ("default", self.default_lifetime),
            ("permission", self.permission_lifetime),
            ("channel", self.channel_lifetime),
            ("nonce", self.nonce_lifetime),
        ] {
            if lifetime.is_zero() {
                return Err(ConfigError::InvalidLifetime(format!(
                    "{} lifetime is zero",
                    name
                )));
            }
        }
        if self.max_lifetime < self.default_lifetime {
            return Err(ConfigError::InvalidLifetime(format!(
                "max lifetime {:?} is below default lifetime {:?}",
                self.max_lifetime, self.default_lifetime
            )));
        }

        let software = self
            .software
            .map(Software::new)
            .transpose()
            .map_err(|e| ConfigError::InvalidSoftware(e.to_string()))?;

        Ok(ServerConfig {
            listen_addr: self.listen_addr,
            relay_public_ip,
            relay_bind_ip,
            relay_ports: min..=max,
            realm,
            credentials: self.credentials,
            default_lifetime: self.default_lifetime,
            max_lifetime: self.max_lifetime,
            permission_lifetime: self.permission_lifetime,
            channel_lifetime: self.channel_lifetime,
            nonce_lifetime: self.nonce_lifetime,
            reaper_interval: self.reaper_interval,
            max_allocations: self.max_allocations,
            user_quota: self.user_quota,
            software,
        })
    }
}
