//! Long-term credential mechanism, server side.
//!
//! Requests are authenticated with the `USERNAME`, `REALM`, `NONCE` and
//! `MESSAGE-INTEGRITY` they carry. Keys are resolved through an
//! [`AuthHandler`] and nonces are issued and checked by a [`NonceManager`].

use crate::config::Credential;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::debug;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use stun_proto::attributes::stun::{Nonce, Realm, UserName};
use stun_proto::{HMACKey, StunError, StunMessage};

/// Resolves the long-term key of a user.
pub trait AuthHandler: Send + Sync {
    /// Returns the key for `username` in `realm`, or `None` if the user is
    /// not known.
    fn auth_key(&self, username: &str, realm: &str) -> Option<HMACKey>;
}

impl<F> AuthHandler for F
where
    F: Fn(&str, &str) -> Option<HMACKey> + Send + Sync,
{
    fn auth_key(&self, username: &str, realm: &str) -> Option<HMACKey> {
        self(username, realm)
    }
}

/// A fixed set of users. Keys are computed once, when the set is created.
///
/// # Examples
///```rust
/// # use turn_relay::auth::{AuthHandler, StaticCredentials};
/// # use turn_relay::config::Credential;
/// let credentials = StaticCredentials::new(
///     "example.org",
///     &[Credential::new("alice", "secret")],
/// ).unwrap();
/// assert!(credentials.auth_key("alice", "example.org").is_some());
/// assert!(credentials.auth_key("alice", "other.org").is_none());
/// assert!(credentials.auth_key("bob", "example.org").is_none());
///```
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    realm: String,
    keys: HashMap<String, HMACKey>,
}

impl StaticCredentials {
    /// Creates the credential set for `realm`. If a username appears more
    /// than once, the last password wins.
    pub fn new<S: Into<String>>(realm: S, credentials: &[Credential]) -> Result<Self, StunError> {
        let realm = realm.into();
        let mut keys = HashMap::new();
        for credential in credentials {
            let key = HMACKey::new_long_term(credential.username(), &realm, credential.password())?;
            keys.insert(credential.username().to_string(), key);
        }
        Ok(Self { realm, keys })
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if there are no users
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl AuthHandler for StaticCredentials {
    fn auth_key(&self, username: &str, realm: &str) -> Option<HMACKey> {
        if realm != self.realm {
            return None;
        }
        self.keys.get(username).cloned()
    }
}

const NONCE_TIMESTAMP_SIZE: usize = 8;
const NONCE_RANDOM_SIZE: usize = 8;
const NONCE_MAC_SIZE: usize = 8;
const NONCE_MAC_OFFSET: usize = NONCE_TIMESTAMP_SIZE + NONCE_RANDOM_SIZE;
const NONCE_SIZE: usize = NONCE_MAC_OFFSET + NONCE_MAC_SIZE;
const NONCE_SECRET_SIZE: usize = 32;

/// State of a nonce presented by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    /// Issued by this server and still within its validity window
    Valid,
    /// Expired, forged or malformed
    Stale,
}

/// Issues and checks stateless nonces.
///
/// A nonce is the base64url encoding of its issue time, 8 random bytes and
/// a truncated HMAC-SHA1 of both under a per-process secret, so no state
/// needs to be kept per client. Issue times are seconds since the manager
/// was created.
#[derive(Debug)]
pub struct NonceManager {
    secret: [u8; NONCE_SECRET_SIZE],
    epoch: Instant,
    lifetime: Duration,
}

impl NonceManager {
    /// Creates a manager whose nonces are valid for `lifetime`
    pub fn new(lifetime: Duration) -> Self {
        Self {
            secret: rand::random(),
            epoch: Instant::now(),
            lifetime,
        }
    }

    fn timestamp(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_secs()
    }

    fn mac(&self, input: &[u8]) -> [u8; NONCE_MAC_SIZE] {
        let hmac = hmac_sha1::hmac_sha1(&self.secret, input);
        let mut mac = [0u8; NONCE_MAC_SIZE];
        mac.copy_from_slice(&hmac[..NONCE_MAC_SIZE]);
        mac
    }

    /// Issues a new nonce
    pub fn issue(&self, now: Instant) -> String {
        let mut raw = [0u8; NONCE_SIZE];
        raw[..NONCE_TIMESTAMP_SIZE].copy_from_slice(&self.timestamp(now).to_be_bytes());
        rand::rng().fill(&mut raw[NONCE_TIMESTAMP_SIZE..NONCE_MAC_OFFSET]);
        let mac = self.mac(&raw[..NONCE_MAC_OFFSET]);
        raw[NONCE_MAC_OFFSET..].copy_from_slice(&mac);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Checks a nonce presented by a client
    pub fn validate(&self, nonce: &str, now: Instant) -> NonceStatus {
        let Ok(raw) = URL_SAFE_NO_PAD.decode(nonce) else {
            debug!("Nonce is not base64url");
            return NonceStatus::Stale;
        };
        if raw.len() != NONCE_SIZE {
            debug!("Nonce has {} bytes, expected {}", raw.len(), NONCE_SIZE);
            return NonceStatus::Stale;
        }

        let expected = self.mac(&raw[..NONCE_MAC_OFFSET]);
        let diff = expected
            .iter()
            .zip(raw[NONCE_MAC_OFFSET..].iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            debug!("Nonce was not issued by this server");
            return NonceStatus::Stale;
        }

        let mut timestamp = [0u8; NONCE_TIMESTAMP_SIZE];
        timestamp.copy_from_slice(&raw[..NONCE_TIMESTAMP_SIZE]);
        let issued = u64::from_be_bytes(timestamp);
        match self.timestamp(now).checked_sub(issued) {
            Some(age) if age <= self.lifetime.as_secs() => NonceStatus::Valid,
            _ => {
                debug!("Nonce issued at {} has expired", issued);
                NonceStatus::Stale
            }
        }
    }
}

/// Outcome of authenticating a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The request carries valid credentials
    Authenticated {
        /// User that signed the request
        username: String,
        /// Key used to sign the response
        key: HMACKey,
    },
    /// Missing or wrong credentials; answered with 401 and a fresh nonce
    Challenge,
    /// The nonce is not valid any more; answered with 438 and a fresh nonce
    StaleNonce,
}

/// Authenticates requests against one realm.
pub(crate) struct Authenticator<'a> {
    pub realm: &'a str,
    pub nonces: &'a NonceManager,
    pub handler: &'a dyn AuthHandler,
}

impl Authenticator<'_> {
    /// Checks the credentials of `msg`. Every failure other than a stale
    /// nonce yields the same [`AuthOutcome::Challenge`], so clients can not
    /// tell unknown users from wrong passwords.
    pub fn authenticate(&self, msg: &StunMessage, now: Instant) -> AuthOutcome {
        let Some(integrity) = msg.integrity() else {
            debug!("[{}] No MESSAGE-INTEGRITY", msg.transaction_id());
            return AuthOutcome::Challenge;
        };

        let username = msg.get::<UserName>().and_then(|a| a.as_user_name());
        let realm = msg.get::<Realm>().and_then(|a| a.as_realm());
        let nonce = msg.get::<Nonce>().and_then(|a| a.as_nonce());
        let (Some(username), Some(realm), Some(nonce)) = (username, realm, nonce) else {
            debug!(
                "[{}] Missing USERNAME, REALM or NONCE",
                msg.transaction_id()
            );
            return AuthOutcome::Challenge;
        };

        if realm.as_str() != self.realm {
            debug!("[{}] Unexpected realm", msg.transaction_id());
            return AuthOutcome::Challenge;
        }

        if self.nonces.validate(nonce.as_str(), now) == NonceStatus::Stale {
            return AuthOutcome::StaleNonce;
        }

        let Some(key) = self.handler.auth_key(username.as_str(), realm.as_str()) else {
            debug!("[{}] Unknown user", msg.transaction_id());
            return AuthOutcome::Challenge;
        };

        if !integrity.verify(&key) {
            debug!("[{}] MESSAGE-INTEGRITY mismatch", msg.transaction_id());
            return AuthOutcome::Challenge;
        }

        AuthOutcome::Authenticated {
            username: username.as_str().to_string(),
            key,
        }
    }
}
