use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

type CredentialsFn = Box<dyn Fn() -> Credentials + Send + Sync>;

/// A struct containing SASL credentials.
///
/// The `identity` is the identity to act as; when empty the peer treats the
/// authenticated `username` as the identity.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// The username used for authentication.
    pub username: Vec<u8>,
    /// The secret used to prove that the user is authentic.
    pub password: Vec<u8>,
    /// The identity to authorize as, if different from the username.
    pub identity: Vec<u8>,
}

impl Credentials {
    /// Creates a new `Credentials` with the specified username and password.
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
            identity: Vec::new(),
        }
    }

    /// Creates a new `Credentials` with the specified authorization identity.
    pub fn with_identity(mut self, identity: impl Into<Vec<u8>>) -> Credentials {
        self.identity = identity.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .finish()
    }
}

/// The state of the TLS connection a negotiation is being carried over,
/// consumed for `tls-unique` channel binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsState {
    /// The unique bytes of the TLS finished message for this session.
    pub tls_unique: Vec<u8>,
}

/// An immutable configuration for a [`Negotiator`](crate::Negotiator), built
/// through its `with_*` options.
#[derive(Default)]
pub struct Config {
    tls_state: Option<TlsState>,
    remote_mechanisms: Vec<String>,
    credentials: Option<CredentialsFn>,
}

impl Config {
    /// Creates an empty configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// Lets the negotiator attempt channel binding with a TLS session if
    /// supported by the underlying mechanism.
    pub fn with_tls_state(mut self, tls_state: TlsState) -> Config {
        self.tls_state = Some(tls_state);
        self
    }

    /// Records the mechanisms advertised by the remote client or server. It
    /// is used to determine whether the remote side supports channel binding
    /// and is required for proper `-PLUS` support.
    pub fn with_remote_mechanisms<I, N>(mut self, mechanisms: I) -> Config
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.remote_mechanisms = mechanisms.into_iter().map(Into::into).collect();
        self
    }

    /// Stores a callback producing the credentials for this exchange.
    ///
    /// The callback must be idempotent: mechanisms may invoke it more than
    /// once during a single exchange.
    pub fn with_credentials<F>(mut self, credentials: F) -> Config
    where
        F: Fn() -> Credentials + Send + Sync + 'static,
    {
        self.credentials = Some(Box::new(credentials));
        self
    }

    /// Returns the configured TLS state, if any.
    pub fn tls_state(&self) -> Option<&TlsState> {
        self.tls_state.as_ref()
    }

    /// Returns the mechanisms advertised by the remote side.
    pub fn remote_mechanisms(&self) -> &[String] {
        &self.remote_mechanisms
    }

    /// Invokes the credentials callback, returning empty credentials when
    /// none is configured.
    pub fn credentials(&self) -> Credentials {
        self.credentials
            .as_ref()
            .map(|producer| producer())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Config")
            .field("tls_state", &self.tls_state)
            .field("remote_mechanisms", &self.remote_mechanisms)
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_defaults_empty() {
        let creds = Credentials::new("user", "pencil");
        assert_eq!(creds.username, b"user");
        assert_eq!(creds.password, b"pencil");
        assert!(creds.identity.is_empty());
    }

    #[test]
    fn credentials_callback_is_repeatable() {
        let config = Config::new().with_credentials(|| Credentials::new("user", "pencil"));
        for _ in 0..2 {
            let creds = config.credentials();
            assert_eq!(creds.username, b"user");
            assert_eq!(creds.password, b"pencil");
        }
    }

    #[test]
    fn missing_credentials_produce_empty_fields() {
        let config = Config::new();
        let creds = config.credentials();
        assert!(creds.username.is_empty() && creds.password.is_empty() && creds.identity.is_empty());
    }

    #[test]
    fn debug_does_not_leak_the_password() {
        let creds = Credentials::new("user", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
