use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use log::{debug, trace};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::{Config, Credentials};
use crate::error::Error;
use crate::mechanism::{Cache, Mechanism};
use crate::nonce::{nonce, DEFAULT_NONCE_LEN};
use crate::state::{State, Step};

/// The authorization predicate consulted by receiving negotiators.
///
/// Implementations should compare secrets in constant time.
pub type Permissions = Box<dyn Fn(&Credentials) -> bool + Send + Sync>;

/// A SASL client or server state machine that drives one mechanism through a
/// negotiation attempt.
///
/// Negotiators are not safe for concurrent use and must be [reset] between
/// negotiation attempts.
///
/// [reset]: Negotiator::reset
pub struct Negotiator {
    mechanism: Arc<dyn Mechanism>,
    config: Config,
    permissions: Option<Permissions>,
    state: State,
    nonce: Vec<u8>,
    cache: Option<Cache>,
    rng: Box<dyn RngCore + Send>,
}

impl Negotiator {
    /// Creates a new SASL negotiator that initiates authentication requests
    /// using the given mechanism.
    pub fn new_client(mechanism: impl Mechanism + 'static, config: Config) -> Negotiator {
        let mut rng: Box<dyn RngCore + Send> = Box::new(OsRng);
        let nonce = nonce(DEFAULT_NONCE_LEN, &mut rng);
        let mut state = State::default();
        let name = mechanism.name();
        if name.ends_with("-PLUS")
            && config.remote_mechanisms().iter().any(|remote| remote == name)
        {
            state |= State::REMOTE_CB;
        }
        Negotiator {
            mechanism: Arc::new(mechanism),
            config,
            permissions: None,
            state,
            nonce,
            cache: None,
            rng,
        }
    }

    /// Creates a new SASL negotiator that receives authentication requests
    /// for the given mechanism.
    ///
    /// The `permissions` predicate decides whether the credentials presented
    /// by the remote client are acceptable; when it is `None` every exchange
    /// fails with [`Error::Authn`].
    pub fn new_server(
        mechanism: impl Mechanism + 'static,
        permissions: Option<Permissions>,
        config: Config,
    ) -> Negotiator {
        let mut negotiator = Negotiator::new_client(mechanism, config);
        negotiator.permissions = permissions;
        negotiator.state |= State::RECEIVING;
        negotiator.state.set_step(Step::AuthTextSent);
        negotiator
    }

    /// Attempts to transition the state machine to its next state.
    ///
    /// The challenge must be base64 encoded (an empty challenge stays empty),
    /// and the returned response is base64 encoded likewise. The returned
    /// flag reports whether more steps are expected.
    ///
    /// # Panics
    ///
    /// Panics if a previous invocation returned an error and the machine has
    /// not been reset since.
    pub fn step(&mut self, challenge: &[u8]) -> Result<(bool, Vec<u8>), Error> {
        assert!(
            !self.state.contains(State::ERRORED),
            "step called on a SASL state machine that has errored"
        );

        let challenge = match Base64.decode(challenge) {
            Ok(challenge) => challenge,
            Err(_) => {
                self.state |= State::ERRORED;
                return Err(Error::InvalidChallenge);
            }
        };

        let step = self.state.step();
        trace!("{} negotiation stepping from {:?}", self.mechanism.name(), step);

        let mechanism = Arc::clone(&self.mechanism);
        let cache = self.cache.take();
        let result = match step {
            Step::Initial => mechanism.start(self),
            _ => mechanism.next(self, &challenge, cache),
        };
        self.state.set_step(match step {
            Step::Initial => Step::AuthTextSent,
            Step::AuthTextSent => Step::ResponseSent,
            Step::ResponseSent | Step::ValidServerResponse => Step::ValidServerResponse,
        });

        match result {
            Ok((more, resp, cache)) => {
                self.cache = cache;
                Ok((more, Base64.encode(resp).into_bytes()))
            }
            Err(err) => {
                debug!(
                    "{} negotiation failed at {:?}: {}",
                    self.mechanism.name(),
                    step,
                    err
                );
                self.state |= State::ERRORED;
                Err(err)
            }
        }
    }

    /// Resets the state machine to its initial state so that it can be
    /// reused in another negotiation attempt.
    ///
    /// Only the `Receiving` and `RemoteCB` flags survive a reset; the nonce
    /// is regenerated and any per-exchange mechanism state is dropped.
    pub fn reset(&mut self) {
        self.state = self.state & (State::RECEIVING | State::REMOTE_CB);

        // Skip the start step for receivers.
        if self.state.contains(State::RECEIVING) {
            self.state.set_step(Step::AuthTextSent);
        }

        self.nonce = nonce(DEFAULT_NONCE_LEN, &mut self.rng);
        self.cache = None;
    }

    /// Returns the internal state of the SASL state machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns a nonce that is unique per negotiation attempt. It is used by
    /// SASL mechanisms and should generally not be called directly.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Returns the negotiator's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the credentials for this exchange.
    ///
    /// On the initiating side this invokes the configured credentials
    /// callback (empty credentials when none is configured). On the
    /// receiving side it returns the triple parsed from the most recent
    /// PLAIN challenge; the triple is moved out rather than copied, so it
    /// can be retrieved once per exchange and empty credentials are
    /// returned thereafter.
    pub fn credentials(&mut self) -> Credentials {
        if self.state.contains(State::RECEIVING) {
            match self.cache.take().map(|cache| cache.downcast::<Credentials>()) {
                Some(Ok(creds)) => *creds,
                Some(Err(cache)) => {
                    self.cache = Some(cache);
                    Credentials::default()
                }
                None => Credentials::default(),
            }
        } else {
            self.config.credentials()
        }
    }

    /// Consults the authorization predicate with the given credentials.
    /// Returns `false` when no predicate is configured.
    pub fn permitted(&self, credentials: &Credentials) -> bool {
        match &self.permissions {
            Some(permissions) => permissions(credentials),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: Vec<u8>) {
        self.nonce = nonce;
    }

    #[cfg(test)]
    pub(crate) fn cache_is_empty(&self) -> bool {
        self.cache.is_none()
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Negotiator")
            .field("mechanism", &self.mechanism.name())
            .field("state", &self.state)
            .finish()
    }
}
