//! Provides the SASL "PLAIN" mechanism as defined by RFC 4616.

use crate::config::Credentials;
use crate::error::Error;
use crate::mechanism::{Cache, Mechanism};
use crate::negotiator::Negotiator;
use crate::state::{State, Step};

/// A struct for the SASL PLAIN mechanism.
///
/// On the initiating side it emits `identity NUL username NUL password` in a
/// single step. On the receiving side it parses the same wire form and hands
/// the triple to the negotiator's authorization predicate.
pub struct Plain;

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn start(&self, negotiator: &Negotiator) -> Result<(bool, Vec<u8>, Option<Cache>), Error> {
        let creds = negotiator.config().credentials();
        let mut resp =
            Vec::with_capacity(creds.identity.len() + creds.username.len() + creds.password.len() + 2);
        resp.extend_from_slice(&creds.identity);
        resp.push(0);
        resp.extend_from_slice(&creds.username);
        resp.push(0);
        resp.extend_from_slice(&creds.password);
        Ok((false, resp, None))
    }

    fn next(
        &self,
        negotiator: &Negotiator,
        challenge: &[u8],
        _cache: Option<Cache>,
    ) -> Result<(bool, Vec<u8>, Option<Cache>), Error> {
        // PLAIN has no step beyond the initial message except receiving it.
        let state = negotiator.state();
        if !state.contains(State::RECEIVING) || state.step() != Step::AuthTextSent {
            return Err(Error::TooManySteps);
        }

        let mut parts = challenge.split(|&b| b == 0);
        let creds = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(identity), Some(username), Some(password), None) => {
                Credentials::new(username, password).with_identity(identity)
            }
            _ => return Err(Error::InvalidChallenge),
        };

        if !negotiator.permitted(&creds) {
            return Err(Error::Authn);
        }
        Ok((false, challenge.to_vec(), Some(Box::new(creds))))
    }
}
