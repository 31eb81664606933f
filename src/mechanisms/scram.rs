//! Provides the SASL "SCRAM-*" and "SCRAM-*-PLUS" mechanisms as defined by
//! RFC 5802 and RFC 7677, and a way to implement more.
//!
//! The only supported channel binding type is `tls-unique` as defined by RFC
//! 5929.

use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Digest;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::Error;
use crate::mechanism::{Cache, Mechanism};
use crate::negotiator::Negotiator;
use crate::state::{State, Step};

const GS2_CB_SUPPORTED: &[u8] = b"p=tls-unique,";
const GS2_CB_NOT_ADVERTISED: &[u8] = b"y,";
const GS2_NO_CB: &[u8] = b"n,";

const CLIENT_KEY_INPUT: &[u8] = b"Client Key";
const SERVER_KEY_INPUT: &[u8] = b"Server Key";

/// A trait which defines the hash family plumbing needed for SCRAM.
pub trait ScramProvider: Send + Sync + 'static {
    /// Applies the hash function to the data.
    fn hash(data: &[u8]) -> Vec<u8>;

    /// Computes an HMAC over the data using the hash function.
    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8>;

    /// Stretches the password with PBKDF2 using the hash function, producing
    /// one hash output length of key material.
    fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8>;
}

/// A `ScramProvider` for SCRAM-SHA-1 and SCRAM-SHA-1-PLUS.
pub struct Sha1;

impl ScramProvider for Sha1 {
    fn hash(data: &[u8]) -> Vec<u8> {
        sha1::Sha1::digest(data).to_vec()
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<sha1::Sha1>::new_from_slice(key)
            .expect("hmac accepts keys of any length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut salted = vec![0u8; 20];
        pbkdf2::pbkdf2::<Hmac<sha1::Sha1>>(password, salt, iterations, &mut salted);
        salted
    }
}

/// A `ScramProvider` for SCRAM-SHA-256 and SCRAM-SHA-256-PLUS.
pub struct Sha256;

impl ScramProvider for Sha256 {
    fn hash(data: &[u8]) -> Vec<u8> {
        sha2::Sha256::digest(data).to_vec()
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(key)
            .expect("hmac accepts keys of any length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn derive(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut salted = vec![0u8; 32];
        pbkdf2::pbkdf2::<Hmac<sha2::Sha256>>(password, salt, iterations, &mut salted);
        salted
    }
}

/// Per-exchange SCRAM state, threaded through the negotiator's cache slot.
enum ScramCache {
    FirstSent { client_first_bare: Vec<u8> },
    FinalSent { server_signature: Vec<u8> },
}

/// A struct for the SASL SCRAM-* and SCRAM-*-PLUS mechanisms.
///
/// The `-PLUS` variants bind the exchange to the underlying TLS session via
/// its `tls-unique` bytes; configure the negotiator with a
/// [`TlsState`](crate::TlsState) and the remote side's advertised mechanisms
/// for the binding to be negotiated.
pub struct Scram<S: ScramProvider> {
    name: &'static str,
    plus: bool,
    _marker: PhantomData<S>,
}

impl<S: ScramProvider> Scram<S> {
    /// Constructs a SCRAM mechanism with the given name. The mechanism
    /// requires channel binding iff the name ends with `-PLUS`.
    pub fn new(name: &'static str) -> Scram<S> {
        Scram {
            name,
            plus: name.ends_with("-PLUS"),
            _marker: PhantomData,
        }
    }
}

impl Scram<Sha1> {
    /// The SCRAM-SHA-1 mechanism (RFC 5802).
    pub fn sha1() -> Scram<Sha1> {
        Scram::new("SCRAM-SHA-1")
    }

    /// The SCRAM-SHA-1-PLUS mechanism (RFC 5802).
    pub fn sha1_plus() -> Scram<Sha1> {
        Scram::new("SCRAM-SHA-1-PLUS")
    }
}

impl Scram<Sha256> {
    /// The SCRAM-SHA-256 mechanism (RFC 7677).
    pub fn sha256() -> Scram<Sha256> {
        Scram::new("SCRAM-SHA-256")
    }

    /// The SCRAM-SHA-256-PLUS mechanism (RFC 7677).
    pub fn sha256_plus() -> Scram<Sha256> {
        Scram::new("SCRAM-SHA-256-PLUS")
    }
}

impl<S: ScramProvider> Scram<S> {
    /// Selects the GS2 header for this exchange.
    ///
    /// `p=tls-unique,` requires all three of: a `-PLUS` mechanism, a
    /// configured TLS state, and a remote advertisement of the `-PLUS`
    /// variant; `y,` announces that we could have bound the channel but the
    /// remote side never advertised it.
    fn gs2_header(&self, negotiator: &Negotiator, identity: &[u8]) -> Vec<u8> {
        let mut header = match negotiator.config().tls_state() {
            None => GS2_NO_CB.to_vec(),
            Some(_) if !self.plus => GS2_NO_CB.to_vec(),
            Some(_) if negotiator.state().contains(State::REMOTE_CB) => GS2_CB_SUPPORTED.to_vec(),
            Some(_) => GS2_CB_NOT_ADVERTISED.to_vec(),
        };
        if !identity.is_empty() {
            header.extend_from_slice(b"a=");
            header.extend_from_slice(identity);
        }
        header.push(b',');
        header
    }

    fn client_final(
        &self,
        negotiator: &Negotiator,
        server_first: &[u8],
        client_first_bare: &[u8],
    ) -> Result<(bool, Vec<u8>, Option<Cache>), Error> {
        let mut iterations: Option<u32> = None;
        let mut salt: Option<Vec<u8>> = None;
        let mut combined_nonce: Option<&[u8]> = None;

        for field in server_first.split(|&b| b == b',') {
            if field.len() < 2 || field[1] != b'=' {
                continue;
            }
            let value = &field[2..];
            match field[0] {
                b'i' => {
                    let value =
                        std::str::from_utf8(value).map_err(|_| Error::InvalidChallenge)?;
                    iterations =
                        Some(value.parse::<u32>().map_err(|_| Error::InvalidChallenge)?);
                }
                b's' => {
                    salt = Some(Base64.decode(value).map_err(|_| Error::InvalidChallenge)?);
                }
                b'r' => combined_nonce = Some(value),
                // Reserved for future extensibility; its presence must cause
                // authentication failure (RFC 5802 section 5.1).
                b'm' => return Err(Error::InvalidChallenge),
                _ => {}
            }
        }

        let iterations = match iterations {
            Some(iterations) if iterations > 0 => iterations,
            _ => return Err(Error::InvalidChallenge),
        };
        let combined_nonce = match combined_nonce {
            Some(nonce) if nonce.starts_with(negotiator.nonce()) => nonce,
            _ => return Err(Error::InvalidChallenge),
        };
        let salt = match salt {
            Some(salt) if !salt.is_empty() => salt,
            _ => return Err(Error::InvalidChallenge),
        };

        let creds = negotiator.config().credentials();
        let mut cbind_input = self.gs2_header(negotiator, &creds.identity);
        if self.plus {
            if let Some(tls_state) = negotiator.config().tls_state() {
                cbind_input.extend_from_slice(&tls_state.tls_unique);
            }
        }

        let mut client_final_no_proof = b"c=".to_vec();
        client_final_no_proof.extend_from_slice(Base64.encode(&cbind_input).as_bytes());
        client_final_no_proof.extend_from_slice(b",r=");
        client_final_no_proof.extend_from_slice(combined_nonce);

        let mut auth_message = client_first_bare.to_vec();
        auth_message.push(b',');
        auth_message.extend_from_slice(server_first);
        auth_message.push(b',');
        auth_message.extend_from_slice(&client_final_no_proof);

        let mut salted = S::derive(&creds.password, &salt, iterations);
        let mut client_key = S::hmac(&salted, CLIENT_KEY_INPUT);
        let mut server_key = S::hmac(&salted, SERVER_KEY_INPUT);
        let mut stored_key = S::hash(&client_key);
        let mut client_signature = S::hmac(&stored_key, &auth_message);
        let server_signature = S::hmac(&server_key, &auth_message);
        let client_proof = xor(&client_key, &client_signature);
        salted.zeroize();
        client_key.zeroize();
        server_key.zeroize();
        stored_key.zeroize();
        client_signature.zeroize();

        let mut resp = client_final_no_proof;
        resp.extend_from_slice(b",p=");
        resp.extend_from_slice(Base64.encode(&client_proof).as_bytes());
        Ok((
            true,
            resp,
            Some(Box::new(ScramCache::FinalSent { server_signature })),
        ))
    }
}

impl<S: ScramProvider> Mechanism for Scram<S> {
    fn name(&self) -> &str {
        self.name
    }

    fn start(&self, negotiator: &Negotiator) -> Result<(bool, Vec<u8>, Option<Cache>), Error> {
        let creds = negotiator.config().credentials();
        let mut client_first_bare = b"n=".to_vec();
        client_first_bare.extend_from_slice(&escape_username(&creds.username));
        client_first_bare.extend_from_slice(b",r=");
        client_first_bare.extend_from_slice(negotiator.nonce());

        let mut resp = self.gs2_header(negotiator, &creds.identity);
        resp.extend_from_slice(&client_first_bare);
        Ok((
            true,
            resp,
            Some(Box::new(ScramCache::FirstSent { client_first_bare })),
        ))
    }

    fn next(
        &self,
        negotiator: &Negotiator,
        challenge: &[u8],
        cache: Option<Cache>,
    ) -> Result<(bool, Vec<u8>, Option<Cache>), Error> {
        if negotiator.state().contains(State::RECEIVING) {
            return Err(Error::InvalidState);
        }
        if challenge.is_empty() {
            return Err(Error::InvalidChallenge);
        }
        let cache = match cache.and_then(|cache| cache.downcast::<ScramCache>().ok()) {
            Some(cache) => *cache,
            None => return Err(Error::InvalidState),
        };

        match (negotiator.state().step(), cache) {
            (Step::AuthTextSent, ScramCache::FirstSent { client_first_bare }) => {
                self.client_final(negotiator, challenge, &client_first_bare)
            }
            (Step::ResponseSent, ScramCache::FinalSent { server_signature }) => {
                verify_server_final(challenge, &server_signature)
            }
            _ => Err(Error::InvalidState),
        }
    }
}

/// Checks the server-final message against the signature computed alongside
/// the client proof. The comparison is over decoded bytes, in constant time.
fn verify_server_final(
    challenge: &[u8],
    server_signature: &[u8],
) -> Result<(bool, Vec<u8>, Option<Cache>), Error> {
    let received = match challenge.strip_prefix(b"v=") {
        Some(received) => Base64.decode(received).map_err(|_| Error::InvalidChallenge)?,
        None => return Err(Error::Authn),
    };
    if bool::from(received.as_slice().ct_eq(server_signature)) {
        Ok((false, Vec::new(), None))
    } else {
        Err(Error::Authn)
    }
}

/// Replaces `=` with `=3D` and `,` with `=2C`, in a single pass.
fn escape_username(username: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(username.len());
    for &b in username {
        match b {
            b'=' => escaped.extend_from_slice(b"=3D"),
            b',' => escaped.extend_from_slice(b"=2C"),
            _ => escaped.push(b),
        }
    }
    escaped
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials, TlsState};

    #[test]
    fn xor_works() {
        assert_eq!(
            xor(
                &[135, 94, 53, 134, 73, 233, 140, 221, 150, 12, 96, 111, 54, 66, 11, 76],
                &[163, 9, 122, 180, 107, 44, 22, 252, 248, 134, 112, 82, 84, 122, 56, 209]
            ),
            &[36, 87, 79, 50, 34, 197, 154, 33, 110, 138, 16, 61, 98, 56, 51, 157]
        );
    }

    #[test]
    fn usernames_are_escaped_in_one_pass() {
        assert_eq!(escape_username(b"user"), b"user");
        assert_eq!(escape_username(b",=,="), b"=2C=3D=2C=3D");
        assert_eq!(escape_username(b"=2C"), b"=3D2C");
    }

    fn sha1_client(config: Config) -> Negotiator {
        let mut client = Negotiator::new_client(Scram::sha1(), config);
        client.set_nonce(b"fyko+d2lbbFgONRv9qkxdawL".to_vec());
        client
    }

    fn creds() -> Config {
        Config::new().with_credentials(|| Credentials::new("user", "pencil"))
    }

    #[test]
    fn gs2_header_selection() {
        let tls = TlsState {
            tls_unique: vec![0, 1, 2, 3, 4],
        };

        // No TLS state: we cannot bind regardless of the mechanism.
        let client = Negotiator::new_client(Scram::sha1_plus(), creds());
        assert_eq!(Scram::<Sha1>::sha1_plus().gs2_header(&client, b""), b"n,,");

        // TLS state but a non-PLUS mechanism.
        let client = Negotiator::new_client(Scram::sha1(), creds().with_tls_state(tls.clone()));
        assert_eq!(Scram::sha1().gs2_header(&client, b""), b"n,,");

        // TLS state, PLUS, but the remote side never advertised it.
        let client = Negotiator::new_client(Scram::sha1_plus(), creds().with_tls_state(tls.clone()));
        assert_eq!(Scram::sha1_plus().gs2_header(&client, b""), b"y,,");

        // Both sides support channel binding.
        let config = creds()
            .with_tls_state(tls)
            .with_remote_mechanisms(["SCRAM-SHA-1-PLUS"]);
        let client = Negotiator::new_client(Scram::sha1_plus(), config);
        assert_eq!(
            Scram::sha1_plus().gs2_header(&client, b"admin"),
            b"p=tls-unique,a=admin,"
        );
    }

    #[test]
    fn server_first_parse_failures() {
        for (server_first, expected) in [
            // Reserved extension attribute.
            (
                &b"m=please,r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=QSXCR+Q6sek8bf92,i=4096"[..],
                Error::InvalidChallenge,
            ),
            // Missing iteration count.
            (
                &b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=QSXCR+Q6sek8bf92"[..],
                Error::InvalidChallenge,
            ),
            // Zero iteration count.
            (
                &b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=QSXCR+Q6sek8bf92,i=0"[..],
                Error::InvalidChallenge,
            ),
            // Negative iteration count.
            (
                &b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=QSXCR+Q6sek8bf92,i=-1"[..],
                Error::InvalidChallenge,
            ),
            // Missing salt.
            (
                &b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,i=4096"[..],
                Error::InvalidChallenge,
            ),
            // Empty salt.
            (
                &b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=,i=4096"[..],
                Error::InvalidChallenge,
            ),
            // Salt that is not base64.
            (
                &b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=!!!,i=4096"[..],
                Error::InvalidChallenge,
            ),
            // Missing nonce.
            (&b"s=QSXCR+Q6sek8bf92,i=4096"[..], Error::InvalidChallenge),
            // Combined nonce not prefixed by ours.
            (
                &b"r=theirnonceonly,s=QSXCR+Q6sek8bf92,i=4096"[..],
                Error::InvalidChallenge,
            ),
        ] {
            let mut client = sha1_client(creds());
            client.step(b"").unwrap();
            let err = client
                .step(Base64.encode(server_first).as_bytes())
                .unwrap_err();
            assert_eq!(err, expected, "server-first {:?}", server_first);
        }
    }

    #[test]
    fn empty_challenges_are_invalid() {
        let mut client = sha1_client(creds());
        client.step(b"").unwrap();
        assert_eq!(client.step(b"").unwrap_err(), Error::InvalidChallenge);
    }

    #[test]
    fn server_final_failures() {
        for (server_final, expected) in [
            // A signature for some other exchange.
            (&b"v=yFVSsBQf4DA9XdMzpLeqS55KPbI="[..], Error::Authn),
            // A server error instead of a verifier.
            (&b"e=other-error"[..], Error::Authn),
            // A verifier that does not decode.
            (&b"v=!!!"[..], Error::InvalidChallenge),
        ] {
            let mut client = sha1_client(creds());
            client.step(b"").unwrap();
            client
                .step(
                    Base64
                        .encode(b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
                        .as_bytes(),
                )
                .unwrap();
            let err = client
                .step(Base64.encode(server_final).as_bytes())
                .unwrap_err();
            assert_eq!(err, expected, "server-final {:?}", server_final);
        }
    }

    #[test]
    fn channel_binding_data_rides_in_the_c_attribute() {
        let config = creds()
            .with_tls_state(TlsState {
                tls_unique: vec![0, 1, 2, 3, 4],
            })
            .with_remote_mechanisms(["SCRAM-SHA-1-PLUS"]);
        let mut client = Negotiator::new_client(Scram::sha1_plus(), config);
        client.set_nonce(b"fyko+d2lbbFgONRv9qkxdawL".to_vec());
        client.step(b"").unwrap();
        let (_, resp) = client
            .step(
                Base64
                    .encode(b"r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=QSXCR+Q6sek8bf92,i=4096")
                    .as_bytes(),
            )
            .unwrap();

        let resp = Base64.decode(resp).unwrap();
        let c_value = resp
            .split(|&b| b == b',')
            .find_map(|field| field.strip_prefix(b"c="))
            .unwrap()
            .to_vec();
        assert_eq!(
            Base64.decode(c_value).unwrap(),
            b"p=tls-unique,,\x00\x01\x02\x03\x04"
        );
    }
}
