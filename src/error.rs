use std::fmt;

/// A wrapper enum for things that could go wrong during a SASL exchange.
///
/// Errors are plain values; once a [`Negotiator`](crate::Negotiator) has
/// surfaced one of these its `Errored` flag stays set and any further call to
/// `step` panics until the machine is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// `step` was invoked from a state the current mechanism cannot
    /// interpret.
    InvalidState,
    /// The peer sent a malformed or unacceptable challenge.
    InvalidChallenge,
    /// The peer's credentials or signature did not validate.
    Authn,
    /// The mechanism was asked to process a step it does not define for this
    /// role.
    TooManySteps,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}",
            match self {
                Error::InvalidState => "invalid state",
                Error::InvalidChallenge => "invalid or missing challenge",
                Error::Authn => "authentication error",
                Error::TooManySteps => "step called too many times",
            }
        )
    }
}

impl std::error::Error for Error {}
