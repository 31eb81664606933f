use std::any::Any;

use crate::error::Error;
use crate::negotiator::Negotiator;

/// An opaque per-exchange value a mechanism hands back to its negotiator.
///
/// The negotiator stores the cache between steps and threads it into the next
/// call to [`Mechanism::next`]. Keeping exchange state here is what lets
/// mechanism values themselves stay immutable and shareable.
pub type Cache = Box<dyn Any + Send + Sync>;

/// A trait which defines SASL mechanisms.
///
/// Mechanism values are stateless descriptors and may be shared between
/// threads and reused across exchanges; all per-exchange state lives in the
/// owning [`Negotiator`] and the [`Cache`] returned from `start` and `next`.
/// Base64 encoding the outer challenges and responses is performed by the
/// negotiator and must not be performed by the mechanism.
pub trait Mechanism: Send + Sync {
    /// The name of the mechanism, e.g. `PLAIN`.
    fn name(&self) -> &str;

    /// Produces the initial payload. Invoked only on the initiating side, for
    /// the first step of the exchange.
    ///
    /// Returns whether more steps are expected, the response payload, and an
    /// optional cache value for later steps.
    fn start(&self, negotiator: &Negotiator) -> Result<(bool, Vec<u8>, Option<Cache>), Error>;

    /// Creates a response to the decoded SASL challenge. Invoked for every
    /// step after the first, on both sides of the exchange.
    fn next(
        &self,
        negotiator: &Negotiator,
        challenge: &[u8],
        cache: Option<Cache>,
    ) -> Result<(bool, Vec<u8>, Option<Cache>), Error>;
}
