use thiserror::Error;

use crate::store::StoreError;

/// Retry classification, propagated from the remote store so the embedder
/// can decide between backing off and giving up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// The same call will keep failing until something else changes.
    Permanent,
    /// A transient fault (outage, contention); trying again is reasonable.
    Retryable,
    /// The store gave no usable signal either way.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Whether a failed mutation may have landed remotely anyway. Writes go out
/// before their change event comes back, so a failure after dispatch leaves
/// the remote outcome undetermined.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// The remote store was never touched.
    None,
    /// The write may or may not have been applied.
    Unknown,
}

/// Initial snapshot read failed. No built-in retry: the caller owns retry
/// policy, and the replica's loading flag stays set until a load succeeds.
#[derive(Error, Debug)]
#[error("snapshot load for {collection} failed: {cause}")]
pub struct LoadError {
    pub collection: String,
    #[source]
    pub cause: StoreError,
}

impl LoadError {
    pub fn transience(&self) -> Transience {
        self.cause.transience
    }
}

/// A change-feed channel failed to open. Reconnection is supplied externally.
#[derive(Error, Debug)]
#[error("subscription to {collection} failed: {reason}")]
pub struct SubscriptionError {
    pub collection: String,
    pub reason: String,
}

/// A remote write failed. Local replica state is left untouched; the caller
/// gets the failure for user-visible reporting.
#[derive(Error, Debug)]
#[error("remote mutation failed: {cause}")]
pub struct MutationError {
    #[source]
    pub cause: StoreError,
}

impl MutationError {
    pub fn transience(&self) -> Transience {
        self.cause.transience
    }

    /// The write may or may not have landed remotely before the failure.
    pub fn effect(&self) -> Effect {
        Effect::Unknown
    }
}

impl From<StoreError> for MutationError {
    fn from(cause: StoreError) -> Self {
        Self { cause }
    }
}

/// Config file could not be read, parsed, or persisted.
#[derive(Error, Debug)]
#[error("config error: {reason}")]
pub struct ConfigError {
    pub reason: String,
}

/// Crate-level convenience error.
///
/// Not a "god error": a thin wrapper over the canonical failure kinds.
/// Merge anomalies (orphans, update-before-insert, duplicate delivery) are
/// deliberately absent here; the feed's at-least-once/out-of-order semantics
/// make them routine, so they are absorbed by the merge rules and surface
/// only through logging.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Load(e) => e.transience(),
            Error::Subscription(_) => Transience::Unknown,
            Error::Mutation(e) => e.transience(),
            Error::Store(e) => e.transience,
            Error::Config(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Mutation(e) => e.effect(),
            Error::Load(_) | Error::Subscription(_) | Error::Config(_) => Effect::None,
            Error::Store(_) => Effect::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_errors_report_unknown_effect() {
        let err = MutationError::from(StoreError::retryable("connection reset"));
        assert_eq!(err.effect(), Effect::Unknown);
        assert!(err.transience().is_retryable());
    }

    #[test]
    fn load_error_inherits_cause_transience() {
        let err = LoadError {
            collection: "tasks".into(),
            cause: StoreError::permanent("relation does not exist"),
        };
        assert_eq!(err.transience(), Transience::Permanent);
        assert!(!err.transience().is_retryable());
    }
}
