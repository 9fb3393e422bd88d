use std::error::Error;
use thiserror::Error;

/// Error type carried out of a failing effect.
pub type EffectError = Box<dyn Error + Send + Sync + 'static>;

/// Failures collected while flushing the pending effect queue.
///
/// A flush keeps going after an effect fails, so one flush can report
/// several failures. They are kept in the order the effects ran.
#[derive(Debug, Error)]
#[error("{}", describe(.failures))]
pub struct FlushError {
    failures: Vec<EffectError>,
}

impl FlushError {
    pub(crate) fn new(failures: Vec<EffectError>) -> Self {
        Self { failures }
    }

    /// All failures, in the order the effects ran.
    pub fn failures(&self) -> &[EffectError] {
        &self.failures
    }

    /// Take the failures, in the order the effects ran.
    pub fn into_failures(self) -> Vec<EffectError> {
        self.failures
    }

    /// Find the first failure of a concrete error type.
    ///
    /// ```
    /// use pantry::{FlushError, PersistError};
    ///
    /// fn key_of_failed_write(err: &FlushError) -> Option<&str> {
    ///     match err.find::<PersistError>()? {
    ///         PersistError::StoreWrite { key, .. } => Some(key.as_str()),
    ///         _ => None,
    ///     }
    /// }
    /// ```
    pub fn find<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        self.failures
            .iter()
            .find_map(|failure| failure.downcast_ref::<E>())
    }
}

fn describe(failures: &[EffectError]) -> String {
    match failures {
        [] => "flush failed".to_string(),
        [only] => format!("effect failed during flush: {only}"),
        [first, rest @ ..] => format!(
            "{} effects failed during flush; first: {first}",
            rest.len() + 1
        ),
    }
}

/// Reported when a single flush runs more effects than the runtime allows.
///
/// This happens when an effect keeps writing a signal it also reads.
#[derive(Debug, Error)]
#[error("flush stopped after {0} effect runs without settling")]
pub struct RunawayFlush(pub usize);
