//! Contains the types necessary for Optimistic Locking through versioning.

use serde::{Deserialize, Serialize};

/// A version used for Optimistic Locking.
///
/// Every Event recorded in an Event Stream gets a [Version], starting from `1`
/// for the first Event. A Stream that never received any Event is at version `0`.
pub type Version = u64;

/// Expectation on the [Version] of an Event Stream, set by a writer when
/// submitting a new [`StreamBatch`][crate::event::StreamBatch].
///
/// It allows for optimistic locking, avoiding data races
/// when modifying the same Event Stream at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Disables the comparison against the current Stream version.
    ///
    /// The commit is still conditional on the Stream metadata not having
    /// changed since it was read, so two concurrent writers using [`ExpectedVersion::Any`]
    /// can still observe a [`ConflictError`].
    Any,

    /// Expects the Event Stream to be exactly at the specified [Version].
    ///
    /// Use `Exact(0)` (or [`ExpectedVersion::START_OF_STREAM`]) to create a new Stream.
    Exact(Version),
}

impl ExpectedVersion {
    /// Expectation used to create a new Event Stream.
    pub const START_OF_STREAM: ExpectedVersion = ExpectedVersion::Exact(0);

    /// Checks the expectation against the `actual` version of the Stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ConflictError`] when the expectation does not hold.
    pub fn check(self, actual: Version) -> Result<(), ConflictError> {
        match self {
            ExpectedVersion::Exact(expected) if expected != actual => {
                Err(ConflictError { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

impl From<Version> for ExpectedVersion {
    fn from(version: Version) -> Self {
        ExpectedVersion::Exact(version)
    }
}

/// This error is returned by a function when a version conflict error has
/// been detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("conflict error detected, expected version was: {expected}, found: {actual}")]
pub struct ConflictError {
    /// The [Version] value that was expected when calling the function that failed.
    pub expected: Version,

    /// The current [Version] of the Stream, which mismatch caused this error.
    pub actual: Version,
}
