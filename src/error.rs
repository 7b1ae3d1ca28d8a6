//! Shared error plumbing: the permanent-error marker and cause-chain helpers.
//!
//! Permanent errors are told apart from transient ones by a marker type that
//! participates in the `std::error::Error::source` chain: wrapping an error
//! in [`PermanentError`] makes [`is_permanent`] return true for it and
//! everything built on top of it.

use std::error::Error as StdError;
use std::fmt;

/// A type-erased error, wide enough to hold any concrete cause.
///
/// Transformers that need to wrap one error kind in another (e.g. marking a
/// [`tonic::Status`](https://docs.rs/tonic) permanent) generally operate on
/// this rather than a fixed concrete type, since [`make_permanent`] produces
/// a different concrete type (`PermanentError<E>`) than its input.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Marker occupying the bottom of a permanent error's cause chain.
///
/// Never constructed directly by callers; [`make_permanent`] is the public
/// entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermanentMarker;

impl fmt::Display for PermanentMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marked permanent (non-retriable)")
    }
}

impl StdError for PermanentMarker {}

/// Pairs a caller error with the [`PermanentMarker`] so that its `source()`
/// bottoms out at the marker, letting [`is_permanent`] find it by walking
/// the chain without needing to downcast an opaque intermediate type.
#[derive(Debug)]
pub struct PermanentError<E> {
    inner: E,
}

impl<E: fmt::Display> fmt::Display for PermanentError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl<E: StdError + 'static> StdError for PermanentError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&PERMANENT_MARKER_SOURCE)
    }
}

// `source()` needs a `'static` reference; since `PermanentMarker` carries no
// state, a single shared instance is all any `PermanentError` needs to point
// at, and it sidesteps storing an extra field purely to have an address.
static PERMANENT_MARKER_SOURCE: PermanentMarker = PermanentMarker;

impl<E> PermanentError<E> {
    /// Borrow the wrapped error.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Unwrap back to the underlying error.
    pub fn into_inner(self) -> E {
        self.inner
    }
}

/// Wrap `err` so that [`is_permanent`] reports it (and anything built on top
/// of it) as non-retriable.
pub fn make_permanent<E>(err: E) -> PermanentError<E> {
    PermanentError { inner: err }
}

/// Walk `err`'s cause chain looking for the [`PermanentMarker`].
///
/// This is the Rust equivalent of an "error whose cause chain contains the
/// permanent sentinel" test.
pub fn is_permanent(mut err: &(dyn StdError + 'static)) -> bool {
    loop {
        if err.downcast_ref::<PermanentMarker>().is_some() {
            return true;
        }
        match err.source() {
            Some(next) => err = next,
            None => return false,
        }
    }
}

/// Marker identifying a cancellation-caused error, analogous to
/// [`PermanentMarker`] but for the "was this cause itself a cancellation"
/// question `RetryError::cause_is_cancelled` asks. Distinct from
/// `RetryError::cancelled`, which records whether the *loop* ended because
/// the cancellation token fired, not whether the op's own last error was a
/// cancellation sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancellationMarker;

impl fmt::Display for CancellationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cancelled")
    }
}

impl StdError for CancellationMarker {}

/// Wraps an error, marking it as a cancellation cause for [`is_cancelled`].
#[derive(Debug)]
pub struct CancelledError<E> {
    inner: E,
}

impl<E: fmt::Display> fmt::Display for CancelledError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl<E: StdError + 'static> StdError for CancelledError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&CANCELLATION_MARKER_SOURCE)
    }
}

static CANCELLATION_MARKER_SOURCE: CancellationMarker = CancellationMarker;

impl<E> CancelledError<E> {
    /// Borrow the wrapped error.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

/// Mark `err` as a cancellation cause.
pub fn make_cancelled<E>(err: E) -> CancelledError<E> {
    CancelledError { inner: err }
}

/// Walk `err`'s cause chain looking for the [`CancellationMarker`].
pub fn is_cancelled(mut err: &(dyn StdError + 'static)) -> bool {
    loop {
        if err.downcast_ref::<CancellationMarker>().is_some() {
            return true;
        }
        match err.source() {
            Some(next) => err = next,
            None => return false,
        }
    }
}
