//! Error kinds the public surface can return (spec §7).
use thiserror::Error;

/// Errors the cache's public surface can return. Capacity pressure and
/// policy bookkeeping never surface here, since the hot paths always make
/// forward progress (spec §7).
#[derive(Debug, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A caller-supplied argument violated one of the cache's invariants:
    /// an empty key passed to `put_if_absent`, or a [`CacheBuilder`]
    /// configuration that violates spec §6's `window_maximum <= maximum`
    /// / `main_protected_maximum <= maximum - window_maximum` bounds.
    ///
    /// [`CacheBuilder`]: crate::CacheBuilder
    #[error("invalid argument")]
    InvalidArgument,

    /// The drain coordinator observed a state outside the four legal
    /// values, or the executor channel that hands maintenance runs to the
    /// dedicated worker thread was found disconnected. Both can only
    /// happen from memory corruption or a bug in this crate; spec §7
    /// calls this an unrecoverable internal error and terminates the
    /// process (see the `panic!` call sites in `common::drain` and
    /// `maintenance`).
    #[error("internal error: {0}")]
    Internal(String),
}
