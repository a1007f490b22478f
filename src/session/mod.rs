//! Device sessions: serialized hardware access with a cached configuration
//! mirror.
//!
//! A session is the sole owner of its physical device handle. Every hardware
//! command passes through one mutex, and cached configuration fields are
//! written only after the corresponding hardware call succeeds, so the cache
//! never reflects an unapplied value.

pub mod camera;
pub mod spectrograph;

pub use camera::{CameraConfig, CameraSession, CameraStatus};
pub use spectrograph::{SpectrographSession, SpectrographStatus};

/// A value mirrored from the device, with explicit invalidation.
///
/// `Stale` means the next read must re-query the hardware. Invalidation is
/// lazy: a mutating call marks the cache stale and nothing recomputes it
/// until a reader asks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cached<T> {
    /// The cached value is current as of the last mutating call.
    Fresh(T),
    /// A mutating call has invalidated the value.
    Stale,
}

impl<T> Cached<T> {
    /// Returns the value if it is fresh.
    pub fn get(&self) -> Option<&T> {
        match self {
            Cached::Fresh(value) => Some(value),
            Cached::Stale => None,
        }
    }

    /// Marks the value stale.
    pub fn invalidate(&mut self) {
        *self = Cached::Stale;
    }

    /// Stores a freshly queried value and returns a reference to it.
    pub fn store(&mut self, value: T) -> &T {
        *self = Cached::Fresh(value);
        match self {
            Cached::Fresh(value) => value,
            // store() just wrote Fresh.
            Cached::Stale => unreachable!(),
        }
    }

    /// Whether the value is fresh.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Cached::Fresh(_))
    }
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Cached::Stale
    }
}
