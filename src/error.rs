//! Unified error types for the resource manager.
//!
//! Every fallible operation in the broker returns [`Error`]. Each variant
//! maps to a negative Linux errno via [`Error::status`], which is the value
//! that travels back to the remote processor in an ack. All variants are
//! `Copy` so they can be logged and encoded without allocation.

use core::fmt;

use thiserror::Error as ThisError;

// ---------------------------------------------------------------------------
// errno values shared with the remote firmware
// ---------------------------------------------------------------------------

pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;
pub const ERANGE: i32 = 34;
pub const ENOSYS: i32 = 38;
pub const ENOTCONN: i32 = 107;

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// Opaque failure reported by a resource provider.
///
/// Wraps a negative errno. The broker never interprets it; it is passed
/// through verbatim as the ack status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderError(i32);

impl ProviderError {
    pub const INVALID: Self = Self(-EINVAL);
    pub const BUSY: Self = Self(-EBUSY);
    pub const NO_MEMORY: Self = Self(-ENOMEM);
    pub const IO: Self = Self(-EIO);
    pub const NOT_FOUND: Self = Self(-ENOENT);
    pub const UNSUPPORTED: Self = Self(-ENOSYS);

    /// Build from an errno. Positive values are negated, zero becomes `-EIO`.
    pub const fn from_errno(errno: i32) -> Self {
        if errno > 0 {
            Self(-errno)
        } else if errno == 0 {
            Self(-EIO)
        } else {
            Self(errno)
        }
    }

    /// The negative errno carried by this error.
    pub const fn status(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A manager with this name is already registered.
    #[error("manager name already registered")]
    DuplicateName,
    /// Unknown manager name or resource id.
    #[error("not found")]
    NotFound,
    /// The manager still has sessions bound to it.
    #[error("manager busy")]
    Busy,
    /// Resource-kind index outside the manager's kind list.
    #[error("resource kind index out of range")]
    OutOfRange,
    /// Malformed message, wrong argument length, or unknown action.
    #[error("invalid argument")]
    InvalidArgument,
    /// The provider refused or failed the operation.
    #[error("provider failure: {0}")]
    Provider(ProviderError),
    /// Sender is not the endpoint this session was opened for, or the
    /// session is not (or no longer) connected.
    #[error("not connected")]
    NotConnected,
    /// The session-local id counter would wrap.
    #[error("resource id space exhausted")]
    IdsExhausted,
    /// Board configuration rejected.
    #[error("config: {0}")]
    Config(&'static str),
}

impl Error {
    /// Negative errno for the wire.
    pub const fn status(self) -> i32 {
        match self {
            Self::DuplicateName => -EEXIST,
            Self::NotFound => -ENOENT,
            Self::Busy => -EBUSY,
            Self::OutOfRange => -ERANGE,
            Self::InvalidArgument | Self::Config(_) => -EINVAL,
            Self::Provider(e) => e.status(),
            Self::NotConnected => -ENOTCONN,
            Self::IdsExhausted => -ENOSPC,
        }
    }
}

impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
