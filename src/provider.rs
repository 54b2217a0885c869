//! Resource provider interface.
//!
//! A provider backs one resource kind (a timer, a clock, a DMA pool). The
//! broker never looks inside a provider: it hands over the argument blob,
//! stores whatever opaque [`ResourceHandle`] comes back, and passes that
//! handle back on release and describe.
//!
//! ```text
//!   Session ──request(args)──▶ ResourceProvider ──▶ hardware
//!           ◀──Grant{handle,base}──
//! ```

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use crate::error::ProviderError;

/// Largest argument blob a REQUEST may carry.
pub const MAX_RES_ARGS: usize = 128;

/// Opaque, provider-owned state for one live allocation.
pub type ResourceHandle = Box<dyn Any + Send>;

/// Successful provider allocation.
pub struct Grant {
    pub handle: ResourceHandle,
    /// Device address reported to the remote side (0 if not applicable).
    pub base: u32,
}

impl Grant {
    pub fn new(handle: impl Any + Send, base: u32) -> Self {
        Self {
            handle: Box::new(handle),
            base,
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant").field("base", &self.base).finish_non_exhaustive()
    }
}

/// Callback set for one resource kind.
pub trait ResourceProvider: Send + Sync {
    /// Exact argument blob length this kind accepts.
    fn arg_len(&self) -> usize;

    /// Allocate. `args` holds exactly [`arg_len`](Self::arg_len) bytes; the
    /// provider may fill fields in place, and the result becomes the ack's
    /// reply bytes.
    fn request(&self, args: &mut [u8]) -> Result<Grant, ProviderError>;

    /// Release. On error the handle stays owned by the session.
    fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError>;

    /// Human-readable description for diagnostics.
    fn describe(&self, _handle: &ResourceHandle, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }
}

/// A named resource kind as registered with a manager.
#[derive(Clone)]
pub struct ResourceKind {
    name: String,
    provider: Arc<dyn ResourceProvider>,
}

impl ResourceKind {
    pub fn new(name: impl Into<String>, provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &dyn ResourceProvider {
        self.provider.as_ref()
    }
}

impl fmt::Debug for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceKind")
            .field("name", &self.name)
            .field("arg_len", &self.provider.arg_len())
            .finish()
    }
}

// ── Closure-backed provider ──────────────────────────────────

type RequestFn = dyn Fn(&mut [u8]) -> Result<Grant, ProviderError> + Send + Sync;
type ReleaseFn = dyn Fn(&mut ResourceHandle) -> Result<(), ProviderError> + Send + Sync;
type DescribeFn = dyn Fn(&ResourceHandle, &mut dyn fmt::Write) -> fmt::Result + Send + Sync;

/// Provider assembled from plain callbacks.
///
/// Lets an external collaborator register a `(request, release, describe)`
/// triple without declaring a type.
pub struct FnProvider {
    arg_len: usize,
    request: Box<RequestFn>,
    release: Box<ReleaseFn>,
    describe: Option<Box<DescribeFn>>,
}

impl FnProvider {
    pub fn new<Rq, Rl>(arg_len: usize, request: Rq, release: Rl) -> Self
    where
        Rq: Fn(&mut [u8]) -> Result<Grant, ProviderError> + Send + Sync + 'static,
        Rl: Fn(&mut ResourceHandle) -> Result<(), ProviderError> + Send + Sync + 'static,
    {
        Self {
            arg_len,
            request: Box::new(request),
            release: Box::new(release),
            describe: None,
        }
    }

    #[must_use]
    pub fn with_describe<D>(mut self, describe: D) -> Self
    where
        D: Fn(&ResourceHandle, &mut dyn fmt::Write) -> fmt::Result + Send + Sync + 'static,
    {
        self.describe = Some(Box::new(describe));
        self
    }
}

impl ResourceProvider for FnProvider {
    fn arg_len(&self) -> usize {
        self.arg_len
    }

    fn request(&self, args: &mut [u8]) -> Result<Grant, ProviderError> {
        (self.request)(args)
    }

    fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError> {
        (self.release)(handle)
    }

    fn describe(&self, handle: &ResourceHandle, out: &mut dyn fmt::Write) -> fmt::Result {
        match &self.describe {
            Some(f) => f(handle, out),
            None => Ok(()),
        }
    }
}

/// Read a little-endian `u32` field out of an argument blob.
pub(crate) fn arg_u32(args: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&args[offset..offset + 4]);
    u32::from_le_bytes(b)
}

/// Write a little-endian `u32` field into an argument blob.
pub(crate) fn put_u32(args: &mut [u8], offset: usize, value: u32) {
    args[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
