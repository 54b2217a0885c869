//! Channel session: per-connection handle table.
//!
//! One [`Session`] binds one remote endpoint to one [`Manager`]. It hands
//! out session-local resource ids in place of provider handles, remembers
//! allocation order, and releases everything newest-first on close.
//!
//! Ids are monotonic (1, 2, 3, ...) and never reused within a session, so
//! a stale id held by the remote side can never alias a newer resource.
//! Because ids only grow, the id-keyed `BTreeMap` doubles as the allocation
//! order: ascending iteration is request order, `pop_last` is newest-first.
//!
//! The session lock is held across every provider callback: only the
//! provider knows whether a request or release actually took effect.

use std::collections::BTreeMap;
use std::ops::Bound;

use core::fmt;

use heapless::Vec as HVec;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::provider::{MAX_RES_ARGS, ResourceHandle, ResourceKind};
use crate::registry::{Manager, ManagerLease, Registry};

/// Session-local resource id as seen by the remote processor.
pub type ResourceId = u32;

/// Result of a successful REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub id: ResourceId,
    pub base: u32,
    /// Argument blob after the provider filled it in.
    pub reply: HVec<u8, MAX_RES_ARGS>,
}

/// One live allocation.
struct Entry {
    kind: ResourceKind,
    handle: ResourceHandle,
    /// Raw request arguments, rendered in the report.
    args: HVec<u8, MAX_RES_ARGS>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Closed,
}

struct Inner {
    state: SessionState,
    lease: Option<ManagerLease>,
    entries: BTreeMap<ResourceId, Entry>,
    next_id: ResourceId,
}

/// Per-connection state binding one remote client to one manager.
pub struct Session {
    peer: u32,
    name: String,
    inner: Mutex<Inner>,
}

impl Session {
    /// Resolve `manager_name` and bind a new session to it.
    ///
    /// The manager is marked busy before this returns, so it cannot be
    /// unregistered until [`close`](Self::close).
    pub fn open(registry: &Registry, peer: u32, manager_name: &str) -> Result<Self> {
        let lease = match registry.acquire(manager_name) {
            Ok(l) => l,
            Err(e) => {
                warn!("RPRM[{}]: no manager '{}'", peer, manager_name);
                return Err(e);
            }
        };

        info!("RPRM[{}]: connected to '{}'", peer, manager_name);
        Ok(Self {
            peer,
            name: manager_name.into(),
            inner: Mutex::new(Inner {
                state: SessionState::Connected,
                lease: Some(lease),
                entries: BTreeMap::new(),
                next_id: 1,
            }),
        })
    }

    /// Peer endpoint address fixed at connection time.
    pub fn peer(&self) -> u32 {
        self.peer
    }

    pub fn manager_name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Live resource ids in allocation order.
    pub fn ids(&self) -> Vec<ResourceId> {
        self.inner.lock().entries.keys().copied().collect()
    }

    /// Diagnostics path, `<namespace>/<manager>-<peer>-resmgr`.
    pub fn report_name(&self) -> String {
        let inner = self.inner.lock();
        let ns = inner.lease.as_ref().and_then(|l| l.manager().debug_namespace());
        match ns {
            Some(ns) => format!("{}/{}-{}-resmgr", ns, self.name, self.peer),
            None => format!("{}-{}-resmgr", self.name, self.peer),
        }
    }

    /// Allocate a resource of kind `kind_index` with the given arguments.
    pub fn request(&self, kind_index: u32, args: &[u8]) -> Result<Allocation> {
        let mut inner = self.inner.lock();
        let manager = bound_manager(&inner)?;

        let Some(kind) = manager.kind(kind_index) else {
            warn!(
                "RPRM[{}]: kind index {} out of range ({} kinds)",
                self.peer,
                kind_index,
                manager.kinds().len()
            );
            return Err(Error::OutOfRange);
        };

        let expected = kind.provider().arg_len();
        if args.len() != expected || args.len() > MAX_RES_ARGS {
            warn!(
                "RPRM[{}]: {} expects {} argument bytes, got {}",
                self.peer,
                kind.name(),
                expected,
                args.len()
            );
            return Err(Error::InvalidArgument);
        }

        if inner.next_id == ResourceId::MAX {
            warn!("RPRM[{}]: resource ids exhausted", self.peer);
            return Err(Error::IdsExhausted);
        }

        let raw: HVec<u8, MAX_RES_ARGS> =
            HVec::from_slice(args).map_err(|()| Error::InvalidArgument)?;
        let mut reply = raw.clone();

        debug!("RPRM[{}]: requesting {}", self.peer, kind.name());
        let kind = kind.clone();
        let grant = kind.provider().request(&mut reply).map_err(|e| {
            warn!("RPRM[{}]: request for {} failed: {}", self.peer, kind.name(), e);
            Error::Provider(e)
        })?;

        let id = inner.next_id;
        inner.next_id += 1;
        info!(
            "RPRM[{}]: {} granted as id {} (base {:#010x})",
            self.peer,
            kind.name(),
            id,
            grant.base
        );
        inner.entries.insert(
            id,
            Entry {
                kind,
                handle: grant.handle,
                args: raw,
            },
        );

        Ok(Allocation {
            id,
            base: grant.base,
            reply,
        })
    }

    /// Release a previously requested resource.
    ///
    /// The entry is dropped only once the provider confirms the release.
    pub fn release(&self, id: ResourceId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return Err(Error::NotFound);
        }

        let Some(entry) = inner.entries.get_mut(&id) else {
            warn!("RPRM[{}]: release of unknown id {}", self.peer, id);
            return Err(Error::NotFound);
        };

        debug!("RPRM[{}]: releasing {} id {}", self.peer, entry.kind.name(), id);
        if let Err(e) = entry.kind.provider().release(&mut entry.handle) {
            warn!(
                "RPRM[{}]: release of {} id {} failed: {}, keeping entry",
                self.peer,
                entry.kind.name(),
                id,
                e
            );
            return Err(Error::Provider(e));
        }

        inner.entries.remove(&id);
        Ok(())
    }

    /// Tear the session down: release every live resource newest-first,
    /// then drop the manager reference. Idempotent.
    ///
    /// Returns the number of resources whose provider release failed.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return 0;
        }

        let mut failed = 0;
        while let Some((id, mut entry)) = inner.entries.pop_last() {
            if let Err(e) = entry.kind.provider().release(&mut entry.handle) {
                failed += 1;
                warn!(
                    "RPRM[{}]: teardown release of {} id {} failed: {}, skipping",
                    self.peer,
                    entry.kind.name(),
                    id,
                    e
                );
            }
        }

        inner.state = SessionState::Closed;
        inner.lease = None;
        info!("RPRM[{}]: session with '{}' closed", self.peer, self.name);
        failed
    }

    /// Report header line.
    pub(crate) fn write_header(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Resource list for remote endpoint {}:", self.peer)
    }

    /// Render the first live entry with an id above `after` into `out`.
    ///
    /// Returns the rendered id, or `None` once past the last live entry.
    pub(crate) fn write_entry_after(
        &self,
        after: ResourceId,
        out: &mut dyn fmt::Write,
    ) -> core::result::Result<Option<ResourceId>, fmt::Error> {
        let inner = self.inner.lock();
        let next = inner
            .entries
            .range((Bound::Excluded(after), Bound::Unbounded))
            .next();
        let Some((&id, e)) = next else {
            return Ok(None);
        };
        self.write_one(id, e, out)?;
        Ok(Some(id))
    }

    /// Write the full live-resource list.
    pub fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.write_header(out)?;
        let inner = self.inner.lock();
        for (&id, e) in &inner.entries {
            self.write_one(id, e, out)?;
        }
        Ok(())
    }

    /// One report entry. A failing provider `describe` cuts only its own
    /// entry short; the report goes on with the next one.
    fn write_one(&self, id: ResourceId, e: &Entry, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "\nResource Name:{}\n", e.kind.name())?;
        if e.kind.provider().describe(&e.handle, out).is_err() {
            warn!(
                "RPRM[{}]: describe of {} id {} failed",
                self.peer,
                e.kind.name(),
                id
            );
            return Ok(());
        }
        if !e.args.is_empty() {
            out.write_str("Args:")?;
            for b in &e.args {
                write!(out, "{:02x}", b)?;
            }
            out.write_char('\n')?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("manager", &self.name)
            .field("state", &self.state())
            .field("ids", &self.ids())
            .finish()
    }
}

fn bound_manager(inner: &Inner) -> Result<&Manager> {
    match (&inner.state, &inner.lease) {
        (SessionState::Connected, Some(lease)) => Ok(lease.manager()),
        _ => Err(Error::NotConnected),
    }
}
