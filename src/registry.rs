//! Manager registry.
//!
//! Process-wide table of named [`Manager`]s. The registry is an explicit
//! object owned by the host (no hidden global); tests build a fresh one per
//! case.
//!
//! Locking: a single `RwLock` guards the table. Opening a session takes the
//! read lock and bumps the manager's busy counter while still holding it;
//! unregistering takes the write lock and checks the counter. A lookup can
//! therefore never race an unregistration.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::provider::ResourceKind;
use crate::rpc::codec::NAME_LEN;

/// Shared reference to a registered manager.
pub type ManagerRef = Arc<Manager>;

/// A named provider of one or more resource kinds.
pub struct Manager {
    name: String,
    kinds: Vec<ResourceKind>,
    debug_namespace: Option<String>,
    active_sessions: AtomicUsize,
}

impl Manager {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource kinds in registration order; the REQUEST kind index points
    /// into this list.
    pub fn kinds(&self) -> &[ResourceKind] {
        &self.kinds
    }

    pub fn kind(&self, index: u32) -> Option<&ResourceKind> {
        self.kinds.get(index as usize)
    }

    pub fn debug_namespace(&self) -> Option<&str> {
        self.debug_namespace.as_deref()
    }

    /// Number of sessions currently bound to this manager.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.name)
            .field("kinds", &self.kinds)
            .field("active_sessions", &self.active_sessions())
            .finish()
    }
}

/// Busy reference held by a session for as long as it is bound.
///
/// Dropping the lease decrements the manager's active-session counter.
pub struct ManagerLease {
    manager: ManagerRef,
}

impl ManagerLease {
    pub fn manager(&self) -> &Manager {
        &self.manager
    }
}

impl Drop for ManagerLease {
    fn drop(&mut self) {
        let prev = self.manager.active_sessions.fetch_sub(1, Ordering::AcqRel);
        debug!("registry: '{}' lease dropped ({} left)", self.manager.name, prev - 1);
    }
}

impl fmt::Debug for ManagerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManagerLease").field(&self.manager.name).finish()
    }
}

/// Registration parameters for [`Registry::register_with`].
#[derive(Debug, Default)]
pub struct ManagerSpec {
    pub name: String,
    pub kinds: Vec<ResourceKind>,
    pub debug_namespace: Option<String>,
}

/// Table of registered managers.
#[derive(Default)]
pub struct Registry {
    managers: RwLock<Vec<ManagerRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager under a unique name.
    pub fn register(&self, name: &str, kinds: Vec<ResourceKind>) -> Result<ManagerRef> {
        self.register_with(ManagerSpec {
            name: name.into(),
            kinds,
            debug_namespace: None,
        })
    }

    pub fn register_with(&self, spec: ManagerSpec) -> Result<ManagerRef> {
        // The name must fit the wire field with its terminating NUL.
        if spec.name.is_empty() || spec.name.len() >= NAME_LEN || spec.name.contains('\0') {
            warn!("registry: rejecting manager name {:?}", spec.name);
            return Err(Error::InvalidArgument);
        }

        let mut table = self.managers.write();
        if table.iter().any(|m| m.name == spec.name) {
            warn!("registry: manager '{}' already exists", spec.name);
            return Err(Error::DuplicateName);
        }

        let manager = Arc::new(Manager {
            name: spec.name,
            kinds: spec.kinds,
            debug_namespace: spec.debug_namespace,
            active_sessions: AtomicUsize::new(0),
        });
        table.push(Arc::clone(&manager));
        info!(
            "registry: manager '{}' registered ({} kinds)",
            manager.name,
            manager.kinds.len()
        );
        Ok(manager)
    }

    /// Plain lookup. Does not mark the manager busy.
    pub fn find(&self, name: &str) -> Result<ManagerRef> {
        self.managers
            .read()
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// Look a manager up and mark it busy in one step.
    pub fn acquire(&self, name: &str) -> Result<ManagerLease> {
        let table = self.managers.read();
        let manager = table.iter().find(|m| m.name == name).ok_or(Error::NotFound)?;
        manager.active_sessions.fetch_add(1, Ordering::AcqRel);
        Ok(ManagerLease {
            manager: Arc::clone(manager),
        })
    }

    /// Remove a manager. Fails with [`Error::Busy`] while any session is
    /// bound to it; the caller retries after clients disconnect.
    pub fn unregister(&self, manager: &ManagerRef) -> Result<()> {
        let mut table = self.managers.write();
        let pos = table
            .iter()
            .position(|m| Arc::ptr_eq(m, manager))
            .ok_or(Error::NotFound)?;

        let busy = manager.active_sessions();
        if busy != 0 {
            warn!(
                "registry: manager '{}' busy ({} sessions), not unregistering",
                manager.name, busy
            );
            return Err(Error::Busy);
        }

        table.remove(pos);
        info!("registry: manager '{}' unregistered", manager.name);
        Ok(())
    }

    /// Names of all registered managers, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.managers.read().iter().map(|m| m.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.managers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.read().is_empty()
    }
}
