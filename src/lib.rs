//! Remote processor resource manager.
//!
//! Host-side broker that lets a remote processor request timers, clocks and
//! DMA channels over a datagram channel. Managers register named resource
//! kinds with the [`Registry`]; each remote connection gets a
//! [`ResmgrChannel`] that decodes requests, drives its [`Session`] and sends
//! the acks. The OMAP providers live in [`omap`].

#![deny(unused_must_use)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod omap;
pub mod provider;
pub mod registry;
pub mod rpc;
pub mod session;

pub use config::ResmgrConfig;
pub use error::{Error, ProviderError, Result};
pub use provider::{FnProvider, Grant, ResourceHandle, ResourceKind, ResourceProvider};
pub use registry::{Manager, ManagerRef, ManagerSpec, Registry};
pub use rpc::{ChannelState, ResmgrChannel};
pub use session::{Allocation, ResourceId, Session, SessionState};
