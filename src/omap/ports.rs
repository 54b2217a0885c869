//! Port traits, the boundary between the OMAP providers and the SoC.
//!
//! ```text
//!   ResmgrChannel ──▶ Session ──▶ OMAP provider ──▶ Port trait ──▶ hardware
//! ```
//!
//! The providers only speak to these traits. A platform adapter implements
//! them over the real timer, clock and DMA drivers;
//! [`SimHardware`](super::sim::SimHardware) implements them in memory.
//!
//! Every port is shared between sessions, so implementations take `&self`
//! and synchronise internally.

use crate::error::ProviderError;

pub type PortResult<T> = Result<T, ProviderError>;

// ───────────────────────────────────────────────────────────────
// Timer port
// ───────────────────────────────────────────────────────────────

/// Dual-mode general-purpose timers, addressed by hardware number.
pub trait TimerPort: Send + Sync {
    /// Claim timer GPT`gptn`. Fails with `EBUSY` if someone else holds it.
    fn request_specific(&self, gptn: u32) -> PortResult<()>;

    /// Select the functional clock source of a claimed timer.
    fn set_source(&self, gptn: u32, src_clk: u32) -> PortResult<()>;

    fn enable(&self, gptn: u32);

    fn disable(&self, gptn: u32);

    /// Return a claimed timer to the pool.
    fn free(&self, gptn: u32);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Named clocks in the SoC clock tree.
pub trait ClockPort: Send + Sync {
    fn exists(&self, clk: &str) -> bool;

    /// Current parent of `clk`, `None` for a root clock.
    fn parent(&self, clk: &str) -> Option<String>;

    fn set_parent(&self, clk: &str, parent: &str) -> PortResult<()>;

    fn set_rate(&self, clk: &str, rate: u32) -> PortResult<()>;

    fn enable(&self, clk: &str) -> PortResult<()>;

    fn disable(&self, clk: &str);
}

// ───────────────────────────────────────────────────────────────
// DMA port
// ───────────────────────────────────────────────────────────────

/// System DMA logical channels.
pub trait DmaPort: Send + Sync {
    /// Allocate any free logical channel.
    fn request_channel(&self) -> PortResult<i32>;

    fn free_channel(&self, ch: i32);
}
