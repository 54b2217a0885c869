//! OMAP resource manager: timers, auxiliary clocks and system DMA.
//!
//! ```text
//!   ResmgrConfig ──▶ register_omap_manager ──▶ Registry
//!                          │
//!              ┌───────────┼───────────┐
//!        omap-gptimer  omap-auxclk  omap-sdma      (kind index 0, 1, 2)
//!              │           │           │
//!          TimerPort   ClockPort    DmaPort
//! ```
//!
//! Kind order is part of the wire contract: the remote firmware uses the
//! index, not the name.

pub mod auxclk;
pub mod gptimer;
pub mod ports;
pub mod sdma;
pub mod sim;

use std::sync::Arc;

use log::info;

use crate::config::ResmgrConfig;
use crate::error::Result;
use crate::provider::ResourceKind;
use crate::registry::{ManagerRef, ManagerSpec, Registry};

pub use auxclk::AuxclkProvider;
pub use gptimer::GptimerProvider;
pub use ports::{ClockPort, DmaPort, TimerPort};
pub use sdma::SdmaProvider;
pub use sim::SimHardware;

/// Kind index of `omap-gptimer`.
pub const GPTIMER: u32 = 0;
/// Kind index of `omap-auxclk`.
pub const AUXCLK: u32 = 1;
/// Kind index of `omap-sdma`.
pub const SDMA: u32 = 2;

/// Resource kinds backed by `hw`, in wire order.
pub fn omap_kinds<H>(cfg: &ResmgrConfig, hw: &Arc<H>) -> Vec<ResourceKind>
where
    H: TimerPort + ClockPort + DmaPort + 'static,
{
    let timers: Arc<dyn TimerPort> = hw.clone();
    let clocks: Arc<dyn ClockPort> = hw.clone();
    let dma: Arc<dyn DmaPort> = hw.clone();

    vec![
        ResourceKind::new(
            gptimer::KIND_NAME,
            Arc::new(GptimerProvider::new(cfg.gptimers.clone(), timers)),
        ),
        ResourceKind::new(
            auxclk::KIND_NAME,
            Arc::new(AuxclkProvider::new(cfg.auxclks.clone(), clocks)),
        ),
        ResourceKind::new(
            sdma::KIND_NAME,
            Arc::new(SdmaProvider::new(cfg.sdma_max_channels, dma)),
        ),
    ]
}

/// Validate `cfg` and register the OMAP manager under its configured name.
pub fn register_omap_manager<H>(
    registry: &Registry,
    cfg: &ResmgrConfig,
    hw: Arc<H>,
) -> Result<ManagerRef>
where
    H: TimerPort + ClockPort + DmaPort + 'static,
{
    cfg.validate()?;
    let manager = registry.register_with(ManagerSpec {
        name: cfg.manager_name.clone(),
        kinds: omap_kinds(cfg, &hw),
        debug_namespace: cfg.debug_namespace.clone(),
    })?;
    info!(
        "omap: '{}' up ({} gptimers, {} auxclks, {} sdma channels max)",
        cfg.manager_name,
        cfg.gptimers.len(),
        cfg.auxclks.len(),
        cfg.sdma_max_channels
    );
    Ok(manager)
}
