//! In-memory OMAP hardware.
//!
//! Models just enough state for the providers to be exercised off-target:
//! timer ownership, a clock tree with parents, rates and enable counts, and
//! a DMA logical-channel pool. Also records the order channels were freed
//! so tests can check reverse-order rollback.

use std::collections::BTreeMap;

use log::debug;
use parking_lot::Mutex;

use crate::config::ResmgrConfig;
use crate::error::ProviderError;

use super::ports::{ClockPort, DmaPort, PortResult, TimerPort};

/// Logical channels on the OMAP4 sDMA controller.
pub const SDMA_CHANNELS: u32 = 32;

/// Highest valid timer source selector (sys_clk, 32k, ext).
const MAX_TIMER_SOURCE: u32 = 2;

#[derive(Debug, Default)]
struct SimTimer {
    claimed: bool,
    enabled: bool,
    source: Option<u32>,
}

#[derive(Debug)]
struct SimClock {
    parent: Option<String>,
    rate: u32,
    enable_count: u32,
}

#[derive(Debug, Default)]
struct SimDma {
    total: u32,
    in_use: Vec<i32>,
    freed: Vec<i32>,
}

/// Simulated SoC implementing every OMAP port.
#[derive(Debug)]
pub struct SimHardware {
    timers: Mutex<BTreeMap<u32, SimTimer>>,
    clocks: Mutex<BTreeMap<String, SimClock>>,
    dma: Mutex<SimDma>,
}

fn root_rate(name: &str) -> u32 {
    match name {
        "sys_clkin_ck" => 38_400_000,
        "dpll_core_m3x2_ck" => 200_000_000,
        "dpll_per_m3x2_ck" => 192_000_000,
        _ => 0,
    }
}

impl SimHardware {
    /// Build the hardware described by `cfg` with a full sDMA pool.
    pub fn new(cfg: &ResmgrConfig) -> Self {
        Self::with_dma_channels(cfg, SDMA_CHANNELS)
    }

    pub fn with_dma_channels(cfg: &ResmgrConfig, dma_channels: u32) -> Self {
        let timers = cfg
            .gptimers
            .iter()
            .map(|t| (t.gptn, SimTimer::default()))
            .collect();

        let mut clocks = BTreeMap::new();
        for aux in &cfg.auxclks {
            for p in &aux.parents {
                clocks.entry(p.clone()).or_insert_with(|| SimClock {
                    parent: None,
                    rate: root_rate(p),
                    enable_count: 0,
                });
            }
            let src = format!("{}_src", aux.name);
            clocks.insert(
                src.clone(),
                SimClock {
                    parent: aux.parents.first().cloned(),
                    rate: 0,
                    enable_count: 0,
                },
            );
            clocks.insert(
                aux.name.clone(),
                SimClock {
                    parent: Some(src),
                    rate: 0,
                    enable_count: 0,
                },
            );
        }

        Self {
            timers: Mutex::new(timers),
            clocks: Mutex::new(clocks),
            dma: Mutex::new(SimDma {
                total: dma_channels,
                ..SimDma::default()
            }),
        }
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn timer_claimed(&self, gptn: u32) -> bool {
        self.timers.lock().get(&gptn).is_some_and(|t| t.claimed)
    }

    pub fn timer_enabled(&self, gptn: u32) -> bool {
        self.timers.lock().get(&gptn).is_some_and(|t| t.enabled)
    }

    pub fn timer_source(&self, gptn: u32) -> Option<u32> {
        self.timers.lock().get(&gptn).and_then(|t| t.source)
    }

    pub fn clock_parent(&self, clk: &str) -> Option<String> {
        self.clocks.lock().get(clk).and_then(|c| c.parent.clone())
    }

    pub fn clock_rate(&self, clk: &str) -> Option<u32> {
        self.clocks.lock().get(clk).map(|c| c.rate)
    }

    pub fn clock_enable_count(&self, clk: &str) -> u32 {
        self.clocks.lock().get(clk).map_or(0, |c| c.enable_count)
    }

    /// Allocated DMA channels, ascending.
    pub fn dma_in_use(&self) -> Vec<i32> {
        let mut v = self.dma.lock().in_use.clone();
        v.sort_unstable();
        v
    }

    /// Every channel freed so far, in the order it was freed.
    pub fn dma_free_order(&self) -> Vec<i32> {
        self.dma.lock().freed.clone()
    }
}

impl TimerPort for SimHardware {
    fn request_specific(&self, gptn: u32) -> PortResult<()> {
        let mut timers = self.timers.lock();
        let timer = timers.get_mut(&gptn).ok_or(ProviderError::NOT_FOUND)?;
        if timer.claimed {
            return Err(ProviderError::BUSY);
        }
        timer.claimed = true;
        Ok(())
    }

    fn set_source(&self, gptn: u32, src_clk: u32) -> PortResult<()> {
        if src_clk > MAX_TIMER_SOURCE {
            return Err(ProviderError::INVALID);
        }
        let mut timers = self.timers.lock();
        let timer = timers.get_mut(&gptn).ok_or(ProviderError::NOT_FOUND)?;
        timer.source = Some(src_clk);
        Ok(())
    }

    fn enable(&self, gptn: u32) {
        if let Some(t) = self.timers.lock().get_mut(&gptn) {
            t.enabled = true;
        }
    }

    fn disable(&self, gptn: u32) {
        if let Some(t) = self.timers.lock().get_mut(&gptn) {
            t.enabled = false;
        }
    }

    fn free(&self, gptn: u32) {
        if let Some(t) = self.timers.lock().get_mut(&gptn) {
            *t = SimTimer::default();
        }
    }
}

impl ClockPort for SimHardware {
    fn exists(&self, clk: &str) -> bool {
        self.clocks.lock().contains_key(clk)
    }

    fn parent(&self, clk: &str) -> Option<String> {
        self.clock_parent(clk)
    }

    fn set_parent(&self, clk: &str, parent: &str) -> PortResult<()> {
        let mut clocks = self.clocks.lock();
        if !clocks.contains_key(parent) {
            return Err(ProviderError::INVALID);
        }
        let c = clocks.get_mut(clk).ok_or(ProviderError::NOT_FOUND)?;
        debug!("sim: {} parent -> {}", clk, parent);
        c.parent = Some(parent.to_owned());
        Ok(())
    }

    fn set_rate(&self, clk: &str, rate: u32) -> PortResult<()> {
        if rate == 0 {
            return Err(ProviderError::INVALID);
        }
        let mut clocks = self.clocks.lock();
        let c = clocks.get_mut(clk).ok_or(ProviderError::NOT_FOUND)?;
        c.rate = rate;
        Ok(())
    }

    fn enable(&self, clk: &str) -> PortResult<()> {
        let mut clocks = self.clocks.lock();
        let c = clocks.get_mut(clk).ok_or(ProviderError::NOT_FOUND)?;
        c.enable_count += 1;
        Ok(())
    }

    fn disable(&self, clk: &str) {
        if let Some(c) = self.clocks.lock().get_mut(clk) {
            c.enable_count = c.enable_count.saturating_sub(1);
        }
    }
}

impl DmaPort for SimHardware {
    fn request_channel(&self) -> PortResult<i32> {
        let mut dma = self.dma.lock();
        let ch = (0..dma.total as i32)
            .find(|ch| !dma.in_use.contains(ch))
            .ok_or(ProviderError::BUSY)?;
        dma.in_use.push(ch);
        Ok(ch)
    }

    fn free_channel(&self, ch: i32) {
        let mut dma = self.dma.lock();
        if let Some(pos) = dma.in_use.iter().position(|&c| c == ch) {
            dma.in_use.remove(pos);
            dma.freed.push(ch);
        }
    }
}
