//! `omap-auxclk`: auxiliary clock outputs.
//!
//! Request args (16 bytes):
//! `{ clk_id: u32, clk_rate: u32, pclk_id: u32, pclk_rate: u32 }`.
//!
//! Each `auxclkN_ck` hangs off a source mux (`auxclkN_ck_src`). A request
//! points the mux at the chosen parent, programs both rates and enables the
//! output. The mux's previous parent is restored on failure and on release.

use core::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::AuxclkConfig;
use crate::error::ProviderError;
use crate::provider::{Grant, ResourceHandle, ResourceProvider, arg_u32};

use super::ports::ClockPort;

pub const KIND_NAME: &str = "omap-auxclk";
pub const ARG_LEN: usize = 16;

struct AuxclkHandle {
    clk_id: u32,
    clk_rate: u32,
    pclk_id: u32,
    pclk_rate: u32,
    name: String,
    parent: String,
    src: String,
    old_parent: Option<String>,
}

pub struct AuxclkProvider {
    clocks: Vec<AuxclkConfig>,
    port: Arc<dyn ClockPort>,
}

impl AuxclkProvider {
    pub fn new(clocks: Vec<AuxclkConfig>, port: Arc<dyn ClockPort>) -> Self {
        Self { clocks, port }
    }

    fn restore(&self, src: &str, old_parent: Option<&str>) {
        if let Some(old) = old_parent {
            if let Err(e) = self.port.set_parent(src, old) {
                warn!("{}: could not restore {} parent {}: {}", KIND_NAME, src, old, e);
            }
        }
    }

    /// Everything after the mux switch; on error the caller restores it.
    fn program(&self, h: &AuxclkHandle) -> Result<(), ProviderError> {
        self.port.set_rate(&h.parent, h.pclk_rate).inspect_err(|_| {
            warn!("{}: rate {} not supported by {}", KIND_NAME, h.pclk_rate, h.parent);
        })?;
        self.port.set_rate(&h.name, h.clk_rate).inspect_err(|_| {
            warn!("{}: rate {} not supported by {}", KIND_NAME, h.clk_rate, h.name);
        })?;
        self.port.enable(&h.name).inspect_err(|_| {
            warn!("{}: error enabling {}", KIND_NAME, h.name);
        })
    }
}

impl ResourceProvider for AuxclkProvider {
    fn arg_len(&self) -> usize {
        ARG_LEN
    }

    fn request(&self, args: &mut [u8]) -> Result<Grant, ProviderError> {
        let clk_id = arg_u32(args, 0);
        let clk_rate = arg_u32(args, 4);
        let pclk_id = arg_u32(args, 8);
        let pclk_rate = arg_u32(args, 12);
        debug!("{}: requesting id {}, parent id {}", KIND_NAME, clk_id, pclk_id);

        let Some(cfg) = self.clocks.iter().find(|c| c.id == clk_id) else {
            warn!("{}: invalid auxclk id {}", KIND_NAME, clk_id);
            return Err(ProviderError::INVALID);
        };
        let Some(parent) = cfg.parents.get(pclk_id as usize) else {
            warn!("{}: invalid parent id {} for {}", KIND_NAME, pclk_id, cfg.name);
            return Err(ProviderError::NOT_FOUND);
        };

        if !self.port.exists(&cfg.name) {
            warn!("{}: unable to get clock {}", KIND_NAME, cfg.name);
            return Err(ProviderError::IO);
        }
        let Some(src) = self.port.parent(&cfg.name) else {
            warn!("{}: unable to get {} source clock", KIND_NAME, cfg.name);
            return Err(ProviderError::IO);
        };
        if !self.port.exists(parent) {
            warn!("{}: unable to get parent clock {}", KIND_NAME, parent);
            return Err(ProviderError::IO);
        }

        let handle = AuxclkHandle {
            clk_id,
            clk_rate,
            pclk_id,
            pclk_rate,
            name: cfg.name.clone(),
            parent: parent.clone(),
            old_parent: self.port.parent(&src),
            src,
        };

        self.port.set_parent(&handle.src, parent).inspect_err(|_| {
            warn!("{}: unable to set {} as parent of {}", KIND_NAME, parent, cfg.name);
        })?;
        if let Err(e) = self.program(&handle) {
            self.restore(&handle.src, handle.old_parent.as_deref());
            return Err(e);
        }

        Ok(Grant::new(handle, 0))
    }

    fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError> {
        let h = handle
            .downcast_ref::<AuxclkHandle>()
            .ok_or(ProviderError::INVALID)?;
        debug!("{}: releasing id {}, parent id {}", KIND_NAME, h.clk_id, h.pclk_id);
        self.restore(&h.src, h.old_parent.as_deref());
        self.port.disable(&h.name);
        Ok(())
    }

    fn describe(&self, handle: &ResourceHandle, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(h) = handle.downcast_ref::<AuxclkHandle>() else {
            return Ok(());
        };
        write!(
            out,
            "id:{}\nname:{}\nrate:{}\nparent id:{}\nparent name:{}\nparent rate:{}\n",
            h.clk_id, h.name, h.clk_rate, h.pclk_id, h.parent, h.pclk_rate
        )
    }
}
