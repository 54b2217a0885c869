//! `omap-gptimer`: general-purpose timers.
//!
//! Request args (8 bytes): `{ id: u32, src_clk: u32 }`. The grant base is
//! the configured register base of the timer.

use core::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::GptimerConfig;
use crate::error::ProviderError;
use crate::provider::{Grant, ResourceHandle, ResourceProvider, arg_u32};

use super::ports::TimerPort;

pub const KIND_NAME: &str = "omap-gptimer";
pub const ARG_LEN: usize = 8;

struct GptimerHandle {
    id: u32,
    gptn: u32,
    src_clk: u32,
}

pub struct GptimerProvider {
    timers: Vec<GptimerConfig>,
    port: Arc<dyn TimerPort>,
}

impl GptimerProvider {
    pub fn new(timers: Vec<GptimerConfig>, port: Arc<dyn TimerPort>) -> Self {
        Self { timers, port }
    }
}

impl ResourceProvider for GptimerProvider {
    fn arg_len(&self) -> usize {
        ARG_LEN
    }

    fn request(&self, args: &mut [u8]) -> Result<Grant, ProviderError> {
        let id = arg_u32(args, 0);
        let src_clk = arg_u32(args, 4);
        debug!("{}: requesting id {}, source {}", KIND_NAME, id, src_clk);

        let Some(cfg) = self.timers.iter().find(|t| t.id == id) else {
            warn!("{}: invalid gptimer id {}", KIND_NAME, id);
            return Err(ProviderError::INVALID);
        };

        self.port.request_specific(cfg.gptn)?;
        if let Err(e) = self.port.set_source(cfg.gptn, src_clk) {
            warn!("{}: invalid source {} for gpt{}", KIND_NAME, src_clk, cfg.gptn);
            self.port.free(cfg.gptn);
            return Err(e);
        }
        self.port.enable(cfg.gptn);

        Ok(Grant::new(
            GptimerHandle {
                id,
                gptn: cfg.gptn,
                src_clk,
            },
            cfg.base,
        ))
    }

    fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError> {
        let h = handle
            .downcast_ref::<GptimerHandle>()
            .ok_or(ProviderError::INVALID)?;
        debug!("{}: releasing id {}, source {}", KIND_NAME, h.id, h.src_clk);
        self.port.disable(h.gptn);
        self.port.free(h.gptn);
        Ok(())
    }

    fn describe(&self, handle: &ResourceHandle, out: &mut dyn fmt::Write) -> fmt::Result {
        match handle.downcast_ref::<GptimerHandle>() {
            Some(h) => write!(out, "Id:{}\nGptimer{}\nSource:{}\n", h.id, h.gptn, h.src_clk),
            None => Ok(()),
        }
    }
}
