//! `omap-sdma`: system DMA channels.
//!
//! Request args (68 bytes): `{ num_chs: u32, channels: [i32; 16] }`. The
//! allocated channel numbers are written back into `channels` and reach
//! the remote through the ack's reply bytes.

use core::fmt;
use std::sync::Arc;

use heapless::Vec as HVec;
use log::{debug, warn};

use crate::config::MAX_SDMA_CHANNELS;
use crate::error::ProviderError;
use crate::provider::{Grant, ResourceHandle, ResourceProvider, arg_u32, put_u32};

use super::ports::DmaPort;

pub const KIND_NAME: &str = "omap-sdma";
pub const ARG_LEN: usize = 4 + 4 * MAX_SDMA_CHANNELS as usize;

type Channels = HVec<i32, { MAX_SDMA_CHANNELS as usize }>;

struct SdmaHandle {
    channels: Channels,
}

pub struct SdmaProvider {
    max_channels: u32,
    port: Arc<dyn DmaPort>,
}

impl SdmaProvider {
    pub fn new(max_channels: u32, port: Arc<dyn DmaPort>) -> Self {
        Self {
            max_channels: max_channels.min(MAX_SDMA_CHANNELS),
            port,
        }
    }

    fn free_all(&self, channels: &Channels) {
        for &ch in channels.iter().rev() {
            debug!("{}: releasing ch {}", KIND_NAME, ch);
            self.port.free_channel(ch);
        }
    }
}

impl ResourceProvider for SdmaProvider {
    fn arg_len(&self) -> usize {
        ARG_LEN
    }

    fn request(&self, args: &mut [u8]) -> Result<Grant, ProviderError> {
        let num_chs = arg_u32(args, 0);
        debug!("{}: requesting {} channels", KIND_NAME, num_chs);
        if num_chs > self.max_channels {
            warn!("{}: not able to provide {} channels", KIND_NAME, num_chs);
            return Err(ProviderError::INVALID);
        }

        let mut channels = Channels::new();
        for i in 0..num_chs as usize {
            match self.port.request_channel() {
                Ok(ch) => {
                    // Bounded by max_channels above.
                    let _ = channels.push(ch);
                    put_u32(args, 4 + 4 * i, ch as u32);
                    debug!("{}: providing ch {}", KIND_NAME, ch);
                }
                Err(e) => {
                    warn!("{}: error {} providing channel {}", KIND_NAME, e, i);
                    self.free_all(&channels);
                    return Err(e);
                }
            }
        }

        Ok(Grant::new(SdmaHandle { channels }, 0))
    }

    fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError> {
        let h = handle
            .downcast_ref::<SdmaHandle>()
            .ok_or(ProviderError::INVALID)?;
        self.free_all(&h.channels);
        Ok(())
    }

    fn describe(&self, handle: &ResourceHandle, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(h) = handle.downcast_ref::<SdmaHandle>() else {
            return Ok(());
        };
        writeln!(out, "NumChannels:{}", h.channels.len())?;
        for (i, ch) in h.channels.iter().enumerate() {
            writeln!(out, "Channel[{}]:{}", i, ch)?;
        }
        Ok(())
    }
}
