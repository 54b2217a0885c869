//! Board configuration for the resource manager.
//!
//! Describes which timers, auxiliary clocks and DMA channels the remote
//! processor may ask for. Defaults match the OMAP4 ducati subsystem.
//! Loaded from JSON by the host binary; any serde format works.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rpc::codec::NAME_LEN;

/// Hard upper bound on channels in one sdma request (wire struct size).
pub const MAX_SDMA_CHANNELS: u32 = 16;

/// One general-purpose timer the remote may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GptimerConfig {
    /// Id used on the wire.
    pub id: u32,
    /// Hardware timer number (GPTn).
    pub gptn: u32,
    /// Register base reported back to the remote.
    pub base: u32,
}

/// One auxiliary clock and the parents its source mux can select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxclkConfig {
    pub id: u32,
    pub name: String,
    /// Parent clock names; the wire `pclk_id` indexes this list.
    pub parents: Vec<String>,
}

/// Resource manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResmgrConfig {
    // --- Identity ---
    /// Manager name the remote sends in CONNECT
    pub manager_name: String,
    /// Transport endpoint the service listens on
    pub port: u32,

    // --- Resources ---
    pub gptimers: Vec<GptimerConfig>,
    pub auxclks: Vec<AuxclkConfig>,
    /// Largest `num_chs` accepted in one sdma request
    pub sdma_max_channels: u32,

    // --- Diagnostics ---
    /// Prefix for per-session report names (e.g. "remoteproc0")
    pub debug_namespace: Option<String>,
}

fn omap4_auxclk(id: u32) -> AuxclkConfig {
    AuxclkConfig {
        id,
        name: format!("auxclk{id}_ck"),
        parents: vec![
            "sys_clkin_ck".into(),
            "dpll_core_m3x2_ck".into(),
            "dpll_per_m3x2_ck".into(),
        ],
    }
}

impl Default for ResmgrConfig {
    fn default() -> Self {
        Self {
            manager_name: "rprm-ducati".into(),
            port: 100,

            // OMAP4 L4 PER timer bases
            gptimers: vec![
                GptimerConfig { id: 3, gptn: 3, base: 0x4803_4000 },
                GptimerConfig { id: 4, gptn: 4, base: 0x4803_6000 },
                GptimerConfig { id: 9, gptn: 9, base: 0x4803_e000 },
                GptimerConfig { id: 11, gptn: 11, base: 0x4808_8000 },
            ],
            auxclks: (0..4).map(omap4_auxclk).collect(),
            sdma_max_channels: MAX_SDMA_CHANNELS,

            debug_namespace: None,
        }
    }
}

impl ResmgrConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).map_err(|e| {
            log::warn!("config: {}", e);
            Error::Config("malformed JSON")
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.manager_name.is_empty() || self.manager_name.len() >= NAME_LEN {
            return Err(Error::Config("manager name must be 1..=15 bytes"));
        }
        if has_duplicates(self.gptimers.iter().map(|t| t.id)) {
            return Err(Error::Config("duplicate gptimer id"));
        }
        if has_duplicates(self.auxclks.iter().map(|c| c.id)) {
            return Err(Error::Config("duplicate auxclk id"));
        }
        if self.auxclks.iter().any(|c| c.parents.is_empty()) {
            return Err(Error::Config("auxclk without parents"));
        }
        if self.sdma_max_channels > MAX_SDMA_CHANNELS {
            return Err(Error::Config("sdma_max_channels above 16"));
        }
        Ok(())
    }

    pub fn gptimer(&self, id: u32) -> Option<&GptimerConfig> {
        self.gptimers.iter().find(|t| t.id == id)
    }

    pub fn auxclk(&self, id: u32) -> Option<&AuxclkConfig> {
        self.auxclks.iter().find(|c| c.id == id)
    }
}

fn has_duplicates(ids: impl Iterator<Item = u32>) -> bool {
    let mut seen = Vec::new();
    for id in ids {
        if seen.contains(&id) {
            return true;
        }
        seen.push(id);
    }
    false
}
