//! rprm-sim: resource manager host on simulated OMAP hardware.
//!
//! ```text
//! ┌──────────────┐  CONNECT / REQUEST / RELEASE   ┌──────────────────────┐
//! │ scripted     │ ─────────────────────────────▶ │ ResmgrChannel        │
//! │ remote (1024)│ ◀───────────── acks ────────── │  → Session → omap-*  │
//! └──────────────┘      LoopbackTransport         │  → SimHardware       │
//!                                                 └──────────────────────┘
//! ```
//!
//! Usage: `rprm-sim [config.json]`. Without a path the OMAP4 ducati
//! defaults are used. `RUST_LOG` controls verbosity (default `info`).

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use rpmsg_resmgr::diagnostics::ReportReader;
use rpmsg_resmgr::omap::{self, SimHardware};
use rpmsg_resmgr::rpc::codec::{self, MsgFrame};
use rpmsg_resmgr::rpc::{LoopbackTransport, Outbox, ResmgrChannel};
use rpmsg_resmgr::{Registry, ResmgrConfig};

/// Endpoint address of the scripted remote.
const REMOTE: u32 = 1024;

fn load_config() -> Result<ResmgrConfig> {
    let Some(path) = std::env::args().nth(1) else {
        info!("Config: built-in OMAP4 defaults");
        return Ok(ResmgrConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let cfg = ResmgrConfig::from_json(&text).with_context(|| format!("parsing {path}"))?;
    info!("Config loaded from {}", path);
    Ok(cfg)
}

/// One acked exchange: send `frame`, return `(status, res_id)` of the reply.
fn exchange(
    channel: &mut ResmgrChannel<LoopbackTransport>,
    outbox: &Outbox,
    what: &str,
    frame: Option<MsgFrame>,
) -> Result<(i32, u32)> {
    let frame = frame.with_context(|| format!("{what}: message does not fit a frame"))?;
    channel.on_message(REMOTE, &frame);

    let reply = outbox.pop().with_context(|| format!("{what}: no ack"))?;
    let ack = codec::decode_ack(&reply.data).with_context(|| format!("{what}: short ack"))?;
    let (id, base) = ack.grant.unwrap_or((0, 0));
    info!(
        "{}: status {} id {} base {:#010x} ({} reply bytes)",
        what,
        ack.status,
        id,
        base,
        ack.reply.len()
    );
    Ok((ack.status, id))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("rprm-sim v{}", env!("CARGO_PKG_VERSION"));

    let cfg = load_config()?;
    let registry = Arc::new(Registry::new());
    let hw = Arc::new(SimHardware::new(&cfg));
    let manager = omap::register_omap_manager(&registry, &cfg, Arc::clone(&hw))
        .context("registering OMAP manager")?;

    let (transport, outbox) = LoopbackTransport::new(cfg.port);
    let mut channel = ResmgrChannel::new(Arc::clone(&registry), transport);

    // ── Connect ───────────────────────────────────────────────
    let (status, _) = exchange(
        &mut channel,
        &outbox,
        "CONNECT",
        codec::encode_connect(&cfg.manager_name),
    )?;
    if status != 0 {
        bail!("CONNECT to '{}' refused: {}", cfg.manager_name, status);
    }

    // ── Request a timer and two DMA channels ─────────────────
    let mut granted = Vec::new();
    if let Some(timer) = cfg.gptimers.first() {
        let mut args = [0u8; omap::gptimer::ARG_LEN];
        args[..4].copy_from_slice(&timer.id.to_le_bytes());
        let (status, id) = exchange(
            &mut channel,
            &outbox,
            "REQUEST omap-gptimer",
            codec::encode_request(omap::GPTIMER, &args),
        )?;
        if status == 0 {
            granted.push(id);
        }
    }

    let mut args = [0u8; omap::sdma::ARG_LEN];
    args[..4].copy_from_slice(&2u32.to_le_bytes());
    let (status, id) = exchange(
        &mut channel,
        &outbox,
        "REQUEST omap-sdma",
        codec::encode_request(omap::SDMA, &args),
    )?;
    if status == 0 {
        granted.push(id);
    }

    // ── Diagnostics ───────────────────────────────────────────
    if let Some(session) = channel.session() {
        let mut reader = ReportReader::new(Arc::clone(session));
        let mut report = String::new();
        reader.read_to_string(&mut report).context("reading report")?;
        println!("== {} ==\n{}", reader.name(), report);
    }

    // ── Release the first grant, tear the rest down ──────────
    if let Some(&first) = granted.first() {
        let frame = codec::encode_release(first).context("RELEASE: frame")?;
        channel.on_message(REMOTE, &frame);
        info!("RELEASE id {} sent", first);
    }
    if !outbox.is_empty() {
        warn!("unexpected ack after RELEASE");
    }

    let failed = channel.remove();
    info!(
        "Channel removed ({} release failures), DMA in use: {:?}",
        failed,
        hw.dma_in_use()
    );
    registry.unregister(&manager).context("unregistering manager")?;
    Ok(())
}
