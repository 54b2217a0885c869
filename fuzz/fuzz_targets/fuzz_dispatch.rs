//! Fuzz target: `ResmgrChannel::on_message`
//!
//! Splits the input into frames and feeds them to a channel connected to
//! the OMAP manager on simulated hardware. Asserts that dispatch never
//! panics, never sends more than one ack per frame, and that removing the
//! channel always returns every simulated resource.
//!
//! cargo fuzz run fuzz_dispatch

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use rpmsg_resmgr::omap::{self, SimHardware};
use rpmsg_resmgr::rpc::codec;
use rpmsg_resmgr::rpc::{LoopbackTransport, ResmgrChannel};
use rpmsg_resmgr::{Registry, ResmgrConfig};

fuzz_target!(|data: &[u8]| {
    let cfg = ResmgrConfig::default();
    let registry = Arc::new(Registry::new());
    let hw = Arc::new(SimHardware::new(&cfg));
    let manager = omap::register_omap_manager(&registry, &cfg, Arc::clone(&hw)).unwrap();

    let (transport, outbox) = LoopbackTransport::new(cfg.port);
    let mut channel = ResmgrChannel::new(Arc::clone(&registry), transport);
    channel.on_message(1024, &codec::encode_connect(&cfg.manager_name).unwrap());
    outbox.drain();

    // First byte of each chunk is its length; the rest is the frame.
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let n = (len as usize).min(tail.len());
        let (frame, next) = tail.split_at(n);
        channel.on_message(1024, frame);
        assert!(outbox.drain().len() <= 1, "at most one ack per frame");
        rest = next;
    }

    channel.remove();
    assert!(hw.dma_in_use().is_empty(), "dma channels leaked");
    for t in &cfg.gptimers {
        assert!(!hw.timer_claimed(t.gptn), "gpt{} leaked", t.gptn);
    }
    registry.unregister(&manager).unwrap();
});
