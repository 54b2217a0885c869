//! Full remote flows against the OMAP manager on simulated hardware.

use std::io::Read;
use std::sync::Arc;

use rpmsg_resmgr::diagnostics::ReportReader;
use rpmsg_resmgr::error::{EBUSY, EINVAL, ENOENT};
use rpmsg_resmgr::omap::{self, SimHardware};
use rpmsg_resmgr::{Registry, ResmgrConfig};

use crate::mock_provider::Remote;

fn le(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn sdma_args(num_chs: u32) -> Vec<u8> {
    let mut a = vec![0u8; omap::sdma::ARG_LEN];
    a[..4].copy_from_slice(&num_chs.to_le_bytes());
    a
}

fn ducati() -> (Arc<Registry>, Arc<SimHardware>, ResmgrConfig) {
    let cfg = ResmgrConfig {
        debug_namespace: Some("remoteproc0".into()),
        ..ResmgrConfig::default()
    };
    let registry = Arc::new(Registry::new());
    let hw = Arc::new(SimHardware::new(&cfg));
    omap::register_omap_manager(&registry, &cfg, Arc::clone(&hw)).unwrap();
    (registry, hw, cfg)
}

#[test]
fn timer_clock_and_dma_lifecycle() {
    let (registry, hw, _cfg) = ducati();
    let mut remote = Remote::new(&registry, 1024);
    assert_eq!(remote.connect("rprm-ducati"), 0);

    let timer = remote.request(omap::GPTIMER, &le(&[9, 0]));
    assert_eq!(timer.status, 0);
    assert_eq!(timer.grant, Some((1, 0x4803_e000)));
    assert!(hw.timer_enabled(9));

    let clk = remote.request(omap::AUXCLK, &le(&[2, 24_000_000, 1, 200_000_000]));
    assert_eq!(clk.status, 0);
    assert_eq!(clk.grant.unwrap().0, 2);
    assert_eq!(hw.clock_parent("auxclk2_ck_src").as_deref(), Some("dpll_core_m3x2_ck"));

    let dma = remote.request(omap::SDMA, &sdma_args(2));
    assert_eq!(dma.status, 0);
    assert_eq!(dma.reply.len(), omap::sdma::ARG_LEN);
    assert_eq!(&dma.reply[4..12], &le(&[0, 1])[..]);

    remote.release(2);
    assert_eq!(hw.clock_parent("auxclk2_ck_src").as_deref(), Some("sys_clkin_ck"));

    assert_eq!(remote.channel.remove(), 0);
    assert!(!hw.timer_claimed(9));
    assert!(hw.dma_in_use().is_empty());
    assert_eq!(hw.dma_free_order(), vec![1, 0]);
}

#[test]
fn provider_errnos_reach_the_remote() {
    let (registry, _hw, _cfg) = ducati();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("rprm-ducati");

    assert_eq!(remote.request(omap::GPTIMER, &le(&[5, 0])).status, -EINVAL);
    assert_eq!(remote.request(omap::AUXCLK, &le(&[0, 1, 7, 1])).status, -ENOENT);
    assert_eq!(remote.request(omap::SDMA, &sdma_args(17)).status, -EINVAL);
    assert_eq!(remote.request(omap::SDMA, &[0u8; 8]).status, -EINVAL);
    assert!(remote.channel.session().unwrap().is_empty());
}

#[test]
fn timer_held_by_one_remote_is_busy_for_another() {
    let (registry, hw, _cfg) = ducati();
    let mut ducati = Remote::new(&registry, 1024);
    let mut tesla = Remote::new(&registry, 1025);
    ducati.connect("rprm-ducati");
    tesla.connect("rprm-ducati");

    assert_eq!(ducati.request(omap::GPTIMER, &le(&[11, 0])).status, 0);
    assert_eq!(tesla.request(omap::GPTIMER, &le(&[11, 0])).status, -EBUSY);

    drop(ducati);
    assert!(!hw.timer_claimed(11));
    assert_eq!(tesla.request(omap::GPTIMER, &le(&[11, 0])).grant, Some((1, 0x4808_8000)));
}

#[test]
fn diagnostics_report_lists_live_resources() {
    let (registry, _hw, _cfg) = ducati();
    let mut remote = Remote::new(&registry, 1024);
    remote.connect("rprm-ducati");
    remote.request(omap::GPTIMER, &le(&[3, 1]));
    remote.request(omap::SDMA, &sdma_args(1));

    let session = Arc::clone(remote.channel.session().unwrap());
    let mut reader = ReportReader::new(Arc::clone(&session));
    assert_eq!(reader.name(), "remoteproc0/rprm-ducati-1024-resmgr");

    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    let expected = format!(
        "Resource list for remote endpoint 1024:\n\
         \nResource Name:omap-gptimer\nId:3\nGptimer3\nSource:1\nArgs:0300000001000000\n\
         \nResource Name:omap-sdma\nNumChannels:1\nChannel[0]:0\nArgs:01000000{}\n",
        "0".repeat(128)
    );
    assert_eq!(text, expected);

    // Reader outlives the channel; the closed session reports nothing live.
    remote.channel.remove();
    reader.rewind();
    let mut after = String::new();
    reader.read_to_string(&mut after).unwrap();
    assert_eq!(after, "Resource list for remote endpoint 1024:\n");
}
