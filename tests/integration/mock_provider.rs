//! Mock provider and scripted remote for integration tests.
//!
//! [`MockProvider`] records every callback so tests can assert on the full
//! call history. [`Remote`] plays the remote processor: it encodes
//! messages, feeds them to a channel and decodes whatever came back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rpmsg_resmgr::provider::{Grant, ResourceHandle, ResourceKind, ResourceProvider};
use rpmsg_resmgr::rpc::codec;
use rpmsg_resmgr::rpc::{LoopbackTransport, Outbox, ResmgrChannel};
use rpmsg_resmgr::{ProviderError, Registry};

pub const TIMER_BASE: u32 = 0x4803_e000;

// ── Provider call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Request { args: Vec<u8> },
    Release { handle: u32 },
}

// ── MockProvider ──────────────────────────────────────────────

/// Hands out consecutive `u32` handles starting at `first_handle`.
pub struct MockProvider {
    arg_len: usize,
    base: u32,
    next_handle: AtomicU32,
    calls: Mutex<Vec<ProviderCall>>,
    fail_request: Mutex<Option<ProviderError>>,
    fail_release: Mutex<Option<ProviderError>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new(arg_len: usize, first_handle: u32, base: u32) -> Arc<Self> {
        Arc::new(Self {
            arg_len,
            base,
            next_handle: AtomicU32::new(first_handle),
            calls: Mutex::new(Vec::new()),
            fail_request: Mutex::new(None),
            fail_release: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, ProviderCall::Request { .. }))
            .count()
    }

    /// Handles passed to `release`, in call order.
    pub fn released(&self) -> Vec<u32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::Release { handle } => Some(*handle),
                ProviderCall::Request { .. } => None,
            })
            .collect()
    }

    /// The next request fails with `err`.
    pub fn fail_next_request(&self, err: ProviderError) {
        *self.fail_request.lock() = Some(err);
    }

    /// Every release fails with `err` until cleared with `None`.
    pub fn set_release_failure(&self, err: Option<ProviderError>) {
        *self.fail_release.lock() = err;
    }
}

impl ResourceProvider for MockProvider {
    fn arg_len(&self) -> usize {
        self.arg_len
    }

    fn request(&self, args: &mut [u8]) -> Result<Grant, ProviderError> {
        self.calls.lock().push(ProviderCall::Request {
            args: args.to_vec(),
        });
        if let Some(e) = self.fail_request.lock().take() {
            return Err(e);
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if let Some(first) = args.first_mut() {
            *first = 0xA5;
        }
        Ok(Grant::new(handle, self.base))
    }

    fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError> {
        let handle = *handle.downcast_ref::<u32>().ok_or(ProviderError::INVALID)?;
        self.calls.lock().push(ProviderCall::Release { handle });
        match *self.fail_release.lock() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn describe(
        &self,
        handle: &ResourceHandle,
        out: &mut dyn core::fmt::Write,
    ) -> core::fmt::Result {
        match handle.downcast_ref::<u32>() {
            Some(h) => writeln!(out, "Handle:{}", h),
            None => Ok(()),
        }
    }
}

/// Registry with `timer-mgr` exposing one `gptimer` kind (handles 7, 8, ...).
pub fn timer_registry() -> (Arc<Registry>, Arc<MockProvider>) {
    let registry = Arc::new(Registry::new());
    let provider = MockProvider::new(0, 7, TIMER_BASE);
    registry
        .register("timer-mgr", vec![ResourceKind::new("gptimer", provider.clone())])
        .unwrap();
    (registry, provider)
}

// ── Scripted remote ───────────────────────────────────────────

/// Owned copy of a decoded ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRecord {
    pub action: u32,
    pub status: i32,
    pub grant: Option<(u32, u32)>,
    pub reply: Vec<u8>,
}

pub struct Remote {
    pub addr: u32,
    pub channel: ResmgrChannel<LoopbackTransport>,
    pub outbox: Outbox,
}

#[allow(dead_code)]
impl Remote {
    pub fn new(registry: &Arc<Registry>, addr: u32) -> Self {
        let (transport, outbox) = LoopbackTransport::new(100);
        Self {
            addr,
            channel: ResmgrChannel::new(Arc::clone(registry), transport),
            outbox,
        }
    }

    /// Deliver raw bytes as if sent from `src`; return every ack produced.
    pub fn send_raw_from(&mut self, src: u32, frame: &[u8]) -> Vec<AckRecord> {
        self.channel.on_message(src, frame);
        self.outbox
            .drain()
            .into_iter()
            .map(|d| {
                assert_eq!(d.dst, src, "acks go back to the sender");
                let ack = codec::decode_ack(&d.data).expect("ack shorter than header");
                AckRecord {
                    action: ack.action,
                    status: ack.status,
                    grant: ack.grant,
                    reply: ack.reply.to_vec(),
                }
            })
            .collect()
    }

    pub fn send_raw(&mut self, frame: &[u8]) -> Vec<AckRecord> {
        self.send_raw_from(self.addr, frame)
    }

    /// CONNECT and return the single ack's status.
    pub fn connect(&mut self, name: &str) -> i32 {
        let acks = self.send_raw(&codec::encode_connect(name).unwrap());
        assert_eq!(acks.len(), 1, "CONNECT gets exactly one ack");
        acks[0].status
    }

    /// REQUEST and return the single ack.
    pub fn request(&mut self, kind: u32, args: &[u8]) -> AckRecord {
        let mut acks = self.send_raw(&codec::encode_request(kind, args).unwrap());
        assert_eq!(acks.len(), 1, "REQUEST gets exactly one ack");
        acks.remove(0)
    }

    /// RELEASE; asserts that nothing is sent back.
    pub fn release(&mut self, res_id: u32) {
        let acks = self.send_raw(&codec::encode_release(res_id).unwrap());
        assert!(acks.is_empty(), "RELEASE is never acked, got {acks:?}");
    }
}
