//! Transport abstraction: any datagram channel between host and remote
//! endpoints.
//!
//! Concrete implementations:
//! - rpmsg over virtio rings (provided by the platform, outside this crate)
//! - [`LoopbackTransport`] for the simulator and tests
//! - [`NullTransport`] where nothing reads the acks
//!
//! The protocol engine is generic over `Transport`, so it never depends
//! on how frames physically move. Delivery is assumed reliable and ordered.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Datagram-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Send one message to the endpoint at `dst`.
    fn send_to(&mut self, dst: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Address of the local (host) endpoint of this channel.
    fn local_addr(&self) -> u32;
}

/// A null transport that discards all sends.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn send_to(&mut self, _dst: u32, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }

    fn local_addr(&self) -> u32 {
        0
    }
}

/// One message captured by a [`LoopbackTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub dst: u32,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<VecDeque<Datagram>>,
    failing: AtomicBool,
}

/// In-memory transport whose sends land in a shared [`Outbox`].
pub struct LoopbackTransport {
    addr: u32,
    shared: Arc<Shared>,
}

/// Remote-side view of a [`LoopbackTransport`]: everything the host sent.
#[derive(Clone)]
pub struct Outbox {
    shared: Arc<Shared>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendFailed;

impl LoopbackTransport {
    pub fn new(addr: u32) -> (Self, Outbox) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                addr,
                shared: Arc::clone(&shared),
            },
            Outbox { shared },
        )
    }
}

impl Transport for LoopbackTransport {
    type Error = SendFailed;

    fn send_to(&mut self, dst: u32, data: &[u8]) -> Result<(), SendFailed> {
        if self.shared.failing.load(Ordering::Relaxed) {
            return Err(SendFailed);
        }
        self.shared.queue.lock().push_back(Datagram {
            dst,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn local_addr(&self) -> u32 {
        self.addr
    }
}

impl Outbox {
    /// Take the oldest unread message.
    pub fn pop(&self) -> Option<Datagram> {
        self.shared.queue.lock().pop_front()
    }

    /// Take every unread message.
    pub fn drain(&self) -> Vec<Datagram> {
        self.shared.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }

    /// Make subsequent sends fail (simulates a torn-down channel).
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::Relaxed);
    }
}
