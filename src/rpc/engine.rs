//! Protocol engine: one [`ResmgrChannel`] per transport channel.
//!
//! The transport calls [`ResmgrChannel::on_message`] for every inbound
//! datagram. Calls for one channel are serialized by the transport; calls
//! for different channels may run concurrently, which is why all shared
//! state lives behind the registry and session locks.
//!
//! ```text
//!   UNCONNECTED ──CONNECT ok──▶ CONNECTED ──remove()──▶ CLOSED
//!        │  ▲                                   ▲
//!        └──┘ CONNECT failed (ack carries error)│
//!        └──────────────remove()────────────────┘
//! ```
//!
//! Reply rules:
//!
//! 1. Frames shorter than the header are dropped with a log line.
//! 2. CONNECT and REQUEST always get exactly one ack.
//! 3. RELEASE never gets an ack, whatever happens.
//! 4. Unknown actions get a header-only `-EINVAL`.
//! 5. A sender other than the connected peer gets a header-only
//!    `-ENOTCONN` and changes nothing. The source is checked before the
//!    body is decoded. A REQUEST before CONNECT gets the same reply.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::Error;
use crate::registry::Registry;
use crate::session::{ResourceId, Session};

use super::codec::{self, AckFrame, Action, DecodeError, Message};
use super::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unconnected,
    Connected,
    Closed,
}

/// Host side of one resource-manager channel.
pub struct ResmgrChannel<T: Transport> {
    registry: Arc<Registry>,
    transport: T,
    session: Option<Arc<Session>>,
    closed: bool,
}

impl<T: Transport> ResmgrChannel<T> {
    pub fn new(registry: Arc<Registry>, transport: T) -> Self {
        debug!("RPRM: channel up on local endpoint {}", transport.local_addr());
        Self {
            registry,
            transport,
            session: None,
            closed: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        match (&self.session, self.closed) {
            (_, true) => ChannelState::Closed,
            (Some(_), false) => ChannelState::Connected,
            (None, false) => ChannelState::Unconnected,
        }
    }

    /// The bound session, once connected. Shared with diagnostics readers.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle one inbound datagram from endpoint `src`.
    pub fn on_message(&mut self, src: u32, frame: &[u8]) {
        if self.closed {
            warn!("RPRM[{}]: channel closed, dropping {} bytes", src, frame.len());
            return;
        }

        let Some(tag) = codec::peek_tag(frame) else {
            warn!("RPRM[{}]: frame too short ({} bytes), dropping", src, frame.len());
            return;
        };

        if let Some(session) = &self.session {
            if session.peer() != src {
                warn!(
                    "RPRM[{}]: action {} from foreign endpoint (bound to {})",
                    src,
                    tag,
                    session.peer()
                );
                self.reply_not_connected(src, tag);
                return;
            }
        }

        let msg = match codec::decode(frame) {
            Ok(m) => m,
            Err(e) => {
                self.reject_frame(src, e);
                return;
            }
        };
        debug!("RPRM[{}]: action {:?}", src, msg.action());

        match msg {
            Message::Connect { name } => self.handle_connect(src, &name),
            Message::Request { kind_index, args } => self.handle_request(src, kind_index, args),
            Message::Release { res_id } => self.handle_release(src, res_id),
        }
    }

    /// Transport teardown: release everything and enter `CLOSED`.
    ///
    /// Returns the number of resources whose release failed.
    pub fn remove(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;
        match self.session.take() {
            Some(session) => {
                let failed = session.close();
                info!("RPRM[{}]: channel removed", session.peer());
                failed
            }
            None => 0,
        }
    }

    // ── Handlers ──────────────────────────────────────────────

    fn handle_connect(&mut self, src: u32, name: &str) {
        if self.session.is_some() {
            warn!("RPRM[{}]: already connected, ignoring CONNECT '{}'", src, name);
            self.reply_error(src, Action::Connect, Error::InvalidArgument);
            return;
        }

        let status = match Session::open(&self.registry, src, name) {
            Ok(session) => {
                self.session = Some(Arc::new(session));
                0
            }
            Err(e) => e.status(),
        };
        self.send(src, codec::encode_status(Action::Connect.tag(), status));
    }

    fn handle_request(&mut self, src: u32, kind_index: u32, args: &[u8]) {
        let Some(session) = &self.session else {
            warn!("RPRM[{}]: REQUEST before CONNECT", src);
            self.reply_not_connected(src, Action::Request.tag());
            return;
        };

        let ack = match session.request(kind_index, args) {
            Ok(alloc) => codec::encode_request_ack(Ok(&alloc)),
            Err(e) => {
                warn!("RPRM[{}]: resource allocation failed: {}", src, e);
                codec::encode_request_ack(Err(e.status()))
            }
        };
        self.send(src, ack);
    }

    fn handle_release(&mut self, src: u32, res_id: ResourceId) {
        let Some(session) = &self.session else {
            warn!("RPRM[{}]: RELEASE before CONNECT", src);
            return;
        };

        if let Err(e) = session.release(res_id) {
            warn!("RPRM[{}]: resource release failed: {}", src, e);
        }
    }

    // ── Replies ───────────────────────────────────────────────

    fn reject_frame(&mut self, src: u32, e: DecodeError) {
        warn!("RPRM[{}]: bad message: {}", src, e);
        match e {
            DecodeError::Truncated { .. } => {}
            DecodeError::UnknownAction(tag) => {
                self.send(src, codec::encode_status(tag, Error::InvalidArgument.status()));
            }
            DecodeError::Malformed(action) => {
                self.reply_error(src, action, Error::InvalidArgument);
            }
        }
    }

    /// Error reply from the connected peer's point of view. RELEASE is
    /// never answered.
    fn reply_error(&mut self, dst: u32, action: Action, err: Error) {
        let frame = match action {
            Action::Release => return,
            Action::Request => codec::encode_request_ack(Err(err.status())),
            Action::Connect => codec::encode_status(action.tag(), err.status()),
        };
        self.send(dst, frame);
    }

    /// Header-only `-ENOTCONN` echoing the raw tag. RELEASE is never answered.
    fn reply_not_connected(&mut self, dst: u32, tag: u32) {
        if tag == Action::Release.tag() {
            return;
        }
        self.send(dst, codec::encode_status(tag, Error::NotConnected.status()));
    }

    fn send(&mut self, dst: u32, frame: Option<AckFrame>) {
        let Some(frame) = frame else {
            warn!("RPRM[{}]: ack did not fit the frame buffer", dst);
            return;
        };
        if let Err(e) = self.transport.send_to(dst, &frame) {
            warn!("RPRM[{}]: ack send failed: {:?}", dst, e);
        }
    }
}

impl<T: Transport> Drop for ResmgrChannel<T> {
    fn drop(&mut self) {
        self.remove();
    }
}
