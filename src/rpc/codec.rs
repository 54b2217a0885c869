//! Resource-manager wire codec.
//!
//! Every message is one transport datagram. All integers are
//! little-endian.
//!
//! Inbound (remote → host):
//! ```text
//! ┌────────────┬───────────────────────────────────────────────┐
//! │ action u32 │ CONNECT: name[16] (NUL-padded)                │
//! │            │ REQUEST: kind_index u32 │ args[0..=128]       │
//! │            │ RELEASE: res_id u32                           │
//! └────────────┴───────────────────────────────────────────────┘
//! ```
//!
//! Outbound ack (host → remote):
//! ```text
//! ┌────────────┬────────────┬──────────────────────────────────┐
//! │ action u32 │ status i32 │ REQUEST only: res_id u32 │       │
//! │  (echo)    │ 0 / -errno │   base u32 │ reply[..]           │
//! └────────────┴────────────┴──────────────────────────────────┘
//! ```
//!
//! Both directions are implemented so the same module drives the host
//! engine and remote-side test clients.

use heapless::{String as HString, Vec as HVec};

use crate::provider::MAX_RES_ARGS;
use crate::session::Allocation;

/// Fixed width of a manager-name field, terminating NUL included.
pub const NAME_LEN: usize = 16;

/// Inbound header: the action tag.
pub const HEADER_SIZE: usize = 4;

/// Ack header: echoed action + status.
pub const ACK_HEADER_SIZE: usize = 8;

/// Largest inbound message (a REQUEST with a full argument blob).
pub const MAX_MSG_SIZE: usize = HEADER_SIZE + 4 + MAX_RES_ARGS;

/// Largest ack (a REQUEST ack with a full reply blob).
pub const MAX_ACK_SIZE: usize = ACK_HEADER_SIZE + 8 + MAX_RES_ARGS;

/// Outbound frame buffer.
pub type AckFrame = HVec<u8, MAX_ACK_SIZE>;

/// Inbound frame buffer (remote-side encoders).
pub type MsgFrame = HVec<u8, MAX_MSG_SIZE>;

/// Manager name after defensive termination.
pub type ManagerName = HString<NAME_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Action {
    Connect = 0,
    Request = 1,
    Release = 2,
}

impl Action {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Connect),
            1 => Some(Self::Request),
            2 => Some(Self::Release),
            _ => None,
        }
    }

    pub const fn tag(self) -> u32 {
        self as u32
    }
}

/// A decoded inbound message, borrowing from the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    Connect { name: ManagerName },
    Request { kind_index: u32, args: &'a [u8] },
    Release { res_id: u32 },
}

impl Message<'_> {
    pub fn action(&self) -> Action {
        match self {
            Self::Connect { .. } => Action::Connect,
            Self::Request { .. } => Action::Request,
            Self::Release { .. } => Action::Release,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Shorter than the fixed header; there is nothing to reply to.
    Truncated { len: usize },
    /// Header parsed but the action is not known.
    UnknownAction(u32),
    /// Known action with a body of the wrong shape.
    Malformed(Action),
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated { len } => write!(f, "frame too short ({len} bytes)"),
            Self::UnknownAction(a) => write!(f, "unknown action {a}"),
            Self::Malformed(a) => write!(f, "malformed {a:?} body"),
        }
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Copy a fixed-width name field, force termination, cut at the first NUL.
pub fn parse_name(field: &[u8]) -> Option<ManagerName> {
    let mut buf = [0u8; NAME_LEN];
    let n = field.len().min(NAME_LEN);
    buf[..n].copy_from_slice(&field[..n]);
    buf[NAME_LEN - 1] = 0;

    let end = buf.iter().position(|&b| b == 0).unwrap_or(NAME_LEN - 1);
    let s = core::str::from_utf8(&buf[..end]).ok()?;
    let mut name = ManagerName::new();
    name.push_str(s).ok()?;
    Some(name)
}

/// Raw action tag of a frame, if it is at least a header long.
pub fn peek_tag(frame: &[u8]) -> Option<u32> {
    read_u32(frame, 0)
}

/// Decode one inbound frame.
pub fn decode(frame: &[u8]) -> Result<Message<'_>, DecodeError> {
    let raw = peek_tag(frame).ok_or(DecodeError::Truncated { len: frame.len() })?;
    let action = Action::from_u32(raw).ok_or(DecodeError::UnknownAction(raw))?;
    let body = &frame[HEADER_SIZE..];

    match action {
        Action::Connect => {
            if body.is_empty() || body.len() > NAME_LEN {
                return Err(DecodeError::Malformed(action));
            }
            let name = parse_name(body).ok_or(DecodeError::Malformed(action))?;
            Ok(Message::Connect { name })
        }
        Action::Request => {
            let kind_index = read_u32(body, 0).ok_or(DecodeError::Malformed(action))?;
            let args = &body[4..];
            if args.len() > MAX_RES_ARGS {
                return Err(DecodeError::Malformed(action));
            }
            Ok(Message::Request { kind_index, args })
        }
        Action::Release => {
            let res_id = read_u32(body, 0).ok_or(DecodeError::Malformed(action))?;
            Ok(Message::Release { res_id })
        }
    }
}

// ── Host-side encoders ───────────────────────────────────────

/// Header-only ack: connection result, or an error reply to an unknown
/// action or a sender with no session.
pub fn encode_status(action: u32, status: i32) -> Option<AckFrame> {
    let mut out = AckFrame::new();
    out.extend_from_slice(&action.to_le_bytes()).ok()?;
    out.extend_from_slice(&status.to_le_bytes()).ok()?;
    Some(out)
}

/// REQUEST ack. On error the id, base and reply are all empty/zero.
pub fn encode_request_ack(result: Result<&Allocation, i32>) -> Option<AckFrame> {
    let (status, id, base, reply): (i32, u32, u32, &[u8]) = match result {
        Ok(a) => (0, a.id, a.base, a.reply.as_slice()),
        Err(status) => (status, 0, 0, &[] as &[u8]),
    };

    let mut out = encode_status(Action::Request.tag(), status)?;
    out.extend_from_slice(&id.to_le_bytes()).ok()?;
    out.extend_from_slice(&base.to_le_bytes()).ok()?;
    out.extend_from_slice(reply).ok()?;
    Some(out)
}

// ── Remote-side encoders / decoder ───────────────────────────

pub fn encode_connect(name: &str) -> Option<MsgFrame> {
    if name.len() >= NAME_LEN {
        return None;
    }
    let mut field = [0u8; NAME_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());

    let mut out = MsgFrame::new();
    out.extend_from_slice(&Action::Connect.tag().to_le_bytes()).ok()?;
    out.extend_from_slice(&field).ok()?;
    Some(out)
}

pub fn encode_request(kind_index: u32, args: &[u8]) -> Option<MsgFrame> {
    let mut out = MsgFrame::new();
    out.extend_from_slice(&Action::Request.tag().to_le_bytes()).ok()?;
    out.extend_from_slice(&kind_index.to_le_bytes()).ok()?;
    out.extend_from_slice(args).ok()?;
    Some(out)
}

pub fn encode_release(res_id: u32) -> Option<MsgFrame> {
    let mut out = MsgFrame::new();
    out.extend_from_slice(&Action::Release.tag().to_le_bytes()).ok()?;
    out.extend_from_slice(&res_id.to_le_bytes()).ok()?;
    Some(out)
}

/// An ack as seen by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack<'a> {
    pub action: u32,
    pub status: i32,
    /// `(res_id, base)` when the ack carries a REQUEST body.
    pub grant: Option<(u32, u32)>,
    pub reply: &'a [u8],
}

pub fn decode_ack(frame: &[u8]) -> Option<Ack<'_>> {
    let action = read_u32(frame, 0)?;
    let status = read_u32(frame, 4)? as i32;
    let grant = match (read_u32(frame, 8), read_u32(frame, 12)) {
        (Some(id), Some(base)) => Some((id, base)),
        _ => None,
    };
    let reply = frame.get(ACK_HEADER_SIZE + 8..).unwrap_or(&[]);
    Some(Ack {
        action,
        status,
        grant,
        reply,
    })
}
