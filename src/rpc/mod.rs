//! Transport-agnostic resource-manager protocol.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Resource Manager Stack                   │
//! │                                                            │
//! │  ┌───────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │ Transport │──▶│  Codec   │──▶│  Engine (per channel) │  │
//! │  │ (trait)   │   │ (decode) │   │  → Session → Provider │  │
//! │  └───────────┘   └──────────┘   └───────────────────────┘  │
//! │       ▲                                    │               │
//! │       │              ┌─────────────────────┘               │
//! │       │              ▼                                     │
//! │  ┌───────────┐   ┌──────────┐                              │
//! │  │ Transport │◀──│  Codec   │   (one ack per CONNECT and   │
//! │  │ (send_to) │   │ (encode) │    REQUEST, none for RELEASE)│
//! │  └───────────┘   └──────────┘                              │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod engine;
pub mod transport;

pub use engine::{ChannelState, ResmgrChannel};
pub use transport::{LoopbackTransport, NullTransport, Outbox, Transport};
