//! Sans-I/O implementation of the client half of a PROXY protocol v2 egress
//! bridge.
//!
//! This crate performs no I/O whatsoever. A [`ClientFactory`] admits
//! application-side stream pairs, opens a correlated stream pair toward the
//! upstream origin, and injects the PROXY protocol v2 header as the very
//! first bytes of the outbound payload. Payload bytes and flow-control
//! signals are forwarded transparently in both directions thereafter.
//!
//! The surrounding nucleus supplies routing, stream identifiers and frame
//! delivery through the [`RouteManager`] and [`StreamIdSupplier`] contracts;
//! outbound frames are drained via [`ClientFactory::poll_transmit`].

use std::fmt;

use bytes::{Buf, BufMut, Bytes};

mod client;
mod coding;
mod config;
pub mod frame;
pub mod header;
mod pool;
pub mod proxy;
mod router;
#[cfg(test)]
mod tests;

pub use crate::client::{ClientFactory, MessageHandler};
pub use crate::coding::UnexpectedEnd;
pub use crate::config::Config;
pub use crate::frame::{Frame, FrameType};
pub use crate::header::EncodeError;
pub use crate::pool::{BufferPool, Slot};
pub use crate::proxy::{
    ProxyAddress, ProxyAddressInet, ProxyAddressInet6, ProxyAddressUnix, ProxyBeginEx, ProxyInfo,
    SecureInfo, Transport,
};
pub use crate::router::{Route, RouteManager, SequentialIdSupplier, StreamIdSupplier};

use crate::coding::BufExt;

/// Identifier for one direction of a correlated stream pair
///
/// The least-significant bit selects the direction: odd ids carry the
/// initial (sender-to-receiver) direction, even ids the reply direction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StreamId(pub u64);

impl StreamId {
    /// Whether this id names the initial (sender-to-receiver) direction
    pub fn is_initial(self) -> bool {
        self.0 & 1 != 0
    }

    /// Whether this id names the reply (receiver-to-sender) direction
    pub fn is_reply(self) -> bool {
        !self.is_initial()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.is_initial() { "initial" } else { "reply" };
        write!(f, "{} stream {:#x}", dir, self.0)
    }
}

impl coding::Codec for StreamId {
    fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Self(buf.get()?))
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.0.encode(buf);
    }
}

/// Opaque address of a frame sink, assigned by the nucleus
///
/// A [`Transmit`] is addressed to the receiver the router supplied for its
/// stream; the value is meaningful only to the embedding dispatcher.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ReceiverId(pub u64);

/// An encoded outbound control frame, ready for delivery
///
/// Drained from the factory via [`ClientFactory::poll_transmit`].
#[derive(Debug)]
pub struct Transmit {
    /// The sink the frame is addressed to
    pub receiver: ReceiverId,
    /// Frame kind, carried alongside the contents per the dispatcher contract
    pub frame_type: FrameType,
    /// The encoded frame
    pub contents: Bytes,
}
