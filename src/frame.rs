//! The eight stream control frames exchanged with the nucleus dispatcher
//!
//! The dispatcher delivers and accepts frames as `(type id, bytes)` pairs and
//! never interprets the interior layout, so the layout here is fixed by this
//! crate: big-endian fixed-width fields followed by trailing payload or
//! extension bytes.

use std::fmt;

use bytes::{BufMut, Bytes};

use crate::coding::{self, BufExt, BufMutExt};
use crate::StreamId;

/// A stream control frame type
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FrameType(u8);

impl FrameType {
    /// Wrap a raw dispatcher type id
    pub fn from_id(id: u8) -> Self {
        Self(id)
    }

    /// The raw dispatcher type id
    pub fn id(self) -> u8 {
        self.0
    }
}

macro_rules! frame_types {
    {$($name:ident = $val:expr,)*} => {
        impl FrameType {
            $(pub const $name: FrameType = FrameType($val);)*
        }

        impl fmt::Debug for FrameType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    _ => write!(f, "Type({:02x})", self.0),
                }
            }
        }

        impl fmt::Display for FrameType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    _ => write!(f, "<unknown {:02x}>", self.0),
                }
            }
        }
    }
}

frame_types! {
    BEGIN = 0x01,
    DATA = 0x02,
    END = 0x03,
    ABORT = 0x04,
    FLUSH = 0x05,
    // throttle direction
    RESET = 0x11,
    WINDOW = 0x12,
    CHALLENGE = 0x13,
}

/// Flags carried by a [`Data`] frame
///
/// Bit 0 marks the final fragment of a message, bit 1 the initial fragment.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DataFlags(pub u8);

impl DataFlags {
    /// A complete single-fragment message (FIN | INIT)
    pub const FUSED: Self = Self(0x03);

    pub fn fin(self) -> bool {
        self.0 & 0x01 != 0
    }
    pub fn init(self) -> bool {
        self.0 & 0x02 != 0
    }
}

fn take_rest(buf: &mut Bytes) -> Bytes {
    buf.split_to(buf.len())
}

/// Opens one direction of a stream pair
#[derive(Debug, Clone)]
pub struct Begin {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
    pub affinity: u64,
    pub extension: Bytes,
}

impl Begin {
    pub fn encode<W: BufMut>(&self, out: &mut W) {
        out.write(self.route_id);
        out.write(self.stream_id);
        out.write(self.trace_id);
        out.write(self.authorization);
        out.write(self.affinity);
        out.put_slice(&self.extension);
    }

    pub fn decode(buf: &mut Bytes) -> coding::Result<Self> {
        Ok(Self {
            route_id: buf.get()?,
            stream_id: buf.get()?,
            trace_id: buf.get()?,
            authorization: buf.get()?,
            affinity: buf.get()?,
            extension: take_rest(buf),
        })
    }
}

/// Carries payload bytes; `reserved` is debited from the sender's budget
#[derive(Debug, Clone)]
pub struct Data {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
    pub flags: DataFlags,
    pub budget_id: u64,
    pub reserved: i32,
    pub payload: Bytes,
}

impl Data {
    pub fn encode<W: BufMut>(&self, out: &mut W) {
        out.write(self.route_id);
        out.write(self.stream_id);
        out.write(self.trace_id);
        out.write(self.authorization);
        out.write(self.flags.0);
        out.write(self.budget_id);
        out.write(self.reserved);
        out.put_slice(&self.payload);
    }

    pub fn decode(buf: &mut Bytes) -> coding::Result<Self> {
        Ok(Self {
            route_id: buf.get()?,
            stream_id: buf.get()?,
            trace_id: buf.get()?,
            authorization: buf.get()?,
            flags: DataFlags(buf.get()?),
            budget_id: buf.get()?,
            reserved: buf.get()?,
            payload: take_rest(buf),
        })
    }
}

/// Graceful end of one direction
#[derive(Debug, Clone)]
pub struct End {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
}

/// Abrupt termination by the sender
#[derive(Debug, Clone)]
pub struct Abort {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
}

/// Abrupt termination by the receiver, flowing against the stream
#[derive(Debug, Clone)]
pub struct Reset {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
}

macro_rules! plain_codec {
    ($ty:ident) => {
        impl $ty {
            pub fn encode<W: BufMut>(&self, out: &mut W) {
                out.write(self.route_id);
                out.write(self.stream_id);
                out.write(self.trace_id);
                out.write(self.authorization);
            }

            pub fn decode(buf: &mut Bytes) -> coding::Result<Self> {
                Ok(Self {
                    route_id: buf.get()?,
                    stream_id: buf.get()?,
                    trace_id: buf.get()?,
                    authorization: buf.get()?,
                })
            }
        }
    };
}

plain_codec!(End);
plain_codec!(Abort);
plain_codec!(Reset);

/// Requests delivery of any deferred payload
#[derive(Debug, Clone)]
pub struct Flush {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
    pub budget_id: u64,
    pub reserved: i32,
}

impl Flush {
    pub fn encode<W: BufMut>(&self, out: &mut W) {
        out.write(self.route_id);
        out.write(self.stream_id);
        out.write(self.trace_id);
        out.write(self.authorization);
        out.write(self.budget_id);
        out.write(self.reserved);
    }

    pub fn decode(buf: &mut Bytes) -> coding::Result<Self> {
        Ok(Self {
            route_id: buf.get()?,
            stream_id: buf.get()?,
            trace_id: buf.get()?,
            authorization: buf.get()?,
            budget_id: buf.get()?,
            reserved: buf.get()?,
        })
    }
}

/// Grants `credit` bytes of send budget and quotes per-frame `padding`
#[derive(Debug, Clone)]
pub struct Window {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
    pub budget_id: u64,
    pub credit: i32,
    pub padding: i32,
}

impl Window {
    pub fn encode<W: BufMut>(&self, out: &mut W) {
        out.write(self.route_id);
        out.write(self.stream_id);
        out.write(self.trace_id);
        out.write(self.authorization);
        out.write(self.budget_id);
        out.write(self.credit);
        out.write(self.padding);
    }

    pub fn decode(buf: &mut Bytes) -> coding::Result<Self> {
        Ok(Self {
            route_id: buf.get()?,
            stream_id: buf.get()?,
            trace_id: buf.get()?,
            authorization: buf.get()?,
            budget_id: buf.get()?,
            credit: buf.get()?,
            padding: buf.get()?,
        })
    }
}

/// Carries an opaque re-authentication challenge against the stream
#[derive(Debug, Clone)]
pub struct Challenge {
    pub route_id: u64,
    pub stream_id: StreamId,
    pub trace_id: u64,
    pub authorization: u64,
    pub extension: Bytes,
}

impl Challenge {
    pub fn encode<W: BufMut>(&self, out: &mut W) {
        out.write(self.route_id);
        out.write(self.stream_id);
        out.write(self.trace_id);
        out.write(self.authorization);
        out.put_slice(&self.extension);
    }

    pub fn decode(buf: &mut Bytes) -> coding::Result<Self> {
        Ok(Self {
            route_id: buf.get()?,
            stream_id: buf.get()?,
            trace_id: buf.get()?,
            authorization: buf.get()?,
            extension: take_rest(buf),
        })
    }
}

/// Tagged union over the eight frame kinds
#[derive(Debug, Clone)]
pub enum Frame {
    Begin(Begin),
    Data(Data),
    End(End),
    Abort(Abort),
    Flush(Flush),
    Window(Window),
    Reset(Reset),
    Challenge(Challenge),
}

impl Frame {
    pub fn ty(&self) -> FrameType {
        match *self {
            Self::Begin(_) => FrameType::BEGIN,
            Self::Data(_) => FrameType::DATA,
            Self::End(_) => FrameType::END,
            Self::Abort(_) => FrameType::ABORT,
            Self::Flush(_) => FrameType::FLUSH,
            Self::Window(_) => FrameType::WINDOW,
            Self::Reset(_) => FrameType::RESET,
            Self::Challenge(_) => FrameType::CHALLENGE,
        }
    }

    pub fn encode<W: BufMut>(&self, out: &mut W) {
        match *self {
            Self::Begin(ref x) => x.encode(out),
            Self::Data(ref x) => x.encode(out),
            Self::End(ref x) => x.encode(out),
            Self::Abort(ref x) => x.encode(out),
            Self::Flush(ref x) => x.encode(out),
            Self::Window(ref x) => x.encode(out),
            Self::Reset(ref x) => x.encode(out),
            Self::Challenge(ref x) => x.encode(out),
        }
    }

    /// Decode a frame of the given type; `None` for an unrecognized type
    pub fn decode(ty: FrameType, buf: &mut Bytes) -> Option<coding::Result<Self>> {
        Some(match ty {
            FrameType::BEGIN => Begin::decode(buf).map(Self::Begin),
            FrameType::DATA => Data::decode(buf).map(Self::Data),
            FrameType::END => End::decode(buf).map(Self::End),
            FrameType::ABORT => Abort::decode(buf).map(Self::Abort),
            FrameType::FLUSH => Flush::decode(buf).map(Self::Flush),
            FrameType::WINDOW => Window::decode(buf).map(Self::Window),
            FrameType::RESET => Reset::decode(buf).map(Self::Reset),
            FrameType::CHALLENGE => Challenge::decode(buf).map(Self::Challenge),
            _ => return None,
        })
    }
}
