//! Typed model of the PROXY Begin extension: the address tuple and info list
//! an application supplies to request the PROXY (rather than LOCAL) command
//!
//! The extension travels as the opaque `extension` bytes of the
//! application-side Begin frame. The codec here is tagged and
//! length-prefixed so unrecognized info items can be skipped, while
//! unrecognized address families or transport protocols are rejected
//! outright: encoding an address block for a family we do not understand
//! would put a malformed header on the wire.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

use crate::coding::{BufExt, BufMutExt, UnexpectedEnd};

/// Transport protocol ordinal, combined with the address family in the
/// header's family/protocol byte
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Transport {
    Stream = 0,
    Datagram = 1,
}

impl Transport {
    pub(crate) fn ordinal(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_ordinal(x: u8) -> Option<Self> {
        match x {
            0 => Some(Self::Stream),
            1 => Some(Self::Datagram),
            _ => None,
        }
    }
}

/// Source/destination tuple for the INET family
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProxyAddressInet {
    pub protocol: Transport,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
}

/// Source/destination tuple for the INET6 family
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProxyAddressInet6 {
    pub protocol: Transport,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub source_port: u16,
    pub destination_port: u16,
}

/// Source/destination socket paths for the UNIX family
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProxyAddressUnix {
    pub protocol: Transport,
    pub source: Bytes,
    pub destination: Bytes,
}

/// Original client address tuple, by family
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProxyAddress {
    Inet(ProxyAddressInet),
    Inet6(ProxyAddressInet6),
    Unix(ProxyAddressUnix),
}

const FAMILY_INET: u8 = 0x01;
const FAMILY_INET6: u8 = 0x02;
const FAMILY_UNIX: u8 = 0x03;

impl ProxyAddress {
    /// The family nibble carried in the encoded header
    pub(crate) fn family(&self) -> u8 {
        match *self {
            Self::Inet(_) => FAMILY_INET,
            Self::Inet6(_) => FAMILY_INET6,
            Self::Unix(_) => FAMILY_UNIX,
        }
    }

    pub fn protocol(&self) -> Transport {
        match *self {
            Self::Inet(ref x) => x.protocol,
            Self::Inet6(ref x) => x.protocol,
            Self::Unix(ref x) => x.protocol,
        }
    }
}

/// A single item of the info list
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProxyInfo {
    Alpn(Bytes),
    Authority(Bytes),
    Identity(Bytes),
    Namespace(Bytes),
    Secure(SecureInfo),
}

/// Constituent of the aggregated SSL/TLS envelope
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SecureInfo {
    Protocol(Bytes),
    Name(Bytes),
    Cipher(Bytes),
    Signature(Bytes),
    Key(Bytes),
}

const INFO_ALPN: u8 = 0x00;
const INFO_AUTHORITY: u8 = 0x01;
const INFO_IDENTITY: u8 = 0x02;
const INFO_NAMESPACE: u8 = 0x03;
const INFO_SECURE: u8 = 0x04;

const SECURE_PROTOCOL: u8 = 0x00;
const SECURE_NAME: u8 = 0x01;
const SECURE_CIPHER: u8 = 0x02;
const SECURE_SIGNATURE: u8 = 0x03;
const SECURE_KEY: u8 = 0x04;

/// The decoded PROXY Begin extension
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProxyBeginEx {
    pub address: ProxyAddress,
    pub infos: Vec<ProxyInfo>,
}

/// Reasons a Begin extension cannot be accepted
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected end of extension")]
    UnexpectedEnd,
    #[error("unrecognized address family {0:#04x}")]
    UnknownFamily(u8),
    #[error("unrecognized transport protocol {0:#04x}")]
    UnknownProtocol(u8),
}

impl From<UnexpectedEnd> for DecodeError {
    fn from(_: UnexpectedEnd) -> Self {
        Self::UnexpectedEnd
    }
}

impl ProxyBeginEx {
    pub fn encode<W: BufMut>(&self, out: &mut W) {
        out.write(self.address.family());
        out.write(self.address.protocol().ordinal());
        match self.address {
            ProxyAddress::Inet(ref x) => {
                out.write(x.source);
                out.write(x.destination);
                out.write(x.source_port);
                out.write(x.destination_port);
            }
            ProxyAddress::Inet6(ref x) => {
                out.write(x.source);
                out.write(x.destination);
                out.write(x.source_port);
                out.write(x.destination_port);
            }
            ProxyAddress::Unix(ref x) => {
                out.write(x.source.len() as u16);
                out.put_slice(&x.source);
                out.write(x.destination.len() as u16);
                out.put_slice(&x.destination);
            }
        }
        for info in &self.infos {
            encode_info(out, info);
        }
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let family = buf.get::<u8>()?;
        let protocol = buf.get::<u8>()?;
        let protocol =
            Transport::from_ordinal(protocol).ok_or(DecodeError::UnknownProtocol(protocol))?;
        let address = match family {
            FAMILY_INET => ProxyAddress::Inet(ProxyAddressInet {
                protocol,
                source: buf.get()?,
                destination: buf.get()?,
                source_port: buf.get()?,
                destination_port: buf.get()?,
            }),
            FAMILY_INET6 => ProxyAddress::Inet6(ProxyAddressInet6 {
                protocol,
                source: buf.get()?,
                destination: buf.get()?,
                source_port: buf.get()?,
                destination_port: buf.get()?,
            }),
            FAMILY_UNIX => {
                let source = get_octets(buf)?;
                let destination = get_octets(buf)?;
                ProxyAddress::Unix(ProxyAddressUnix {
                    protocol,
                    source,
                    destination,
                })
            }
            other => return Err(DecodeError::UnknownFamily(other)),
        };

        let mut infos = Vec::new();
        while buf.has_remaining() {
            let kind = buf.get::<u8>()?;
            let mut body = get_octets(buf)?;
            match decode_info(kind, &mut body) {
                Some(info) => infos.push(info),
                // tolerated: advance past items this version does not know
                None => continue,
            }
        }

        Ok(Self { address, infos })
    }
}

fn get_octets(buf: &mut Bytes) -> Result<Bytes, UnexpectedEnd> {
    let len = buf.get::<u16>()? as usize;
    if buf.len() < len {
        return Err(UnexpectedEnd);
    }
    Ok(buf.split_to(len))
}

fn encode_info<W: BufMut>(out: &mut W, info: &ProxyInfo) {
    let (kind, sub, value) = match *info {
        ProxyInfo::Alpn(ref v) => (INFO_ALPN, None, v),
        ProxyInfo::Authority(ref v) => (INFO_AUTHORITY, None, v),
        ProxyInfo::Identity(ref v) => (INFO_IDENTITY, None, v),
        ProxyInfo::Namespace(ref v) => (INFO_NAMESPACE, None, v),
        ProxyInfo::Secure(ref secure) => {
            let (sub, v) = match *secure {
                SecureInfo::Protocol(ref v) => (SECURE_PROTOCOL, v),
                SecureInfo::Name(ref v) => (SECURE_NAME, v),
                SecureInfo::Cipher(ref v) => (SECURE_CIPHER, v),
                SecureInfo::Signature(ref v) => (SECURE_SIGNATURE, v),
                SecureInfo::Key(ref v) => (SECURE_KEY, v),
            };
            (INFO_SECURE, Some(sub), v)
        }
    };
    out.write(kind);
    match sub {
        Some(sub) => {
            out.write((value.len() + 1) as u16);
            out.write(sub);
        }
        None => out.write(value.len() as u16),
    }
    out.put_slice(value);
}

fn decode_info(kind: u8, body: &mut Bytes) -> Option<ProxyInfo> {
    Some(match kind {
        INFO_ALPN => ProxyInfo::Alpn(body.clone()),
        INFO_AUTHORITY => ProxyInfo::Authority(body.clone()),
        INFO_IDENTITY => ProxyInfo::Identity(body.clone()),
        INFO_NAMESPACE => ProxyInfo::Namespace(body.clone()),
        INFO_SECURE => {
            let sub = body.get::<u8>().ok()?;
            let value = body.clone();
            ProxyInfo::Secure(match sub {
                SECURE_PROTOCOL => SecureInfo::Protocol(value),
                SECURE_NAME => SecureInfo::Name(value),
                SECURE_CIPHER => SecureInfo::Cipher(value),
                SECURE_SIGNATURE => SecureInfo::Signature(value),
                SECURE_KEY => SecureInfo::Key(value),
                _ => return None,
            })
        }
        _ => return None,
    })
}
