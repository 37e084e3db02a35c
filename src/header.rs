//! PROXY protocol v2 wire encoding
//!
//! Layout, in order: the 12-byte signature, the version/command byte, the
//! family/protocol byte, a 16-bit length covering everything that follows
//! it, the family-dependent address block, and the TLV list. Multi-byte
//! integers are big-endian. The length field is back-patched once the full
//! header has been written, matching the HAProxy specification
//! byte-for-byte.
//!
//! Encoding targets a caller-supplied slice (a buffer-pool slot); the
//! decoder is the inverse used to verify emitted headers.

use bytes::Bytes;
use thiserror::Error;

use crate::proxy::{
    ProxyAddress, ProxyAddressInet, ProxyAddressInet6, ProxyAddressUnix, ProxyBeginEx, ProxyInfo,
    SecureInfo, Transport,
};

pub(crate) const SIGNATURE: [u8; 12] = *b"\r\n\r\n\x00\r\nQUIT\n";

const COMMAND_LOCAL: u8 = 0x20;
const COMMAND_PROXY: u8 = 0x21;
const LENGTH_OFFSET: usize = 14;

const TLV_ALPN: u8 = 0x01;
const TLV_AUTHORITY: u8 = 0x02;
const TLV_UNIQUE_ID: u8 = 0x05;
const TLV_SSL: u8 = 0x20;
const TLV_SSL_VERSION: u8 = 0x21;
const TLV_SSL_CN: u8 = 0x22;
const TLV_SSL_CIPHER: u8 = 0x23;
const TLV_SSL_SIG_ALG: u8 = 0x24;
const TLV_SSL_KEY_ALG: u8 = 0x25;
const TLV_NAMESPACE: u8 = 0x30;

/// PP2_CLIENT_SSL | PP2_CLIENT_CERT_CONN | PP2_CLIENT_CERT_SESS
const SSL_CLIENT_FLAGS: u8 = 0x07;

/// UNIX address block: two 108-byte socket paths
const UNIX_PATH_SIZE: usize = 108;

/// Reasons a header cannot be encoded
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum EncodeError {
    #[error("header does not fit the encode buffer")]
    Overflow,
    #[error("value exceeds the 16-bit TLV length")]
    ValueTooLong,
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    progress: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, progress: 0 }
    }

    fn put_u8(&mut self, x: u8) -> Result<(), EncodeError> {
        self.put_slice(&[x])
    }

    fn put_u16(&mut self, x: u16) -> Result<(), EncodeError> {
        self.put_slice(&x.to_be_bytes())
    }

    fn put_u32(&mut self, x: u32) -> Result<(), EncodeError> {
        self.put_slice(&x.to_be_bytes())
    }

    fn put_slice(&mut self, x: &[u8]) -> Result<(), EncodeError> {
        let end = self.progress.checked_add(x.len()).ok_or(EncodeError::Overflow)?;
        if end > self.buf.len() {
            return Err(EncodeError::Overflow);
        }
        self.buf[self.progress..end].copy_from_slice(x);
        self.progress = end;
        Ok(())
    }

    /// Reserve `n` bytes to be patched later; returns their offset
    fn skip(&mut self, n: usize) -> Result<usize, EncodeError> {
        let at = self.progress;
        let end = at.checked_add(n).ok_or(EncodeError::Overflow)?;
        if end > self.buf.len() {
            return Err(EncodeError::Overflow);
        }
        self.buf[at..end].fill(0);
        self.progress = end;
        Ok(at)
    }

    fn patch_u16(&mut self, at: usize, x: u16) {
        self.buf[at..at + 2].copy_from_slice(&x.to_be_bytes());
    }

    fn put_tlv(&mut self, ty: u8, value: &[u8]) -> Result<(), EncodeError> {
        let len = u16::try_from(value.len()).map_err(|_| EncodeError::ValueTooLong)?;
        self.put_u8(ty)?;
        self.put_u16(len)?;
        self.put_slice(value)
    }

    /// UNIX socket paths occupy fixed 108-byte fields on the wire,
    /// NUL padded; over-long paths are truncated
    fn put_unix_path(&mut self, path: &[u8]) -> Result<(), EncodeError> {
        let len = path.len().min(UNIX_PATH_SIZE);
        self.put_slice(&path[..len])?;
        self.skip(UNIX_PATH_SIZE - len)?;
        Ok(())
    }
}

/// Encode a LOCAL-command header into `buf`, returning the encoded length
///
/// Always exactly 16 bytes: the signature, the LOCAL command, an UNSPEC
/// family/protocol byte and a zero length.
pub fn encode_local(buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut cur = Cursor::new(buf);
    cur.put_slice(&SIGNATURE)?;
    cur.put_u8(COMMAND_LOCAL)?;
    cur.put_u8(0)?;
    cur.put_u16(0)?;
    Ok(cur.progress)
}

/// Encode a PROXY-command header for `begin_ex` into `buf`, returning the
/// encoded length
pub fn encode_proxy(buf: &mut [u8], begin_ex: &ProxyBeginEx) -> Result<usize, EncodeError> {
    let mut cur = Cursor::new(buf);
    cur.put_slice(&SIGNATURE)?;
    cur.put_u8(COMMAND_PROXY)?;
    encode_address(&mut cur, &begin_ex.address)?;
    encode_infos(&mut cur, &begin_ex.infos)?;

    let following = cur.progress - LENGTH_OFFSET - 2;
    let following = u16::try_from(following).map_err(|_| EncodeError::ValueTooLong)?;
    cur.patch_u16(LENGTH_OFFSET, following);
    Ok(cur.progress)
}

fn encode_address(cur: &mut Cursor<'_>, address: &ProxyAddress) -> Result<(), EncodeError> {
    cur.put_u8(address.family() << 4 | (address.protocol().ordinal() + 1))?;
    cur.skip(2)?;
    match *address {
        ProxyAddress::Inet(ref inet) => {
            cur.put_slice(&inet.source.octets())?;
            cur.put_slice(&inet.destination.octets())?;
            cur.put_u16(inet.source_port)?;
            cur.put_u16(inet.destination_port)
        }
        ProxyAddress::Inet6(ref inet6) => {
            cur.put_slice(&inet6.source.octets())?;
            cur.put_slice(&inet6.destination.octets())?;
            cur.put_u16(inet6.source_port)?;
            cur.put_u16(inet6.destination_port)
        }
        ProxyAddress::Unix(ref unix) => {
            cur.put_unix_path(&unix.source)?;
            cur.put_unix_path(&unix.destination)
        }
    }
}

fn encode_infos(cur: &mut Cursor<'_>, infos: &[ProxyInfo]) -> Result<(), EncodeError> {
    let mut iter = infos.iter().peekable();
    while let Some(info) = iter.next() {
        match *info {
            ProxyInfo::Alpn(ref v) => cur.put_tlv(TLV_ALPN, v)?,
            ProxyInfo::Authority(ref v) => cur.put_tlv(TLV_AUTHORITY, v)?,
            ProxyInfo::Identity(ref v) => cur.put_tlv(TLV_UNIQUE_ID, v)?,
            ProxyInfo::Namespace(ref v) => cur.put_tlv(TLV_NAMESPACE, v)?,
            ProxyInfo::Secure(ref secure) => {
                // aggregate the contiguous run of SECURE items into one
                // envelope, back-patching its length on exit
                cur.put_u8(TLV_SSL)?;
                let len_at = cur.skip(2)?;
                cur.put_u8(SSL_CLIENT_FLAGS)?;
                cur.put_u32(0)?;
                encode_secure(cur, secure)?;
                while matches!(iter.peek(), Some(ProxyInfo::Secure(_))) {
                    if let Some(ProxyInfo::Secure(next)) = iter.next() {
                        encode_secure(cur, next)?;
                    }
                }
                let len = cur.progress - len_at - 2;
                let len = u16::try_from(len).map_err(|_| EncodeError::ValueTooLong)?;
                cur.patch_u16(len_at, len);
            }
        }
    }
    Ok(())
}

fn encode_secure(cur: &mut Cursor<'_>, secure: &SecureInfo) -> Result<(), EncodeError> {
    match *secure {
        SecureInfo::Protocol(ref v) => cur.put_tlv(TLV_SSL_VERSION, v),
        SecureInfo::Name(ref v) => cur.put_tlv(TLV_SSL_CN, v),
        SecureInfo::Cipher(ref v) => cur.put_tlv(TLV_SSL_CIPHER, v),
        SecureInfo::Signature(ref v) => cur.put_tlv(TLV_SSL_SIG_ALG, v),
        SecureInfo::Key(ref v) => cur.put_tlv(TLV_SSL_KEY_ALG, v),
    }
}

/// The command conveyed by a decoded header
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    Local,
    Proxy,
}

/// A decoded PROXY protocol v2 header
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Header {
    pub command: Command,
    pub address: Option<ProxyAddress>,
    pub infos: Vec<ProxyInfo>,
}

/// Reasons a byte sequence is not a valid header
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("truncated header")]
    UnexpectedEnd,
    #[error("signature mismatch")]
    InvalidSignature,
    #[error("unsupported version/command {0:#04x}")]
    UnsupportedCommand(u8),
    #[error("unrecognized family/protocol {0:#04x}")]
    UnknownFamily(u8),
    #[error("malformed TLV list")]
    InvalidTlv,
}

/// Decode a header from the front of `buf`, returning it along with the
/// number of bytes it occupied
///
/// UNIX address blocks follow the fixed two-by-108-byte layout of the
/// HAProxy specification; trailing NUL padding is trimmed from the
/// decoded paths.
pub fn decode(buf: &[u8]) -> Result<(Header, usize), DecodeError> {
    if buf.len() < 16 {
        return Err(DecodeError::UnexpectedEnd);
    }
    if buf[..12] != SIGNATURE {
        return Err(DecodeError::InvalidSignature);
    }
    let following = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    let total = 16 + following;
    if buf.len() < total {
        return Err(DecodeError::UnexpectedEnd);
    }

    match buf[12] {
        COMMAND_LOCAL => Ok((
            Header {
                command: Command::Local,
                address: None,
                infos: Vec::new(),
            },
            total,
        )),
        COMMAND_PROXY => {
            let fam_proto = buf[13];
            let protocol = (fam_proto & 0x0f)
                .checked_sub(1)
                .and_then(Transport::from_ordinal)
                .ok_or(DecodeError::UnknownFamily(fam_proto))?;
            let (address, tlvs_at) = decode_address(fam_proto >> 4, protocol, &buf[16..total])
                .ok_or(DecodeError::UnknownFamily(fam_proto))?;
            let infos = decode_tlvs(&buf[16 + tlvs_at..total])?;
            Ok((
                Header {
                    command: Command::Proxy,
                    address: Some(address),
                    infos,
                },
                total,
            ))
        }
        other => Err(DecodeError::UnsupportedCommand(other)),
    }
}

fn decode_address(
    family: u8,
    protocol: Transport,
    block: &[u8],
) -> Option<(ProxyAddress, usize)> {
    match family {
        0x1 => {
            let b = block.get(..12)?;
            let address = ProxyAddress::Inet(ProxyAddressInet {
                protocol,
                source: <[u8; 4]>::try_from(&b[..4]).unwrap().into(),
                destination: <[u8; 4]>::try_from(&b[4..8]).unwrap().into(),
                source_port: u16::from_be_bytes([b[8], b[9]]),
                destination_port: u16::from_be_bytes([b[10], b[11]]),
            });
            Some((address, 12))
        }
        0x2 => {
            let b = block.get(..36)?;
            let address = ProxyAddress::Inet6(ProxyAddressInet6 {
                protocol,
                source: <[u8; 16]>::try_from(&b[..16]).unwrap().into(),
                destination: <[u8; 16]>::try_from(&b[16..32]).unwrap().into(),
                source_port: u16::from_be_bytes([b[32], b[33]]),
                destination_port: u16::from_be_bytes([b[34], b[35]]),
            });
            Some((address, 36))
        }
        0x3 => {
            let b = block.get(..2 * UNIX_PATH_SIZE)?;
            let address = ProxyAddress::Unix(ProxyAddressUnix {
                protocol,
                source: trim_unix_path(&b[..UNIX_PATH_SIZE]),
                destination: trim_unix_path(&b[UNIX_PATH_SIZE..]),
            });
            Some((address, 2 * UNIX_PATH_SIZE))
        }
        _ => None,
    }
}

fn trim_unix_path(field: &[u8]) -> Bytes {
    let len = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Bytes::copy_from_slice(&field[..len])
}

fn decode_tlvs(mut buf: &[u8]) -> Result<Vec<ProxyInfo>, DecodeError> {
    let mut infos = Vec::new();
    while !buf.is_empty() {
        if buf.len() < 3 {
            return Err(DecodeError::InvalidTlv);
        }
        let ty = buf[0];
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        let value = buf.get(3..3 + len).ok_or(DecodeError::InvalidTlv)?;
        match ty {
            TLV_ALPN => infos.push(ProxyInfo::Alpn(Bytes::copy_from_slice(value))),
            TLV_AUTHORITY => infos.push(ProxyInfo::Authority(Bytes::copy_from_slice(value))),
            TLV_UNIQUE_ID => infos.push(ProxyInfo::Identity(Bytes::copy_from_slice(value))),
            TLV_NAMESPACE => infos.push(ProxyInfo::Namespace(Bytes::copy_from_slice(value))),
            TLV_SSL => decode_ssl_envelope(value, &mut infos)?,
            _ => {}
        }
        buf = &buf[3 + len..];
    }
    Ok(infos)
}

fn decode_ssl_envelope(value: &[u8], infos: &mut Vec<ProxyInfo>) -> Result<(), DecodeError> {
    // client flags byte and 32-bit verify word precede the sub-TLVs
    let mut sub = value.get(5..).ok_or(DecodeError::InvalidTlv)?;
    while !sub.is_empty() {
        if sub.len() < 3 {
            return Err(DecodeError::InvalidTlv);
        }
        let ty = sub[0];
        let len = u16::from_be_bytes([sub[1], sub[2]]) as usize;
        let v = sub.get(3..3 + len).ok_or(DecodeError::InvalidTlv)?;
        let v = Bytes::copy_from_slice(v);
        match ty {
            TLV_SSL_VERSION => infos.push(ProxyInfo::Secure(SecureInfo::Protocol(v))),
            TLV_SSL_CN => infos.push(ProxyInfo::Secure(SecureInfo::Name(v))),
            TLV_SSL_CIPHER => infos.push(ProxyInfo::Secure(SecureInfo::Cipher(v))),
            TLV_SSL_SIG_ALG => infos.push(ProxyInfo::Secure(SecureInfo::Signature(v))),
            TLV_SSL_KEY_ALG => infos.push(ProxyInfo::Secure(SecureInfo::Key(v))),
            _ => {}
        }
        sub = &sub[3 + len..];
    }
    Ok(())
}
