// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire PDU encoding/decoding (spec.md §4.1.4).
//!
//! Every PDU shares a 2-byte header (`version`, `pdu_type`); the commonality
//! ends there, so PDUs are modeled as a tagged enum keyed by `pdu_type` with
//! per-kind encode/decode rather than an inheritance chain (spec.md §9).
//! All multi-byte integers are big-endian. Protocol version is always 0.

use crate::error::PduError;
use crate::prefix::{Afi, PrefixAssertion, SOURCE_RPKI};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u8 = 0;

pub const PDU_TYPE_SERIAL_NOTIFY: u8 = 0;
pub const PDU_TYPE_SERIAL_QUERY: u8 = 1;
pub const PDU_TYPE_RESET_QUERY: u8 = 2;
pub const PDU_TYPE_CACHE_RESPONSE: u8 = 3;
pub const PDU_TYPE_IPV4_PREFIX: u8 = 4;
pub const PDU_TYPE_IPV6_PREFIX: u8 = 6;
pub const PDU_TYPE_END_OF_DATA: u8 = 7;
pub const PDU_TYPE_CACHE_RESET: u8 = 8;
pub const PDU_TYPE_ERROR_REPORT: u8 = 10;

/// RFC 6810-style error codes. The protocol itself only names the wire slot
/// (`u16 errno`); these values are the conventional assignments and give the
/// debug client and tests something meaningful to print.
pub mod errno {
    pub const CORRUPT_DATA: u16 = 0;
    pub const INTERNAL_ERROR: u16 = 1;
    pub const NO_DATA_AVAILABLE: u16 = 2;
    pub const INVALID_REQUEST: u16 = 3;
    pub const UNSUPPORTED_PROTOCOL_VERSION: u16 = 4;
    pub const UNSUPPORTED_PDU_TYPE: u16 = 5;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    SerialNotify { serial: u32 },
    SerialQuery { serial: u32 },
    ResetQuery,
    CacheResponse,
    Prefix(PrefixAssertion),
    EndOfData { serial: u32 },
    CacheReset,
    /// `encapsulated_pdu` is the raw wire bytes of the PDU that triggered the
    /// error, copied verbatim; it may itself be malformed, so we don't try
    /// to re-parse it into a `Pdu`.
    ErrorReport {
        errno: u16,
        encapsulated_pdu: Vec<u8>,
        message: String,
    },
}

impl Pdu {
    pub fn pdu_type(&self) -> u8 {
        match self {
            Pdu::SerialNotify { .. } => PDU_TYPE_SERIAL_NOTIFY,
            Pdu::SerialQuery { .. } => PDU_TYPE_SERIAL_QUERY,
            Pdu::ResetQuery => PDU_TYPE_RESET_QUERY,
            Pdu::CacheResponse => PDU_TYPE_CACHE_RESPONSE,
            Pdu::Prefix(p) => p.family.pdu_type(),
            Pdu::EndOfData { .. } => PDU_TYPE_END_OF_DATA,
            Pdu::CacheReset => PDU_TYPE_CACHE_RESET,
            Pdu::ErrorReport { .. } => PDU_TYPE_ERROR_REPORT,
        }
    }

    /// Encodes this PDU to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![PROTOCOL_VERSION, self.pdu_type()];
        match self {
            Pdu::SerialNotify { serial } | Pdu::SerialQuery { serial } | Pdu::EndOfData { serial } => {
                buf.extend_from_slice(&0u16.to_be_bytes());
                buf.extend_from_slice(&serial.to_be_bytes());
            }
            Pdu::ResetQuery | Pdu::CacheResponse | Pdu::CacheReset => {
                buf.extend_from_slice(&0u16.to_be_bytes());
            }
            Pdu::Prefix(p) => {
                buf.push(p.color);
                buf.push(p.announce as u8);
                buf.push(p.length);
                buf.push(p.max_length);
                buf.push(SOURCE_RPKI);
                match p.family {
                    Afi::V4 => buf.extend_from_slice(&(p.prefix as u32).to_be_bytes()),
                    Afi::V6 => buf.extend_from_slice(&p.prefix.to_be_bytes()),
                }
                buf.extend_from_slice(&p.asn.to_be_bytes());
            }
            Pdu::ErrorReport {
                errno,
                encapsulated_pdu,
                message,
            } => {
                buf.extend_from_slice(&errno.to_be_bytes());
                buf.extend_from_slice(encapsulated_pdu);
                // The msglen field is a single byte in this protocol variant
                // (spec.md §4.1.4, §9 flags this as possibly nonstandard,
                // kept as specified rather than silently widened to u32).
                let truncated = &message.as_bytes()[..message.len().min(u8::MAX as usize)];
                buf.push(truncated.len() as u8);
                buf.extend_from_slice(truncated);
            }
        }
        buf
    }

    /// Reads and decodes one PDU from an async byte stream.
    pub async fn read<R: AsyncRead + Unpin>(r: &mut R) -> Result<Pdu, PduError> {
        let mut header = [0u8; 2];
        r.read_exact(&mut header).await?;
        if header[0] != PROTOCOL_VERSION {
            return Err(PduError::BadPdu {
                message: format!("bad protocol version {}", header[0]),
                raw: header.to_vec(),
            });
        }
        let pdu_type = header[1];

        if pdu_type == PDU_TYPE_ERROR_REPORT {
            let mut errno_buf = [0u8; 2];
            r.read_exact(&mut errno_buf).await?;
            let errno = u16::from_be_bytes(errno_buf);
            let encapsulated_pdu = read_raw_framed_pdu(r).await?;
            let mut len_buf = [0u8; 1];
            r.read_exact(&mut len_buf).await?;
            let msglen = len_buf[0] as usize;
            let mut msg_bytes = vec![0u8; msglen];
            r.read_exact(&mut msg_bytes).await?;
            let message = String::from_utf8_lossy(&msg_bytes).into_owned();
            return Ok(Pdu::ErrorReport {
                errno,
                encapsulated_pdu,
                message,
            });
        }

        let body_len = body_len_for_type(pdu_type).ok_or_else(|| PduError::BadPdu {
            message: format!("unknown PDU type {pdu_type}"),
            raw: header.to_vec(),
        })?;
        let mut body = vec![0u8; body_len];
        r.read_exact(&mut body).await?;
        let mut raw = header.to_vec();
        raw.extend_from_slice(&body);
        parse_fixed_body(pdu_type, &body, &raw)
    }

    /// Writes this PDU to an async byte stream.
    pub async fn write<W: AsyncWrite + Unpin>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.encode()).await
    }
}

/// Body length (excluding the 2-byte header) for every fixed-length PDU
/// kind. `ErrorReport` is the only variable-length kind and is excluded.
pub(crate) fn body_len_for_type(pdu_type: u8) -> Option<usize> {
    match pdu_type {
        PDU_TYPE_SERIAL_NOTIFY | PDU_TYPE_SERIAL_QUERY | PDU_TYPE_END_OF_DATA => Some(6),
        PDU_TYPE_RESET_QUERY | PDU_TYPE_CACHE_RESPONSE | PDU_TYPE_CACHE_RESET => Some(2),
        PDU_TYPE_IPV4_PREFIX => Some(5 + 4 + 4),
        PDU_TYPE_IPV6_PREFIX => Some(5 + 16 + 4),
        _ => None,
    }
}

/// Reads the raw bytes of one well-framed (but not necessarily semantically
/// valid) PDU, for encapsulation inside an Error Report. A nested Error
/// Report is itself a framing violation, per the original's invariant that
/// an error_report never encapsulates another error_report.
async fn read_raw_framed_pdu<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, PduError> {
    let mut header = [0u8; 2];
    r.read_exact(&mut header).await?;
    let pdu_type = header[1];
    if pdu_type == PDU_TYPE_ERROR_REPORT {
        return Err(PduError::BadPdu {
            message: "Error Report cannot encapsulate another Error Report".into(),
            raw: header.to_vec(),
        });
    }
    let body_len = body_len_for_type(pdu_type).ok_or_else(|| PduError::BadPdu {
        message: format!("cannot encapsulate unknown PDU type {pdu_type}"),
        raw: header.to_vec(),
    })?;
    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body).await?;
    let mut raw = header.to_vec();
    raw.extend_from_slice(&body);
    Ok(raw)
}

pub(crate) fn parse_fixed_body(pdu_type: u8, body: &[u8], raw: &[u8]) -> Result<Pdu, PduError> {
    let bad = |message: String| PduError::BadPdu {
        message,
        raw: raw.to_vec(),
    };

    match pdu_type {
        PDU_TYPE_SERIAL_NOTIFY | PDU_TYPE_SERIAL_QUERY | PDU_TYPE_END_OF_DATA => {
            let zero = u16::from_be_bytes([body[0], body[1]]);
            if zero != 0 {
                return Err(bad(format!("reserved field nonzero: {zero}")));
            }
            let serial = u32::from_be_bytes([body[2], body[3], body[4], body[5]]);
            Ok(match pdu_type {
                PDU_TYPE_SERIAL_NOTIFY => Pdu::SerialNotify { serial },
                PDU_TYPE_SERIAL_QUERY => Pdu::SerialQuery { serial },
                _ => Pdu::EndOfData { serial },
            })
        }
        PDU_TYPE_RESET_QUERY | PDU_TYPE_CACHE_RESPONSE | PDU_TYPE_CACHE_RESET => {
            let zero = u16::from_be_bytes([body[0], body[1]]);
            if zero != 0 {
                return Err(bad(format!("reserved field nonzero: {zero}")));
            }
            Ok(match pdu_type {
                PDU_TYPE_RESET_QUERY => Pdu::ResetQuery,
                PDU_TYPE_CACHE_RESPONSE => Pdu::CacheResponse,
                _ => Pdu::CacheReset,
            })
        }
        PDU_TYPE_IPV4_PREFIX | PDU_TYPE_IPV6_PREFIX => {
            let color = body[0];
            if color != 0 {
                return Err(bad(format!("reserved color byte nonzero: {color}")));
            }
            let flags = body[1];
            if flags > 1 {
                return Err(bad(format!("announce flag out of range: {flags}")));
            }
            let length = body[2];
            let max_length = body[3];
            let source = body[4];
            if source != SOURCE_RPKI {
                return Err(bad(format!("unexpected source tag {source}")));
            }
            let (family, prefix, asn) = if pdu_type == PDU_TYPE_IPV4_PREFIX {
                let prefix = u32::from_be_bytes([body[5], body[6], body[7], body[8]]) as u128;
                let asn = u32::from_be_bytes([body[9], body[10], body[11], body[12]]);
                (Afi::V4, prefix, asn)
            } else {
                let mut addr = [0u8; 16];
                addr.copy_from_slice(&body[5..21]);
                let prefix = u128::from_be_bytes(addr);
                let asn = u32::from_be_bytes([body[21], body[22], body[23], body[24]]);
                (Afi::V6, prefix, asn)
            };
            let assertion = PrefixAssertion {
                family,
                prefix,
                length,
                max_length,
                asn,
                announce: flags == 1,
                color,
            };
            assertion
                .check()
                .map_err(|e| bad(format!("invalid prefix assertion: {e}")))?;
            Ok(Pdu::Prefix(assertion))
        }
        _ => unreachable!("body_len_for_type would have rejected this type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_prefix(family: Afi) -> PrefixAssertion {
        let width = family.width();
        let length = fastrand::u8(0..=width);
        let max_length = fastrand::u8(length..=width);
        let prefix = match family {
            Afi::V4 => fastrand::u32(..) as u128,
            Afi::V6 => ((fastrand::u64(..) as u128) << 64) | (fastrand::u64(..) as u128),
        };
        PrefixAssertion {
            family,
            prefix,
            length,
            max_length,
            asn: fastrand::u32(..),
            announce: fastrand::bool(),
            color: 0,
        }
    }

    async fn round_trip(pdu: Pdu) -> Pdu {
        let encoded = pdu.encode();
        let mut cursor = std::io::Cursor::new(encoded);
        Pdu::read(&mut cursor).await.expect("decode should succeed")
    }

    #[tokio::test]
    async fn round_trips_every_fixed_kind() {
        for _ in 0..64 {
            let v4 = Pdu::Prefix(random_prefix(Afi::V4));
            assert_eq!(round_trip(v4.clone()).await, v4);
            let v6 = Pdu::Prefix(random_prefix(Afi::V6));
            assert_eq!(round_trip(v6.clone()).await, v6);
        }
        let kinds = [
            Pdu::SerialNotify { serial: 12345 },
            Pdu::SerialQuery { serial: 0 },
            Pdu::ResetQuery,
            Pdu::CacheResponse,
            Pdu::EndOfData { serial: u32::MAX },
            Pdu::CacheReset,
        ];
        for pdu in kinds {
            assert_eq!(round_trip(pdu.clone()).await, pdu);
        }
    }

    #[tokio::test]
    async fn round_trips_error_report() {
        let inner = Pdu::EndOfData { serial: 7 };
        let pdu = Pdu::ErrorReport {
            errno: errno::CORRUPT_DATA,
            encapsulated_pdu: inner.encode(),
            message: "bad version".into(),
        };
        assert_eq!(round_trip(pdu.clone()).await, pdu);
    }

    #[tokio::test]
    async fn rejects_bad_version() {
        let bytes = vec![1u8, PDU_TYPE_RESET_QUERY, 0, 0];
        let mut cursor = std::io::Cursor::new(bytes);
        let err = Pdu::read(&mut cursor).await.unwrap_err();
        assert!(matches!(err, PduError::BadPdu { .. }));
    }

    #[tokio::test]
    async fn rejects_nonzero_reserved_field() {
        let bytes = vec![PROTOCOL_VERSION, PDU_TYPE_RESET_QUERY, 0, 1];
        let mut cursor = std::io::Cursor::new(bytes);
        let err = Pdu::read(&mut cursor).await.unwrap_err();
        assert!(matches!(err, PduError::BadPdu { .. }));
    }

    #[tokio::test]
    async fn rejects_unknown_pdu_type() {
        let bytes = vec![PROTOCOL_VERSION, 99];
        let mut cursor = std::io::Cursor::new(bytes);
        let err = Pdu::read(&mut cursor).await.unwrap_err();
        assert!(matches!(err, PduError::BadPdu { .. }));
    }
}
