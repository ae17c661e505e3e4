// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ROA decoding (spec.md §4.1.1, §6.1).
//!
//! RPKI signature and certificate-chain validation happen upstream and are
//! out of scope for this core; what remains is turning an already-decoded
//! ROA payload into prefix assertions. We split that boundary explicitly:
//! `RoaSource` is the external collaborator that hands back the decoded
//! `(version, asn, [(afi, [prefix_entry, ...])])` tuple per file, and
//! [`decode_raw_roa`] is the core logic (version check, AFI mapping,
//! length/range validation) that turns one such tuple into assertions. That
//! split lets the canonicalization logic be unit-tested with synthetic
//! `RawRoa` fixtures that never touch ASN.1 or signature verification.

use crate::error::RoaError;
use crate::prefix::{Afi, PrefixAssertion};
use std::path::{Path, PathBuf};

/// One `(bit_string, max_len_or_nil)` prefix entry from a ROA's payload.
#[derive(Debug, Clone, Copy)]
pub struct RawPrefixEntry {
    /// Length of the ROA bit string (= the prefix length `L`).
    pub prefix_len: u8,
    /// The bit string's value, left-padded with zero bits to the family
    /// width (spec.md §4.1.1).
    pub prefix_bits: u128,
    /// `max_len_or_nil`; `None` means the ROA omitted it (`M` defaults to `L`).
    pub max_length: Option<u8>,
}

/// The decoded payload of one validated ROA, as exposed by the upstream
/// validator: `(version, asn, [(afi, [prefix_entry, ...]), ...])`.
#[derive(Debug, Clone)]
pub struct RawRoa {
    pub version: u8,
    pub asn: u32,
    pub blocks: Vec<(u16, Vec<RawPrefixEntry>)>,
}

/// External collaborator: decodes validated ROA objects found under a set
/// of directories into their raw payload tuples. Malformed individual files
/// are reported per-file so the caller can log and skip them rather than
/// aborting the whole walk (spec.md §7).
pub trait RoaSource {
    fn load(&self, dirs: &[PathBuf]) -> Vec<(PathBuf, Result<RawRoa, RoaError>)>;
}

/// Turns one ROA's decoded payload into the prefix assertions it asserts
/// (spec.md §4.1.1):
///
/// - the payload version must be 0;
/// - AFI `0x0001`/`0x0002` map to IPv4/IPv6, anything else is `UnknownAfi`;
/// - `M` defaults to `L` when the ROA omitted it, otherwise is taken as-is
///   and then range-checked together with `L` against the family width.
pub fn decode_raw_roa(raw: &RawRoa) -> Result<Vec<PrefixAssertion>, RoaError> {
    if raw.version != 0 {
        return Err(RoaError::MalformedRoa(format!(
            "unsupported ROA version {}",
            raw.version
        )));
    }
    let mut out = Vec::new();
    for (afi, entries) in &raw.blocks {
        let family = Afi::from_roa_afi(*afi).ok_or(RoaError::UnknownAfi(*afi))?;
        for entry in entries {
            let max_length = entry.max_length.unwrap_or(entry.prefix_len);
            let assertion = PrefixAssertion {
                family,
                prefix: entry.prefix_bits,
                length: entry.prefix_len,
                max_length,
                asn: raw.asn,
                announce: true,
                color: 0,
            };
            assertion.check()?;
            out.push(assertion);
        }
    }
    Ok(out)
}

/// Walks a set of directories recursively for files named `*.roa` and
/// decodes each with the `rpki` crate's signed-object payload decoder
/// (spec.md §4.1.2: "recursively; only files with suffix `.roa`").
pub struct FileRoaSource;

impl RoaSource for FileRoaSource {
    fn load(&self, dirs: &[PathBuf]) -> Vec<(PathBuf, Result<RawRoa, RoaError>)> {
        let mut out = Vec::new();
        for dir in dirs {
            walk_roa_files(dir, &mut out);
        }
        out
    }
}

fn walk_roa_files(dir: &Path, out: &mut Vec<(PathBuf, Result<RawRoa, RoaError>)>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            out.push((dir.to_path_buf(), Err(RoaError::Io(e))));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_roa_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("roa") {
            let decoded = decode_roa_file(&path);
            out.push((path, decoded));
        }
    }
}

fn decode_roa_file(path: &Path) -> Result<RawRoa, RoaError> {
    use std::net::IpAddr;

    let der = std::fs::read(path)?;
    let roa = rpki::repository::roa::Roa::decode(der.as_ref(), true)
        .map_err(|e| RoaError::MalformedRoa(e.to_string()))?;
    let content = roa.content();

    // `max_length()` is already defaulted to `address_length()` by the
    // decoder when the ROA omitted it, so this call site always has a
    // value; we still carry it through as `Some(..)` since `RawPrefixEntry`
    // models "ROA omitted M" generically for synthetic fixtures too.
    let mut v4 = Vec::new();
    for entry in content.v4_addrs().iter() {
        let IpAddr::V4(addr) = entry.address() else {
            continue;
        };
        v4.push(RawPrefixEntry {
            prefix_len: entry.address_length(),
            prefix_bits: ipv4_addr_bits(&addr),
            max_length: Some(entry.max_length()),
        });
    }

    let mut v6 = Vec::new();
    for entry in content.v6_addrs().iter() {
        let IpAddr::V6(addr) = entry.address() else {
            continue;
        };
        v6.push(RawPrefixEntry {
            prefix_len: entry.address_length(),
            prefix_bits: ipv6_addr_bits(&addr),
            max_length: Some(entry.max_length()),
        });
    }

    let mut blocks = Vec::new();
    if !v4.is_empty() {
        blocks.push((0x0001u16, v4));
    }
    if !v6.is_empty() {
        blocks.push((0x0002u16, v6));
    }

    Ok(RawRoa {
        version: 0,
        asn: content.as_id().into_u32(),
        blocks,
    })
}

fn ipv4_addr_bits(addr: &std::net::Ipv4Addr) -> u128 {
    u32::from_be_bytes(addr.octets()) as u128
}

fn ipv6_addr_bits(addr: &std::net::Ipv6Addr) -> u128 {
    u128::from_be_bytes(addr.octets())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prefix_len: u8, prefix_bits: u128, max_length: Option<u8>) -> RawPrefixEntry {
        RawPrefixEntry {
            prefix_len,
            prefix_bits,
            max_length,
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let raw = RawRoa {
            version: 1,
            asn: 1,
            blocks: vec![],
        };
        assert!(matches!(
            decode_raw_roa(&raw),
            Err(RoaError::MalformedRoa(_))
        ));
    }

    #[test]
    fn rejects_unknown_afi() {
        let raw = RawRoa {
            version: 0,
            asn: 1,
            blocks: vec![(0x0003, vec![entry(24, 0xC0000200, None)])],
        };
        assert!(matches!(decode_raw_roa(&raw), Err(RoaError::UnknownAfi(0x0003))));
    }

    #[test]
    fn defaults_max_length_to_prefix_length() {
        let raw = RawRoa {
            version: 0,
            asn: 64512,
            blocks: vec![(0x0001, vec![entry(24, 0xC0000200, None)])],
        };
        let assertions = decode_raw_roa(&raw).unwrap();
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].length, 24);
        assert_eq!(assertions[0].max_length, 24);
        assert_eq!(assertions[0].asn, 64512);
    }

    #[test]
    fn honors_explicit_max_length() {
        let raw = RawRoa {
            version: 0,
            asn: 1,
            blocks: vec![(0x0001, vec![entry(16, 0xC0000000, Some(24))])],
        };
        let assertions = decode_raw_roa(&raw).unwrap();
        assert_eq!(assertions[0].max_length, 24);
    }

    #[test]
    fn rejects_out_of_range_max_length() {
        let raw = RawRoa {
            version: 0,
            asn: 1,
            blocks: vec![(0x0001, vec![entry(24, 0xC0000200, Some(16))])],
        };
        assert!(decode_raw_roa(&raw).is_err());
    }

    #[test]
    fn decodes_multiple_families_in_one_roa() {
        let raw = RawRoa {
            version: 0,
            asn: 7,
            blocks: vec![
                (0x0001, vec![entry(24, 0xC0000200, None)]),
                (0x0002, vec![entry(32, 1 << 96, None)]),
            ],
        };
        let assertions = decode_raw_roa(&raw).unwrap();
        assert_eq!(assertions.len(), 2);
        assert_eq!(assertions[0].family, Afi::V4);
        assert_eq!(assertions[1].family, Afi::V6);
    }
}
