// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Versioned prefix sets: canonical construction, the IXFR diff algorithm,
//! and the AXFR/IXFR file format (spec.md §3.2, §4.1.2, §4.1.3, §4.1.5).

use crate::error::PduError;
use crate::pdu::Pdu;
use crate::prefix::PrefixAssertion;
use std::path::{Path, PathBuf};

/// An ordered, deduplicated set of prefix assertions stamped with a serial.
#[derive(Debug, Clone)]
pub struct PrefixSet {
    pub serial: u32,
    pub assertions: Vec<PrefixAssertion>,
}

impl PrefixSet {
    /// Builds the canonical prefix set for `serial` from an unordered,
    /// possibly-duplicated multiset of assertions (spec.md §4.1.2): sort by
    /// canonical wire order, then sweep once to drop exact duplicates.
    pub fn canonicalize(serial: u32, mut assertions: Vec<PrefixAssertion>) -> Self {
        assertions.sort();
        assertions.dedup();
        Self { serial, assertions }
    }

    pub fn axfr_path(dir: &Path, serial: u32) -> PathBuf {
        dir.join(format!("{serial}.ax"))
    }

    pub fn ixfr_path(dir: &Path, from: u32, to: u32) -> PathBuf {
        dir.join(format!("{to}.ix.{from}"))
    }

    /// Writes this set as an AXFR snapshot file. Every assertion is written
    /// with `announce = true`, regardless of its own flag, matching
    /// spec.md §4.1.5 ("Snapshot files contain only ... Prefix PDUs with
    /// `announce=1`").
    pub fn save_axfr(&self, dir: &Path) -> std::io::Result<()> {
        let path = Self::axfr_path(dir, self.serial);
        let mut bytes = Vec::with_capacity(self.assertions.len() * 16);
        for assertion in &self.assertions {
            bytes.extend(Pdu::Prefix(assertion.with_announce(true)).encode());
        }
        std::fs::write(path, bytes)
    }

    /// Loads an AXFR snapshot file, taking the serial from the filename.
    pub fn load_axfr(path: &Path) -> Result<Self, PduError> {
        let serial = parse_axfr_filename(path).ok_or_else(|| PduError::BadPdu {
            message: format!("not an AXFR filename: {}", path.display()),
            raw: Vec::new(),
        })?;
        let assertions = load_prefix_pdus(path)?;
        Ok(Self { serial, assertions })
    }

    /// Computes the delta `old -> self` as a merge-walk over both
    /// canonically-ordered sets (spec.md §4.1.3): while both are nonempty,
    /// compare heads; the lower one withdraws/announces and advances, and
    /// equal heads are dropped from both without emitting anything. Once one
    /// side is drained, the rest of the other is emitted outright. Output
    /// order follows the walk, not a second global sort, by contract.
    pub fn diff(old: &PrefixSet, new: &PrefixSet) -> Vec<PrefixAssertion> {
        let mut out = Vec::new();
        let mut oi = 0;
        let mut ni = 0;
        let old = &old.assertions;
        let new = &new.assertions;
        while oi < old.len() && ni < new.len() {
            match old[oi].cmp(&new[ni]) {
                std::cmp::Ordering::Less => {
                    out.push(old[oi].with_announce(false));
                    oi += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(new[ni].with_announce(true));
                    ni += 1;
                }
                std::cmp::Ordering::Equal => {
                    oi += 1;
                    ni += 1;
                }
            }
        }
        out.extend(old[oi..].iter().map(|p| p.with_announce(false)));
        out.extend(new[ni..].iter().map(|p| p.with_announce(true)));
        out
    }

    /// Writes the delta `old -> self` as an IXFR file.
    pub fn save_ixfr(&self, old: &PrefixSet, dir: &Path) -> std::io::Result<()> {
        let path = Self::ixfr_path(dir, old.serial, self.serial);
        let delta = Self::diff(old, self);
        let mut bytes = Vec::with_capacity(delta.len() * 16);
        for assertion in &delta {
            bytes.extend(Pdu::Prefix(*assertion).encode());
        }
        std::fs::write(path, bytes)
    }

    /// Loads an IXFR file, returning `(from_serial, to_serial, delta)`.
    pub fn load_ixfr(path: &Path) -> Result<(u32, u32, Vec<PrefixAssertion>), PduError> {
        let (from, to) = parse_ixfr_filename(path).ok_or_else(|| PduError::BadPdu {
            message: format!("not an IXFR filename: {}", path.display()),
            raw: Vec::new(),
        })?;
        let assertions = load_prefix_pdus(path)?;
        Ok((from, to, assertions))
    }
}

/// A snapshot/delta file is the bare concatenation of Prefix PDUs with no
/// framing, header, or trailer (spec.md §4.1.5): parse PDU-by-PDU until EOF.
/// Both kinds contain only IPv4/IPv6 Prefix PDUs, so this walks the buffer
/// directly rather than going through the general (async) `Pdu::read`.
fn load_prefix_pdus(path: &Path) -> Result<Vec<PrefixAssertion>, PduError> {
    let bytes = std::fs::read(path)?;
    let mut offset = 0;
    let mut out = Vec::new();
    while offset < bytes.len() {
        if bytes.len() - offset < 2 {
            return Err(PduError::BadPdu {
                message: "truncated PDU header".into(),
                raw: bytes[offset..].to_vec(),
            });
        }
        let pdu_type = bytes[offset + 1];
        let body_len = crate::pdu::body_len_for_type(pdu_type).filter(|_| {
            pdu_type == crate::pdu::PDU_TYPE_IPV4_PREFIX || pdu_type == crate::pdu::PDU_TYPE_IPV6_PREFIX
        });
        let body_len = body_len.ok_or_else(|| PduError::BadPdu {
            message: format!("unexpected PDU kind {pdu_type} in snapshot/delta file"),
            raw: bytes[offset..].to_vec(),
        })?;
        let body_start = offset + 2;
        let body_end = body_start + body_len;
        if body_end > bytes.len() {
            return Err(PduError::BadPdu {
                message: "truncated PDU body".into(),
                raw: bytes[offset..].to_vec(),
            });
        }
        let body = &bytes[body_start..body_end];
        match crate::pdu::parse_fixed_body(pdu_type, body, &bytes[offset..body_end])? {
            Pdu::Prefix(p) => out.push(p),
            _ => unreachable!("body_len_for_type filter restricted this to Prefix PDUs"),
        }
        offset = body_end;
    }
    Ok(out)
}

fn parse_axfr_filename(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let serial = name.strip_suffix(".ax")?;
    serial.parse().ok()
}

fn parse_ixfr_filename(path: &Path) -> Option<(u32, u32)> {
    let name = path.file_name()?.to_str()?;
    let (to, rest) = name.split_once(".ix.")?;
    Some((rest.parse().ok()?, to.parse().ok()?))
}
