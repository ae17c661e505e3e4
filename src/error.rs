// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error kinds, one enum per concern, per spec.md §7.

use thiserror::Error;

/// Errors from decoding a ROA payload into prefix assertions.
///
/// Per-ROA: logged and the file is skipped, never fatal to a builder run.
#[derive(Debug, Error)]
pub enum PrefixError {
    #[error("prefix out of range: {0}")]
    OutOfRange(String),
}

/// Errors surfaced while turning a validated ROA's decoded payload into
/// prefix assertions (spec.md §4.1.1).
#[derive(Debug, Error)]
pub enum RoaError {
    #[error("malformed ROA: {0}")]
    MalformedRoa(String),

    #[error("unknown AFI {0:#06x}")]
    UnknownAfi(u16),

    #[error(transparent)]
    OutOfRange(#[from] PrefixError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire framing errors (spec.md §4.1.4): bad version, unknown PDU type, or a
/// reserved field that is nonzero. Carries the raw bytes read so far so the
/// caller can echo them back inside an Error Report's encapsulated PDU.
#[derive(Debug, Error)]
pub enum PduError {
    #[error("{message}")]
    BadPdu { message: String, raw: Vec<u8> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PduError {
    pub fn raw(&self) -> &[u8] {
        match self {
            PduError::BadPdu { raw, .. } => raw,
            PduError::Io(_) => &[],
        }
    }
}

/// Errors from one build run (spec.md §4.2, §7).
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("no ROA input directories configured")]
    NoRoaDirs,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from one server session (spec.md §4.3, §7).
///
/// `MissingCurrent` and `MissingDelta` are deliberately not variants here:
/// both are non-fatal per spec.md §7 and are handled inline as a `Cache
/// Reset` reply rather than surfaced as an error.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pdu(#[from] PduError),
}

/// Errors from the debug client (spec.md §4.5, out of core).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pdu(#[from] PduError),
}
