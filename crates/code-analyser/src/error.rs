//! Error type for the analyser's few genuinely fallible operations.
//!
//! Classifier, disassembler, and label uniquification all stay
//! infallible; this enum covers only the two outer-boundary operations
//! that can fail: loading a malformed page and remapping an unknown
//! bank.

use std::fmt;

/// Errors surfaced by [`crate::persist`] and [`crate::bank::BankManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyserError {
    /// Binary page load saw a magic/version mismatch; the page buffer
    /// given did not look like one this crate wrote.
    BadPageFormat { expected_magic: u32, found_magic: u32 },
    /// Binary page load saw a supported magic but an unsupported version.
    UnsupportedVersion { found_version: u32 },
    /// `BankManager::map_bank` referenced a bank id that was never created.
    UnknownBank(i16),
    /// A read was attempted against an address-space slot with no page
    /// mapped and no byte source configured to fall back to.
    PageNotMapped(u16),
    /// A binary page buffer ended before a record it promised (magic,
    /// string, or count) could be read in full.
    Truncated { context: &'static str },
}

impl fmt::Display for AnalyserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPageFormat { expected_magic, found_magic } => write!(
                f,
                "page format magic mismatch: expected {expected_magic:#010x}, found {found_magic:#010x}"
            ),
            Self::UnsupportedVersion { found_version } => {
                write!(f, "unsupported page format version {found_version}")
            }
            Self::UnknownBank(id) => write!(f, "unknown bank id {id}"),
            Self::PageNotMapped(addr) => {
                write!(f, "no page mapped for read at address {addr:#06x}")
            }
            Self::Truncated { context } => write!(f, "page buffer truncated while reading {context}"),
        }
    }
}

impl std::error::Error for AnalyserError {}

pub type Result<T> = std::result::Result<T, AnalyserError>;
