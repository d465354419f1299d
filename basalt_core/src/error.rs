//! Error types and result definitions for the Basalt runtime.
//!
//! Everything that can go wrong while decoding or emitting the binary
//! unwind tables is funneled through [`BasaltError`]. The personality
//! routine maps any decode failure to the unwinder's fatal phase-1
//! reason code; nothing in the hot path panics.

use thiserror::Error;

/// The unified result type used throughout the Basalt runtime crates.
pub type BasaltResult<T> = Result<T, BasaltError>;

/// Errors arising from the unwind-table codecs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasaltError {
    /// A DWARF value encoding the decoder does not support.
    #[error("unsupported DWARF encoding 0x{0:02x}")]
    UnsupportedEncoding(u8),

    /// A types-table encoding without a fixed entry size.
    ///
    /// Types-table entries are indexed backwards from the table end, so
    /// only fixed-size encodings can describe them.
    #[error("types-table encoding 0x{0:02x} has no fixed entry size")]
    UnsizedTypeEntry(u8),

    /// The frame's instruction pointer precedes every remaining
    /// call-site entry; the table is sorted, so the frame carries no
    /// unwind information for this address.
    #[error("instruction pointer offset {0:#x} precedes the call-site table")]
    IpPrecedesCallSites(usize),

    /// An action record referenced a types-table entry but the LSDA
    /// omitted the types table.
    #[error("action record names type index {0} but the types table is omitted")]
    MissingTypesTable(i64),

    /// Emission-side failure: a value does not fit the requested
    /// encoding.
    #[error("value {value:#x} does not fit DWARF encoding 0x{encoding:02x}")]
    ValueTooLarge {
        /// The requested encoding.
        encoding: u8,
        /// The value that overflowed it.
        value: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BasaltError::UnsupportedEncoding(0x5E);
        assert_eq!(err.to_string(), "unsupported DWARF encoding 0x5e");

        let err = BasaltError::IpPrecedesCallSites(0x40);
        assert!(err.to_string().contains("0x40"));
    }

    #[test]
    fn test_error_is_copy_eq() {
        let a = BasaltError::UnsizedTypeEntry(0x01);
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, BasaltError::UnsupportedEncoding(0x01));
    }
}
