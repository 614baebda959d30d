//! Error types for shadowtree.

use thiserror::Error;

use super::BlockId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the tree and its block store.
///
/// Errors fall into two classes:
/// - recoverable: the caller asked for something that cannot be done
///   (`KeyMissing`, `BadKey`, `ReadOnly`, configuration errors) and the tree
///   is left exactly as it was;
/// - fatal: the on-disk or in-memory structure is inconsistent, or I/O
///   failed. The caller must `abort()` or discard the handle.
///
/// See [`Error::is_fatal`].
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the backing medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lookup or removal of a key that is not in the tree.
    #[error("key not found: {:?}", String::from_utf8_lossy(.key))]
    KeyMissing {
        /// The key as passed by the caller.
        key: Vec<u8>,
    },

    /// A key longer than the configured maximum was passed to `set`.
    #[error("key of {len} bytes exceeds the maximum key length of {max}")]
    BadKey { len: usize, max: usize },

    /// The node encoder refused a key that does not fit its payload region.
    #[error("key of {len} bytes does not fit a {max}-byte key slot")]
    KeyTooLarge { len: usize, max: usize },

    /// Integrity failure: corrupted block, double free, broken parent link,
    /// free-list cycle, or a violated tree invariant.
    #[error("structural error: {0}")]
    Structural(String),

    /// Strict recovery found blocks that are neither reachable, free, nor
    /// scheduled for release.
    #[error("found {} unreachable blocks: {blocks:?}", blocks.len())]
    Unreachable { blocks: Vec<BlockId> },

    /// A header or preamble did not start with the expected prefix.
    #[error("invalid {0} prefix")]
    BadMagic(&'static str),

    /// The comparator supplied at open time differs from the one the store
    /// was created with.
    #[error("store was created with comparator locale {stored}, got {supplied}")]
    ComparatorMismatch { stored: u32, supplied: u32 },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A mutating operation was attempted on a read-only handle.
    #[error("tree is open read-only")]
    ReadOnly,

    /// A block past the end of the store was read.
    #[error("block {id} not found (next unused block is {next})")]
    BlockNotFound { id: BlockId, next: BlockId },

    /// A write would leave a gap in the block sequence.
    #[error("cannot write block {id}: next unused block is {next}")]
    BlockGap { id: BlockId, next: BlockId },
}

impl Error {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    pub(crate) fn key_missing(key: &[u8]) -> Self {
        Error::KeyMissing { key: key.to_vec() }
    }

    /// Whether this error means the handle's state can no longer be trusted.
    ///
    /// After a fatal error the caller must `abort()` (or drop the handle)
    /// before issuing further mutations.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::KeyMissing { .. }
                | Error::BadKey { .. }
                | Error::ReadOnly
                | Error::InvalidConfig(_)
                | Error::ComparatorMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::key_missing(b"pig");
        assert_eq!(format!("{}", err), "key not found: \"pig\"");

        let err = Error::BadKey { len: 40, max: 20 };
        assert_eq!(
            format!("{}", err),
            "key of 40 bytes exceeds the maximum key length of 20"
        );

        let err = Error::Unreachable {
            blocks: vec![BlockId::new(3), BlockId::new(7)],
        };
        assert!(format!("{}", err).starts_with("found 2 unreachable blocks"));
    }

    #[test]
    fn test_key_missing_keeps_raw_bytes() {
        let key = [0x70, 0xFF, 0x00, 0x67];
        match Error::key_missing(&key) {
            Error::KeyMissing { key: stored } => assert_eq!(stored, key),
            other => panic!("Expected KeyMissing, got {:?}", other),
        }
        let err = Error::key_missing(&key);
        assert_eq!(format!("{}", err), "key not found: \"p\u{fffd}\\0g\"");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::key_missing(b"x").is_fatal());
        assert!(!Error::ReadOnly.is_fatal());
        assert!(Error::structural("double free").is_fatal());
        assert!(Error::Unreachable { blocks: vec![] }.is_fatal());
    }
}
