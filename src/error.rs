//! Error type shared by the lookup structures and their loaders.

/// Errors produced by lookup construction, insertion, and loading.
///
/// The trie and hash table themselves only ever fail with
/// [`Error::OutOfMemory`]. The remaining variants come from the layers that
/// validate untrusted input before it reaches them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An owning allocation could not be satisfied.
    #[error("unable to allocate storage for {what}")]
    OutOfMemory {
        /// What the failed allocation was for.
        what: &'static str,
    },

    /// A primitive that is expected to always succeed failed.
    #[error("unexpected operation failure: {0}")]
    UnexpectedOperation(&'static str),

    /// A prefix length outside `0..=32`.
    #[error("invalid prefix length {0}, expected 0..=32")]
    InvalidPrefixLength(i64),

    /// A hash table capacity that is not positive.
    #[error("invalid hash table capacity {0}, expected a positive value")]
    InvalidCapacity(i64),

    /// Text that is not a dotted-quad IPv4 address.
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),

    /// A record that could not be parsed by a record reader.
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number of the record.
        line: usize,
        /// Why the record was rejected.
        reason: String,
    },

    /// I/O failure while reading records.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) const fn oom(what: &'static str) -> Self {
        Error::OutOfMemory { what }
    }

    /// Returns true if this is an allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. })
    }
}
