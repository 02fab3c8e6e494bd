//! Error types for copse

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// The main error type for copse operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Key outside the accepted size range (the empty key is reserved)
    #[error("key size {size} outside accepted range 1..={max}")]
    KeySizeLimit {
        /// Size of the offending key
        size: usize,
        /// Maximum allowed key size
        max: usize,
    },

    /// Value exceeds the configured size limit
    #[error("value size {size} exceeds limit {max}")]
    ValueSizeLimit {
        /// Size of the offending value
        size: usize,
        /// Maximum allowed value size
        max: usize,
    },

    /// Entry index beyond a node's entry count
    #[error("entry index {index} out of range for node with {count} entries")]
    IndexOutOfRange {
        /// Requested entry index
        index: u16,
        /// Entry count of the node
        count: u16,
    },

    /// The splitter could not partition a node within the page budget
    #[error("split produced a node of {nbytes} bytes over the page budget")]
    SplitBudget {
        /// Encoded size of the oversized partition
        nbytes: usize,
    },

    /// A builder write would run past its scratch buffer
    #[error("node buffer overflow: need {need} bytes, have {cap}")]
    NodeOverflow {
        /// Bytes the write requires
        need: usize,
        /// Capacity of the scratch buffer
        cap: usize,
    },

    /// Node layout corruption detected
    #[error("corruption detected: {details}")]
    Corruption {
        /// Description of the corruption
        details: String,
        /// Page where corruption was detected
        page_id: Option<PageId>,
    },

    /// Invalid operation attempted
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Page not found in the page store
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// Opaque failure propagated from the page store
    #[error("page store error: {0}")]
    Store(Cow<'static, str>),
}

/// Page identifier assigned by the page store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

impl PageId {
    /// Sentinel id for "no page"; the root of an empty tree.
    pub const NULL: PageId = PageId(0);

    /// Whether this is the null sentinel
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result type alias for copse operations
pub type Result<T> = std::result::Result<T, Error>;
