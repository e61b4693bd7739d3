use std::cell::RefCell;
use std::fmt;

/// Error Type shared by every fallible engine entry point
///
/// Informational conditions (no value at an index, iterator exhaustion) are
/// expressed through `Option` and [crate::iter::CursorStatus] rather than
/// through this enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GblasError {
    /// Context disengaged (or mode queried) before the engine saw an engage/init
    Uninitialized,
    /// A required object handle was absent
    NullPointer(String),
    /// An argument carried an invalid value
    InvalidValue(String),
    /// A row or column index is not a valid index (beyond the 2^60 ceiling)
    InvalidIndex(String),
    /// Operator, monoid, or semiring domains do not line up
    DomainMismatch(String),
    /// Object dimensions do not line up
    DimensionMismatch(String),
    /// The output object was required to be empty and is not
    OutputNotEmpty,
    /// Requested feature has no backend wired in
    NotImplemented(String),
    /// A write-once setting was set a second time
    AlreadySet(String),
    /// A user-supplied operator panicked inside a kernel
    Panic(String),
    /// Allocation failure reported by the allocator
    OutOfMemory,
    /// A caller-provided buffer is too small
    InsufficientSpace(String),
    /// Internal invariants of an object failed a deep check
    InvalidObject(String),
    /// A row or column index exceeds the object dimensions
    IndexOutOfBounds(String),
    /// An operation required a non-empty object
    EmptyObject,
}

impl fmt::Display for GblasError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Engine context is not initialized!"),
            Self::NullPointer(what) => write!(f, "Required object is absent: {}!", what),
            Self::InvalidValue(what) => write!(f, "Invalid argument value: {}!", what),
            Self::InvalidIndex(what) => write!(f, "Invalid index: {}!", what),
            Self::DomainMismatch(what) => write!(f, "Operator domains do not match: {}!", what),
            Self::DimensionMismatch(what) => write!(f, "Dimensions do not match: {}!", what),
            Self::OutputNotEmpty => write!(f, "Output object must be empty; Cannot proceed!"),
            Self::NotImplemented(what) => write!(f, "Not implemented: {}!", what),
            Self::AlreadySet(what) => write!(f, "Setting was already fixed: {}!", what),
            Self::Panic(what) => write!(f, "User operator panicked: {}!", what),
            Self::OutOfMemory => write!(f, "Out of memory!"),
            Self::InsufficientSpace(what) => write!(f, "Insufficient space: {}!", what),
            Self::InvalidObject(what) => write!(f, "Object is corrupt: {}!", what),
            Self::IndexOutOfBounds(what) => write!(f, "Index out of bounds: {}!", what),
            Self::EmptyObject => write!(f, "Object has no entries; Cannot proceed!"),
        }
    }
}

impl std::error::Error for GblasError {}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

/// Most recent error message observed on this thread, if any
///
/// The message is a rendered copy; it stays valid after the error value is
/// dropped.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow().clone())
}

pub(crate) fn record<T>(res: Result<T, GblasError>) -> Result<T, GblasError> {
    if let Err(ref e) = res {
        LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(e.to_string()));
    }
    res
}
