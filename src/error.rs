//! Library-wide error and result types.

use std::fmt;

/// Result alias used throughout the codec.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the codec can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No version's header signature matched the supplied prefix/filename.
    DecryptUnknown,
    /// The caller-supplied header-out buffer is smaller than required.
    BufferTooSmall,
    /// The requested version disagrees with the version the file declares.
    InvalidMethod,
    /// The header declares reserved version tag 5.
    V3Unimplemented,
    /// Contradictory or missing region/prefix arguments.
    InvalidArg,
    /// The operation is not supported for this version (V5 has no seek).
    Unimplemented,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DecryptUnknown => write!(f, "no decryption method matched this file"),
            Error::BufferTooSmall => write!(f, "header output buffer is too small"),
            Error::InvalidMethod => write!(f, "requested version disagrees with file header"),
            Error::V3Unimplemented => write!(f, "header declares an unimplemented version tag"),
            Error::InvalidArg => write!(f, "invalid or contradictory arguments"),
            Error::Unimplemented => write!(f, "operation unsupported for this version"),
        }
    }
}

impl std::error::Error for Error {}
