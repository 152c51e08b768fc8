use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Header parse failure. Copy-only so the lookup path never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("header truncated")]
    Truncated,

    #[error("unexpected IP version")]
    BadVersion,

    #[error("bad header length field")]
    BadHeaderLength,
}

/// Extension header walk failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// The chain ended without reaching the requested header.
    #[error("header not found in extension chain")]
    NotFound,

    /// A header in the chain could not be read; the walk cannot continue.
    #[error("malformed extension header chain")]
    Malformed,
}

/// Why a packet yielded no transport tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("packet carries no extractable transport tuple")]
    NotExtractable,

    #[error("malformed extension header chain")]
    Malformed,
}

impl From<HeaderError> for ExtractError {
    fn from(_: HeaderError) -> Self {
        ExtractError::NotExtractable
    }
}

impl From<WalkError> for ExtractError {
    fn from(err: WalkError) -> Self {
        match err {
            WalkError::NotFound => ExtractError::NotExtractable,
            WalkError::Malformed => ExtractError::Malformed,
        }
    }
}

/// Why a socket found in the table was not handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// Rejected by the listener/established mode filter.
    ModeMismatch,
    /// Bound to the unspecified address and not in TIME_WAIT.
    WildcardBound,
}

/// Why a lookup produced no socket. Callers only ever see `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MissReason {
    #[error("packet carries no extractable transport tuple")]
    NotExtractable,

    #[error("malformed extension header chain")]
    Malformed,

    #[error("no matching socket")]
    NoMatch,

    #[error("socket filtered: {0:?}")]
    Filtered(FilterReason),
}

impl From<ExtractError> for MissReason {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NotExtractable => MissReason::NotExtractable,
            ExtractError::Malformed => MissReason::Malformed,
        }
    }
}
