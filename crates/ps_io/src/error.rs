use alloc::borrow::Cow;

use ps_record::RecordRef;
use thiserror::Error;

// -----------------------------------------------------------------------------
// WriteError

/// A failure while emitting records through a [`RecordWriter`].
///
/// [`RecordWriter`]: crate::RecordWriter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteError {
    #[error("record handle {token} is not open in this writer")]
    UnknownHandle { token: u32 },

    #[error("field names must not be empty")]
    EmptyFieldName,

    #[error("record {reference} was never sealed with `end_record`")]
    UnfinishedRecord { reference: RecordRef },

    #[error("writer backend failure: {detail}")]
    Backend { detail: Cow<'static, str> },
}

// -----------------------------------------------------------------------------
// ReadError

/// A failure while producing records through a [`RecordReader`].
///
/// [`RecordReader`]: crate::RecordReader
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReadError {
    /// The reader produced data that does not parse into the record value
    /// model. Never silently coerced; always surfaced.
    #[error("malformed record {reference}: {detail}")]
    MalformedRecord {
        reference: RecordRef,
        detail: Cow<'static, str>,
    },

    /// A record was requested by reference from a reader that does not
    /// contain it.
    #[error("record {reference} is not present in this reader")]
    MissingRecord { reference: RecordRef },

    #[error("reader backend failure: {detail}")]
    Backend { detail: Cow<'static, str> },
}
