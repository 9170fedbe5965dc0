use ps_record::{Record, RecordRef};

use crate::ReadError;

// -----------------------------------------------------------------------------
// RecordReader

/// The injectable source half of the record protocol.
///
/// A reader produces [`Record`]s in the same order a matching writer emitted
/// them, ending the stream with `Ok(None)`. A record that cannot be parsed
/// into the value model is reported as [`ReadError::MalformedRecord`]:
/// surfaced, never silently coerced into something constructible.
pub trait RecordReader {
    /// Produces the next record, or `Ok(None)` at end of stream.
    fn next_record(&mut self) -> Result<Option<Record>, ReadError>;
}

// -----------------------------------------------------------------------------
// RandomAccess

/// Optional capability for readers whose medium supports addressing records
/// directly by reference, without consuming the stream.
pub trait RandomAccess: RecordReader {
    /// Produces the record with the given reference.
    fn record_at(&mut self, reference: RecordRef) -> Result<Record, ReadError>;
}
