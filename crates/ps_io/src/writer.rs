use ps_record::{RecordRef, TypeTag, Value};

use crate::WriteError;

// -----------------------------------------------------------------------------
// RecordHandle

/// The handle to a record that has been begun but not yet sealed.
///
/// Handles are created by [`RecordWriter::begin_record`] and consumed by
/// [`RecordWriter::end_record`]; fields are written through a borrow in
/// between, so a sealed record can never be written to again.
///
/// The handle carries the [`RecordRef`] the writer allocated for the record,
/// which is available from the moment the record is begun. That is what lets
/// the graph walker install a parent's reference into a child while the
/// parent record is still open, resolving cycles without revisiting.
#[derive(Debug)]
pub struct RecordHandle {
    reference: RecordRef,
    token: u32,
}

impl RecordHandle {
    /// Creates a handle. Called by writer implementations only.
    #[inline]
    pub const fn new(reference: RecordRef, token: u32) -> Self {
        Self { reference, token }
    }

    /// Returns the reference the writer allocated for this record.
    #[inline]
    pub const fn reference(&self) -> RecordRef {
        self.reference
    }

    /// Returns the writer-internal token identifying the open record.
    #[inline]
    pub const fn token(&self) -> u32 {
        self.token
    }
}

// -----------------------------------------------------------------------------
// RecordWriter

/// The injectable sink half of the record protocol.
///
/// A writer converts a graph traversal into a sequence of primitive-valued
/// records. The concrete medium (memory, file, network, text format) is
/// entirely the implementation's concern; the walker only relies on the
/// contract below.
///
/// # Contract
///
/// - `begin_record` allocates the next [`RecordRef`], densely and in begin
///   order, and returns a handle carrying it.
/// - Several records may be open at once: a parent stays open while the
///   walker begins its children, so implementations must keep per-handle
///   state rather than a single current record.
/// - `write_field` appends one named value to an open record. Field order is
///   significant and must be preserved.
/// - `end_record` seals the record and returns the same reference the handle
///   was begun with.
/// - Output must be deterministic relative to the traversal: writing an
///   unchanged graph twice through the same implementation produces
///   identical record sequences.
pub trait RecordWriter {
    /// Starts a new record with the given tag, allocating its reference.
    fn begin_record(&mut self, tag: &TypeTag) -> Result<RecordHandle, WriteError>;

    /// Appends a field to an open record.
    fn write_field(
        &mut self,
        handle: &RecordHandle,
        name: &str,
        value: Value,
    ) -> Result<(), WriteError>;

    /// Seals a record, returning its reference.
    fn end_record(&mut self, handle: RecordHandle) -> Result<RecordRef, WriteError>;
}
