use alloc::borrow::Cow;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::debug;
use ps_record::{Record, RecordRef, TypeTag, Value};
use serde::{Deserialize, Serialize};

use crate::{RandomAccess, ReadError, RecordHandle, RecordReader, RecordWriter, WriteError};

// -----------------------------------------------------------------------------
// RecordSet

/// An ordered, reference-indexed batch of records.
///
/// The position of a record in the set equals the index of its reference, so
/// lookups by [`RecordRef`] are direct. A `RecordSet` serializes through
/// `serde`, which makes any serde data format a wire format for record
/// batches, so the core never has to assume one.
///
/// A set does not validate its contents; readers check each record against
/// the value model as they hand it out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    /// Creates an empty set.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Wraps an already-ordered batch of records.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Appends a record. The record's reference should equal its position;
    /// readers flag mismatches as malformed.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Returns the record with the given reference.
    pub fn get(&self, reference: RecordRef) -> Option<&Record> {
        self.records.get(reference.index() as usize)
    }

    /// Returns the number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the set holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates the records in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

// -----------------------------------------------------------------------------
// MemoryWriter

/// A [`RecordWriter`] that collects records into a [`RecordSet`].
///
/// References are allocated densely in begin order; any number of records
/// may be open at once. Call [`finish`](MemoryWriter::finish) to take the
/// completed set.
///
/// # Examples
///
/// ```
/// use ps_io::{MemoryReader, MemoryWriter, RecordReader, RecordWriter};
/// use ps_record::{TypeTag, Value};
///
/// let mut writer = MemoryWriter::new();
/// let tag = TypeTag::new("geo.point");
///
/// let handle = writer.begin_record(&tag).unwrap();
/// writer.write_field(&handle, "x", Value::Int(3)).unwrap();
/// let reference = writer.end_record(handle).unwrap();
///
/// let set = writer.finish().unwrap();
/// let mut reader = MemoryReader::new(&set);
/// let rec = reader.next_record().unwrap().unwrap();
/// assert_eq!(rec.reference(), reference);
/// assert_eq!(rec.get("x"), Some(&Value::Int(3)));
/// assert!(reader.next_record().unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryWriter {
    slots: Vec<OpenSlot>,
}

#[derive(Debug)]
struct OpenSlot {
    record: Record,
    sealed: bool,
}

impl MemoryWriter {
    /// Creates a writer with no records.
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Returns the number of records begun so far, sealed or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no record has been begun.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Consumes the writer, returning the completed [`RecordSet`].
    ///
    /// Fails with [`WriteError::UnfinishedRecord`] if any record was begun
    /// but never sealed.
    pub fn finish(self) -> Result<RecordSet, WriteError> {
        let mut records = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            if !slot.sealed {
                return Err(WriteError::UnfinishedRecord {
                    reference: slot.record.reference(),
                });
            }
            records.push(slot.record);
        }
        debug!("memory writer finished with {} records", records.len());
        Ok(RecordSet { records })
    }

    fn open_slot(&mut self, token: u32) -> Result<&mut Record, WriteError> {
        match self.slots.get_mut(token as usize) {
            Some(slot) if !slot.sealed => Ok(&mut slot.record),
            _ => Err(WriteError::UnknownHandle { token }),
        }
    }
}

impl RecordWriter for MemoryWriter {
    fn begin_record(&mut self, tag: &TypeTag) -> Result<RecordHandle, WriteError> {
        let token = self.slots.len() as u32;
        let reference = RecordRef::new(token);
        self.slots.push(OpenSlot {
            record: Record::new(tag.clone(), reference),
            sealed: false,
        });
        Ok(RecordHandle::new(reference, token))
    }

    fn write_field(
        &mut self,
        handle: &RecordHandle,
        name: &str,
        value: Value,
    ) -> Result<(), WriteError> {
        if name.is_empty() {
            return Err(WriteError::EmptyFieldName);
        }
        let record = self.open_slot(handle.token())?;
        record.push(Cow::Owned(String::from(name)), value);
        Ok(())
    }

    fn end_record(&mut self, handle: RecordHandle) -> Result<RecordRef, WriteError> {
        let token = handle.token();
        match self.slots.get_mut(token as usize) {
            Some(slot) if !slot.sealed => {
                slot.sealed = true;
                Ok(slot.record.reference())
            }
            _ => Err(WriteError::UnknownHandle { token }),
        }
    }
}

// -----------------------------------------------------------------------------
// MemoryReader

/// A [`RecordReader`] streaming a [`RecordSet`] in emission order.
///
/// Every record is checked against the value model before it is handed out;
/// a record that fails validation, or whose reference does not match its
/// position in the set, is reported as [`ReadError::MalformedRecord`].
///
/// Also implements [`RandomAccess`], since the backing set is indexed by
/// reference.
#[derive(Debug)]
pub struct MemoryReader<'a> {
    set: &'a RecordSet,
    cursor: usize,
}

impl<'a> MemoryReader<'a> {
    /// Creates a reader over the given set.
    pub const fn new(set: &'a RecordSet) -> Self {
        Self { set, cursor: 0 }
    }
}

fn checked(record: &Record, expected: RecordRef) -> Result<Record, ReadError> {
    record
        .validate()
        .map_err(|fault| ReadError::MalformedRecord {
            reference: record.reference(),
            detail: fault.to_string().into(),
        })?;
    if record.reference() != expected {
        return Err(ReadError::MalformedRecord {
            reference: record.reference(),
            detail: "record reference does not match its position in the set".into(),
        });
    }
    Ok(record.clone())
}

impl RecordReader for MemoryReader<'_> {
    fn next_record(&mut self) -> Result<Option<Record>, ReadError> {
        let Some(record) = self.set.records.get(self.cursor) else {
            return Ok(None);
        };
        let record = checked(record, RecordRef::new(self.cursor as u32))?;
        self.cursor += 1;
        Ok(Some(record))
    }
}

impl RandomAccess for MemoryReader<'_> {
    fn record_at(&mut self, reference: RecordRef) -> Result<Record, ReadError> {
        match self.set.get(reference) {
            Some(record) => checked(record, reference),
            None => Err(ReadError::MissingRecord { reference }),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
