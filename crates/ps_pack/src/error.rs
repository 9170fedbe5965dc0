use alloc::borrow::Cow;
use alloc::string::String;

use ps_io::{ReadError, WriteError};
use ps_record::{FieldName, Record, RecordRef, TypeTag, ValueKind};
use thiserror::Error;

// -----------------------------------------------------------------------------
// ConstructError

/// A failure inside one construction strategy.
///
/// Strategy failures are wrapped with the record's reference and tag by the
/// decode walker before reaching the caller, so a strategy only reports what
/// it can see: its own fields.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConstructError {
    /// No strategy is registered for the tag. Produced by
    /// [`ObjectFactory::construct`](crate::ObjectFactory::construct); the
    /// decode walker promotes this to
    /// [`UnpackError::UnknownTypeTag`].
    #[error("no construction strategy registered for type tag `{tag}`")]
    UnknownTypeTag { tag: TypeTag },

    /// The strategy needs the dependency behind `field` fully constructed
    /// and it is not. The walker re-runs the strategy once the dependency
    /// completes; a cycle of such strategies becomes
    /// [`UnpackError::CyclicConstruction`].
    #[error("dependency behind field `{field}` is not constructed yet")]
    DependencyNotReady { field: FieldName },

    /// A deferred dependency cannot be installed after the fact.
    #[error("field `{field}` cannot be back-patched")]
    CannotPatch { field: FieldName },

    #[error("record {reference} is missing required field `{field}`")]
    MissingField {
        reference: RecordRef,
        field: FieldName,
    },

    #[error("field `{field}`: expected {expected}, found {found}")]
    FieldType {
        field: FieldName,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{detail}")]
    Failed { detail: Cow<'static, str> },
}

impl ConstructError {
    /// A required field is absent from the record.
    pub fn missing_field(record: &Record, field: &str) -> Self {
        Self::MissingField {
            reference: record.reference(),
            field: owned(field),
        }
    }

    /// A field holds a value of the wrong kind.
    pub fn field_type(field: &str, expected: ValueKind, found: ValueKind) -> Self {
        Self::FieldType {
            field: owned(field),
            expected,
            found,
        }
    }

    /// The dependency behind `field` must be fully constructed first.
    pub fn not_ready(field: &str) -> Self {
        Self::DependencyNotReady { field: owned(field) }
    }

    /// The field cannot be back-patched.
    pub fn cannot_patch(field: &str) -> Self {
        Self::CannotPatch { field: owned(field) }
    }

    /// A free-form strategy failure.
    pub fn failed(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }
}

pub(crate) fn owned(field: &str) -> FieldName {
    Cow::Owned(String::from(field))
}

// -----------------------------------------------------------------------------
// PackError

/// A failure while serializing an object graph.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PackError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("record tagged `{tag}` wrote a field with an empty name")]
    EmptyFieldName { tag: TypeTag },

    /// A pack implementation tried to smuggle a raw reference value through
    /// [`PackBuilder::field`](crate::PackBuilder::field). References are
    /// only produced by the session itself.
    #[error("record tagged `{tag}` wrote a raw reference into field `{field}`")]
    RawReference { tag: TypeTag, field: FieldName },

    /// An object field was written outside a graph session, where no
    /// references can be allocated.
    #[error("record tagged `{tag}` wrote object field `{field}` outside a graph session")]
    ObjectOutsideSession { tag: TypeTag, field: FieldName },

    /// The writer sealed a record under a different reference than it was
    /// begun with, breaking the determinism contract.
    #[error("writer sealed record {found}, expected {expected}")]
    ReferenceMismatch {
        expected: RecordRef,
        found: RecordRef,
    },

    /// An object in the graph is mutably borrowed while the session runs.
    /// A session must be the sole owner of its traversal.
    #[error("an object in the graph is already mutably borrowed")]
    BorrowConflict,

    #[error("{detail}")]
    Failed { detail: Cow<'static, str> },
}

impl PackError {
    /// A free-form pack failure.
    pub fn failed(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }
}

// -----------------------------------------------------------------------------
// UnpackError

/// A failure while reconstructing an object graph.
///
/// Every variant is session-fatal: the walker never returns a partially
/// reconstructed graph. These are data-integrity errors, not transient ones;
/// nothing is retried.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum UnpackError {
    /// The factory supplied for this call has no strategy for the tag.
    #[error("no construction strategy registered for type tag `{tag}` (record {reference})")]
    UnknownTypeTag { tag: TypeTag, reference: RecordRef },

    /// The reader produced a record violating the value model.
    #[error("malformed record {reference}: {detail}")]
    MalformedRecord {
        reference: RecordRef,
        detail: Cow<'static, str>,
    },

    /// A reference was used but never defined within the session.
    #[error("record {origin} field `{field}` refers to {reference}, which was never defined in this session")]
    DanglingReference {
        origin: RecordRef,
        field: FieldName,
        reference: RecordRef,
    },

    /// A placeholder-bound cycle never resolved to a fully constructed
    /// object, because every strategy in the cycle demands a finished
    /// dependency.
    #[error("construction of record {reference} (tag `{tag}`) stalled on a cycle that never completes")]
    CyclicConstruction { reference: RecordRef, tag: TypeTag },

    #[error("reader produced no records")]
    EmptyStream,

    #[error("target record {reference} was not produced by this session")]
    TargetNotFound { reference: RecordRef },

    /// A strategy failed for a reason other than the taxonomy above.
    #[error("record {reference} (tag `{tag}`): {source}")]
    Construct {
        reference: RecordRef,
        tag: TypeTag,
        source: ConstructError,
    },

    #[error(transparent)]
    Read(ReadError),
}
