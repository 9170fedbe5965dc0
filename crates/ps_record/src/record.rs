use alloc::borrow::Cow;
use core::fmt;

use alloc::vec::Vec;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{RecordRef, TypeTag, Value};

/// The name of one record field.
///
/// Field names are usually string literals, so the borrowed form avoids an
/// allocation per field on the hot path.
pub type FieldName = Cow<'static, str>;

// -----------------------------------------------------------------------------
// Record

/// The ordered, primitive-valued representation of one packed object.
///
/// A record carries the [`TypeTag`] naming its logical type, the
/// [`RecordRef`] identifying it within its session, and an ordered sequence
/// of named [`Value`]s. Records are the only unit exchanged with writers and
/// readers; field order is significant and preserved, which is what makes
/// serialization output deterministic.
///
/// Field names must be non-empty and unique within a record; [`validate`]
/// checks both. Readers are expected to reject records that fail validation
/// rather than hand them to the factory.
///
/// # Examples
///
/// ```
/// use ps_record::{Record, RecordRef, TypeTag, Value};
///
/// let mut rec = Record::new(TypeTag::new("geo.point"), RecordRef::new(0));
/// rec.push("x", 3);
/// rec.push("y", 4);
///
/// assert_eq!(rec.len(), 2);
/// assert_eq!(rec.get("y"), Some(&Value::Int(4)));
/// assert!(rec.validate().is_ok());
/// ```
///
/// [`validate`]: Record::validate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    tag: TypeTag,
    reference: RecordRef,
    fields: Vec<(FieldName, Value)>,
}

impl Record {
    /// Creates an empty record with the given tag and reference.
    pub const fn new(tag: TypeTag, reference: RecordRef) -> Self {
        Self {
            tag,
            reference,
            fields: Vec::new(),
        }
    }

    /// Returns the type tag.
    #[inline]
    pub const fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// Returns the reference identifying this record within its session.
    #[inline]
    pub const fn reference(&self) -> RecordRef {
        self.reference
    }

    /// Appends a field.
    ///
    /// Appending does not validate; use [`validate`](Record::validate) to
    /// check the whole record.
    pub fn push(&mut self, name: impl Into<FieldName>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the value of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Returns `true` if a field with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates the fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_ref(), v))
    }

    /// Iterates every reference this record contains, paired with the field
    /// it occurs in. References nested inside lists are included.
    pub fn references(&self) -> impl Iterator<Item = (&str, RecordRef)> {
        self.fields
            .iter()
            .flat_map(|(n, v)| v.references().map(move |r| (n.as_ref(), r)))
    }

    /// Checks the record against the value model.
    ///
    /// A record is malformed if any field name is empty or if two fields
    /// share a name.
    pub fn validate(&self) -> Result<(), RecordFault> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for (index, (name, _)) in self.fields.iter().enumerate() {
            if name.is_empty() {
                return Err(RecordFault::EmptyFieldName { index });
            }
            if !seen.insert(name.as_ref()) {
                return Err(RecordFault::DuplicateFieldName { name: name.clone() });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` ({} fields)", self.reference, self.tag, self.len())
    }
}

// -----------------------------------------------------------------------------
// RecordFault

/// A violation of the record value model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordFault {
    #[error("field {index} has an empty name")]
    EmptyFieldName { index: usize },

    #[error("field name `{name}` occurs more than once")]
    DuplicateFieldName { name: FieldName },
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Record, RecordFault};
    use crate::{RecordRef, TypeTag, Value};
    use alloc::vec;
    use alloc::vec::Vec;

    fn record() -> Record {
        Record::new(TypeTag::new("demo.node"), RecordRef::new(0))
    }

    #[test]
    fn get_returns_first_match_in_order() {
        let mut rec = record();
        rec.push("label", "a");
        rec.push("weight", 2.5);
        assert_eq!(rec.get("label"), Some(&Value::Text("a".into())));
        assert_eq!(rec.get("missing"), None);
        assert!(rec.contains("weight"));
    }

    #[test]
    fn references_reports_field_names() {
        let mut rec = record();
        rec.push("next", RecordRef::new(1));
        rec.push(
            "others",
            Value::List(vec![RecordRef::new(2).into(), Value::Null]),
        );
        let refs: Vec<_> = rec.references().collect();
        assert_eq!(
            refs,
            vec![("next", RecordRef::new(1)), ("others", RecordRef::new(2))]
        );
    }

    #[test]
    fn validate_rejects_empty_and_duplicate_names() {
        let mut rec = record();
        rec.push("", 1);
        assert_eq!(rec.validate(), Err(RecordFault::EmptyFieldName { index: 0 }));

        let mut rec = record();
        rec.push("x", 1);
        rec.push("x", 2);
        assert!(matches!(
            rec.validate(),
            Err(RecordFault::DuplicateFieldName { .. })
        ));
    }

    #[test]
    fn serde_round_trip_preserves_field_order() {
        let mut rec = record();
        rec.push("b", 1);
        rec.push("a", 2);
        let text = serde_json::to_string(&rec).unwrap();
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rec);
        let names: Vec<_> = back.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);

        let text = ron::to_string(&rec).unwrap();
        let back: Record = ron::from_str(&text).unwrap();
        assert_eq!(back, rec);
    }
}
