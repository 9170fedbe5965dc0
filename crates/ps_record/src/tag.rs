use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use serde::de::{Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// TypeTag

/// A caller-defined identifier naming the logical type of a packed object.
///
/// A tag is meaningful only relative to the factory supplied for a given
/// call: the same tag may resolve to different concrete implementations
/// across calls. That indirection is what lets a deserializing peer
/// substitute its own local class versions for the ones that produced the
/// data.
///
/// Tags are cheap to clone and compare.
///
/// # Examples
///
/// ```
/// use ps_record::TypeTag;
///
/// let tag = TypeTag::new("geo.point");
/// assert_eq!(tag.as_str(), "geo.point");
/// assert_eq!(tag, TypeTag::from("geo.point"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(Arc<str>);

impl TypeTag {
    /// Creates a tag from any string-like value.
    #[inline]
    pub fn new(tag: impl Into<TypeTag>) -> Self {
        tag.into()
    }

    /// Returns the tag text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeTag {
    #[inline]
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for TypeTag {
    #[inline]
    fn from(value: String) -> Self {
        Self(Arc::from(value.as_str()))
    }
}

impl AsRef<str> for TypeTag {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TypeTag {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for TypeTag {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({:?})", &*self.0)
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = TypeTag;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a type tag string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(TypeTag::from(v))
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

// -----------------------------------------------------------------------------
// Tests
