use alloc::boxed::Box;

use hashbrown::HashMap;
use ps_record::{PropertySheet, Record, TypeTag};

use crate::decode::Dependencies;
use crate::error::{ConstructError, owned};
use crate::object::Obj;

// -----------------------------------------------------------------------------
// Construct

/// One construction strategy: a pure mapping from a record and its resolved
/// dependencies to a new object.
///
/// # Cycles
///
/// A dependency pulled through [`Dependencies::object`] may come back
/// *deferred* when it participates in a cycle. A strategy that tolerates
/// this stores a placeholder (typically `None`) and implements
/// [`patch`](Construct::patch) so the walker can install the real object
/// once it exists. A strategy that needs the dependency finished uses
/// [`Dependencies::require`] instead; the walker re-runs it once the
/// dependency completes, and reports a cycle of such strategies as a
/// cyclic-construction failure.
pub trait Construct {
    /// Builds the object for one record.
    fn construct(
        &self,
        state: &Record,
        deps: &mut Dependencies<'_>,
        hints: &PropertySheet,
    ) -> Result<Obj, ConstructError>;

    /// Installs a dependency that was deferred during
    /// [`construct`](Construct::construct).
    ///
    /// The default refuses, which is correct for strategies that never
    /// accept a deferred dependency.
    fn patch(&self, obj: &Obj, field: &str, dep: Obj) -> Result<(), ConstructError> {
        let _ = (obj, dep);
        Err(ConstructError::CannotPatch { field: owned(field) })
    }
}

struct FnConstruct<F>(F);

impl<F> Construct for FnConstruct<F>
where
    F: Fn(&Record, &mut Dependencies<'_>, &PropertySheet) -> Result<Obj, ConstructError>,
{
    fn construct(
        &self,
        state: &Record,
        deps: &mut Dependencies<'_>,
        hints: &PropertySheet,
    ) -> Result<Obj, ConstructError> {
        (self.0)(state, deps, hints)
    }
}

// -----------------------------------------------------------------------------
// ConstructObjects

/// Strategy lookup, the seam the decode walker consumes.
///
/// [`ObjectFactory`] is the plain implementation; [`Chained`] composes two
/// lookups without mutating either.
pub trait ConstructObjects {
    /// Returns the strategy registered for a tag, if any.
    fn strategy(&self, tag: &TypeTag) -> Option<&dyn Construct>;
}

// -----------------------------------------------------------------------------
// ObjectFactory

/// A per-call registry mapping type tags to construction strategies.
///
/// Factories are plain values: registering mutates only the instance it is
/// called on, and the framework holds no process-wide default registry that
/// silently participates in deserialization. Passing different factories to
/// different calls is how a caller substitutes local class versions for the
/// ones that produced the data.
///
/// # Examples
///
/// ```
/// use ps_pack::{ConstructError, ObjectFactory, obj};
/// use ps_pack::{PackBuilder, PackError, Packable};
/// use ps_record::{TypeTag, Value};
///
/// struct Point { x: i64, y: i64 }
///
/// impl Packable for Point {
///     fn state_tag(&self) -> TypeTag { TypeTag::new("geo.point") }
///     fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
///         rec.field("x", self.x)?;
///         rec.field("y", self.y)
///     }
/// }
///
/// let mut factory = ObjectFactory::new();
/// factory.register_fn("geo.point", |state, _deps, _hints| {
///     let x = state.get("x").and_then(Value::as_int)
///         .ok_or_else(|| ConstructError::missing_field(state, "x"))?;
///     let y = state.get("y").and_then(Value::as_int)
///         .ok_or_else(|| ConstructError::missing_field(state, "y"))?;
///     Ok(obj(Point { x, y }))
/// });
///
/// assert!(factory.contains(&TypeTag::new("geo.point")));
/// ```
#[derive(Default)]
pub struct ObjectFactory {
    strategies: HashMap<TypeTag, Box<dyn Construct>>,
}

impl ObjectFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the strategy for a tag.
    pub fn register(&mut self, tag: impl Into<TypeTag>, strategy: impl Construct + 'static) {
        self.strategies.insert(tag.into(), Box::new(strategy));
    }

    /// Adds or replaces a closure strategy for a tag.
    ///
    /// Closure strategies keep the default [`Construct::patch`], so they must
    /// pull cyclic dependencies through [`Dependencies::require`] rather than
    /// accepting deferred ones.
    pub fn register_fn<F>(&mut self, tag: impl Into<TypeTag>, construct: F)
    where
        F: Fn(&Record, &mut Dependencies<'_>, &PropertySheet) -> Result<Obj, ConstructError>
            + 'static,
    {
        self.register(tag, FnConstruct(construct));
    }

    /// Invokes the strategy registered for a tag.
    ///
    /// Fails with [`ConstructError::UnknownTypeTag`] if no strategy is
    /// registered: a recoverable, reportable error, never a silent default.
    pub fn construct(
        &self,
        tag: &TypeTag,
        state: &Record,
        deps: &mut Dependencies<'_>,
        hints: &PropertySheet,
    ) -> Result<Obj, ConstructError> {
        match self.strategy(tag) {
            Some(strategy) => strategy.construct(state, deps, hints),
            None => Err(ConstructError::UnknownTypeTag { tag: tag.clone() }),
        }
    }

    /// Returns `true` if a strategy is registered for the tag.
    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.strategies.contains_key(tag)
    }

    /// Returns the number of registered strategies.
    #[inline]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns `true` if no strategy is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl ConstructObjects for ObjectFactory {
    fn strategy(&self, tag: &TypeTag) -> Option<&dyn Construct> {
        self.strategies.get(tag).map(|b| &**b)
    }
}

// -----------------------------------------------------------------------------
// Chained

/// Two strategy lookups composed front-to-back.
///
/// Resolution consults `first`, then `fallback`, the original chained
/// factory arrangement, expressed as a borrowing combinator so neither
/// factory is mutated or consumed. Chains nest: a `Chained` can itself be
/// the fallback of another.
pub struct Chained<'a> {
    first: &'a dyn ConstructObjects,
    fallback: &'a dyn ConstructObjects,
}

impl<'a> Chained<'a> {
    /// Composes two lookups.
    pub fn new(first: &'a dyn ConstructObjects, fallback: &'a dyn ConstructObjects) -> Self {
        Self { first, fallback }
    }
}

impl ConstructObjects for Chained<'_> {
    fn strategy(&self, tag: &TypeTag) -> Option<&dyn Construct> {
        self.first
            .strategy(tag)
            .or_else(|| self.fallback.strategy(tag))
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Chained, ConstructObjects, ObjectFactory};
    use crate::error::ConstructError;
    use crate::object::{Packable, downcast, obj};
    use crate::{PackBuilder, PackError};
    use ps_record::{PropertySheet, Record, RecordRef, TypeTag};

    struct Marker(&'static str);

    impl Packable for Marker {
        fn state_tag(&self) -> TypeTag {
            TypeTag::new("demo.marker")
        }

        fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
            rec.field("name", self.0)
        }
    }

    fn marker_factory(name: &'static str) -> ObjectFactory {
        let mut factory = ObjectFactory::new();
        factory.register_fn("demo.marker", move |_state, _deps, _hints| {
            Ok(obj(Marker(name)))
        });
        factory
    }

    #[test]
    fn register_replaces_previous_strategy() {
        let mut factory = marker_factory("old");
        factory.register_fn("demo.marker", |_s, _d, _h| Ok(obj(Marker("new"))));
        assert_eq!(factory.len(), 1);

        let tag = TypeTag::new("demo.marker");
        let state = Record::new(tag.clone(), RecordRef::new(0));
        let hints = PropertySheet::new();
        let built = crate::unpack_object(&state, &factory, &hints).unwrap();
        assert_eq!(downcast::<Marker>(&built).unwrap().0, "new");
    }

    #[test]
    fn unknown_tags_are_reported_not_defaulted() {
        let factory = ObjectFactory::new();
        let tag = TypeTag::new("demo.unseen");
        assert!(!factory.contains(&tag));
        assert!(factory.strategy(&tag).is_none());

        let state = Record::new(tag.clone(), RecordRef::new(0));
        let mut deps = crate::Dependencies::detached(&state);
        let hints = PropertySheet::new();
        assert!(matches!(
            factory.construct(&tag, &state, &mut deps, &hints),
            Err(ConstructError::UnknownTypeTag { .. })
        ));
    }

    #[test]
    fn chained_lookup_prefers_the_first_factory() {
        let local = marker_factory("local");
        let fallback = marker_factory("fallback");
        let chain = Chained::new(&local, &fallback);
        assert!(chain.strategy(&TypeTag::new("demo.marker")).is_some());

        let mut only_fallback = ObjectFactory::new();
        only_fallback.register_fn("demo.other", |_s, _d, _h| Ok(obj(Marker("other"))));
        let chain = Chained::new(&only_fallback, &fallback);

        let state = Record::new(TypeTag::new("demo.marker"), RecordRef::new(0));
        let hints = PropertySheet::new();
        let built = crate::unpack_object(&state, &chain, &hints).unwrap();
        assert_eq!(downcast::<Marker>(&built).unwrap().0, "fallback");
    }
}
