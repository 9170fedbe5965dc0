use alloc::rc::Rc;
use core::any::Any;
use core::cell::{Ref, RefCell, RefMut};

use ps_record::TypeTag;

use crate::PackError;
use crate::encode::PackBuilder;

// -----------------------------------------------------------------------------
// Packable

/// The decomposition contract an object supplies to the encode walker.
///
/// A packable object names its logical type with a [`TypeTag`] and writes its
/// state as named fields into the builder. Child objects are written with
/// [`PackBuilder::object`], which installs the child's reference into the
/// field, never the child's data.
///
/// The tag deliberately says nothing about the Rust type: a deserializing
/// peer resolves it against whatever factory *it* supplies, so different
/// concrete implementations can exchange state as long as they agree on the
/// field layout behind a tag.
///
/// # Examples
///
/// ```
/// use ps_pack::{PackBuilder, PackError, Packable};
/// use ps_record::TypeTag;
///
/// struct Point {
///     x: i64,
///     y: i64,
/// }
///
/// impl Packable for Point {
///     fn state_tag(&self) -> TypeTag {
///         TypeTag::new("geo.point")
///     }
///
///     fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
///         rec.field("x", self.x)?;
///         rec.field("y", self.y)
///     }
/// }
/// ```
pub trait Packable: Any {
    /// Returns the tag naming this object's logical type.
    fn state_tag(&self) -> TypeTag;

    /// Decomposes the object's state into the builder.
    fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError>;
}

/// The shared live-object handle used on both sides of the walker.
///
/// Objects are shared with `Rc` so several parents can hold the same child,
/// and wrapped in `RefCell` so deferred cycle edges can be back-patched after
/// construction. The combination is deliberately single-threaded, matching
/// the single-owner session rule.
pub type Obj = Rc<RefCell<dyn Packable>>;

/// Wraps a value into an [`Obj`].
pub fn obj<T: Packable>(value: T) -> Obj {
    Rc::new(RefCell::new(value))
}

/// Borrows the object as a concrete type.
///
/// Returns `None` if the object is not a `T`.
///
/// # Panics
///
/// Panics if the object is currently mutably borrowed.
pub fn downcast<T: Packable>(obj: &Obj) -> Option<Ref<'_, T>> {
    Ref::filter_map(obj.borrow(), |p| {
        let any: &dyn Any = p;
        any.downcast_ref::<T>()
    })
    .ok()
}

/// Mutably borrows the object as a concrete type.
///
/// Returns `None` if the object is not a `T`.
///
/// # Panics
///
/// Panics if the object is currently borrowed.
pub fn downcast_mut<T: Packable>(obj: &Obj) -> Option<RefMut<'_, T>> {
    RefMut::filter_map(obj.borrow_mut(), |p| {
        let any: &mut dyn Any = p;
        any.downcast_mut::<T>()
    })
    .ok()
}

// -----------------------------------------------------------------------------
// ObjId

/// The identity of a live object within one session.
///
/// Identity, not equality: two equal-but-separate objects have different
/// ids, and the encode walker gives them separate references. Ids are only
/// meaningful while the session keeps the object alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjId(usize);

impl ObjId {
    /// Returns the identity of the given object.
    pub fn of(obj: &Obj) -> Self {
        Self(Rc::as_ptr(obj) as *const () as usize)
    }
}

// -----------------------------------------------------------------------------
// Tests
