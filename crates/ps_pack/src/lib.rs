#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

// -----------------------------------------------------------------------------
// no_std support

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod decode;
mod encode;
mod error;
mod factory;
mod object;

// -----------------------------------------------------------------------------
// Top-level exports

pub use decode::{Dep, Dependencies, unpack_at, unpack_graph, unpack_object, unpack_ref};
pub use encode::{PackBuilder, pack_graph, pack_object};
pub use error::{ConstructError, PackError, UnpackError};
pub use factory::{Chained, Construct, ConstructObjects, ObjectFactory};
pub use object::{Obj, ObjId, Packable, downcast, downcast_mut, obj};
